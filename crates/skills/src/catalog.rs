//! Generated skill catalog.
//!
//! Renders the effective skill set into a markdown file the reasoning
//! engine reads at session start, so it knows which skills exist, how to
//! author new ones, and where the user tier lives.

use std::path::Path;

use {chrono::Utc, tracing::info};

use crate::{registry::SkillRegistry, types::Skill};

/// Render the catalog for the current registry contents.
pub fn render(registry: &SkillRegistry, user_dir: &Path) -> String {
    let skills: Vec<&Skill> = registry.get_all().collect();
    let user_dir = user_dir.display();

    let skill_section = if skills.is_empty() {
        "_No skills registered yet._\n\nAdd a skill directory and it will show up here.".to_string()
    } else {
        skills
            .iter()
            .map(|s| render_skill(s))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    };

    format!(
        r#"# huddle

> Generated {now}
> Say "reload skills" after adding a skill to refresh this file.

---

## Current skills ({count})

{skill_section}

---

## Built-in commands

| Command | Effect |
|---|---|
| `reset` | Clear this conversation's session |
| `list skills` | Show the loaded skill set |
| `reload skills` | Rescan skill directories and regenerate this catalog |
| `show current directory` | Print the engine working directory |
| `change directory <path>` | Move the engine working directory |

---

## Adding a skill

Create a directory under the user tier (or ask the engine to create one):

```
{user_dir}/
└── <skill-name>/
    ├── SKILL.md          # metadata (required)
    └── <skill-name>.sh   # executable script (required)
```

### SKILL.md format

```yaml
---
name: my-skill
description: When this skill should run
triggers:
  - "trigger phrase"
schedule:             # optional automatic runs
  cron: "0 9 * * *"
  enabled: false
  timezone: "Asia/Seoul"
access: owner-only    # or: public
---

## Instructions

Describe what the skill does.
```

### Script contract

Scripts run as `sh <script> [args..] <channel>` from the skill directory,
with `HUDDLE_SDK_PATH` pointing at the helper SDK. Print a JSON object to
stdout (`{{"success": true, ...}}`); plain text is also accepted and
treated as a successful result. Exit non-zero on failure.

Rules:
- Skill names use lowercase letters, digits, and hyphens (`daily-report`)
- Secrets come from the environment, never from the skill directory

---

## Skill precedence

```
user tier ({user_dir}/)
    > builtin tier (<project>/skills/)
```

A user skill overrides a builtin skill of the same name.
"#,
        now = Utc::now().format("%Y-%m-%d %H:%M UTC"),
        count = skills.len(),
    )
}

fn render_skill(skill: &Skill) -> String {
    let m = &skill.metadata;
    let mut lines = vec![
        format!("### `{}` [{:?}]", skill.name, skill.tier).to_lowercase(),
        String::new(),
        if m.description.is_empty() {
            "_No description._".to_string()
        } else {
            m.description.clone()
        },
    ];

    if !m.triggers.is_empty() {
        let triggers = m
            .triggers
            .iter()
            .map(|t| format!("`{t}`"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("- **Triggers:** {triggers}"));
    }
    if let Some(schedule) = m.schedule.as_ref().filter(|s| s.enabled) {
        let tz = schedule.timezone.as_deref().unwrap_or("Asia/Seoul");
        lines.push(format!("- **Schedule:** `{}` ({tz})", schedule.cron));
    }
    if let Some(hint) = &m.argument_hint {
        lines.push(format!("- **Arguments:** `{hint}`"));
    }

    lines.join("\n")
}

/// Render and write the catalog file.
pub fn write_catalog(
    registry: &SkillRegistry,
    user_dir: &Path,
    output: &Path,
) -> std::io::Result<()> {
    let content = render(registry, user_dir);
    std::fs::write(output, content)?;
    info!(path = %output.display(), skills = registry.len(), "catalog written");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::fs};

    fn registry_with(frontmatter: &str) -> (tempfile::TempDir, SkillRegistry) {
        let tmp = tempfile::tempdir().unwrap();
        let builtin = tmp.path().join("builtin");
        let dir = builtin.join("digest");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("SKILL.md"), format!("---\n{frontmatter}---\nbody\n")).unwrap();
        fs::write(dir.join("digest.sh"), "#!/bin/sh\n").unwrap();
        let mut registry = SkillRegistry::new(builtin, tmp.path().join("user"));
        registry.load_all();
        (tmp, registry)
    }

    #[test]
    fn renders_skill_entries_with_triggers_and_schedule() {
        let (tmp, registry) = registry_with(
            "description: Morning digest\ntriggers:\n  - daily digest\nschedule:\n  cron: '0 9 * * *'\n  enabled: true\n",
        );
        let content = render(&registry, &tmp.path().join("user"));
        assert!(content.contains("## Current skills (1)"));
        assert!(content.contains("### `digest`"));
        assert!(content.contains("**Triggers:** `daily digest`"));
        assert!(content.contains("`0 9 * * *` (Asia/Seoul)"));
    }

    #[test]
    fn empty_registry_renders_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let mut registry =
            SkillRegistry::new(tmp.path().join("builtin"), tmp.path().join("user"));
        registry.load_all();
        let content = render(&registry, &tmp.path().join("user"));
        assert!(content.contains("_No skills registered yet._"));
    }

    #[test]
    fn write_catalog_creates_the_file() {
        let (tmp, registry) = registry_with("description: x\n");
        let out = tmp.path().join("CATALOG.md");
        write_catalog(&registry, &tmp.path().join("user"), &out).unwrap();
        assert!(fs::read_to_string(out).unwrap().contains("# huddle"));
    }
}
