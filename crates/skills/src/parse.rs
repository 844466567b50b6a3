//! SKILL.md parsing: YAML frontmatter between `---` fences, markdown body.

use anyhow::{Context, bail};

use crate::types::SkillMetadata;

/// Parsed SKILL.md: frontmatter metadata plus the instruction body.
#[derive(Debug, Clone)]
pub struct SkillDoc {
    pub metadata: SkillMetadata,
    pub body: String,
}

/// Parse a SKILL.md file. Unknown frontmatter keys are ignored; missing
/// keys take their defaults.
pub fn parse_skill(content: &str) -> anyhow::Result<SkillDoc> {
    let (frontmatter, body) = split_frontmatter(content)?;
    let metadata: SkillMetadata =
        serde_yaml::from_str(&frontmatter).context("invalid SKILL.md frontmatter")?;
    Ok(SkillDoc {
        metadata,
        body: body.to_string(),
    })
}

/// Validate a cron-friendly skill name: lowercase ASCII, digits, hyphens.
pub fn validate_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--")
}

/// Split SKILL.md content at `---` delimiters into (frontmatter, body).
fn split_frontmatter(content: &str) -> anyhow::Result<(String, String)> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        bail!("SKILL.md must start with YAML frontmatter delimited by ---");
    }

    let after_open = &trimmed[3..];
    let close_pos = after_open
        .find("\n---")
        .context("SKILL.md missing closing --- for frontmatter")?;

    let frontmatter = after_open[..close_pos].trim().to_string();
    let body = after_open[close_pos + 4..].trim().to_string();
    Ok((frontmatter, body))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::SkillAccess};

    #[test]
    fn parses_metadata_and_body() {
        let content = r#"---
name: daily-digest
description: Post a morning digest
triggers:
  - daily digest
schedule:
  cron: "0 9 * * 1-5"
  enabled: true
  timezone: Asia/Seoul
---

# Daily digest

Collect yesterday's highlights and post them.
"#;
        let doc = parse_skill(content).unwrap();
        assert_eq!(doc.metadata.name, "daily-digest");
        assert_eq!(doc.metadata.triggers, vec!["daily digest"]);
        let schedule = doc.metadata.schedule.unwrap();
        assert!(schedule.enabled);
        assert_eq!(schedule.timezone.as_deref(), Some("Asia/Seoul"));
        assert!(doc.body.contains("morning digest") || doc.body.contains("highlights"));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let content = "---\nname: x\nfuture-field: whatever\n---\nbody\n";
        let doc = parse_skill(content).unwrap();
        assert_eq!(doc.metadata.name, "x");
        assert_eq!(doc.metadata.access, SkillAccess::OwnerOnly);
    }

    #[test]
    fn missing_frontmatter_rejected() {
        assert!(parse_skill("# Just markdown\n").is_err());
        assert!(parse_skill("---\nname: unterminated\n").is_err());
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("send-report"));
        assert!(validate_name("a1"));
        assert!(!validate_name(""));
        assert!(!validate_name("Bad"));
        assert!(!validate_name("-lead"));
        assert!(!validate_name("trail-"));
        assert!(!validate_name("dou--ble"));
        assert!(!validate_name(&"a".repeat(65)));
    }
}
