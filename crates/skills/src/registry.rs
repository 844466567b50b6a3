//! Two-tier skill registry.
//!
//! Builtin skills load first, then user skills overlay them by directory
//! name. The effective set is kept in name order so lookups that take the
//! first match are deterministic.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    parse,
    types::{Skill, Tier},
};

/// Holds the effective skill set. `load_all` replaces it wholesale, so a
/// reload either succeeds per-skill or leaves that skill out.
pub struct SkillRegistry {
    builtin_dir: PathBuf,
    user_dir: PathBuf,
    skills: BTreeMap<String, Skill>,
}

impl SkillRegistry {
    pub fn new(builtin_dir: impl Into<PathBuf>, user_dir: impl Into<PathBuf>) -> Self {
        Self {
            builtin_dir: builtin_dir.into(),
            user_dir: user_dir.into(),
            skills: BTreeMap::new(),
        }
    }

    /// Scan both tiers and rebuild the effective set. A malformed skill is
    /// logged and skipped; it never fails the whole load. The user tier
    /// directory is created if missing.
    pub fn load_all(&mut self) -> usize {
        if let Err(e) = std::fs::create_dir_all(&self.user_dir) {
            warn!(dir = %self.user_dir.display(), %e, "could not create user skills dir");
        }

        let mut skills = BTreeMap::new();
        load_tier(&self.builtin_dir, Tier::Builtin, &mut skills);
        load_tier(&self.user_dir, Tier::User, &mut skills);

        info!(count = skills.len(), "skills loaded");
        self.skills = skills;
        self.skills.len()
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    /// All skills in name order.
    pub fn get_all(&self) -> impl Iterator<Item = &Skill> {
        self.skills.values()
    }

    pub fn get_public(&self) -> impl Iterator<Item = &Skill> {
        self.skills.values().filter(|s| s.is_public())
    }

    /// Skills with an enabled schedule block.
    pub fn get_scheduled(&self) -> impl Iterator<Item = &Skill> {
        self.skills.values().filter(|s| s.schedule_enabled())
    }

    /// First skill (in name order) with a trigger phrase matching the
    /// message. Matching is case-insensitive and bidirectional: the phrase
    /// may appear inside the message, or a short message inside the phrase.
    pub fn find_by_trigger(&self, message: &str) -> Option<&Skill> {
        let needle = message.to_lowercase();
        self.skills
            .values()
            .find(|s| trigger_matches(s, &needle))
    }

    /// Same as [`find_by_trigger`](Self::find_by_trigger) restricted to
    /// public skills.
    pub fn find_public_by_trigger(&self, message: &str) -> Option<&Skill> {
        let needle = message.to_lowercase();
        self.skills
            .values()
            .filter(|s| s.is_public())
            .find(|s| trigger_matches(s, &needle))
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

fn trigger_matches(skill: &Skill, needle: &str) -> bool {
    skill.metadata.triggers.iter().any(|t| {
        let phrase = t.to_lowercase();
        needle.contains(&phrase) || phrase.contains(needle)
    })
}

/// Scan one tier directory, one level deep. Later tiers overwrite earlier
/// entries of the same name.
fn load_tier(base: &Path, tier: Tier, skills: &mut BTreeMap<String, Skill>) {
    let entries = match std::fs::read_dir(base) {
        Ok(e) => e,
        Err(e) => {
            // A tier directory that simply does not exist is normal; any
            // other scan failure is worth surfacing.
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %base.display(), %e, "skill directory scan failed");
            }
            return;
        },
    };

    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(String::from) else {
            continue;
        };
        if !parse::validate_name(&name) {
            warn!(skill = %name, "skipping skill with invalid directory name");
            continue;
        }

        let skill_md = dir.join("SKILL.md");
        let content = match std::fs::read_to_string(&skill_md) {
            Ok(c) => c,
            Err(_) => continue,
        };
        let doc = match parse::parse_skill(&content) {
            Ok(d) => d,
            Err(e) => {
                warn!(skill = %name, %e, "skipping skill with invalid SKILL.md");
                continue;
            },
        };

        let Some(script_path) = resolve_script(&dir, &name, doc.metadata.script.as_deref())
        else {
            warn!(skill = %name, "skipping skill with no executable script");
            continue;
        };

        skills.insert(name.clone(), Skill {
            name,
            dir,
            script_path,
            metadata: doc.metadata,
            tier,
        });
    }
}

/// Resolve the skill's script: the explicit frontmatter name, then
/// `<dirname>.sh`, then the first `*.sh` in the directory.
fn resolve_script(dir: &Path, name: &str, explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(file) = explicit {
        let path = dir.join(file);
        if path.is_file() {
            return Some(path);
        }
        warn!(skill = %name, script = %file, "declared script not found");
    }

    let conventional = dir.join(format!("{name}.sh"));
    if conventional.is_file() {
        return Some(conventional);
    }

    let mut shell_scripts: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "sh"))
        .collect();
    shell_scripts.sort();
    shell_scripts.into_iter().next()
}
