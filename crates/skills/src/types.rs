use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which precedence layer a skill was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Shipped with the host: `<project>/skills/`.
    Builtin,
    /// User-supplied. Wins on name collision.
    User,
}

/// Cron schedule block from SKILL.md frontmatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillSchedule {
    pub cron: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Who may trigger a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkillAccess {
    Public,
    #[default]
    OwnerOnly,
}

/// Metadata parsed from SKILL.md frontmatter. Every field is optional;
/// a missing field takes its documented default rather than failing the
/// skill.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "argument-hint")]
    pub argument_hint: Option<String>,
    /// Tools the reasoning engine may use on this skill's behalf.
    #[serde(default, alias = "allowed-tools")]
    pub allowed_tools: Vec<String>,
    /// Explicit script filename, relative to the skill directory.
    #[serde(default, alias = "script-name")]
    pub script: Option<String>,
    #[serde(default)]
    pub schedule: Option<SkillSchedule>,
    /// Phrases whose presence in a message activates this skill.
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, alias = "disable-model-invocation")]
    pub disable_model_invocation: bool,
    #[serde(default)]
    pub access: SkillAccess,
    /// Skill only makes sense inside a thread.
    #[serde(default, alias = "requires-thread")]
    pub requires_thread: bool,
    /// Skill needs a ticket-reference URL embedded in the message.
    #[serde(default, alias = "requires-ticket-url")]
    pub requires_ticket_url: bool,
}

/// A loaded skill: metadata plus its resolved script.
#[derive(Debug, Clone)]
pub struct Skill {
    /// Directory base name; the identity within the effective registry.
    pub name: String,
    pub dir: PathBuf,
    pub script_path: PathBuf,
    pub metadata: SkillMetadata,
    pub tier: Tier,
}

impl Skill {
    pub fn is_public(&self) -> bool {
        self.metadata.access == SkillAccess::Public
    }

    pub fn schedule_enabled(&self) -> bool {
        self.metadata.schedule.as_ref().is_some_and(|s| s.enabled)
    }
}

/// Normalized output of running a skill script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_excerpt: Option<String>,
}

impl ExecutionResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            stderr_excerpt: None,
        }
    }

    pub fn failure(error: impl Into<String>, stderr_excerpt: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            stderr_excerpt,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_defaults_to_owner_only() {
        let meta: SkillMetadata = serde_yaml::from_str("description: x").unwrap();
        assert_eq!(meta.access, SkillAccess::OwnerOnly);
        assert!(!meta.requires_thread);
        assert!(meta.triggers.is_empty());
    }

    #[test]
    fn kebab_case_aliases_accepted() {
        let meta: SkillMetadata = serde_yaml::from_str(
            "argument-hint: '<channel>'\nrequires-thread: true\naccess: public\n",
        )
        .unwrap();
        assert_eq!(meta.argument_hint.as_deref(), Some("<channel>"));
        assert!(meta.requires_thread);
        assert_eq!(meta.access, SkillAccess::Public);
    }

    #[test]
    fn schedule_disabled_by_default() {
        let meta: SkillMetadata =
            serde_yaml::from_str("schedule:\n  cron: '0 9 * * *'\n").unwrap();
        assert!(!meta.schedule.unwrap().enabled);
    }

    #[test]
    fn execution_result_parses_script_output() {
        let parsed: ExecutionResult =
            serde_json::from_str(r#"{"success":true,"data":{"sent":3}}"#).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.data.unwrap()["sent"], 3);
    }
}
