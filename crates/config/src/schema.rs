//! Typed configuration schema with env-variable loading.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {name}")]
    MissingVar { name: String },
}

/// How the external reasoning engine is invoked.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Program path or name resolved via `PATH`.
    pub program: String,
    /// Default working directory for engine turns.
    pub default_working_dir: PathBuf,
}

/// Full host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Platform id of the owner. Required; messages from anyone else go
    /// through the restricted dispatch path.
    pub owner_id: String,
    /// Channel scheduled-run alerts are posted to. Defaults to the owner.
    pub alert_channel: String,
    /// Builtin-tier skill directory.
    pub builtin_skills_dir: PathBuf,
    /// User-tier skill directory. Overrides builtin skills on name collision.
    pub user_skills_dir: PathBuf,
    /// Date-partitioned execution journal directory.
    pub journal_dir: PathBuf,
    /// Rendered skill catalog path, regenerated on reload.
    pub catalog_path: PathBuf,
    /// SDK entry script handed to skill processes via `HUDDLE_SDK_PATH`.
    pub sdk_path: PathBuf,
    /// Fallback timezone for schedules that don't name one.
    pub default_timezone: String,
    /// Phrases that trigger thread summarization.
    pub summarize_triggers: Vec<String>,
    /// Phrases that trigger ticket recording.
    pub ticket_triggers: Vec<String>,
    pub engine: EngineConfig,
}

const DEFAULT_TIMEZONE: &str = "Asia/Seoul";

impl HostConfig {
    /// Load from the process environment. Fails on missing identifiers.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source (injectable for tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let owner_id = lookup("HUDDLE_OWNER_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar {
                name: "HUDDLE_OWNER_ID".into(),
            })?;

        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let data = crate::data_dir();

        let alert_channel = lookup("HUDDLE_ALERT_CHANNEL").unwrap_or_else(|| owner_id.clone());

        Ok(Self {
            alert_channel,
            builtin_skills_dir: lookup("HUDDLE_BUILTIN_SKILLS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| cwd.join("skills")),
            user_skills_dir: lookup("HUDDLE_USER_SKILLS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data.join("skills")),
            journal_dir: lookup("HUDDLE_JOURNAL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data.join("logs")),
            catalog_path: lookup("HUDDLE_CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| cwd.join("CATALOG.md")),
            sdk_path: lookup("HUDDLE_SDK_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| cwd.join("sdk")),
            default_timezone: lookup("HUDDLE_TIMEZONE")
                .unwrap_or_else(|| DEFAULT_TIMEZONE.into()),
            summarize_triggers: lookup("HUDDLE_SUMMARIZE_TRIGGERS")
                .map(|v| split_phrases(&v))
                .unwrap_or_else(default_summarize_triggers),
            ticket_triggers: lookup("HUDDLE_TICKET_TRIGGERS")
                .map(|v| split_phrases(&v))
                .unwrap_or_else(default_ticket_triggers),
            engine: EngineConfig {
                program: lookup("HUDDLE_ENGINE_PATH").unwrap_or_else(|| "claude".into()),
                default_working_dir: cwd,
            },
            owner_id,
        })
    }
}

fn split_phrases(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn default_summarize_triggers() -> Vec<String> {
    vec!["summarize this thread".into(), "thread summary".into()]
}

fn default_ticket_triggers() -> Vec<String> {
    vec!["record to ticket".into(), "file this as a ticket".into()]
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::collections::HashMap};

    fn lookup_from<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| map.get(name).map(|v| (*v).to_string())
    }

    #[test]
    fn missing_owner_is_fatal() {
        let vars = HashMap::new();
        let err = HostConfig::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { ref name } if name == "HUDDLE_OWNER_ID"));
    }

    #[test]
    fn blank_owner_is_fatal() {
        let mut vars = HashMap::new();
        vars.insert("HUDDLE_OWNER_ID", "  ");
        assert!(HostConfig::from_lookup(lookup_from(&vars)).is_err());
    }

    #[test]
    fn alert_channel_defaults_to_owner() {
        let mut vars = HashMap::new();
        vars.insert("HUDDLE_OWNER_ID", "U123");
        let cfg = HostConfig::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(cfg.alert_channel, "U123");
        assert_eq!(cfg.default_timezone, "Asia/Seoul");
        assert!(!cfg.summarize_triggers.is_empty());
    }

    #[test]
    fn explicit_values_win() {
        let mut vars = HashMap::new();
        vars.insert("HUDDLE_OWNER_ID", "U123");
        vars.insert("HUDDLE_ALERT_CHANNEL", "C-alerts");
        vars.insert("HUDDLE_TIMEZONE", "Europe/Paris");
        vars.insert("HUDDLE_ENGINE_PATH", "/opt/engine");
        vars.insert("HUDDLE_SUMMARIZE_TRIGGERS", "wrap up, tl;dr");
        let cfg = HostConfig::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(cfg.alert_channel, "C-alerts");
        assert_eq!(cfg.default_timezone, "Europe/Paris");
        assert_eq!(cfg.engine.program, "/opt/engine");
        assert_eq!(cfg.summarize_triggers, vec!["wrap up", "tl;dr"]);
    }

    #[test]
    fn trigger_list_drops_empty_entries() {
        assert_eq!(split_phrases("a, ,b,"), vec!["a", "b"]);
    }
}
