//! Append-only execution journal: one JSONL file per day.
//!
//! Journaling is strictly best-effort. A failed write is logged at debug
//! and dropped; it must never affect the execution it records.

use std::path::PathBuf;

use {
    chrono::Utc,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::types::Tier;

/// Pseudo skill name used for reasoning-engine turns.
pub const ENGINE_SKILL: &str = "__engine__";

const EXCERPT_LEN: usize = 100;

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    /// RFC 3339 UTC timestamp.
    pub ts: String,
    pub skill: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Truncated prompt excerpt, recorded for engine turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl JournalRecord {
    pub fn skill_run(
        skill: impl Into<String>,
        tier: Tier,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    ) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            skill: skill.into(),
            tier: Some(tier),
            success,
            duration_ms,
            error,
            excerpt: None,
        }
    }

    /// Record a reasoning-engine turn under the `__engine__` name with a
    /// truncated prompt excerpt.
    pub fn engine_turn(prompt: &str, success: bool, duration_ms: u64) -> Self {
        let excerpt: String = prompt.chars().take(EXCERPT_LEN).collect();
        Self {
            ts: Utc::now().to_rfc3339(),
            skill: ENGINE_SKILL.to_string(),
            tier: None,
            success,
            duration_ms,
            error: None,
            excerpt: Some(excerpt),
        }
    }
}

/// Daily JSONL journal rooted at one directory.
#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Append one record to today's file, creating the directory and file
    /// as needed. Failures are swallowed.
    pub fn append(&self, record: &JournalRecord) {
        let line = match serde_json::to_string(record) {
            Ok(l) => l,
            Err(e) => {
                debug!(%e, "journal record not serializable");
                return;
            },
        };
        if let Err(e) = self.try_append(&line) {
            debug!(%e, "journal append failed");
        }
    }

    fn try_append(&self, line: &str) -> std::io::Result<()> {
        use std::io::Write;

        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.jsonl", Utc::now().format("%Y-%m-%d")));
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{line}")
    }
}
