//! Skill script execution.
//!
//! Scripts run as `sh <script> [args..] <channel>` with a hard timeout.
//! The executor never returns an error: every outcome, including spawn
//! failures and timeouts, is normalized into an [`ExecutionResult`] and
//! journaled.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use {
    tokio::process::Command,
    tracing::{debug, warn},
};

use crate::{
    journal::{Journal, JournalRecord},
    types::{ExecutionResult, Skill},
};

const STDERR_EXCERPT_BYTES: usize = 500;

/// Options controlling one skill run.
#[derive(Debug, Clone)]
pub struct ExecOpts {
    pub timeout: Duration,
    /// Delivery channel; appended as the script's last argument when set.
    pub channel: Option<String>,
}

impl Default for ExecOpts {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            channel: None,
        }
    }
}

/// Runs skill scripts and journals every run.
pub struct SkillExecutor {
    sdk_path: PathBuf,
    journal: Journal,
}

impl SkillExecutor {
    pub fn new(sdk_path: impl Into<PathBuf>, journal: Journal) -> Self {
        Self {
            sdk_path: sdk_path.into(),
            journal,
        }
    }

    /// Run one skill. The script gets `args` followed by the channel, with
    /// `HUDDLE_SDK_PATH` in its environment and its own directory as cwd.
    pub async fn execute(
        &self,
        skill: &Skill,
        args: &[String],
        opts: &ExecOpts,
    ) -> ExecutionResult {
        debug!(
            skill = %skill.name,
            timeout_secs = opts.timeout.as_secs(),
            "running skill script"
        );
        let started = Instant::now();
        let result = self.run_script(skill, args, opts).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        if !result.success {
            warn!(
                skill = %skill.name,
                error = result.error.as_deref().unwrap_or("unknown"),
                "skill run failed"
            );
        }
        self.journal.append(&JournalRecord::skill_run(
            &skill.name,
            skill.tier,
            result.success,
            duration_ms,
            result.error.clone(),
        ));
        result
    }

    async fn run_script(
        &self,
        skill: &Skill,
        args: &[String],
        opts: &ExecOpts,
    ) -> ExecutionResult {
        let mut cmd = Command::new("sh");
        cmd.arg(&skill.script_path).args(args);
        if let Some(channel) = &opts.channel {
            cmd.arg(channel);
        }
        cmd.current_dir(&skill.dir)
            .env("HUDDLE_SDK_PATH", &self.sdk_path)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return ExecutionResult::failure(format!("failed to spawn: {e}"), None),
        };

        let output = match tokio::time::timeout(opts.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ExecutionResult::failure(format!("failed to run script: {e}"), None);
            },
            Err(_) => {
                // kill_on_drop reaps the child when the future is dropped.
                return ExecutionResult::failure(
                    format!("timed out after {}s", opts.timeout.as_secs()),
                    None,
                );
            },
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr_excerpt = excerpt(&stderr);

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            return ExecutionResult::failure(format!("exited with status {code}"), stderr_excerpt);
        }

        // Structured output when the script emits it, otherwise wrap the
        // trimmed text as a successful string result.
        match serde_json::from_str::<ExecutionResult>(stdout.trim()) {
            Ok(parsed) => parsed,
            Err(_) => ExecutionResult {
                success: true,
                data: Some(serde_json::Value::String(stdout.trim().to_string())),
                error: None,
                stderr_excerpt,
            },
        }
    }
}

fn excerpt(stderr: &str) -> Option<String> {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(STDERR_EXCERPT_BYTES).collect())
}
