//! One reasoning-engine turn: spawn the engine subprocess, stream its
//! JSON output line by line, and track the resume token.
//!
//! Protocol notes:
//! - `system` events may carry the session id; `subtype: init` marks the
//!   session starting.
//! - `assistant` text blocks overwrite the running answer; `tool_use`
//!   blocks surface as progress.
//! - A `result` event is the authoritative final answer.
//! - Lines that are not valid JSON are skipped.

use std::{path::PathBuf, sync::Arc};

use {
    serde::Deserialize,
    thiserror::Error,
    tokio::{
        io::{AsyncBufReadExt, AsyncReadExt, BufReader},
        process::Command,
    },
    tracing::{debug, warn},
};

use crate::store::SessionStore;

/// Reply text used when the engine exits cleanly without producing one.
const DEFAULT_REPLY: &str = "Done.";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch engine: {0}")]
    Launch(#[from] std::io::Error),
    #[error("engine turn failed: {0}")]
    Turn(String),
}

/// Milestones surfaced while a turn is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    SessionStarting,
    ToolRunning(String),
    Done,
}

pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Outcome of a completed turn.
#[derive(Debug, Clone)]
pub struct EngineReply {
    /// Resume token in effect after this turn.
    pub session_id: String,
    pub text: String,
}

#[derive(Deserialize)]
struct StreamLine {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    content: Option<Vec<ContentBlock>>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// One conversation's handle onto the engine binary.
pub struct EngineSession {
    program: String,
    working_dir: PathBuf,
    conversation_id: String,
    store: Arc<SessionStore>,
    on_progress: Option<ProgressFn>,
}

impl EngineSession {
    pub fn new(
        program: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        conversation_id: impl Into<String>,
        store: Arc<SessionStore>,
        on_progress: Option<ProgressFn>,
    ) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
            conversation_id: conversation_id.into(),
            store,
            on_progress,
        }
    }

    /// Run one turn. Holds the conversation's turn lock for the duration,
    /// so concurrent sends on the same conversation queue rather than race
    /// on the resume token.
    pub async fn send_message(&self, prompt: &str) -> Result<EngineReply, EngineError> {
        let lock = self.store.turn_lock(&self.conversation_id).await;
        let _turn = lock.lock().await;

        let existing = self.store.token(&self.conversation_id).await;

        let mut cmd = Command::new(&self.program);
        cmd.args([
            "--print",
            "--verbose",
            "--output-format",
            "stream-json",
            "--permission-mode",
            "bypassPermissions",
        ]);
        if let Some(token) = &existing {
            cmd.args(["--resume", token]);
        }
        cmd.arg(prompt)
            .current_dir(&self.working_dir)
            // A child turn must not think it is nested inside another one.
            .env_remove("CLAUDECODE")
            .env_remove("CLAUDE_CODE_ENTRYPOINT")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                // Same rule as a failed turn: a token that cannot be resumed
                // is useless, so the next turn starts a fresh session.
                if existing.is_some() {
                    self.store.clear(&self.conversation_id).await;
                    warn!(
                        conversation = %self.conversation_id,
                        "engine failed to launch, resume token dropped"
                    );
                }
                return Err(EngineError::Launch(e));
            },
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let mut text = String::new();
        let mut new_session_id: Option<String> = None;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf).await;
            }
            buf
        });

        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                let event: StreamLine = match serde_json::from_str(&line) {
                    Ok(e) => e,
                    Err(_) => {
                        debug!(conversation = %self.conversation_id, "skipping non-JSON line");
                        continue;
                    },
                };
                self.apply(event, &mut text, &mut new_session_id);
            }
        }

        let status = child.wait().await?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if let Some(token) = &new_session_id {
            self.store
                .set_token(&self.conversation_id, token.clone())
                .await;
        }

        if status.success() {
            let session_id = new_session_id
                .or(existing)
                .unwrap_or_default();
            if text.is_empty() {
                text = DEFAULT_REPLY.to_string();
            }
            Ok(EngineReply { session_id, text })
        } else {
            // A failed resume leaves the token useless; drop it so the next
            // turn starts a fresh session.
            if existing.is_some() {
                self.store.clear(&self.conversation_id).await;
                warn!(conversation = %self.conversation_id, "turn failed, resume token dropped");
            }
            let message = if stderr_output.trim().is_empty() {
                format!("exit code {}", status.code().unwrap_or(-1))
            } else {
                stderr_output.trim().to_string()
            };
            Err(EngineError::Turn(message))
        }
    }

    fn apply(&self, event: StreamLine, text: &mut String, new_session_id: &mut Option<String>) {
        match event.kind.as_str() {
            "system" => {
                if let Some(id) = event.session_id {
                    *new_session_id = Some(id);
                }
                if event.subtype.as_deref() == Some("init") {
                    self.progress(Progress::SessionStarting);
                }
            },
            "assistant" => {
                for block in event.content.unwrap_or_default() {
                    match block.kind.as_str() {
                        "text" => {
                            if let Some(t) = block.text {
                                *text = t;
                            }
                        },
                        "tool_use" => {
                            self.progress(Progress::ToolRunning(
                                block.name.unwrap_or_else(|| "tool".into()),
                            ));
                        },
                        _ => {},
                    }
                }
            },
            "result" => {
                if let Some(result) = event.result {
                    *text = result;
                }
                self.progress(Progress::Done);
            },
            _ => {},
        }
    }

    fn progress(&self, progress: Progress) {
        if let Some(on_progress) = &self.on_progress {
            on_progress(progress);
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{fs, os::unix::fs::PermissionsExt, path::Path, sync::Mutex},
    };

    fn write_engine(dir: &Path, body: &str) -> String {
        let path = dir.join("engine.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn session(program: &str, dir: &Path, store: Arc<SessionStore>) -> EngineSession {
        EngineSession::new(program, dir, "C1", store, None)
    }

    #[tokio::test]
    async fn result_event_wins_and_token_is_stored() {
        let tmp = tempfile::tempdir().unwrap();
        let program = write_engine(
            tmp.path(),
            r#"echo '{"type":"system","subtype":"init","session_id":"s-123"}'
echo 'this line is not json'
echo '{"type":"assistant","content":[{"type":"text","text":"partial"}]}'
echo '{"type":"result","result":"final answer"}'
"#,
        );
        let store = Arc::new(SessionStore::new());
        let reply = session(&program, tmp.path(), Arc::clone(&store))
            .send_message("hi")
            .await
            .unwrap();

        assert_eq!(reply.text, "final answer");
        assert_eq!(reply.session_id, "s-123");
        assert_eq!(store.token("C1").await.as_deref(), Some("s-123"));
    }

    #[tokio::test]
    async fn assistant_text_used_when_no_result_event() {
        let tmp = tempfile::tempdir().unwrap();
        let program = write_engine(
            tmp.path(),
            r#"echo '{"type":"assistant","content":[{"type":"text","text":"one"}]}'
echo '{"type":"assistant","content":[{"type":"text","text":"two"}]}'
"#,
        );
        let store = Arc::new(SessionStore::new());
        let reply = session(&program, tmp.path(), store)
            .send_message("hi")
            .await
            .unwrap();
        assert_eq!(reply.text, "two");
    }

    #[tokio::test]
    async fn empty_output_falls_back_to_default_reply() {
        let tmp = tempfile::tempdir().unwrap();
        let program = write_engine(tmp.path(), "true\n");
        let store = Arc::new(SessionStore::new());
        let reply = session(&program, tmp.path(), store)
            .send_message("hi")
            .await
            .unwrap();
        assert_eq!(reply.text, DEFAULT_REPLY);
        assert_eq!(reply.session_id, "");
    }

    #[tokio::test]
    async fn existing_token_is_passed_as_resume() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("argv.txt");
        let program = write_engine(
            tmp.path(),
            &format!("printf '%s\\n' \"$@\" > {}\n", out.display()),
        );
        let store = Arc::new(SessionStore::new());
        store.set_token("C1", "tok-9".into()).await;

        session(&program, tmp.path(), store)
            .send_message("hello there")
            .await
            .unwrap();

        let argv = fs::read_to_string(out).unwrap();
        let args: Vec<&str> = argv.lines().collect();
        let resume_at = args.iter().position(|a| *a == "--resume").unwrap();
        assert_eq!(args[resume_at + 1], "tok-9");
        assert_eq!(*args.last().unwrap(), "hello there");
    }

    #[tokio::test]
    async fn failed_resume_drops_the_token() {
        let tmp = tempfile::tempdir().unwrap();
        let program = write_engine(tmp.path(), "echo 'no such session' >&2\nexit 1\n");
        let store = Arc::new(SessionStore::new());
        store.set_token("C1", "stale".into()).await;

        let err = session(&program, tmp.path(), Arc::clone(&store))
            .send_message("hi")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no such session"));
        assert_eq!(store.token("C1").await, None);
    }

    #[tokio::test]
    async fn spawn_failure_drops_the_token() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("no-such-engine");
        let store = Arc::new(SessionStore::new());
        store.set_token("C1", "stale".into()).await;

        let err = session(&missing.to_string_lossy(), tmp.path(), Arc::clone(&store))
            .send_message("hi")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Launch(_)));
        assert_eq!(store.token("C1").await, None);
    }

    #[tokio::test]
    async fn failure_without_stderr_reports_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let program = write_engine(tmp.path(), "exit 7\n");
        let store = Arc::new(SessionStore::new());
        let err = session(&program, tmp.path(), store)
            .send_message("hi")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit code 7"));
    }

    #[tokio::test]
    async fn progress_milestones_fire_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let program = write_engine(
            tmp.path(),
            r#"echo '{"type":"system","subtype":"init","session_id":"s-1"}'
echo '{"type":"assistant","content":[{"type":"tool_use","name":"search"}]}'
echo '{"type":"result","result":"ok"}'
"#,
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let on_progress: ProgressFn = Arc::new(move |p| seen_clone.lock().unwrap().push(p));

        let store = Arc::new(SessionStore::new());
        EngineSession::new(&program, tmp.path(), "C1", store, Some(on_progress))
            .send_message("hi")
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![
            Progress::SessionStarting,
            Progress::ToolRunning("search".into()),
            Progress::Done,
        ]);
    }
}
