//! The dispatch state machine for one normalized chat message.
//!
//! Order, first match wins: access gate, built-in commands (owner only),
//! public-skill triggers, domain trigger sets (thread summarize, ticket
//! record), then the reasoning-engine fallback.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    huddle_bus::{Event, EventHandler, EventPayload},
    huddle_common::types::ChatMessage,
    huddle_cron::SkillScheduler,
    huddle_session::{EngineSession, SessionStore},
    huddle_skills::{Journal, JournalRecord, Skill, SkillRegistry, catalog},
    regex::Regex,
    tokio::sync::{Mutex, RwLock},
    tracing::{debug, info, warn},
};

use crate::transport::{MessageId, Transport};

/// Replies longer than this go out as a file attachment.
const FILE_UPLOAD_THRESHOLD: usize = 3000;

/// Timeout for trigger-dispatched skill runs.
const TRIGGER_TIMEOUT: Duration = Duration::from_secs(120);

/// Skills dispatched by the domain trigger sets, when installed.
const SUMMARIZE_SKILL: &str = "summarize-thread";
const TICKET_SKILL: &str = "record-ticket";

const TICKET_URL_PATTERN: &str = r"(?i)https?://[^\s>]+/browse/([A-Z]+-\d+)";

/// Router wiring that comes from host configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub engine_program: String,
    pub default_working_dir: PathBuf,
    /// Phrases that trigger thread summarization.
    pub summarize_triggers: Vec<String>,
    /// Phrases that trigger recording a thread to a ticket.
    pub ticket_triggers: Vec<String>,
    pub catalog_path: PathBuf,
    pub user_skills_dir: PathBuf,
}

pub struct MessageRouter {
    transport: Arc<dyn Transport>,
    registry: Arc<RwLock<SkillRegistry>>,
    scheduler: Arc<SkillScheduler>,
    sessions: Arc<SessionStore>,
    journal: Journal,
    config: RouterConfig,
    /// Per-channel working-directory overrides; absent means the default.
    working_dirs: Mutex<HashMap<String, PathBuf>>,
    ticket_url: Regex,
}

impl MessageRouter {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<RwLock<SkillRegistry>>,
        scheduler: Arc<SkillScheduler>,
        sessions: Arc<SessionStore>,
        journal: Journal,
        config: RouterConfig,
    ) -> anyhow::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            transport,
            registry,
            scheduler,
            sessions,
            journal,
            config,
            working_dirs: Mutex::new(HashMap::new()),
            ticket_url: Regex::new(TICKET_URL_PATTERN)?,
        }))
    }

    pub async fn handle_message(&self, msg: &ChatMessage) {
        let text = msg.text.trim();
        debug!(channel = %msg.channel, owner = msg.is_owner, "routing message");

        if !msg.is_owner {
            self.handle_restricted(msg, text).await;
            return;
        }

        if text.eq_ignore_ascii_case("reset") || text.eq_ignore_ascii_case("start over") {
            self.handle_reset(msg).await;
            return;
        }
        if text.eq_ignore_ascii_case("list skills") {
            self.handle_list(msg).await;
            return;
        }
        if text.eq_ignore_ascii_case("reload skills") {
            self.handle_reload(msg).await;
            return;
        }
        if text.eq_ignore_ascii_case("show current directory") {
            self.handle_show_dir(msg).await;
            return;
        }
        if let Some(path) = parse_change_dir(text) {
            self.handle_change_dir(msg, path).await;
            return;
        }

        if self.run_public_skill_if_matched(msg, text).await {
            return;
        }
        if self.run_domain_trigger_if_matched(msg, text).await {
            return;
        }

        self.engine_turn(msg, text).await;
    }

    // ── access gate ─────────────────────────────────────────────────────

    async fn handle_restricted(&self, msg: &ChatMessage, text: &str) {
        if self.run_public_skill_if_matched(msg, text).await {
            return;
        }
        if self.run_domain_trigger_if_matched(msg, text).await {
            return;
        }

        let lines: Vec<String> = {
            let registry = self.registry.read().await;
            registry
                .get_public()
                .map(|s| {
                    let summary = s
                        .metadata
                        .description
                        .split('.')
                        .next()
                        .unwrap_or(s.name.as_str())
                        .trim();
                    let trigger = s
                        .metadata
                        .triggers
                        .first()
                        .cloned()
                        .unwrap_or_else(|| s.name.clone());
                    format!("• *{summary}* — `{trigger}`")
                })
                .collect()
        };
        self.post(
            &msg.channel,
            &format!(
                "@{} I can only help with the following here:\n{}",
                msg.sender,
                lines.join("\n")
            ),
            msg.thread.as_deref(),
        )
        .await;
    }

    // ── built-in commands ───────────────────────────────────────────────

    async fn handle_reset(&self, msg: &ChatMessage) {
        self.sessions.clear(msg.conversation_id()).await;
        self.working_dirs.lock().await.remove(&msg.channel);
        info!(channel = %msg.channel, "conversation reset");
        self.post(
            &msg.channel,
            "Conversation and working directory reset.",
            msg.thread.as_deref(),
        )
        .await;
    }

    async fn handle_list(&self, msg: &ChatMessage) {
        let body = {
            let registry = self.registry.read().await;
            if registry.is_empty() {
                "No skills registered.\n\nSee the catalog for how to add one.".to_string()
            } else {
                let lines: Vec<String> = registry
                    .get_all()
                    .map(|s| {
                        let tier = format!("{:?}", s.tier).to_lowercase();
                        let schedule = s
                            .metadata
                            .schedule
                            .as_ref()
                            .filter(|sch| sch.enabled)
                            .map(|sch| format!(" _({})_", sch.cron))
                            .unwrap_or_default();
                        format!(
                            "`{}` [{tier}]{schedule}\n   {}",
                            s.name, s.metadata.description
                        )
                    })
                    .collect();
                format!("*Skills ({})*\n\n{}", registry.len(), lines.join("\n\n"))
            }
        };
        self.post(&msg.channel, &body, msg.thread.as_deref()).await;
    }

    async fn handle_reload(&self, msg: &ChatMessage) {
        self.post(&msg.channel, "Reloading skills...", msg.thread.as_deref())
            .await;

        self.scheduler.stop_all().await;
        let (count, catalog_error) = {
            let mut registry = self.registry.write().await;
            let count = registry.load_all();
            let catalog_error = catalog::write_catalog(
                &registry,
                &self.config.user_skills_dir,
                &self.config.catalog_path,
            )
            .err();
            self.scheduler.register_all(registry.get_scheduled()).await;
            (count, catalog_error)
        };

        let mut reply = format!("Skills reloaded ({count} loaded).");
        if let Some(e) = catalog_error {
            warn!(%e, "catalog write failed during reload");
            reply.push_str(&format!("\nCatalog write failed: {e}"));
        }
        self.post(&msg.channel, &reply, msg.thread.as_deref()).await;
    }

    async fn handle_show_dir(&self, msg: &ChatMessage) {
        let override_dir = self.working_dirs.lock().await.get(&msg.channel).cloned();
        let (dir, label) = match override_dir {
            Some(dir) => (dir, "custom"),
            None => (self.config.default_working_dir.clone(), "default"),
        };
        self.post(
            &msg.channel,
            &format!("Current working directory ({label})\n`{}`", dir.display()),
            msg.thread.as_deref(),
        )
        .await;
    }

    async fn handle_change_dir(&self, msg: &ChatMessage, raw_path: &str) {
        let resolved = expand_tilde(raw_path);
        if !resolved.exists() {
            self.post(
                &msg.channel,
                &format!("Path does not exist:\n`{}`", resolved.display()),
                msg.thread.as_deref(),
            )
            .await;
            return;
        }
        if !resolved.is_dir() {
            self.post(
                &msg.channel,
                &format!("Not a directory:\n`{}`", resolved.display()),
                msg.thread.as_deref(),
            )
            .await;
            return;
        }

        // A new directory means a new reasoning context.
        self.working_dirs
            .lock()
            .await
            .insert(msg.channel.clone(), resolved.clone());
        self.sessions.clear(msg.conversation_id()).await;

        self.post(
            &msg.channel,
            &format!(
                "Working directory changed to\n`{}`\n\nSession reset; the next message starts fresh.",
                resolved.display()
            ),
            msg.thread.as_deref(),
        )
        .await;
    }

    // ── trigger dispatch ────────────────────────────────────────────────

    async fn run_public_skill_if_matched(&self, msg: &ChatMessage, text: &str) -> bool {
        let skill: Option<Skill> = {
            let registry = self.registry.read().await;
            registry.find_public_by_trigger(text).cloned()
        };
        let Some(skill) = skill else {
            return false;
        };

        if !self.structural_requirements_met(msg, text, &skill).await {
            return true;
        }

        self.dispatch_skill(&skill.name, msg, text, None).await;
        true
    }

    async fn run_domain_trigger_if_matched(&self, msg: &ChatMessage, text: &str) -> bool {
        let lower = text.to_lowercase();

        if matches_any(&lower, &self.config.summarize_triggers) {
            if msg.thread.is_none() {
                self.post_thread_guidance(msg).await;
                return true;
            }
            self.dispatch_named(SUMMARIZE_SKILL, msg, text, None).await;
            return true;
        }

        if matches_any(&lower, &self.config.ticket_triggers) {
            if msg.thread.is_none() {
                self.post_thread_guidance(msg).await;
                return true;
            }
            let Some(key) = self.extract_ticket_key(text) else {
                self.post_ticket_guidance(msg).await;
                return true;
            };
            self.dispatch_named(TICKET_SKILL, msg, text, Some(key)).await;
            return true;
        }

        false
    }

    /// Thread/ticket-URL preconditions declared in the skill's metadata.
    async fn structural_requirements_met(
        &self,
        msg: &ChatMessage,
        text: &str,
        skill: &Skill,
    ) -> bool {
        if skill.metadata.requires_thread && msg.thread.is_none() {
            self.post_thread_guidance(msg).await;
            return false;
        }
        if skill.metadata.requires_ticket_url && !self.ticket_url.is_match(text) {
            self.post_ticket_guidance(msg).await;
            return false;
        }
        true
    }

    async fn dispatch_named(
        &self,
        name: &str,
        msg: &ChatMessage,
        text: &str,
        extra_arg: Option<String>,
    ) {
        let installed = { self.registry.read().await.get(name).is_some() };
        if !installed {
            self.post(
                &msg.channel,
                &format!("The `{name}` skill is not installed."),
                msg.thread.as_deref(),
            )
            .await;
            return;
        }
        self.dispatch_skill(name, msg, text, extra_arg).await;
    }

    async fn dispatch_skill(
        &self,
        name: &str,
        msg: &ChatMessage,
        text: &str,
        extra_arg: Option<String>,
    ) {
        let mut args = vec![
            msg.channel.clone(),
            msg.thread.clone().unwrap_or_default(),
            msg.sender.clone(),
            text.to_string(),
        ];
        args.extend(extra_arg);

        if let Err(e) = self
            .scheduler
            .run_on_demand(name, args, Some(TRIGGER_TIMEOUT))
            .await
        {
            debug!(skill = name, %e, "trigger dispatch failed");
        }
    }

    fn extract_ticket_key(&self, text: &str) -> Option<String> {
        self.ticket_url
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_uppercase())
    }

    async fn post_thread_guidance(&self, msg: &ChatMessage) {
        self.post(
            &msg.channel,
            &format!(
                "@{} please mention me inside a thread; this needs thread context.",
                msg.sender
            ),
            msg.thread.as_deref(),
        )
        .await;
    }

    async fn post_ticket_guidance(&self, msg: &ChatMessage) {
        self.post(
            &msg.channel,
            &format!(
                "@{} please include a ticket URL, e.g. `https://tracker.example.com/browse/ENG-123`.",
                msg.sender
            ),
            msg.thread.as_deref(),
        )
        .await;
    }

    // ── engine fallback ─────────────────────────────────────────────────

    async fn engine_turn(&self, msg: &ChatMessage, text: &str) {
        let started = Instant::now();
        let thread = msg.thread.as_deref();
        let placeholder = self
            .post(
                &msg.channel,
                &format!("Working on it...\n\n> {text}"),
                thread,
            )
            .await;

        let prompt = self.build_prompt(msg, text).await;
        let working_dir = self
            .working_dirs
            .lock()
            .await
            .get(&msg.channel)
            .cloned()
            .unwrap_or_else(|| self.config.default_working_dir.clone());

        let session = EngineSession::new(
            &self.config.engine_program,
            working_dir,
            msg.conversation_id(),
            Arc::clone(&self.sessions),
            None,
        );

        match session.send_message(&prompt).await {
            Ok(reply) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.journal
                    .append(&JournalRecord::engine_turn(text, true, duration_ms));

                if reply.text.chars().count() > FILE_UPLOAD_THRESHOLD {
                    self.update_or_post(
                        &msg.channel,
                        placeholder,
                        &format!("Done (sent as a file)\n\n> {text}"),
                        thread,
                    )
                    .await;
                    if let Err(e) = self
                        .transport
                        .upload_file(&msg.channel, "response.txt", "Engine response", &reply.text)
                        .await
                    {
                        warn!(%e, "file upload failed");
                    }
                } else {
                    self.update_or_post(&msg.channel, placeholder, &reply.text, thread)
                        .await;
                }
            },
            Err(e) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.journal
                    .append(&JournalRecord::engine_turn(text, false, duration_ms));
                warn!(channel = %msg.channel, %e, "engine turn failed");
                self.update_or_post(&msg.channel, placeholder, &format!("Error: {e}"), thread)
                    .await;
            },
        }
    }

    async fn build_prompt(&self, msg: &ChatMessage, text: &str) -> String {
        let Some(thread) = msg.thread.as_deref() else {
            return text.to_string();
        };
        match self.transport.fetch_thread(&msg.channel, thread).await {
            Ok(messages) if messages.len() > 1 => {
                let history: Vec<String> = messages
                    .iter()
                    .map(|m| format!("[{}] {}: {}", m.ts, m.sender, m.text))
                    .collect();
                format!("[Thread]\n{}\n\n[Request]\n{text}", history.join("\n"))
            },
            Ok(_) => text.to_string(),
            Err(e) => {
                warn!(%e, "thread fetch failed, sending bare message");
                text.to_string()
            },
        }
    }

    // ── transport helpers ───────────────────────────────────────────────

    /// Best-effort post; transport failures are logged, never surfaced.
    async fn post(&self, channel: &str, text: &str, thread: Option<&str>) -> Option<MessageId> {
        match self.transport.post(channel, text, thread).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(channel, %e, "post failed");
                None
            },
        }
    }

    /// Edit in place, falling back to a fresh post when the edit fails or
    /// there is nothing to edit.
    async fn update_or_post(
        &self,
        channel: &str,
        id: Option<MessageId>,
        text: &str,
        thread: Option<&str>,
    ) {
        if let Some(id) = id {
            if self.transport.update(channel, &id, text).await.is_ok() {
                return;
            }
        }
        self.post(channel, text, thread).await;
    }
}

#[async_trait]
impl EventHandler for MessageRouter {
    fn name(&self) -> &str {
        "message-router"
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let EventPayload::Chat(msg) = &event.payload;
        self.handle_message(msg).await;
        Ok(())
    }
}

fn matches_any(lower_text: &str, phrases: &[String]) -> bool {
    phrases
        .iter()
        .any(|p| !p.is_empty() && lower_text.contains(&p.to_lowercase()))
}

fn parse_change_dir(text: &str) -> Option<&str> {
    strip_prefix_ci(text, "change directory ").or_else(|| strip_prefix_ci(text, "cd "))
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        let rest = text[prefix.len()..].trim();
        (!rest.is_empty()).then_some(rest)
    } else {
        None
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(base) = directories::BaseDirs::new() {
            return base.home_dir().join(rest.trim_start_matches('/'));
        }
    }
    Path::new(path).to_path_buf()
}
