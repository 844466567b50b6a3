//! Scheduler for skills with an enabled cron schedule.
//!
//! Each registered skill gets its own timer task: compute the next
//! occurrence in the skill's timezone, sleep until then, run it, repeat.
//! A failed run alerts (if a callback is wired) and never stops the timer.

pub mod schedule;

pub use schedule::FALLBACK_TZ;

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc, time::Duration};

use {
    chrono::Utc,
    chrono_tz::Tz,
    huddle_skills::Skill,
    tokio::{sync::Mutex, task::JoinHandle},
    tracing::{error, info, warn},
};

use crate::schedule::{next_occurrence, parse_cron};

/// One skill invocation handed to the run callback.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub name: String,
    pub args: Vec<String>,
    /// `None` takes the executor's default.
    pub timeout: Option<Duration>,
}

/// Callback that runs one skill.
pub type RunSkillFn = Arc<
    dyn Fn(RunRequest) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync,
>;

/// Callback for surfacing scheduler failures (posts to the alert channel).
pub type AlertFn = Arc<dyn Fn(String) + Send + Sync>;

/// Owns the per-skill timer tasks.
pub struct SkillScheduler {
    default_tz: Tz,
    run_skill: RunSkillFn,
    on_alert: Option<AlertFn>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SkillScheduler {
    pub fn new(default_tz: Tz, run_skill: RunSkillFn, on_alert: Option<AlertFn>) -> Arc<Self> {
        Arc::new(Self {
            default_tz,
            run_skill,
            on_alert,
            timers: Mutex::new(HashMap::new()),
        })
    }

    /// Replace all timers with the given skill set. Skills without an
    /// enabled schedule, or with an invalid cron expression, are skipped
    /// with a warning. Returns how many timers are now armed.
    pub async fn register_all<'a>(
        self: &Arc<Self>,
        skills: impl Iterator<Item = &'a Skill>,
    ) -> usize {
        self.stop_all().await;
        let mut armed = 0;
        for skill in skills {
            if !skill.schedule_enabled() {
                continue;
            }
            match self.register(skill).await {
                Ok(()) => armed += 1,
                Err(e) => warn!(skill = %skill.name, %e, "skipping unschedulable skill"),
            }
        }
        info!(count = armed, "skill timers armed");
        armed
    }

    /// Arm one skill's timer, replacing any existing timer of the same name.
    pub async fn register(self: &Arc<Self>, skill: &Skill) -> anyhow::Result<()> {
        let Some(spec) = skill.metadata.schedule.as_ref() else {
            anyhow::bail!("skill '{}' has no schedule", skill.name);
        };
        let cron = parse_cron(&spec.cron)?;
        let tz = match spec.timezone.as_deref() {
            None => self.default_tz,
            Some(name) => name
                .parse()
                .map_err(|_| anyhow::anyhow!("unknown timezone '{name}'"))?,
        };

        let name = skill.name.clone();
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let Some(next) = next_occurrence(&cron, tz, Utc::now()) else {
                    warn!(skill = %name, "schedule has no future occurrences, timer stopping");
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                info!(skill = %name, "scheduled run firing");
                let request = RunRequest {
                    name: name.clone(),
                    args: Vec::new(),
                    timeout: None,
                };
                if let Err(e) = (scheduler.run_skill)(request).await {
                    error!(skill = %name, %e, "scheduled run failed");
                    scheduler.alert(format!("scheduled skill `{name}` failed: {e}"));
                }
            }
        });

        if let Some(old) = self.timers.lock().await.insert(skill.name.clone(), handle) {
            old.abort();
        }
        Ok(())
    }

    /// Abort every timer.
    pub async fn stop_all(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    /// Names of currently armed timers, sorted.
    pub async fn list_registered_names(&self) -> Vec<String> {
        let timers = self.timers.lock().await;
        let mut names: Vec<String> = timers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run a skill immediately, outside its schedule. Failures alert the
    /// same way a timed run does.
    pub async fn run_on_demand(
        &self,
        name: &str,
        args: Vec<String>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<()> {
        let result = (self.run_skill)(RunRequest {
            name: name.to_string(),
            args,
            timeout,
        })
        .await;
        if let Err(e) = &result {
            error!(skill = name, %e, "on-demand run failed");
            self.alert(format!("skill `{name}` failed: {e}"));
        }
        result
    }

    fn alert(&self, message: String) {
        if let Some(on_alert) = &self.on_alert {
            on_alert(message);
        }
    }
}
