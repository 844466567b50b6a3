mod console;

use std::sync::Arc;

use {
    clap::Parser,
    huddle_bus::{EventBus, EventKind},
    huddle_config::HostConfig,
    huddle_cron::{AlertFn, RunRequest, RunSkillFn, SkillScheduler},
    huddle_routing::{MessageRouter, RouterConfig, Transport},
    huddle_session::SessionStore,
    huddle_skills::{ExecOpts, Journal, SkillExecutor, SkillRegistry, catalog},
    tokio::sync::RwLock,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "huddle", about = "huddle — chat automation host")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "huddle starting");

    // Configuration problems abort before anything is wired up.
    let config = HostConfig::from_env()?;

    // Skills: registry, catalog, executor.
    let mut registry = SkillRegistry::new(&config.builtin_skills_dir, &config.user_skills_dir);
    let count = registry.load_all();
    info!(count, "initial skill load complete");
    if let Err(e) = catalog::write_catalog(&registry, &config.user_skills_dir, &config.catalog_path)
    {
        warn!(%e, "catalog write failed at startup");
    }
    let registry = Arc::new(RwLock::new(registry));

    let journal = Journal::new(&config.journal_dir);
    let executor = Arc::new(SkillExecutor::new(&config.sdk_path, journal.clone()));

    let transport: Arc<dyn Transport> = console::ConsoleTransport::new();

    // Scheduler: runs skills through the executor; failures alert the
    // configured channel.
    let run_skill = make_run_skill(
        Arc::clone(&registry),
        Arc::clone(&executor),
        config.alert_channel.clone(),
    );
    let on_alert = make_alert(Arc::clone(&transport), config.alert_channel.clone());
    let tz = huddle_cron::schedule::resolve_tz(
        Some(&config.default_timezone),
        huddle_cron::FALLBACK_TZ,
    );
    let scheduler = SkillScheduler::new(tz, run_skill, Some(on_alert));
    {
        let registry = registry.read().await;
        scheduler.register_all(registry.get_scheduled()).await;
    }

    // Sessions and routing.
    let sessions = Arc::new(SessionStore::new());
    let router = MessageRouter::new(
        Arc::clone(&transport),
        Arc::clone(&registry),
        Arc::clone(&scheduler),
        Arc::clone(&sessions),
        journal,
        RouterConfig {
            engine_program: config.engine.program.clone(),
            default_working_dir: config.engine.default_working_dir.clone(),
            summarize_triggers: config.summarize_triggers.clone(),
            ticket_triggers: config.ticket_triggers.clone(),
            catalog_path: config.catalog_path.clone(),
            user_skills_dir: config.user_skills_dir.clone(),
        },
    )?;

    let mut bus = EventBus::new();
    bus.subscribe(EventKind::ChatMessage, router, None);
    let bus = Arc::new(bus);

    info!(owner = %config.owner_id, "ready; type a message");
    let input = tokio::spawn(console::run_input_loop(
        Arc::clone(&bus),
        config.owner_id.clone(),
    ));

    // Non-draining shutdown: stop the timers and exit; in-flight runs are
    // abandoned.
    shutdown_signal().await;
    info!("shutdown signal received");
    scheduler.stop_all().await;
    input.abort();
    info!("huddle stopped");
    Ok(())
}

fn make_run_skill(
    registry: Arc<RwLock<SkillRegistry>>,
    executor: Arc<SkillExecutor>,
    alert_channel: String,
) -> RunSkillFn {
    Arc::new(move |request: RunRequest| {
        let registry = Arc::clone(&registry);
        let executor = Arc::clone(&executor);
        let alert_channel = alert_channel.clone();
        Box::pin(async move {
            let skill = {
                let registry = registry.read().await;
                registry.get(&request.name).cloned()
            };
            let Some(skill) = skill else {
                anyhow::bail!("unknown skill '{}'", request.name);
            };

            let mut opts = ExecOpts::default();
            if let Some(timeout) = request.timeout {
                opts.timeout = timeout;
            }
            // Scheduled fires carry no args; the script gets the alert
            // channel as its delivery target. Trigger dispatch already
            // passes the originating channel in args.
            if request.args.is_empty() {
                opts.channel = Some(alert_channel);
            }

            let result = executor.execute(&skill, &request.args, &opts).await;
            if result.success {
                Ok(())
            } else {
                anyhow::bail!(
                    result
                        .error
                        .unwrap_or_else(|| "skill reported failure".into())
                )
            }
        })
    })
}

fn make_alert(transport: Arc<dyn Transport>, alert_channel: String) -> AlertFn {
    Arc::new(move |message: String| {
        let transport = Arc::clone(&transport);
        let channel = alert_channel.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.post(&channel, &message, None).await {
                warn!(%e, "alert post failed");
            }
        });
    })
}

async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => {},
                _ = sigterm.recv() => {},
            }
        },
        Err(e) => {
            warn!(%e, "SIGTERM handler unavailable");
            let _ = ctrl_c.await;
        },
    }
}
