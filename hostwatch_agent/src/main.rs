//! hostwatch_agent: samples this host, keeps a bounded history and sends threshold alerts.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hostwatch_agent::alerts::{AlertEngine, AlertKind};
use hostwatch_agent::config::{load_alert_settings, parse_args, AgentConfig};
use hostwatch_agent::history::{HistoryStore, JsonFilePersistence};
use hostwatch_agent::metrics::SysinfoSource;
use hostwatch_agent::notify::{LogSink, Notifier, TelegramSink};
use hostwatch_agent::sampler::{
    spawn_alert_sweep, spawn_heartbeat, spawn_history_sampler, spawn_retention, startup_check,
};
use hostwatch_agent::session::LiveSessions;
use hostwatch_agent::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match parse_args(std::env::args()) {
        Ok(cli) => cli,
        Err(msg) => {
            let help = msg.starts_with("Usage:");
            if help {
                println!("{msg}");
            } else {
                eprintln!("{msg}");
            }
            std::process::exit(if help { 0 } else { 2 });
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "hostwatch_agent=info".into()),
        )
        .init();

    let cfg = AgentConfig::load(&cli)?;
    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("creating data dir {}", cfg.data_dir.display()))?;

    let source = SysinfoSource::new(cfg.interface.clone());
    let hostname = source.hostname().to_string();

    let notifier = match &cfg.telegram {
        Some(t) => Notifier::Telegram(
            TelegramSink::new(&t.api_base, &t.token, t.chat_id).context("telegram client")?,
        ),
        None => {
            info!("no telegram credentials, alerts go to the log");
            Notifier::Log(LogSink)
        }
    };

    let persistence = JsonFilePersistence::in_dir(&cfg.data_dir);
    info!(path = %persistence.path().display(), "history snapshot");
    let store = HistoryStore::open(persistence, cfg.history_options()).await;

    let engine = AlertEngine::new(load_alert_settings(&cfg.alerts_path), cfg.alert_cooldown)
        .with_recovery_notice(cfg.notify_recovery);

    let state = AppState::new(
        source,
        notifier,
        store,
        engine,
        LiveSessions::new(cfg.live_period, cfg.live_updates),
        hostname,
        cfg.alerts_path.clone(),
    );

    startup_check(&state).await;

    let mut tasks = vec![
        spawn_history_sampler(state.clone(), cfg.history_interval),
        spawn_alert_sweep(
            state.clone(),
            cfg.check_interval,
            &AlertKind::FULL_SWEEP,
            cfg.rate_window,
        ),
        spawn_heartbeat(state.clone(), cfg.heartbeat_interval),
        spawn_retention(state.clone(), cfg.cleanup_interval),
    ];
    if let Some(fast) = cfg.fast_check_interval {
        tasks.push(spawn_alert_sweep(
            state.clone(),
            fast,
            &AlertKind::FAST_SWEEP,
            cfg.rate_window,
        ));
    }
    info!(host = %state.hostname, "monitoring");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    for t in tasks {
        t.abort();
    }
    Ok(())
}
