//! Periodic drivers: history collection, alert sweeps, heartbeat and retention.
//!
//! Each `run_*` function is one tick and absorbs its own errors (logged at
//! warn), so a failing source or store never ends a ticker. The `spawn_*`
//! wrappers put a tick on a tokio interval.

use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alerts::{Alert, AlertKind, LivenessEvent, Observation};
use crate::format::status_report;
use crate::history::Persistence;
use crate::metrics::MetricSource;
use crate::normalize::{throughput, to_samples, NetRateTracker};
use crate::notify::{deliver, NotificationSink};
use crate::state::AppState;
use crate::types::now_ms;

/// Sample once and append every derived series; returns how many samples were stored.
pub async fn collect_history<S, N, P>(state: &AppState<S, N, P>, tracker: &mut NetRateTracker) -> usize
where
    S: MetricSource,
    N: NotificationSink,
    P: Persistence,
{
    match state.source.sample().await {
        Ok(bundle) => state.store.append_batch(to_samples(&bundle, tracker)).await,
        Err(e) => {
            warn!(error = %e, "history sample skipped");
            0
        }
    }
}

/// Sample, evaluate `kinds` and send whatever fires. Network throughput is
/// measured only when the network kind is requested and enabled, from a
/// second sample taken `rate_window` later.
pub async fn run_alert_sweep<S, N, P>(
    state: &AppState<S, N, P>,
    kinds: &[AlertKind],
    rate_window: Duration,
) -> Vec<Alert>
where
    S: MetricSource,
    N: NotificationSink,
    P: Persistence,
{
    let bundle = match state.source.sample().await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "alert sweep skipped");
            return Vec::new();
        }
    };
    let mut obs = Observation::from_bundle(&bundle);

    let wants_net = kinds.contains(&AlertKind::Network)
        && state.engine.lock().await.is_enabled(AlertKind::Network);
    if let (true, Some(first)) = (wants_net, bundle.network.as_ref()) {
        sleep(rate_window).await;
        match state.source.sample().await {
            Ok(second) => {
                let rate = second
                    .network
                    .as_ref()
                    .and_then(|next| throughput(bundle.timestamp_ms, first, second.timestamp_ms, next));
                obs = obs.with_network_rate(rate);
            }
            Err(e) => warn!(error = %e, "second network sample failed"),
        }
    }

    let alerts = state
        .engine
        .lock()
        .await
        .evaluate(&obs, kinds, bundle.timestamp_ms);
    for alert in &alerts {
        info!(kind = %alert.kind, value = alert.value, threshold = alert.threshold, "alert fired");
        deliver(&*state.notifier, &alert.message(&state.hostname)).await;
    }
    alerts
}

/// Sample the source and report a liveness edge if there is one.
pub async fn run_heartbeat<S, N, P>(state: &AppState<S, N, P>) -> Option<LivenessEvent>
where
    S: MetricSource,
    N: NotificationSink,
    P: Persistence,
{
    let reachable = match state.source.sample().await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "heartbeat failed");
            false
        }
    };
    let event = state.engine.lock().await.record_heartbeat(reachable);
    if let Some(ev) = event {
        deliver(&*state.notifier, &ev.message(&state.hostname)).await;
    }
    event
}

/// First heartbeat at process start: announces monitoring on success,
/// otherwise reports the outage like any other heartbeat.
pub async fn startup_check<S, N, P>(state: &AppState<S, N, P>) -> bool
where
    S: MetricSource,
    N: NotificationSink,
    P: Persistence,
{
    match state.source.sample().await {
        Ok(bundle) => {
            state.engine.lock().await.record_heartbeat(true);
            let text = format!("✅ *Monitoring started*\n\n{}", status_report(&bundle));
            deliver(&*state.notifier, &text).await;
            true
        }
        Err(e) => {
            warn!(error = %e, "startup check failed");
            let event = state.engine.lock().await.record_heartbeat(false);
            if let Some(ev) = event {
                deliver(&*state.notifier, &ev.message(&state.hostname)).await;
            }
            false
        }
    }
}

/// Drop samples older than the retention window; returns how many went.
pub async fn run_retention<S, N, P>(state: &AppState<S, N, P>) -> usize
where
    S: MetricSource,
    N: NotificationSink,
    P: Persistence,
{
    match state.store.compact(now_ms()).await {
        Ok(removed) => {
            if removed > 0 {
                info!(removed, "old history purged");
            }
            removed
        }
        Err(e) => {
            warn!(error = %e, "retention pass skipped");
            0
        }
    }
}

fn ticker(period: Duration, immediate: bool) -> tokio::time::Interval {
    let mut t = if immediate {
        interval(period)
    } else {
        interval_at(Instant::now() + period, period)
    };
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    t
}

pub fn spawn_history_sampler<S, N, P>(state: AppState<S, N, P>, period: Duration) -> JoinHandle<()>
where
    S: MetricSource,
    N: NotificationSink,
    P: Persistence,
{
    tokio::spawn(async move {
        let mut tracker = NetRateTracker::default();
        let mut t = ticker(period, true);
        loop {
            t.tick().await;
            let stored = collect_history(&state, &mut tracker).await;
            debug!(stored, "history tick");
        }
    })
}

pub fn spawn_alert_sweep<S, N, P>(
    state: AppState<S, N, P>,
    period: Duration,
    kinds: &'static [AlertKind],
    rate_window: Duration,
) -> JoinHandle<()>
where
    S: MetricSource,
    N: NotificationSink,
    P: Persistence,
{
    tokio::spawn(async move {
        let mut t = ticker(period, false);
        loop {
            t.tick().await;
            run_alert_sweep(&state, kinds, rate_window).await;
        }
    })
}

// first tick is one period out; startup_check covers t=0
pub fn spawn_heartbeat<S, N, P>(state: AppState<S, N, P>, period: Duration) -> JoinHandle<()>
where
    S: MetricSource,
    N: NotificationSink,
    P: Persistence,
{
    tokio::spawn(async move {
        let mut t = ticker(period, false);
        loop {
            t.tick().await;
            run_heartbeat(&state).await;
        }
    })
}

pub fn spawn_retention<S, N, P>(state: AppState<S, N, P>, period: Duration) -> JoinHandle<()>
where
    S: MetricSource,
    N: NotificationSink,
    P: Persistence,
{
    tokio::spawn(async move {
        let mut t = ticker(period, true);
        loop {
            t.tick().await;
            run_retention(&state).await;
        }
    })
}
