//! Shared agent state: the metric source, notifier, history store and alert engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::alerts::{Adjust, AlertEngine, AlertKind, AlertSettings};
use crate::config::save_alert_settings;
use crate::error::MonitorError;
use crate::format::status_report;
use crate::history::{HistoryStore, Persistence};
use crate::metrics::MetricSource;
use crate::notify::NotificationSink;
use crate::session::LiveSessions;
use crate::stats::{stats, SeriesStats};
use crate::types::Series;

pub struct AppState<S, N, P> {
    pub source: Arc<S>,
    pub notifier: Arc<N>,
    pub store: Arc<HistoryStore<P>>,
    // Only locked for synchronous engine calls, never across a sample or a send
    pub engine: Arc<Mutex<AlertEngine>>,
    pub sessions: LiveSessions,
    pub hostname: Arc<str>,
    alerts_path: Arc<PathBuf>,
}

// derive(Clone) would require S/N/P: Clone
impl<S, N, P> Clone for AppState<S, N, P> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            notifier: Arc::clone(&self.notifier),
            store: Arc::clone(&self.store),
            engine: Arc::clone(&self.engine),
            sessions: self.sessions.clone(),
            hostname: Arc::clone(&self.hostname),
            alerts_path: Arc::clone(&self.alerts_path),
        }
    }
}

impl<S, N, P> AppState<S, N, P>
where
    S: MetricSource,
    N: NotificationSink,
    P: Persistence,
{
    pub fn new(
        source: S,
        notifier: N,
        store: HistoryStore<P>,
        engine: AlertEngine,
        sessions: LiveSessions,
        hostname: impl Into<Arc<str>>,
        alerts_path: PathBuf,
    ) -> Self {
        Self {
            source: Arc::new(source),
            notifier: Arc::new(notifier),
            store: Arc::new(store),
            engine: Arc::new(Mutex::new(engine)),
            sessions,
            hostname: hostname.into(),
            alerts_path: Arc::new(alerts_path),
        }
    }

    pub fn alerts_path(&self) -> &Path {
        &self.alerts_path
    }

    pub async fn stats(&self, series: Series, hours: u32, subtype: Option<&str>) -> Option<SeriesStats> {
        stats(&self.store, series, hours, subtype).await
    }

    pub async fn alert_settings(&self) -> AlertSettings {
        self.engine.lock().await.settings().clone()
    }

    /// Flip an alert kind on or off; returns the new state. Not saved until
    /// [`save_alert_settings`](Self::save_alert_settings).
    pub async fn toggle_alert(&self, kind: AlertKind) -> bool {
        let on = self.engine.lock().await.toggle(kind);
        info!(%kind, on, "alert toggled");
        on
    }

    pub async fn set_alert_enabled(&self, kind: AlertKind, on: bool) {
        self.engine.lock().await.set_enabled(kind, on);
    }

    /// Step a threshold up or down within its bounds; returns the stored value.
    pub async fn adjust_threshold(&self, kind: AlertKind, dir: Adjust) -> f64 {
        let value = self.engine.lock().await.adjust_threshold(kind, dir);
        info!(%kind, threshold = value, "threshold adjusted");
        value
    }

    pub async fn save_alert_settings(&self) -> Result<(), MonitorError> {
        let settings = self.alert_settings().await;
        save_alert_settings(&self.alerts_path, &settings).await?;
        info!(path = %self.alerts_path.display(), "alert settings saved");
        Ok(())
    }

    /// One fresh sample rendered as a status block.
    pub async fn status(&self) -> Result<String, MonitorError> {
        let bundle = self.source.sample().await?;
        Ok(status_report(&bundle))
    }

    /// Start (or restart) a live session for `id`.
    pub async fn start_live(&self, id: i64) {
        self.sessions.start(id, self.clone()).await;
    }

    pub async fn stop_live(&self, id: i64) -> bool {
        self.sessions.stop(id).await
    }
}
