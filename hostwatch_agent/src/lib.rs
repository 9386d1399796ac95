//! Library for hostwatch_agent: bounded metric history, window stats and threshold alerts.

pub mod alerts;
pub mod config;
pub mod error;
pub mod format;
pub mod history;
pub mod metrics;
pub mod normalize;
pub mod notify;
pub mod sampler;
pub mod session;
pub mod state;
pub mod stats;
pub mod types;

pub use alerts::{AlertEngine, AlertKind, AlertSettings};
pub use error::MonitorError;
pub use history::{HistoryStore, JsonFilePersistence, MemoryPersistence, Persistence};
pub use metrics::{MetricSource, SysinfoSource};
pub use notify::{NotificationSink, Notifier};
pub use state::AppState;
pub use types::{MetricSample, MetricsBundle, Series};
