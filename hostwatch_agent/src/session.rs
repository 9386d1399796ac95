//! Live sessions: a bounded run of status pushes that can be stopped early.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::format::live_status;
use crate::history::Persistence;
use crate::metrics::MetricSource;
use crate::notify::{deliver, NotificationSink};
use crate::state::AppState;

pub const FINISHED_MESSAGE: &str = "⏹ Live mode finished.";

struct Entry {
    generation: u64,
    stop: Arc<Notify>,
}

#[derive(Default)]
struct Registry {
    next_generation: u64,
    sessions: HashMap<i64, Entry>,
}

/// Session registry keyed by a caller-chosen id (a chat, in practice).
#[derive(Clone)]
pub struct LiveSessions {
    inner: Arc<Mutex<Registry>>,
    period: Duration,
    updates: u32,
}

impl LiveSessions {
    pub fn new(period: Duration, updates: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry::default())),
            period,
            updates,
        }
    }

    /// Spawn a session for `id`, stopping any session already running under it.
    pub async fn start<S, N, P>(&self, id: i64, state: AppState<S, N, P>) -> JoinHandle<()>
    where
        S: MetricSource,
        N: NotificationSink,
        P: Persistence,
    {
        let stop = Arc::new(Notify::new());
        let generation = {
            let mut reg = self.inner.lock().await;
            reg.next_generation += 1;
            let generation = reg.next_generation;
            let entry = Entry {
                generation,
                stop: Arc::clone(&stop),
            };
            if let Some(old) = reg.sessions.insert(id, entry) {
                debug!(id, "replacing live session");
                old.stop.notify_one();
            }
            generation
        };

        let registry = Arc::clone(&self.inner);
        let (period, updates) = (self.period, self.updates);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sent = 0u32;
            let finished = loop {
                tokio::select! {
                    _ = stop.notified() => break false,
                    _ = ticker.tick() => {
                        if sent >= updates {
                            break true;
                        }
                        match state.source.sample().await {
                            Ok(bundle) => {
                                deliver(&*state.notifier, &live_status(&bundle)).await;
                            }
                            Err(e) => warn!(id, error = %e, "live update skipped"),
                        }
                        sent += 1;
                    }
                }
            };
            if finished {
                deliver(&*state.notifier, FINISHED_MESSAGE).await;
            }
            let mut reg = registry.lock().await;
            if reg.sessions.get(&id).map(|e| e.generation) == Some(generation) {
                reg.sessions.remove(&id);
            }
            debug!(id, sent, finished, "live session ended");
        })
    }

    /// Stop the session for `id`; `false` if none was running.
    pub async fn stop(&self, id: i64) -> bool {
        match self.inner.lock().await.sessions.remove(&id) {
            Some(entry) => {
                entry.stop.notify_one();
                true
            }
            None => false,
        }
    }

    pub async fn is_active(&self, id: i64) -> bool {
        self.inner.lock().await.sessions.contains_key(&id)
    }

    pub async fn active(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.inner.lock().await.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
