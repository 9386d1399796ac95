//! Threshold alerting with per-kind cooldown, plus edge-triggered liveness tracking.
//!
//! [`AlertEngine`] is a plain state machine: it never samples or sends
//! anything itself. The sweep drivers in `sampler` feed it observations and
//! deliver whatever alerts it returns, so no engine state is held across an
//! await.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::format::{escape_markdown, format_bytes, local_time};
use crate::types::MetricsBundle;

const MIB: f64 = 1024.0 * 1024.0;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Cpu,
    Ram,
    Disk,
    Temp,
    Network,
}

impl AlertKind {
    pub const ALL: [AlertKind; 5] = [
        AlertKind::Cpu,
        AlertKind::Ram,
        AlertKind::Disk,
        AlertKind::Temp,
        AlertKind::Network,
    ];

    /// Checked by the slow sweep.
    pub const FULL_SWEEP: [AlertKind; 4] =
        [AlertKind::Cpu, AlertKind::Ram, AlertKind::Disk, AlertKind::Temp];

    /// Checked by the fast sweep.
    pub const FAST_SWEEP: [AlertKind; 3] = [AlertKind::Cpu, AlertKind::Ram, AlertKind::Network];

    /// Inclusive clamp applied to every threshold change.
    pub fn bounds(self) -> (f64, f64) {
        match self {
            AlertKind::Cpu | AlertKind::Ram | AlertKind::Disk => (10.0, 100.0),
            AlertKind::Temp => (30.0, 120.0),
            AlertKind::Network => (10.0 * MIB, 1000.0 * MIB),
        }
    }

    pub fn step(self) -> f64 {
        match self {
            AlertKind::Network => 10.0 * MIB,
            _ => 5.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AlertKind::Cpu => "CPU",
            AlertKind::Ram => "RAM",
            AlertKind::Disk => "Disk",
            AlertKind::Temp => "Temperature",
            AlertKind::Network => "Network",
        }
    }

    fn emoji(self) -> &'static str {
        match self {
            AlertKind::Cpu => "⚡",
            AlertKind::Ram => "🧠",
            AlertKind::Disk => "💽",
            AlertKind::Temp => "🔥",
            AlertKind::Network => "🌐",
        }
    }

    pub fn format_value(self, v: f64) -> String {
        match self {
            AlertKind::Cpu | AlertKind::Ram | AlertKind::Disk => format!("{v:.1}%"),
            AlertKind::Temp => format!("{v:.1}°C"),
            AlertKind::Network => format!("{}/s", format_bytes(v)),
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(AlertKind::Cpu),
            "ram" | "memory" => Ok(AlertKind::Ram),
            "disk" => Ok(AlertKind::Disk),
            "temp" | "temperature" => Ok(AlertKind::Temp),
            "network" | "net" => Ok(AlertKind::Network),
            other => Err(format!("unknown alert kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjust {
    Increase,
    Decrease,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub cpu: f64,
    pub ram: f64,
    pub disk: f64,
    pub temp: f64,
    /// bytes per second
    pub network: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: 80.0,
            ram: 85.0,
            disk: 90.0,
            temp: 80.0,
            network: 100.0 * MIB,
        }
    }
}

impl Thresholds {
    pub fn get(&self, kind: AlertKind) -> f64 {
        match kind {
            AlertKind::Cpu => self.cpu,
            AlertKind::Ram => self.ram,
            AlertKind::Disk => self.disk,
            AlertKind::Temp => self.temp,
            AlertKind::Network => self.network,
        }
    }

    fn slot(&mut self, kind: AlertKind) -> &mut f64 {
        match kind {
            AlertKind::Cpu => &mut self.cpu,
            AlertKind::Ram => &mut self.ram,
            AlertKind::Disk => &mut self.disk,
            AlertKind::Temp => &mut self.temp,
            AlertKind::Network => &mut self.network,
        }
    }

    /// Store `value` clamped to the kind's bounds; returns what was stored.
    pub fn set_clamped(&mut self, kind: AlertKind, value: f64) -> f64 {
        let (lo, hi) = kind.bounds();
        let v = if value.is_finite() { value.clamp(lo, hi) } else { self.get(kind) };
        *self.slot(kind) = v;
        v
    }

    /// Clamp every value into range; used after loading a hand-edited file.
    pub fn sanitized(mut self) -> Self {
        for kind in AlertKind::ALL {
            let v = self.get(kind);
            self.set_clamped(kind, v);
        }
        self
    }
}

/// The part of the alert configuration that is saved on request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub thresholds: Thresholds,
    pub enabled: BTreeMap<AlertKind, bool>,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            enabled: AlertKind::ALL.iter().map(|k| (*k, true)).collect(),
        }
    }
}

/// The scalars each alert kind is judged on, extracted from one poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub cpu_percent: Option<f64>,
    pub ram_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub temp_max: Option<f64>,
    pub net_bytes_per_sec: Option<f64>,
    pub interface: Option<String>,
}

impl Observation {
    pub fn from_bundle(bundle: &MetricsBundle) -> Self {
        Self {
            cpu_percent: Some(bundle.cpu.percent),
            ram_percent: Some(bundle.memory.percent),
            disk_percent: bundle.disk.as_ref().map(|d| d.percent),
            temp_max: bundle.temperature.max(),
            net_bytes_per_sec: None,
            interface: bundle.network.as_ref().map(|n| n.interface.clone()),
        }
    }

    pub fn with_network_rate(mut self, bytes_per_sec: Option<f64>) -> Self {
        self.net_bytes_per_sec = bytes_per_sec;
        self
    }

    pub fn value(&self, kind: AlertKind) -> Option<f64> {
        let v = match kind {
            AlertKind::Cpu => self.cpu_percent,
            AlertKind::Ram => self.ram_percent,
            AlertKind::Disk => self.disk_percent,
            AlertKind::Temp => self.temp_max,
            AlertKind::Network => self.net_bytes_per_sec,
        };
        v.filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: AlertKind,
    pub value: f64,
    pub threshold: f64,
    pub at_ms: i64,
    pub interface: Option<String>,
}

impl Alert {
    pub fn message(&self, hostname: &str) -> String {
        let host = escape_markdown(hostname);
        let mut text = format!(
            "🚨 *Alert on {host}*\n\n{} *{}*: {}\nThreshold: {}\n",
            self.kind.emoji(),
            self.kind.label(),
            self.kind.format_value(self.value),
            self.kind.format_value(self.threshold),
        );
        if let (AlertKind::Network, Some(iface)) = (self.kind, self.interface.as_deref()) {
            text.push_str(&format!("Interface: {}\n", escape_markdown(iface)));
        }
        text.push_str(&format!("\n🕐 {}", local_time(self.at_ms)));
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessEvent {
    Lost,
    Recovered,
}

impl LivenessEvent {
    pub fn message(self, hostname: &str) -> String {
        let hostname = escape_markdown(hostname);
        match self {
            LivenessEvent::Lost => format!(
                "⚠️ *{hostname} unreachable!*\n\nMetrics could not be collected. Possible power or system failure."
            ),
            LivenessEvent::Recovered => {
                format!("✅ *{hostname} reachable again*\n\nMetric collection resumed.")
            }
        }
    }
}

pub struct AlertEngine {
    settings: AlertSettings,
    last_fired: HashMap<AlertKind, i64>,
    cooldown_ms: i64,
    source_up: bool,
    notify_recovery: bool,
}

impl AlertEngine {
    pub fn new(settings: AlertSettings, cooldown: Duration) -> Self {
        Self {
            settings: AlertSettings {
                thresholds: settings.thresholds.sanitized(),
                enabled: settings.enabled,
            },
            last_fired: HashMap::new(),
            cooldown_ms: i64::try_from(cooldown.as_millis()).unwrap_or(i64::MAX),
            source_up: true,
            notify_recovery: false,
        }
    }

    pub fn with_recovery_notice(mut self, on: bool) -> Self {
        self.notify_recovery = on;
        self
    }

    pub fn settings(&self) -> &AlertSettings {
        &self.settings
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.settings.thresholds
    }

    pub fn is_enabled(&self, kind: AlertKind) -> bool {
        // kinds missing from a saved file default to on
        self.settings.enabled.get(&kind).copied().unwrap_or(true)
    }

    pub fn set_enabled(&mut self, kind: AlertKind, on: bool) {
        self.settings.enabled.insert(kind, on);
    }

    pub fn toggle(&mut self, kind: AlertKind) -> bool {
        let on = !self.is_enabled(kind);
        self.set_enabled(kind, on);
        on
    }

    pub fn set_threshold(&mut self, kind: AlertKind, value: f64) -> f64 {
        self.settings.thresholds.set_clamped(kind, value)
    }

    pub fn adjust_threshold(&mut self, kind: AlertKind, dir: Adjust) -> f64 {
        let current = self.settings.thresholds.get(kind);
        let next = match dir {
            Adjust::Increase => current + kind.step(),
            Adjust::Decrease => current - kind.step(),
        };
        self.set_threshold(kind, next)
    }

    pub fn last_fired(&self, kind: AlertKind) -> Option<i64> {
        self.last_fired.get(&kind).copied()
    }

    pub fn source_up(&self) -> bool {
        self.source_up
    }

    fn cooled_down(&self, kind: AlertKind, now: i64) -> bool {
        match self.last_fired.get(&kind) {
            None => true,
            // a clock stepped back past the last fire must not freeze the kind
            Some(&last) if now < last => true,
            Some(&last) => now.saturating_sub(last) > self.cooldown_ms,
        }
    }

    /// Judge `obs` for each enabled kind in `kinds`. Breaches outside their
    /// cooldown are returned and stamped as fired at `now`; the rest are
    /// suppressed. Dropping back under a threshold leaves the cooldown running.
    pub fn evaluate(&mut self, obs: &Observation, kinds: &[AlertKind], now: i64) -> Vec<Alert> {
        let mut fired = Vec::new();
        for &kind in kinds {
            if !self.is_enabled(kind) {
                continue;
            }
            let Some(value) = obs.value(kind) else {
                continue;
            };
            let threshold = self.settings.thresholds.get(kind);
            if value <= threshold {
                continue;
            }
            if !self.cooled_down(kind, now) {
                debug!(?kind, value, threshold, "alert suppressed by cooldown");
                continue;
            }
            self.last_fired.insert(kind, now);
            fired.push(Alert {
                kind,
                value,
                threshold,
                at_ms: now,
                interface: obs.interface.clone(),
            });
        }
        fired
    }

    /// Record one heartbeat outcome. Only the transition to unreachable is
    /// reported (once per outage); recovery is reported only when opted in.
    pub fn record_heartbeat(&mut self, reachable: bool) -> Option<LivenessEvent> {
        let was_up = std::mem::replace(&mut self.source_up, reachable);
        match (was_up, reachable) {
            (true, false) => Some(LivenessEvent::Lost),
            (false, true) if self.notify_recovery => Some(LivenessEvent::Recovered),
            _ => None,
        }
    }
}
