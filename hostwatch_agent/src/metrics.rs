//! Metrics collection using sysinfo for hostwatch_agent.

use std::future::Future;
use std::path::Path;

use once_cell::sync::OnceCell;
use sysinfo::{
    Components, CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System,
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::MonitorError;
use crate::types::{
    now_ms, CpuLoad, DiskUsage, MemoryUsage, MetricsBundle, NetCounters, Temperatures,
};

/// Produces one metrics bundle on demand.
pub trait MetricSource: Send + Sync + 'static {
    fn sample(&self) -> impl Future<Output = Result<MetricsBundle, MonitorError>> + Send;
}

// Runtime toggle (read once)
fn temp_enabled() -> bool {
    static ON: OnceCell<bool> = OnceCell::new();
    *ON.get_or_init(|| {
        std::env::var("HOSTWATCH_TEMP")
            .map(|v| v != "0")
            .unwrap_or(true)
    })
}

// Readings outside this range are sensor noise
fn plausible_temp(t: f32) -> Option<f64> {
    let t = f64::from(t);
    (t > 0.0 && t < 150.0).then_some(t)
}

fn label_matches(label: &str, needles: &[&str]) -> bool {
    let l = label.to_ascii_lowercase();
    needles.iter().any(|n| l.contains(n))
}

const CPU_LABELS: &[&str] = &["cpu", "package", "tctl", "tdie", "coretemp", "k10temp"];
const GPU_LABELS: &[&str] = &["gpu", "amdgpu", "nouveau", "radeon", "edge"];
const SSD_LABELS: &[&str] = &["nvme", "composite", "drivetemp", "ssd"];

const IFACE_PRIORITY: &[&str] = &["eth0", "enp", "wlan0", "wlp"];

/// Pick the interface to report: explicit choice, then by name priority,
/// then the first non-loopback one (sorted for stable output).
pub fn pick_interface<'a>(names: &[&'a str], preferred: Option<&str>) -> Option<&'a str> {
    if let Some(p) = preferred {
        return names.iter().copied().find(|n| *n == p);
    }
    let mut candidates: Vec<&str> = names
        .iter()
        .copied()
        .filter(|n| *n != "lo" && !n.starts_with("lo:"))
        .collect();
    candidates.sort_unstable();
    for prefix in IFACE_PRIORITY {
        if let Some(found) = candidates.iter().copied().find(|n| n.starts_with(prefix)) {
            return Some(found);
        }
    }
    candidates.first().copied()
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

pub struct SysinfoSource {
    // Persistent sysinfo handles so cpu usage is a delta between polls
    sys: Mutex<System>,
    disks: Mutex<Disks>,
    components: Mutex<Components>,
    networks: Mutex<Networks>,
    hostname: String,
    interface: Option<String>,
}

impl SysinfoSource {
    pub fn new(interface: Option<String>) -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());
        let sys = System::new_with_specifics(refresh_kind);

        let hostname = hostname::get()
            .ok()
            .and_then(|s| s.into_string().ok())
            .or_else(System::host_name)
            .unwrap_or_else(|| "unknown".into());

        Self {
            sys: Mutex::new(sys),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            components: Mutex::new(Components::new_with_refreshed_list()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            hostname,
            interface,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn cpu_and_memory(&self) -> Result<(CpuLoad, MemoryUsage), MonitorError> {
        let mut sys = self.sys.lock().await;
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sys.refresh_cpu_usage();
            sys.refresh_memory();
        })) {
            warn!("sysinfo refresh panicked: {e:?}");
            return Err(MonitorError::SourceUnavailable("sysinfo refresh panicked".into()));
        }
        if sys.cpus().is_empty() {
            return Err(MonitorError::SourceUnavailable("no cpus reported".into()));
        }
        let total = sys.total_memory();
        if total == 0 {
            return Err(MonitorError::SourceUnavailable("no memory reported".into()));
        }
        let used = total.saturating_sub(sys.available_memory());
        let load = System::load_average();
        Ok((
            CpuLoad {
                percent: f64::from(sys.global_cpu_usage()).clamp(0.0, 100.0),
                load1: load.one,
                load5: load.five,
                load15: load.fifteen,
            },
            MemoryUsage {
                used_bytes: used,
                total_bytes: total,
                percent: percent(used, total),
            },
        ))
    }

    async fn root_disk(&self) -> Option<DiskUsage> {
        let mut disks = self.disks.lock().await;
        disks.refresh(false); // don't drop missing disks
        let root = disks
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| disks.iter().max_by_key(|d| d.total_space()))?;
        let total = root.total_space();
        if total == 0 {
            return None;
        }
        let used = total.saturating_sub(root.available_space());
        Some(DiskUsage {
            mount: root.mount_point().to_string_lossy().into_owned(),
            used_bytes: used,
            total_bytes: total,
            percent: percent(used, total),
        })
    }

    async fn temperatures(&self) -> Temperatures {
        if !temp_enabled() {
            return Temperatures::default();
        }
        let mut components = self.components.lock().await;
        components.refresh(false);
        let hottest = |needles: &[&str]| {
            components
                .iter()
                .filter(|c| label_matches(c.label(), needles))
                .filter_map(|c| c.temperature().and_then(plausible_temp))
                .reduce(f64::max)
        };
        Temperatures {
            cpu: hottest(CPU_LABELS),
            gpu: hottest(GPU_LABELS),
            ssd: hottest(SSD_LABELS),
        }
    }

    async fn network(&self) -> Option<NetCounters> {
        let mut nets = self.networks.lock().await;
        nets.refresh(false);
        let names: Vec<&str> = nets.iter().map(|(name, _)| name.as_str()).collect();
        let chosen = pick_interface(&names, self.interface.as_deref())?.to_string();
        let (_, data) = nets.iter().find(|(name, _)| name.as_str() == chosen)?;
        Some(NetCounters {
            interface: chosen,
            rx_bytes: data.total_received(),
            tx_bytes: data.total_transmitted(),
            rx_packets: data.total_packets_received(),
            tx_packets: data.total_packets_transmitted(),
        })
    }
}

impl MetricSource for SysinfoSource {
    async fn sample(&self) -> Result<MetricsBundle, MonitorError> {
        let (cpu, memory) = self.cpu_and_memory().await?;
        let disk = self.root_disk().await;
        let temperature = self.temperatures().await;
        let network = self.network().await;
        Ok(MetricsBundle {
            timestamp_ms: now_ms(),
            hostname: self.hostname.clone(),
            cpu,
            memory,
            disk,
            temperature,
            network,
            uptime_secs: System::uptime(),
        })
    }
}
