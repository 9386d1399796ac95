//! Turning one metrics bundle into per-series history samples.

use crate::types::{MetricSample, MetricsBundle, NetCounters, Series};

/// Bytes/sec between two counter readings of the same interface.
/// `None` if the interface changed or no time elapsed; counter resets read as zero.
pub fn throughput(prev_ms: i64, prev: &NetCounters, next_ms: i64, next: &NetCounters) -> Option<f64> {
    if prev.interface != next.interface {
        return None;
    }
    let elapsed_ms = next_ms.saturating_sub(prev_ms);
    if elapsed_ms <= 0 {
        return None;
    }
    let delta = next.total_bytes().saturating_sub(prev.total_bytes());
    Some(delta as f64 * 1000.0 / elapsed_ms as f64)
}

/// Remembers the previous history tick's counters so each tick can record a rate.
#[derive(Debug, Default)]
pub struct NetRateTracker {
    last: Option<(i64, NetCounters)>,
}

impl NetRateTracker {
    pub fn observe(&mut self, at_ms: i64, counters: &NetCounters) -> Option<f64> {
        let rate = self
            .last
            .as_ref()
            .and_then(|(t, prev)| throughput(*t, prev, at_ms, counters));
        self.last = Some((at_ms, counters.clone()));
        rate
    }
}

pub fn to_samples(bundle: &MetricsBundle, net: &mut NetRateTracker) -> Vec<(Series, MetricSample)> {
    let ts = bundle.timestamp_ms;
    let mut out = Vec::with_capacity(7);

    out.push((
        Series::Cpu,
        MetricSample::new(ts, bundle.cpu.percent)
            .with_tag("load1", bundle.cpu.load1)
            .with_tag("load5", bundle.cpu.load5)
            .with_tag("load15", bundle.cpu.load15),
    ));

    out.push((
        Series::Memory,
        MetricSample::new(ts, bundle.memory.percent)
            .with_tag("used_bytes", bundle.memory.used_bytes)
            .with_tag("total_bytes", bundle.memory.total_bytes),
    ));

    if let Some(d) = &bundle.disk {
        out.push((
            Series::Disk,
            MetricSample::new(ts, d.percent)
                .with_tag("used_bytes", d.used_bytes)
                .with_tag("total_bytes", d.total_bytes)
                .with_tag("mount", d.mount.as_str()),
        ));
    }

    for (kind, v) in bundle.temperature.readings() {
        out.push((
            Series::Temperature,
            MetricSample::new(ts, v).with_tag("type", kind),
        ));
    }

    if let Some(n) = &bundle.network {
        if let Some(rate) = net.observe(ts, n) {
            out.push((
                Series::Network,
                MetricSample::new(ts, rate)
                    .with_tag("interface", n.interface.as_str())
                    .with_tag("rx_bytes", n.rx_bytes)
                    .with_tag("tx_bytes", n.tx_bytes)
                    .with_tag("rx_packets", n.rx_packets)
                    .with_tag("tx_packets", n.tx_packets),
            ));
        }
    }

    out
}
