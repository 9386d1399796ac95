//! Text rendering for notifications and reports.

use chrono::{Local, TimeZone};

use crate::stats::SeriesStats;
use crate::types::{MetricsBundle, Series};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// 1024-based size with at most two decimals, e.g. `1.5 KB`, `100 MB`.
pub fn format_bytes(bytes: f64) -> String {
    if !bytes.is_finite() || bytes <= 0.0 {
        return "0 B".to_string();
    }
    let idx = ((bytes.ln() / 1024f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let scaled = bytes / 1024f64.powi(idx as i32);
    let mut num = format!("{scaled:.2}");
    if num.contains('.') {
        let trimmed = num.trim_end_matches('0').trim_end_matches('.').len();
        num.truncate(trimmed);
    }
    format!("{num} {}", UNITS[idx])
}

/// Escape the characters legacy Telegram Markdown treats as entity markers,
/// so host names like `db_primary` render literally.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn local_time(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ms.to_string(),
    }
}

pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days}d "));
    }
    if hours > 0 {
        out.push_str(&format!("{hours}h "));
    }
    out.push_str(&format!("{minutes}m"));
    out
}

fn unit_value(series: Series, v: f64) -> String {
    match series {
        Series::Cpu | Series::Memory | Series::Disk => format!("{v:.1}%"),
        Series::Temperature => format!("{v:.1}°C"),
        Series::Network => format!("{}/s", format_bytes(v)),
    }
}

pub fn format_stats(series: Series, stats: Option<&SeriesStats>, hours: u32) -> String {
    let title = series.as_str().to_uppercase();
    match stats {
        None => format!("{title}: no data for the last {hours}h"),
        Some(s) => format!(
            "{title} over {hours}h:\n  max: {}\n  min: {}\n  avg: {}\n  points: {}",
            unit_value(series, s.max),
            unit_value(series, s.min),
            unit_value(series, s.avg),
            s.count,
        ),
    }
}

/// Compact status for live sessions.
pub fn live_status(m: &MetricsBundle) -> String {
    let mut text = format!(
        "🔴 *LIVE* {}\nCPU: {:.1}%\nRAM: {:.1}%",
        escape_markdown(&m.hostname),
        m.cpu.percent,
        m.memory.percent
    );
    if let Some(t) = m.temperature.cpu {
        text.push_str(&format!("\nTEMP: {t:.1}°C"));
    }
    if let Some(d) = &m.disk {
        text.push_str(&format!("\nDISK: {:.1}%", d.percent));
    }
    text
}

/// Full status block for one fresh sample.
pub fn status_report(m: &MetricsBundle) -> String {
    let mut lines = vec![
        format!("🖥 *{}*", escape_markdown(&m.hostname)),
        String::new(),
        format!("⚡ CPU {:.1}%", m.cpu.percent),
        format!(
            "   Load: {:.2} | {:.2} | {:.2}",
            m.cpu.load1, m.cpu.load5, m.cpu.load15
        ),
        format!(
            "🧠 RAM {:.1}% ({} / {})",
            m.memory.percent,
            format_bytes(m.memory.used_bytes as f64),
            format_bytes(m.memory.total_bytes as f64)
        ),
    ];
    if let Some(d) = &m.disk {
        lines.push(format!(
            "💽 DISK {:.1}% ({} / {}) on {}",
            d.percent,
            format_bytes(d.used_bytes as f64),
            format_bytes(d.total_bytes as f64),
            escape_markdown(&d.mount)
        ));
    }
    for (kind, v) in m.temperature.readings() {
        lines.push(format!("🌡 {} {v:.1}°C", kind.to_uppercase()));
    }
    if let Some(n) = &m.network {
        lines.push(format!(
            "🌐 {} RX {} / TX {}",
            escape_markdown(&n.interface),
            format_bytes(n.rx_bytes as f64),
            format_bytes(n.tx_bytes as f64)
        ));
    }
    lines.push(format!("⏱ Uptime: {}", format_uptime(m.uptime_secs)));
    lines.join("\n")
}
