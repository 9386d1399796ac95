//! Agent configuration: defaults, then `agent.json`, then `HOSTWATCH_*` env, then flags.
//! Files live under $XDG_CONFIG_HOME/hostwatch (fallback ~/.config/hostwatch); history
//! under $XDG_DATA_HOME/hostwatch (fallback ~/.local/share/hostwatch).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::alerts::{AlertSettings, DEFAULT_COOLDOWN};
use crate::error::MonitorError;
use crate::history::{HistoryOptions, DEFAULT_MAX_POINTS, DEFAULT_RETENTION};
use crate::notify::TELEGRAM_API;

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("hostwatch")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hostwatch")
    }
}

pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("HOSTWATCH_DATA_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        PathBuf::from(xdg).join("hostwatch")
    } else {
        dirs_next::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hostwatch")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: i64,
    pub api_base: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub data_dir: PathBuf,
    pub alerts_path: PathBuf,
    pub history_interval: Duration,
    pub check_interval: Duration,
    /// `None` disables the fast sweep.
    pub fast_check_interval: Option<Duration>,
    pub heartbeat_interval: Duration,
    pub cleanup_interval: Duration,
    pub rate_window: Duration,
    pub alert_cooldown: Duration,
    pub retention: Duration,
    pub max_points: usize,
    pub interface: Option<String>,
    pub notify_recovery: bool,
    pub live_period: Duration,
    pub live_updates: u32,
    pub telegram: Option<TelegramConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: data_dir(),
            alerts_path: config_dir().join("alerts.json"),
            history_interval: Duration::from_secs(5 * 60),
            check_interval: Duration::from_secs(60),
            fast_check_interval: Some(Duration::from_secs(5)),
            heartbeat_interval: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            rate_window: Duration::from_secs(1),
            alert_cooldown: DEFAULT_COOLDOWN,
            retention: DEFAULT_RETENTION,
            max_points: DEFAULT_MAX_POINTS,
            interface: None,
            notify_recovery: false,
            live_period: Duration::from_secs(5),
            live_updates: 12,
            telegram: None,
        }
    }
}

/// On-disk shape of `agent.json`; every field optional, durations in seconds.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfigFile {
    pub data_dir: Option<PathBuf>,
    pub alerts_path: Option<PathBuf>,
    pub history_interval_secs: Option<u64>,
    pub check_interval_secs: Option<u64>,
    pub fast_check_interval_secs: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
    pub alert_cooldown_secs: Option<u64>,
    pub retention_days: Option<u64>,
    pub max_points: Option<usize>,
    pub interface: Option<String>,
    pub notify_recovery: Option<bool>,
    pub live_period_secs: Option<u64>,
    pub live_updates: Option<u32>,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<i64>,
    pub telegram_api_base: Option<String>,
}

/// Flags accepted by the daemon binary.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub interface: Option<String>,
}

pub const USAGE: &str = "Usage: hostwatch_agent [--config FILE|-c FILE] [--data-dir DIR|-d DIR] [--interface IFACE|-i IFACE]";

/// Parse daemon flags. `Err` carries the text to print (usage or complaint).
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliOverrides, String> {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut out = CliOverrides::default();
    while let Some(arg) = it.next() {
        let mut value_for = |flag: &str| it.next().ok_or_else(|| format!("{flag} needs a value\n{USAGE}"));
        match arg.as_str() {
            "-h" | "--help" => return Err(USAGE.to_string()),
            "--config" | "-c" => out.config = Some(value_for(&arg)?.into()),
            "--data-dir" | "-d" => out.data_dir = Some(value_for(&arg)?.into()),
            "--interface" | "-i" => out.interface = Some(value_for(&arg)?),
            _ => match arg.split_once('=') {
                Some(("--config", v)) if !v.is_empty() => out.config = Some(v.into()),
                Some(("--data-dir", v)) if !v.is_empty() => out.data_dir = Some(v.into()),
                Some(("--interface", v)) if !v.is_empty() => out.interface = Some(v.into()),
                _ => return Err(format!("Unexpected argument '{arg}'\n{USAGE}")),
            },
        }
    }
    Ok(out)
}

fn secs(v: u64) -> Duration {
    Duration::from_secs(v)
}

fn days(v: u64) -> anyhow::Result<Duration> {
    v.checked_mul(24 * 60 * 60)
        .map(secs)
        .with_context(|| format!("retention of {v} days is out of range"))
}

impl AgentConfig {
    pub fn apply_file(&mut self, f: AgentConfigFile) -> anyhow::Result<()> {
        if let Some(v) = f.data_dir {
            self.data_dir = v;
        }
        if let Some(v) = f.alerts_path {
            self.alerts_path = v;
        }
        if let Some(v) = f.history_interval_secs {
            self.history_interval = secs(v);
        }
        if let Some(v) = f.check_interval_secs {
            self.check_interval = secs(v);
        }
        if let Some(v) = f.fast_check_interval_secs {
            self.fast_check_interval = (v > 0).then(|| secs(v));
        }
        if let Some(v) = f.heartbeat_interval_secs {
            self.heartbeat_interval = secs(v);
        }
        if let Some(v) = f.cleanup_interval_secs {
            self.cleanup_interval = secs(v);
        }
        if let Some(v) = f.alert_cooldown_secs {
            self.alert_cooldown = secs(v);
        }
        if let Some(v) = f.retention_days {
            self.retention = days(v)?;
        }
        if let Some(v) = f.max_points {
            self.max_points = v;
        }
        if f.interface.is_some() {
            self.interface = f.interface;
        }
        if let Some(v) = f.notify_recovery {
            self.notify_recovery = v;
        }
        if let Some(v) = f.live_period_secs {
            self.live_period = secs(v);
        }
        if let Some(v) = f.live_updates {
            self.live_updates = v;
        }
        if let (Some(token), Some(chat_id)) = (f.telegram_token, f.telegram_chat_id) {
            self.telegram = Some(TelegramConfig {
                token,
                chat_id,
                api_base: f.telegram_api_base.unwrap_or_else(|| TELEGRAM_API.to_string()),
            });
        }
        Ok(())
    }

    /// Apply `HOSTWATCH_*` variables looked up through `get`.
    pub fn apply_env<F>(&mut self, get: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let num = |key: &str| -> anyhow::Result<Option<u64>> {
            get(key)
                .map(|v| v.trim().parse::<u64>().with_context(|| format!("{key}={v} is not a number")))
                .transpose()
        };
        if let Some(v) = get("HOSTWATCH_DATA_DIR") {
            self.data_dir = v.into();
        }
        if let Some(v) = num("HOSTWATCH_HISTORY_INTERVAL_SECS")? {
            self.history_interval = secs(v);
        }
        if let Some(v) = num("HOSTWATCH_CHECK_INTERVAL_SECS")? {
            self.check_interval = secs(v);
        }
        if let Some(v) = num("HOSTWATCH_FAST_CHECK_INTERVAL_SECS")? {
            self.fast_check_interval = (v > 0).then(|| secs(v));
        }
        if let Some(v) = num("HOSTWATCH_HEARTBEAT_INTERVAL_SECS")? {
            self.heartbeat_interval = secs(v);
        }
        if let Some(v) = num("HOSTWATCH_ALERT_COOLDOWN_SECS")? {
            self.alert_cooldown = secs(v);
        }
        if let Some(v) = num("HOSTWATCH_RETENTION_DAYS")? {
            self.retention = days(v)?;
        }
        if let Some(v) = num("HOSTWATCH_MAX_POINTS")? {
            self.max_points = usize::try_from(v).unwrap_or(usize::MAX);
        }
        if let Some(v) = get("HOSTWATCH_INTERFACE") {
            self.interface = Some(v);
        }
        if let Some(v) = get("HOSTWATCH_NOTIFY_RECOVERY") {
            self.notify_recovery = v != "0";
        }
        if let Some(token) = get("HOSTWATCH_TELEGRAM_TOKEN") {
            let chat = get("HOSTWATCH_ADMIN_CHAT_ID")
                .context("HOSTWATCH_TELEGRAM_TOKEN set without HOSTWATCH_ADMIN_CHAT_ID")?;
            let chat_id = chat
                .trim()
                .parse()
                .with_context(|| format!("HOSTWATCH_ADMIN_CHAT_ID={chat} is not an integer"))?;
            let api_base = get("HOSTWATCH_TELEGRAM_API").unwrap_or_else(|| TELEGRAM_API.to_string());
            self.telegram = Some(TelegramConfig {
                token,
                chat_id,
                api_base,
            });
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(d) = &cli.data_dir {
            self.data_dir = d.clone();
        }
        if let Some(i) = &cli.interface {
            self.interface = Some(i.clone());
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let periods = [
            ("history interval", self.history_interval),
            ("check interval", self.check_interval),
            ("heartbeat interval", self.heartbeat_interval),
            ("cleanup interval", self.cleanup_interval),
            ("live period", self.live_period),
        ];
        for (name, d) in periods {
            anyhow::ensure!(!d.is_zero(), "{name} must be greater than zero");
        }
        anyhow::ensure!(self.max_points > 0, "max points must be at least 1");
        Ok(())
    }

    /// Resolve the full configuration for the daemon.
    pub fn load(cli: &CliOverrides) -> anyhow::Result<Self> {
        let mut cfg = AgentConfig::default();
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| config_dir().join("agent.json"));
        match std::fs::read_to_string(&path) {
            Ok(s) => {
                let file: AgentConfigFile = serde_json::from_str(&s)
                    .with_context(|| format!("parsing {}", path.display()))?;
                cfg.apply_file(file)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && cli.config.is_none() => {}
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        }
        cfg.apply_env(|k| std::env::var(k).ok())?;
        cfg.apply_cli(cli);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn history_options(&self) -> HistoryOptions {
        HistoryOptions {
            max_points: self.max_points,
            retention: self.retention,
        }
    }
}

/// Saved thresholds and switches, merged over defaults. A missing or
/// unreadable file yields the defaults.
pub fn load_alert_settings(path: &Path) -> AlertSettings {
    match std::fs::read_to_string(path) {
        Ok(s) => match serde_json::from_str(&s) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed alert settings");
                AlertSettings::default()
            }
        },
        Err(_) => AlertSettings::default(),
    }
}

pub async fn save_alert_settings(path: &Path, settings: &AlertSettings) -> Result<(), MonitorError> {
    let where_ = path.display().to_string();
    let data = serde_json::to_vec_pretty(settings).map_err(|e| MonitorError::storage(&where_, e))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MonitorError::storage(&where_, e))?;
    }
    tokio::fs::write(path, data)
        .await
        .map_err(|e| MonitorError::storage(&where_, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(v: &[&str]) -> Vec<String> {
        std::iter::once("hostwatch_agent")
            .chain(v.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn flags_long_short_and_assign() {
        let cli = parse_args(args(&["-d", "/tmp/hw", "--interface=eth1"])).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/hw")));
        assert_eq!(cli.interface.as_deref(), Some("eth1"));
        assert!(parse_args(args(&["--help"])).unwrap_err().contains("Usage:"));
        assert!(parse_args(args(&["--config"])).is_err());
        assert!(parse_args(args(&["--bogus"])).is_err());
    }

    #[test]
    fn file_then_env_layering() {
        let mut cfg = AgentConfig::default();
        let file: AgentConfigFile = serde_json::from_str(
            r#"{"check_interval_secs": 30, "fast_check_interval_secs": 0, "retention_days": 2,
                "telegram_token": "t", "telegram_chat_id": 42}"#,
        )
        .unwrap();
        cfg.apply_file(file).unwrap();
        assert_eq!(cfg.check_interval, Duration::from_secs(30));
        assert_eq!(cfg.fast_check_interval, None);
        assert_eq!(cfg.retention, Duration::from_secs(2 * 86_400));
        assert_eq!(cfg.telegram.as_ref().map(|t| t.chat_id), Some(42));

        let env: HashMap<&str, &str> = [
            ("HOSTWATCH_CHECK_INTERVAL_SECS", "10"),
            ("HOSTWATCH_MAX_POINTS", "50"),
        ]
        .into_iter()
        .collect();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.check_interval, Duration::from_secs(10));
        assert_eq!(cfg.max_points, 50);
        cfg.validate().unwrap();
    }

    #[test]
    fn huge_retention_is_rejected() {
        let mut cfg = AgentConfig::default();
        let file: AgentConfigFile =
            serde_json::from_str(&format!(r#"{{"retention_days": {}}}"#, u64::MAX)).unwrap();
        let err = cfg.apply_file(file).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
        assert!(cfg
            .apply_env(|k| (k == "HOSTWATCH_RETENTION_DAYS").then(|| u64::MAX.to_string()))
            .is_err());
        assert_eq!(cfg.retention, AgentConfig::default().retention);
    }

    #[test]
    fn bad_env_values_are_errors() {
        let mut cfg = AgentConfig::default();
        assert!(cfg
            .apply_env(|k| (k == "HOSTWATCH_MAX_POINTS").then(|| "lots".to_string()))
            .is_err());
        assert!(cfg
            .apply_env(|k| (k == "HOSTWATCH_TELEGRAM_TOKEN").then(|| "t".to_string()))
            .is_err());
        cfg.max_points = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(serde_json::from_str::<AgentConfigFile>(r#"{"chek_interval_secs": 1}"#).is_err());
    }

    #[tokio::test]
    async fn alert_settings_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("alerts.json");
        assert_eq!(load_alert_settings(&path), AlertSettings::default());
        let mut s = AlertSettings::default();
        s.thresholds.cpu = 55.0;
        s.enabled.insert(crate::alerts::AlertKind::Network, false);
        save_alert_settings(&path, &s).await.unwrap();
        assert_eq!(load_alert_settings(&path), s);
    }
}
