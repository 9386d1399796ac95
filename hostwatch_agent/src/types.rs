//! Metric data types: the bundle a source produces and the samples the store keeps.
//! The sample layout is also the on-disk history format, so keep it stable.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MonitorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Series {
    Cpu,
    Memory,
    Disk,
    Temperature,
    Network,
}

impl Series {
    pub const ALL: [Series; 5] = [
        Series::Cpu,
        Series::Memory,
        Series::Disk,
        Series::Temperature,
        Series::Network,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Series::Cpu => "cpu",
            Series::Memory => "memory",
            Series::Disk => "disk",
            Series::Temperature => "temperature",
            Series::Network => "network",
        }
    }

    /// Plausibility rule applied at ingestion.
    pub fn check_value(self, value: f64) -> Result<(), String> {
        if !value.is_finite() {
            return Err(format!("value {value} is not finite"));
        }
        match self {
            Series::Cpu | Series::Memory | Series::Disk => {
                if !(0.0..=100.0).contains(&value) {
                    return Err(format!("percentage {value} outside 0..=100"));
                }
            }
            Series::Temperature => {
                if value <= 0.0 || value >= 150.0 {
                    return Err(format!("temperature {value} outside (0, 150)"));
                }
            }
            Series::Network => {
                if value < 0.0 {
                    return Err(format!("throughput {value} is negative"));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Series {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Series::Cpu),
            "memory" | "mem" | "ram" => Ok(Series::Memory),
            "disk" => Ok(Series::Disk),
            "temperature" | "temp" => Ok(Series::Temperature),
            "network" | "net" => Ok(Series::Network),
            other => Err(format!("unknown series '{other}'")),
        }
    }
}

/// One timestamped observation. Tags are flattened next to `timestamp`/`value`
/// in the JSON record, e.g. `{"timestamp":1,"value":50.0,"type":"cpu"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: i64,
    pub value: f64,
    #[serde(flatten)]
    pub tags: BTreeMap<String, Value>,
}

impl MetricSample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    pub fn tag_str(&self, key: &str) -> Option<&str> {
        self.tags.get(key).and_then(Value::as_str)
    }

    /// Temperature subtype (`cpu`, `gpu`, `ssd`) when present.
    pub fn subtype(&self) -> Option<&str> {
        self.tag_str("type")
    }

    pub fn validate(&self, series: Series) -> Result<(), MonitorError> {
        let reason = if self.timestamp < 0 {
            Some(format!("timestamp {} is negative", self.timestamp))
        } else {
            series.check_value(self.value).err()
        };
        match reason {
            Some(reason) => Err(MonitorError::InvalidSample { series, reason }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuLoad {
    pub percent: f64,
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub mount: String,
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Temperatures {
    pub cpu: Option<f64>,
    pub gpu: Option<f64>,
    pub ssd: Option<f64>,
}

impl Temperatures {
    pub fn readings(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        [("cpu", self.cpu), ("gpu", self.gpu), ("ssd", self.ssd)]
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
    }

    pub fn max(&self) -> Option<f64> {
        self.readings().map(|(_, v)| v).reduce(f64::max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetCounters {
    pub interface: String,
    // cumulative since boot; diff two readings to get a rate
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
}

impl NetCounters {
    pub fn total_bytes(&self) -> u64 {
        self.rx_bytes.saturating_add(self.tx_bytes)
    }
}

/// Everything one poll of the metric source yields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsBundle {
    pub timestamp_ms: i64,
    pub hostname: String,
    pub cpu: CpuLoad,
    pub memory: MemoryUsage,
    pub disk: Option<DiskUsage>,
    pub temperature: Temperatures,
    pub network: Option<NetCounters>,
    pub uptime_secs: u64,
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
