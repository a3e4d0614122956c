use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::limits::MAX_HOLD_TIMEOUT;

pub const DEFAULT_GATE_SIZE: usize = 3;
pub const DEFAULT_HOLD_TIMEOUT: Duration = Duration::from_secs(120);

/// Knobs the allocation engine itself needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Client operations admitted at once.
    pub gate_size: usize,
    /// How long a granted seat waits for confirmation.
    pub hold_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gate_size: DEFAULT_GATE_SIZE,
            hold_timeout: DEFAULT_HOLD_TIMEOUT,
        }
    }
}

/// Process configuration, read from `SEATLINE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Missing or unparsable values take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse().ok())
        }

        Self {
            bind: lookup("SEATLINE_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&lookup, "SEATLINE_PORT").unwrap_or(7400),
            data_dir: lookup("SEATLINE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            max_connections: parsed(&lookup, "SEATLINE_MAX_CONNECTIONS").unwrap_or(256),
            compact_threshold: parsed(&lookup, "SEATLINE_COMPACT_THRESHOLD").unwrap_or(1000),
            metrics_port: parsed(&lookup, "SEATLINE_METRICS_PORT"),
            engine: EngineConfig {
                gate_size: parsed(&lookup, "SEATLINE_GATE_SIZE").unwrap_or(DEFAULT_GATE_SIZE),
                hold_timeout: parsed(&lookup, "SEATLINE_HOLD_TIMEOUT_SECS")
                    .map(|secs: u64| Duration::from_secs(secs).min(MAX_HOLD_TIMEOUT))
                    .unwrap_or(DEFAULT_HOLD_TIMEOUT),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
