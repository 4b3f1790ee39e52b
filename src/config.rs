use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::buffer::DEFAULT_CAPACITY;
use crate::error::{PeekError, Result};
use crate::live_capture::LiveSource;
use crate::replay_source::ReplaySource;
use crate::source::{Pacing, PacketSource};
use crate::synthetic_source::SyntheticSource;

const ENV_PREFIX: &str = "PEEK_";

#[derive(Debug, Clone, PartialEq)]
pub enum SourceConfig {
    Synthetic {
        pacing: Option<Pacing>,
        seed: Option<u64>,
    },
    Replay {
        path: PathBuf,
        gap: Option<Duration>,
    },
    Live {
        /// `None` means "ask at startup"
        interface: Option<String>,
    },
}

impl SourceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::Synthetic { .. } => "synthetic",
            SourceConfig::Replay { .. } => "replay",
            SourceConfig::Live { .. } => "live",
        }
    }

    /// Opens the adapter this configuration names.
    pub fn open(&self) -> Result<Box<dyn PacketSource>> {
        match self {
            SourceConfig::Synthetic { pacing, seed } => {
                let mut source = SyntheticSource::new(*seed);
                if let Some(pacing) = pacing {
                    source = source.with_pacing(*pacing);
                }
                Ok(Box::new(source))
            }
            SourceConfig::Replay { path, gap } => {
                let mut source = ReplaySource::open(path)?;
                if let Some(gap) = gap {
                    source = source.with_gap(*gap);
                }
                Ok(Box::new(source))
            }
            SourceConfig::Live { interface } => {
                let name = interface
                    .as_deref()
                    .ok_or("live capture needs an interface name")?;
                Ok(Box::new(LiveSource::open(name)?))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub capacity: usize,
    pub source: SourceConfig,
    pub report_interval: Duration,
    pub subscriber_capacity: usize,
    pub max_consecutive_errors: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            source: SourceConfig::Synthetic {
                pacing: Some(Pacing::between(
                    Duration::from_millis(500),
                    Duration::from_millis(1500),
                )),
                seed: None,
            },
            report_interval: Duration::from_secs(5),
            subscriber_capacity: 256,
            max_consecutive_errors: 50,
        }
    }
}

impl CaptureConfig {
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect();
        Self::from_vars(&vars)
    }

    /// Builds a configuration from `PEEK_*` style key/value pairs, falling
    /// back to defaults for anything missing.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |name: &str| {
            vars.get(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(capacity) = get("CAPACITY") {
            config.capacity = capacity.parse()?;
        }
        if let Some(secs) = get("REPORT_SECS") {
            config.report_interval = Duration::from_secs(secs.parse()?);
        }
        if let Some(capacity) = get("SUBSCRIBER_CAPACITY") {
            config.subscriber_capacity = capacity.parse()?;
        }
        if let Some(limit) = get("MAX_SOURCE_ERRORS") {
            config.max_consecutive_errors = limit.parse()?;
        }

        config.source = match get("SOURCE").unwrap_or("synthetic") {
            "synthetic" | "mock" => {
                let min = get("MIN_INTERVAL_MS").map(str::parse::<u64>).transpose()?;
                let max = get("MAX_INTERVAL_MS").map(str::parse::<u64>).transpose()?;
                let pacing = match (min, max) {
                    (None, None) => Some(Pacing::between(
                        Duration::from_millis(500),
                        Duration::from_millis(1500),
                    )),
                    (Some(0), Some(0)) => None,
                    (min, max) => {
                        let min = min.or(max).unwrap_or(0);
                        let max = max.unwrap_or(min);
                        Some(Pacing::between(
                            Duration::from_millis(min),
                            Duration::from_millis(max),
                        ))
                    }
                };
                let seed = get("SEED").map(str::parse::<u64>).transpose()?;
                SourceConfig::Synthetic { pacing, seed }
            }
            "replay" => {
                let path = get("REPLAY_PATH")
                    .ok_or("PEEK_REPLAY_PATH is required for the replay source")?;
                let gap = get("REPLAY_PACING_MS")
                    .map(str::parse::<u64>)
                    .transpose()?
                    .map(Duration::from_millis);
                SourceConfig::Replay {
                    path: PathBuf::from(path),
                    gap,
                }
            }
            "live" => SourceConfig::Live {
                interface: get("INTERFACE").map(str::to_string),
            },
            other => {
                return Err(PeekError::ConfigError(format!(
                    "unknown source kind {:?} (expected synthetic, replay or live)",
                    other
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err("PEEK_CAPACITY must be at least 1".into());
        }
        if self.subscriber_capacity == 0 {
            return Err("PEEK_SUBSCRIBER_CAPACITY must be at least 1".into());
        }
        if self.report_interval.is_zero() {
            return Err("PEEK_REPORT_SECS must be at least 1".into());
        }
        if self.max_consecutive_errors == 0 {
            return Err("PEEK_MAX_SOURCE_ERRORS must be at least 1".into());
        }
        Ok(())
    }
}
