//! Server configuration.
//!
//! Loaded from a TOML file (every field optional), then overridden from the
//! environment:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:5000"
//!
//! [scheduler]
//! workers = 4
//! poll_interval_ms = 1000
//! step_timeout_ms = 600000
//!
//! [store]
//! path = "var/courier/tasks.json"
//!
//! [logging]
//! level = "info"
//! json = false
//!
//! [simulation]
//! latency_ms = 200
//! failure_rate = 0.0
//!
//! [[devices]]
//! name = "PACS"
//! ae_title = "PACS"
//! host = "10.0.0.5"
//! port = 104
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use courier_core::SchedulerConfig;
use courier_core::ports::Device;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_BIND: &str = "COURIER_BIND";
pub const ENV_WORKERS: &str = "COURIER_WORKERS";
pub const ENV_STORE_PATH: &str = "COURIER_STORE_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub scheduler: SchedulerSection,
    pub store: StoreSection,
    pub logging: LoggingSection,
    pub simulation: SimulationSection,
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub workers: usize,
    pub poll_interval_ms: u64,
    /// 0 disables the per-step timeout.
    pub step_timeout_ms: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval_ms: 1000,
            step_timeout_ms: 0,
        }
    }
}

/// Where tasks are kept. Without a `path` they live in memory only and are
/// lost on restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Used when `RUST_LOG` is not set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Behaviour of the simulated DICOM collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    /// Time each simulated operation takes.
    pub latency_ms: u64,
    /// Probability in `[0, 1]` that an operation fails.
    pub failure_rate: f64,
    /// Images "received" when the subject does not announce a count.
    pub default_images: u32,
    /// Devices that never answer.
    pub unreachable: Vec<String>,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            latency_ms: 200,
            failure_rate: 0.0,
            default_images: 100,
            unreachable: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Reads `path` (or starts from defaults), applies environment overrides
    /// and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Applies `COURIER_BIND` / `COURIER_WORKERS` / `COURIER_STORE_PATH` as
    /// returned by `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(bind) = lookup(ENV_BIND) {
            self.server.bind = bind;
        }
        if let Some(workers) = lookup(ENV_WORKERS) {
            self.scheduler.workers = workers.trim().parse().map_err(|e| {
                ConfigError::invalid("scheduler.workers", format!("{ENV_WORKERS}={workers}: {e}"))
            })?;
        }
        if let Some(path) = lookup(ENV_STORE_PATH) {
            self.store.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.scheduler.workers == 0 {
            return Err(ConfigError::invalid("scheduler.workers", "must be at least 1"));
        }
        if self.scheduler.poll_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "scheduler.poll_interval_ms",
                "must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.simulation.failure_rate) {
            return Err(ConfigError::invalid(
                "simulation.failure_rate",
                format!("{} is outside [0, 1]", self.simulation.failure_rate),
            ));
        }
        if let Some(path) = &self.store.path
            && path.as_os_str().is_empty()
        {
            return Err(ConfigError::invalid("store.path", "must not be empty"));
        }
        for (i, device) in self.devices.iter().enumerate() {
            if device.name.trim().is_empty() {
                return Err(ConfigError::invalid("devices", format!("device #{} has no name", i + 1)));
            }
            if self.devices[..i].iter().any(|d| d.name == device.name) {
                return Err(ConfigError::invalid(
                    "devices",
                    format!("device '{}' is defined twice", device.name),
                ));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e| ConfigError::invalid("server.bind", format!("'{}': {e}", self.server.bind)))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let step_timeout = match self.scheduler.step_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        SchedulerConfig {
            workers: self.scheduler.workers,
            poll_interval: Duration::from_millis(self.scheduler.poll_interval_ms),
            step_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.bind_addr().unwrap().port(), 5000);
        assert_eq!(config.scheduler_config().step_timeout, None);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            [scheduler]
            workers = 8
            step_timeout_ms = 1500

            [[devices]]
            name = "PACS"
            ae_title = "PACS_AE"
            host = "10.0.0.5"
            port = 104
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.workers, 8);
        assert_eq!(config.scheduler.poll_interval_ms, 1000);
        assert_eq!(config.logging, LoggingSection::default());
        assert_eq!(config.store.path, None);
        assert_eq!(config.devices[0].ae_title, "PACS_AE");
        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.step_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            (ENV_BIND, "0.0.0.0:8080"),
            (ENV_WORKERS, "2"),
            (ENV_STORE_PATH, "/var/lib/courier/tasks.json"),
        ]
        .into();
        let mut config = ServerConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.scheduler.workers, 2);
        assert_eq!(
            config.store.path.as_deref(),
            Some(Path::new("/var/lib/courier/tasks.json"))
        );
    }

    #[test]
    fn bad_worker_override_is_reported() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_overrides(|k| (k == ENV_WORKERS).then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "scheduler.workers", .. }));
    }

    #[rstest]
    #[case("[scheduler]\nworkers = 0", "scheduler.workers")]
    #[case("[server]\nbind = \"not an address\"", "server.bind")]
    #[case("[simulation]\nfailure_rate = 1.5", "simulation.failure_rate")]
    #[case("[store]\npath = \"\"", "store.path")]
    #[case(
        "[[devices]]\nname = \"A\"\nae_title = \"A\"\nhost = \"h\"\nport = 1\n[[devices]]\nname = \"A\"\nae_title = \"B\"\nhost = \"h\"\nport = 2",
        "devices"
    )]
    fn invalid_values_are_rejected(#[case] raw: &str, #[case] expected_key: &str) {
        let err = ServerConfig::from_toml(raw).unwrap().validate().unwrap_err();
        match err {
            ConfigError::Invalid { key, .. } => assert_eq!(key, expected_key),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn store_path_is_read_from_file() {
        let config = ServerConfig::from_toml("[store]\npath = \"state/tasks.json\"").unwrap();
        assert_eq!(config.store.path, Some(PathBuf::from("state/tasks.json")));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = ServerConfig::from_toml("[scheduler\nworkers = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ServerConfig::load(Some(Path::new("/nonexistent/courier.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
