use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimctlConfig {
    pub channel: ChannelConfig,
    pub drain: DrainConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Longest time `apply` waits for the state lock, in milliseconds
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Number of committed transitions kept in history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DrainConfig {
    /// Log a warning once a drain has run this long, in seconds
    #[serde(default = "default_warn_after_secs")]
    pub warn_after_secs: u64,

    /// Duration of the stand-in drain used by the CLI, in milliseconds
    #[serde(default = "default_simulated_drain_ms")]
    pub simulated_drain_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EventsConfig {
    /// Lifecycle event bus capacity
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Log every published lifecycle event at debug level
    #[serde(default = "default_debug_logging")]
    pub debug_logging: bool,
}

impl ChannelConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl DrainConfig {
    pub fn warn_after(&self) -> Duration {
        Duration::from_secs(self.warn_after_secs)
    }

    pub fn simulated_drain(&self) -> Duration {
        Duration::from_millis(self.simulated_drain_ms)
    }
}

impl SimctlConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("simctl.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("channel.lock_timeout_ms", default_lock_timeout_ms())?
            .set_default(
                "channel.history_capacity",
                default_history_capacity() as i64,
            )?
            .set_default("drain.warn_after_secs", default_warn_after_secs())?
            .set_default("drain.simulated_drain_ms", default_simulated_drain_ms())?
            .set_default("events.bus_capacity", default_bus_capacity() as i64)?
            .set_default("events.debug_logging", default_debug_logging())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment variables, e.g. SIMCTL_CHANNEL__LOCK_TIMEOUT_MS
            .add_source(
                Environment::with_prefix("SIMCTL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: SimctlConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.lock_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Channel lock_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.channel.history_capacity == 0 {
            return Err(ConfigError::Message(
                "Channel history_capacity must be greater than 0".to_string(),
            ));
        }

        if self.drain.warn_after_secs == 0 {
            return Err(ConfigError::Message(
                "Drain warn_after_secs must be greater than 0".to_string(),
            ));
        }

        if self.events.bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for SimctlConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig {
                lock_timeout_ms: default_lock_timeout_ms(),
                history_capacity: default_history_capacity(),
            },
            drain: DrainConfig {
                warn_after_secs: default_warn_after_secs(),
                simulated_drain_ms: default_simulated_drain_ms(),
            },
            events: EventsConfig {
                bus_capacity: default_bus_capacity(),
                debug_logging: default_debug_logging(),
            },
        }
    }
}

// Default value functions
fn default_lock_timeout_ms() -> u64 {
    250
}
fn default_history_capacity() -> usize {
    64
}

fn default_warn_after_secs() -> u64 {
    10
}
fn default_simulated_drain_ms() -> u64 {
    0
}

fn default_bus_capacity() -> usize {
    100
}
fn default_debug_logging() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SimctlConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.channel.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.drain.simulated_drain(), Duration::ZERO);
    }

    #[test]
    fn test_config_validation() {
        let mut config = SimctlConfig::default();
        config.channel.history_capacity = 0;

        assert!(config.validate().is_err());

        config.channel.history_capacity = 16;
        assert!(config.validate().is_ok());

        config.events.bus_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_with_partial_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[channel]\nlock_timeout_ms = 1000\n\n[drain]\nsimulated_drain_ms = 75"
        )
        .unwrap();

        let config = SimctlConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.channel.lock_timeout_ms, 1000);
        assert_eq!(config.channel.history_capacity, 64);
        assert_eq!(config.drain.simulated_drain_ms, 75);
        assert_eq!(config.events.bus_capacity, 100);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SimctlConfig::load_from_file(dir.path().join("absent.toml")).unwrap();

        assert_eq!(config, SimctlConfig::default());
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let rendered = SimctlConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[channel]"));

        let parsed: SimctlConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, SimctlConfig::default());
    }
}
