//! Service configuration
//!
//! Layered via figment: built-in defaults, then an optional YAML file, then
//! `CHASERSRV_`-prefixed environment variables.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// PLC endpoint host
    #[serde(default = "default_host")]
    pub host: String,

    /// PLC endpoint port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Modbus unit identifier
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Tick delay per speed level, milliseconds (level 1 first)
    #[serde(default = "default_speed_delays")]
    pub speed_delays_ms: Vec<u64>,

    /// Discrete-input poll interval, milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Environment (temperature/humidity) poll interval, milliseconds
    #[serde(default = "default_environment_interval")]
    pub environment_interval_ms: u64,

    /// TCP connect timeout, milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Per-request round-trip timeout, milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_host() -> String {
    "192.168.0.10".to_string()
}

fn default_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_speed_delays() -> Vec<u64> {
    vec![1000, 500, 200]
}

fn default_poll_interval() -> u64 {
    200
}

fn default_environment_interval() -> u64 {
    2000
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    2000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            unit_id: default_unit_id(),
            speed_delays_ms: default_speed_delays(),
            poll_interval_ms: default_poll_interval(),
            environment_interval_ms: default_environment_interval(),
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration, merging defaults, an optional file and env vars
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed("CHASERSRV_"));

        let config: AppConfig = figment
            .extract()
            .map_err(|e| ServiceError::config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.speed_delays_ms.len() != 3 {
            return Err(ServiceError::config(format!(
                "speed_delays_ms must have exactly 3 entries, got {}",
                self.speed_delays_ms.len()
            )));
        }
        if self.speed_delays_ms.iter().any(|&d| d == 0) {
            return Err(ServiceError::config("speed_delays_ms entries must be > 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ServiceError::config("poll_interval_ms must be > 0"));
        }
        if self.environment_interval_ms == 0 {
            return Err(ServiceError::config("environment_interval_ms must be > 0"));
        }
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(ServiceError::config("timeouts must be > 0"));
        }
        Ok(())
    }

    /// Speed-to-delay table as a fixed array (validated to 3 entries)
    pub fn speed_delays(&self) -> [u64; 3] {
        [
            self.speed_delays_ms[0],
            self.speed_delays_ms[1],
            self.speed_delays_ms[2],
        ]
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn environment_interval(&self) -> Duration {
        Duration::from_millis(self.environment_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.host, "192.168.0.10");
        assert_eq!(config.port, 502);
        assert_eq!(config.unit_id, 1);
        assert_eq!(config.speed_delays(), [1000, 500, 200]);
        assert_eq!(config.poll_interval_ms, 200);
        config.validate().expect("defaults should validate");
    }

    #[test]
    fn test_load_yaml_overrides() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("tempfile");
        writeln!(
            file,
            "host: 10.0.0.5\nport: 1502\nspeed_delays_ms: [800, 400, 100]"
        )
        .expect("write config");

        let config = AppConfig::load(Some(file.path())).expect("load");
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 1502);
        assert_eq!(config.speed_delays(), [800, 400, 100]);
        // Untouched fields keep their defaults
        assert_eq!(config.poll_interval_ms, 200);
    }

    #[test]
    fn test_validate_rejects_wrong_delay_count() {
        let config = AppConfig {
            speed_delays_ms: vec![1000, 500],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_delay() {
        let config = AppConfig {
            speed_delays_ms: vec![1000, 0, 200],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let config = AppConfig {
            poll_interval_ms: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
