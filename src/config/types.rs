use super::serde_duration;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default timeout applied to a single container runtime command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Default delay between two readiness probe attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default per-attempt TCP connect timeout.
pub const DEFAULT_TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default per-attempt HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of trailing log lines searched by a log-pattern probe.
pub const DEFAULT_LOG_TAIL_LINES: usize = 50;

/// Readiness budget for each condition during group deployment.
pub const DEFAULT_DEPLOY_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default health check poll interval.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Top-level `conductor.yaml` configuration.
///
/// Every section is optional; an empty file yields the defaults.
///
/// ```yaml
/// runtime:
///   binary: docker
///   command_timeout: 2m
/// probe:
///   poll_interval: 2s
///   tcp_connect_timeout: 3s
///   http_timeout: 5s
///   log_tail_lines: 50
/// deploy:
///   probe_timeout: 60s
/// health:
///   default_interval: 30s
/// state_dir: ~/.conductor
/// log_level: info
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub probe: ProbeConfig,
    pub deploy: DeployConfig,
    pub health: HealthConfig,

    /// Directory holding persisted snapshots and templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Container runtime CLI binary.
    pub binary: String,

    #[serde(with = "serde_duration")]
    pub command_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Timing parameters for readiness probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    #[serde(with = "serde_duration")]
    pub poll_interval: Duration,

    #[serde(with = "serde_duration")]
    pub tcp_connect_timeout: Duration,

    #[serde(with = "serde_duration")]
    pub http_timeout: Duration,

    pub log_tail_lines: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            tcp_connect_timeout: DEFAULT_TCP_CONNECT_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            log_tail_lines: DEFAULT_LOG_TAIL_LINES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    #[serde(with = "serde_duration")]
    pub probe_timeout: Duration,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_DEPLOY_PROBE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    #[serde(with = "serde_duration")]
    pub default_interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            default_interval: DEFAULT_HEALTH_INTERVAL,
        }
    }
}

impl Config {
    /// Reject values that would make the engine spin or never finish.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.binary.trim().is_empty() {
            return Err(Error::Config("runtime.binary must not be empty".to_string()));
        }
        if self.runtime.command_timeout.is_zero() {
            return Err(Error::Config(
                "runtime.command_timeout must be greater than zero".to_string(),
            ));
        }
        if self.probe.poll_interval.is_zero() {
            return Err(Error::Config(
                "probe.poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.probe.log_tail_lines == 0 {
            return Err(Error::Config(
                "probe.log_tail_lines must be at least 1".to_string(),
            ));
        }
        if self.health.default_interval.is_zero() {
            return Err(Error::Config(
                "health.default_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the state directory, defaulting to `~/.conductor`.
    ///
    /// A leading `~/` is expanded against the home directory.
    pub fn state_dir(&self) -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        match &self.state_dir {
            Some(dir) => match dir.strip_prefix("~") {
                Ok(rest) => home.join(rest),
                Err(_) => dir.clone(),
            },
            None => home.join(".conductor"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.runtime.binary, "docker");
        assert_eq!(config.probe, ProbeConfig::default());
        assert_eq!(config.deploy.probe_timeout, Duration::from_secs(60));
        assert_eq!(config.health.default_interval, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let yaml = r#"
probe:
  poll_interval: 250ms
deploy:
  probe_timeout: 5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.probe.poll_interval, Duration::from_millis(250));
        assert_eq!(config.probe.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert_eq!(config.deploy.probe_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let yaml = "probe:\n  poll_interval: soon\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = Config::default();
        config.probe.poll_interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_state_dir_expands_home() {
        let config = Config {
            state_dir: Some(PathBuf::from("~/envs")),
            ..Config::default()
        };
        assert!(config.state_dir().ends_with("envs"));
        assert!(!config.state_dir().starts_with("~"));
    }
}
