use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Predicate gating a dependent service.
///
/// `host` and `container` may be left out in group files; group deployment
/// fills them in from the batch before probing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReadinessCondition {
    Tcp {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        port: u16,
    },
    Http {
        url: String,
    },
    #[serde(rename = "log")]
    LogPattern {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container: Option<String>,
        pattern: String,
    },
}

impl ReadinessCondition {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        ReadinessCondition::Tcp {
            host: Some(host.into()),
            port,
        }
    }

    pub fn http(url: impl Into<String>) -> Self {
        ReadinessCondition::Http { url: url.into() }
    }

    pub fn log(container: impl Into<String>, pattern: impl Into<String>) -> Self {
        ReadinessCondition::LogPattern {
            container: Some(container.into()),
            pattern: pattern.into(),
        }
    }

    /// Short type tag: `tcp`, `http` or `log`.
    pub fn kind(&self) -> &'static str {
        match self {
            ReadinessCondition::Tcp { .. } => "tcp",
            ReadinessCondition::Http { .. } => "http",
            ReadinessCondition::LogPattern { .. } => "log",
        }
    }

    /// Check everything that can be checked without a target: port range,
    /// URL shape and regex syntax. Missing host/container is allowed here.
    pub fn validate_shape(&self) -> Result<()> {
        match self {
            ReadinessCondition::Tcp { host, port } => {
                if *port == 0 {
                    return Err(Error::InvalidCondition("tcp port must be 1-65535".into()));
                }
                if matches!(host, Some(h) if h.trim().is_empty()) {
                    return Err(Error::InvalidCondition("tcp host is empty".into()));
                }
                Ok(())
            }
            ReadinessCondition::Http { url } => validate_url(url),
            ReadinessCondition::LogPattern { container, pattern } => {
                if matches!(container, Some(c) if c.trim().is_empty()) {
                    return Err(Error::InvalidCondition("log container is empty".into()));
                }
                compile_pattern(pattern).map(|_| ())
            }
        }
    }

    /// Full validation for a condition about to be probed.
    pub fn validate(&self) -> Result<()> {
        self.validate_shape()?;
        match self {
            ReadinessCondition::Tcp { host: None, .. } => {
                Err(Error::InvalidCondition("tcp condition has no host".into()))
            }
            ReadinessCondition::LogPattern {
                container: None, ..
            } => Err(Error::InvalidCondition(
                "log condition has no container".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ReadinessCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessCondition::Tcp { host, port } => {
                write!(f, "tcp {}:{}", host.as_deref().unwrap_or("?"), port)
            }
            ReadinessCondition::Http { url } => write!(f, "http {}", url),
            ReadinessCondition::LogPattern { container, pattern } => write!(
                f,
                "log /{}/ in {}",
                pattern,
                container.as_deref().unwrap_or("?")
            ),
        }
    }
}

/// Require an absolute http(s) URL.
pub(crate) fn validate_url(url: &str) -> Result<()> {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                return Err(Error::InvalidCondition(format!(
                    "url '{}': scheme must be http or https, got '{}'",
                    url, scheme
                )));
            }
            Ok(())
        }
        Err(e) => Err(Error::InvalidCondition(format!("url '{}': {}", url, e))),
    }
}

/// Log patterns are matched case-insensitively.
pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::InvalidCondition(format!("pattern '{}': {}", pattern, e)))
}
