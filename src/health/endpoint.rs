use crate::error::{Error, Result};
use crate::probe::ReadinessCondition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// What a health check probes: a TCP port or an HTTP URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthEndpoint {
    Tcp { host: String, port: u16 },
    Http { url: String },
}

impl HealthEndpoint {
    pub fn as_condition(&self) -> ReadinessCondition {
        match self {
            HealthEndpoint::Tcp { host, port } => ReadinessCondition::tcp(host.clone(), *port),
            HealthEndpoint::Http { url } => ReadinessCondition::http(url.clone()),
        }
    }
}

impl FromStr for HealthEndpoint {
    type Err = Error;

    /// `http(s)://...` is an HTTP check; anything else must be `host:port`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with("http://") || s.starts_with("https://") {
            ReadinessCondition::http(s)
                .validate()
                .map_err(|_| Error::InvalidEndpoint(s.to_string()))?;
            return Ok(HealthEndpoint::Http { url: s.to_string() });
        }

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidEndpoint(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidEndpoint(s.to_string()))?;
        if host.is_empty() || port == 0 || host.contains('/') {
            return Err(Error::InvalidEndpoint(s.to_string()));
        }
        Ok(HealthEndpoint::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for HealthEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthEndpoint::Tcp { host, port } if host.contains(':') => {
                write!(f, "[{}]:{}", host, port)
            }
            HealthEndpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            HealthEndpoint::Http { url } => f.write_str(url),
        }
    }
}

/// Images that speak a non-HTTP protocol on a well-known port.
const TCP_SERVICES: [(&str, u16); 5] = [
    ("postgres", 5432),
    ("mysql", 3306),
    ("mariadb", 3306),
    ("redis", 6379),
    ("mongo", 27017),
];

/// Guess a health endpoint from an image reference and its port mapping.
///
/// Databases and caches get a TCP check on the host port mapped to their
/// well-known port. Everything else gets `http://localhost:<port>/health`
/// on the first mapped host port. Returns `None` when nothing is mapped.
pub fn infer_endpoint(image: &str, ports: &BTreeMap<String, String>) -> Option<HealthEndpoint> {
    let repository = image_repository(image);

    if let Some((_, port)) = TCP_SERVICES
        .iter()
        .find(|(name, _)| repository.contains(name))
    {
        let host_port = mapped_host_port(ports, *port).unwrap_or(*port);
        return Some(HealthEndpoint::Tcp {
            host: "localhost".to_string(),
            port: host_port,
        });
    }

    let first = ports.values().find_map(|p| parse_host_port(p))?;
    Some(HealthEndpoint::Http {
        url: format!("http://localhost:{}/health", first),
    })
}

/// `registry.example.com/library/postgres:15@sha256:..` -> `postgres`
fn image_repository(image: &str) -> String {
    let without_digest = image.split('@').next().unwrap_or(image);
    let last = without_digest.rsplit('/').next().unwrap_or(without_digest);
    last.split(':').next().unwrap_or(last).to_lowercase()
}

fn mapped_host_port(ports: &BTreeMap<String, String>, container_port: u16) -> Option<u16> {
    ports
        .iter()
        .find(|(key, _)| key.split('/').next() == Some(container_port.to_string().as_str()))
        .and_then(|(_, host)| parse_host_port(host))
}

/// Accepts `8080` or `127.0.0.1:8080`.
fn parse_host_port(value: &str) -> Option<u16> {
    value
        .rsplit(':')
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .filter(|p| *p != 0)
}
