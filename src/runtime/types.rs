use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One host binding for a container port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortBinding {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_ip: String,
    pub host_port: String,
}

impl PortBinding {
    pub fn host_port(port: impl Into<String>) -> Self {
        Self {
            host_ip: String::new(),
            host_port: port.into(),
        }
    }
}

/// Container restart policy, as the runtime reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    pub name: String,
    #[serde(default)]
    pub maximum_retry_count: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            name: "no".to_string(),
            maximum_retry_count: 0,
        }
    }
}

impl RestartPolicy {
    pub fn is_default(&self) -> bool {
        self.name.is_empty() || self.name == "no"
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == "on-failure" && self.maximum_retry_count > 0 {
            write!(f, "{}:{}", self.name, self.maximum_retry_count)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// A bind mount from the host into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub source: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,
    #[serde(default = "default_rw")]
    pub read_write: bool,
}

fn default_rw() -> bool {
    true
}

impl Mount {
    /// `-v` argument form: `src:dst[:mode]`.
    pub fn to_volume_arg(&self) -> String {
        let mode = if !self.mode.is_empty() {
            self.mode.clone()
        } else if !self.read_write {
            "ro".to_string()
        } else {
            String::new()
        };
        if mode.is_empty() {
            format!("{}:{}", self.source, self.destination)
        } else {
            format!("{}:{}:{}", self.source, self.destination, mode)
        }
    }
}

/// Runtime view of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub running: bool,
    /// Container port (`80/tcp`) to host bindings.
    #[serde(default)]
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default)]
    pub volume_mounts: Vec<Mount>,
}

/// Everything needed to create and start a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSpec {
    pub name: Option<String>,
    pub image: String,
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub restart_policy: Option<RestartPolicy>,
    pub network_mode: Option<String>,
    pub mounts: Vec<Mount>,
}

impl RunSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add simple `container port -> host port` mappings.
    pub fn ports<'a, I>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (container, host) in ports {
            self.port_bindings
                .entry(container.clone())
                .or_default()
                .push(PortBinding::host_port(host.clone()));
        }
        self
    }

    pub fn env<'a, I>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        self.env
            .extend(env.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// First host port bound for a container port, matching `80` against `80/tcp`.
    pub fn host_port_for(&self, container_port: &str) -> Option<&str> {
        host_port_for(&self.port_bindings, container_port)
    }
}

/// Look up the first host port bound for `container_port`.
///
/// A bare port number matches its `/tcp` form and vice versa.
pub fn host_port_for<'a>(
    bindings: &'a BTreeMap<String, Vec<PortBinding>>,
    container_port: &str,
) -> Option<&'a str> {
    let bare = container_port.split('/').next().unwrap_or(container_port);
    bindings
        .iter()
        .find(|(key, _)| {
            key.as_str() == container_port || key.split('/').next() == Some(bare)
        })
        .and_then(|(_, list)| list.first())
        .map(|b| b.host_port.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_port_lookup_ignores_protocol() {
        let ports = BTreeMap::from([("80".to_string(), "8080".to_string())]);
        let spec = RunSpec::new("nginx").ports(&ports);
        assert_eq!(spec.host_port_for("80/tcp"), Some("8080"));
        assert_eq!(spec.host_port_for("80"), Some("8080"));
        assert_eq!(spec.host_port_for("443"), None);
    }

    #[test]
    fn test_volume_arg_modes() {
        let mut mount = Mount {
            source: "/data".into(),
            destination: "/var/lib/data".into(),
            mode: String::new(),
            read_write: true,
        };
        assert_eq!(mount.to_volume_arg(), "/data:/var/lib/data");
        mount.read_write = false;
        assert_eq!(mount.to_volume_arg(), "/data:/var/lib/data:ro");
        mount.mode = "z".into();
        assert_eq!(mount.to_volume_arg(), "/data:/var/lib/data:z");
    }

    #[test]
    fn test_restart_policy_display() {
        let policy = RestartPolicy {
            name: "on-failure".into(),
            maximum_retry_count: 3,
        };
        assert_eq!(policy.to_string(), "on-failure:3");
        assert!(RestartPolicy::default().is_default());
    }
}
