//! Docker CLI implementation of [`RuntimeGateway`].
//!
//! Every call builds `Command::new(binary)` in one place, applies the
//! configured timeout and maps failures to [`RuntimeError`].

use super::{ContainerInfo, Mount, PortBinding, RestartPolicy, RunSpec, RuntimeError};
use super::{RuntimeGateway, RuntimeResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::Output;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn command_string(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    /// Run a runtime command with a timeout, returning raw Output.
    async fn run(&self, args: &[&str]) -> RuntimeResult<Output> {
        let result = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.binary)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let cmd_str = self.command_string(args);
        tracing::debug!("{}", cmd_str);

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(RuntimeError::exec_failed(cmd_str, e)),
            Err(_) => Err(RuntimeError::timeout(cmd_str, self.timeout)),
        }
    }

    /// Run a runtime command, returning Output only if exit 0.
    async fn run_success(&self, args: &[&str]) -> RuntimeResult<Output> {
        let output = self.run(args).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(RuntimeError::failed(self.command_string(args), &output))
        }
    }

    /// Like `run_success`, but maps "No such container" to `ContainerNotFound`.
    async fn run_on_container(&self, args: &[&str], container: &str) -> RuntimeResult<Output> {
        let output = self.run(args).await?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No such container") {
            return Err(RuntimeError::not_found(container));
        }
        Err(RuntimeError::failed(self.command_string(args), &output))
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker", Duration::from_secs(120))
    }
}

#[async_trait]
impl RuntimeGateway for DockerCli {
    async fn list_containers(&self, all: bool) -> RuntimeResult<Vec<ContainerInfo>> {
        let mut ps_args = vec!["ps", "-q", "--no-trunc"];
        if all {
            ps_args.push("-a");
        }
        let output = self.run_success(&ps_args).await?;
        let ids: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut inspect_args = vec!["inspect", "--type", "container"];
        inspect_args.extend(ids.iter().map(String::as_str));
        let output = self.run_success(&inspect_args).await?;
        parse_inspect(&String::from_utf8_lossy(&output.stdout)).map_err(|reason| {
            RuntimeError::InvalidOutput {
                command: self.command_string(&["inspect"]),
                reason,
            }
        })
    }

    async fn create_and_start(&self, spec: &RunSpec) -> RuntimeResult<String> {
        let args = run_args(spec);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_success(&arg_refs).await?;
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(RuntimeError::InvalidOutput {
                command: self.command_string(&["run"]),
                reason: "no container id printed".to_string(),
            });
        }
        Ok(id)
    }

    async fn stop(&self, id: &str) -> RuntimeResult<()> {
        self.run_on_container(&["stop", id], id).await.map(|_| ())
    }

    async fn remove(&self, id: &str) -> RuntimeResult<()> {
        match self.run_on_container(&["rm", "-f", id], id).await {
            Ok(_) | Err(RuntimeError::ContainerNotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn restart(&self, id: &str) -> RuntimeResult<()> {
        self.run_on_container(&["restart", id], id).await.map(|_| ())
    }

    async fn logs(&self, id: &str, tail: usize) -> RuntimeResult<String> {
        let tail_str = tail.to_string();
        let output = self
            .run_on_container(&["logs", "--tail", &tail_str, id], id)
            .await?;
        // The runtime replays the container's stderr on our stderr.
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        Ok(text)
    }

    async fn image_exists(&self, image: &str) -> RuntimeResult<bool> {
        let output = self.run(&["image", "inspect", image]).await?;
        if output.status.success() {
            return Ok(true);
        }
        match RuntimeError::failed("image inspect", &output) {
            RuntimeError::DaemonUnavailable => Err(RuntimeError::DaemonUnavailable),
            _ => Ok(false),
        }
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let output = self.run(&["pull", image]).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        // "up to date" or "already exists" aren't real failures
        if stderr.contains("up to date") || stderr.contains("already exists") {
            return Ok(());
        }
        Err(RuntimeError::failed(self.command_string(&["pull", image]), &output))
    }

    async fn build_image(&self, context: &Path, tag: &str) -> RuntimeResult<()> {
        let context = context.to_string_lossy();
        self.run_success(&["build", "-t", tag, context.as_ref()])
            .await
            .map(|_| ())
    }
}

/// Arguments for `docker run -d` from a [`RunSpec`].
pub fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args = vec!["run".to_string(), "-d".to_string()];

    if let Some(name) = &spec.name {
        args.push("--name".to_string());
        args.push(name.clone());
    }
    for (container_port, bindings) in &spec.port_bindings {
        for binding in bindings {
            args.push("-p".to_string());
            if binding.host_ip.is_empty() {
                args.push(format!("{}:{}", binding.host_port, container_port));
            } else {
                args.push(format!(
                    "{}:{}:{}",
                    binding.host_ip, binding.host_port, container_port
                ));
            }
        }
    }
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    for (key, value) in &spec.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }
    if let Some(policy) = spec.restart_policy.as_ref().filter(|p| !p.is_default()) {
        args.push("--restart".to_string());
        args.push(policy.to_string());
    }
    if let Some(mode) = spec
        .network_mode
        .as_deref()
        .filter(|m| !m.is_empty() && *m != "default")
    {
        args.push("--network".to_string());
        args.push(mode.to_string());
    }
    for mount in &spec.mounts {
        args.push("-v".to_string());
        args.push(mount.to_volume_arg());
    }

    args.push(spec.image.clone());
    args
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectContainer {
    id: String,
    name: String,
    config: InspectConfig,
    state: InspectState,
    #[serde(default)]
    host_config: InspectHostConfig,
    #[serde(default)]
    mounts: Vec<InspectMount>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    image: String,
    #[serde(default)]
    env: Option<Vec<String>>,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    running: bool,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHostConfig {
    #[serde(default)]
    port_bindings: Option<HashMap<String, Option<Vec<InspectPortBinding>>>>,
    #[serde(default)]
    restart_policy: Option<InspectRestartPolicy>,
    #[serde(default)]
    network_mode: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectPortBinding {
    #[serde(default)]
    host_ip: String,
    #[serde(default)]
    host_port: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectRestartPolicy {
    #[serde(default)]
    name: String,
    #[serde(default)]
    maximum_retry_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectMount {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    destination: String,
    #[serde(default)]
    mode: String,
    #[serde(rename = "RW", default)]
    rw: bool,
}

/// Parse `docker inspect` JSON into [`ContainerInfo`] records.
pub fn parse_inspect(json: &str) -> Result<Vec<ContainerInfo>, String> {
    let raw: Vec<InspectContainer> = serde_json::from_str(json).map_err(|e| e.to_string())?;
    Ok(raw.into_iter().map(container_info).collect())
}

fn container_info(raw: InspectContainer) -> ContainerInfo {
    let env_vars: BTreeMap<String, String> = raw
        .config
        .env
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect();

    let port_bindings: BTreeMap<String, Vec<PortBinding>> = raw
        .host_config
        .port_bindings
        .unwrap_or_default()
        .into_iter()
        .map(|(port, bindings)| {
            let bindings: Vec<PortBinding> = bindings
                .unwrap_or_default()
                .into_iter()
                .map(|b| PortBinding {
                    host_ip: b.host_ip,
                    host_port: b.host_port,
                })
                .collect();
            (port, bindings)
        })
        .collect();

    let restart_policy = raw
        .host_config
        .restart_policy
        .map(|p| RestartPolicy {
            name: if p.name.is_empty() {
                "no".to_string()
            } else {
                p.name
            },
            maximum_retry_count: p.maximum_retry_count,
        })
        .unwrap_or_default();

    let volume_mounts = raw
        .mounts
        .into_iter()
        .filter(|m| m.kind == "bind")
        .map(|m| Mount {
            source: m.source,
            destination: m.destination,
            mode: m.mode,
            read_write: m.rw,
        })
        .collect();

    ContainerInfo {
        id: raw.id,
        name: raw.name.trim_start_matches('/').to_string(),
        image: raw.config.image,
        running: raw.state.running,
        port_bindings,
        env_vars,
        labels: raw.config.labels.unwrap_or_default(),
        restart_policy,
        network_mode: raw.host_config.network_mode,
        volume_mounts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSPECT_SAMPLE: &str = r#"[{
        "Id": "4f2a9c",
        "Name": "/web",
        "Config": {
            "Image": "nginx:1.25",
            "Env": ["PATH=/usr/bin", "MODE=dev=1"],
            "Labels": {"team": "core"}
        },
        "State": {"Running": true},
        "HostConfig": {
            "PortBindings": {"80/tcp": [{"HostIp": "", "HostPort": "8080"}], "443/tcp": null},
            "RestartPolicy": {"Name": "", "MaximumRetryCount": 0},
            "NetworkMode": "bridge"
        },
        "Mounts": [
            {"Type": "bind", "Source": "/srv", "Destination": "/usr/share/nginx/html", "Mode": "", "RW": false},
            {"Type": "volume", "Source": "/var/lib/docker/volumes/x", "Destination": "/cache", "Mode": "z", "RW": true}
        ]
    }]"#;

    #[test]
    fn test_parse_inspect_output() {
        let containers = parse_inspect(INSPECT_SAMPLE).unwrap();
        assert_eq!(containers.len(), 1);
        let web = &containers[0];
        assert_eq!(web.name, "web");
        assert_eq!(web.image, "nginx:1.25");
        assert!(web.running);
        assert_eq!(web.env_vars.get("MODE").map(String::as_str), Some("dev=1"));
        assert_eq!(web.port_bindings["80/tcp"][0].host_port, "8080");
        assert!(web.port_bindings["443/tcp"].is_empty());
        assert!(web.restart_policy.is_default());
        assert_eq!(web.network_mode.as_deref(), Some("bridge"));
        assert_eq!(web.volume_mounts.len(), 1);
        assert!(!web.volume_mounts[0].read_write);
    }

    #[test]
    fn test_parse_inspect_rejects_garbage() {
        assert!(parse_inspect("not json").is_err());
    }

    #[test]
    fn test_run_args_layout() {
        let ports = BTreeMap::from([("5432".to_string(), "15432".to_string())]);
        let env = BTreeMap::from([("POSTGRES_PASSWORD".to_string(), "pw".to_string())]);
        let mut spec = RunSpec::new("postgres:15").name("db").ports(&ports).env(&env);
        spec.restart_policy = Some(RestartPolicy {
            name: "always".into(),
            maximum_retry_count: 0,
        });
        spec.network_mode = Some("default".into());

        let args = run_args(&spec);
        assert_eq!(
            args,
            vec![
                "run",
                "-d",
                "--name",
                "db",
                "-p",
                "15432:5432",
                "-e",
                "POSTGRES_PASSWORD=pw",
                "--restart",
                "always",
                "postgres:15",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let cli = DockerCli::new("conduct-no-such-runtime-binary", Duration::from_secs(5));
        let err = cli.list_containers(false).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
