use clap::{Args, Parser, Subcommand};
use service_conductor::config::parse_duration_string;
use service_conductor::ReadinessCondition;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "conduct")]
#[command(about = "Deploy, probe, supervise and snapshot groups of containers")]
pub struct Cli {
    /// Config file path (defaults to conductor.yaml, searched upward)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for persisted snapshots and templates (overrides state_dir)
    #[arg(long, env = "CONDUCTOR_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Keep snapshots and templates in memory only
    #[arg(long)]
    pub no_persist: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a group of services in dependency order
    Deploy {
        /// Group file (YAML or JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Print the deployment order without starting anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Dependencies applied to later deployments
    #[command(subcommand)]
    Dependency(DependencyCommands),
    /// List containers
    Ps {
        /// Include stopped containers
        #[arg(short, long)]
        all: bool,
    },
    /// Start a single service
    Run {
        name: String,
        /// Image reference, or a build context path (./app)
        image: String,
        /// CONTAINER:HOST (repeatable)
        #[arg(short, long = "port", value_parser = parse_pair::<':'>)]
        ports: Vec<(String, String)>,
        /// KEY=VALUE (repeatable)
        #[arg(short, long = "env", value_parser = parse_pair::<'='>)]
        env: Vec<(String, String)>,
        /// Readiness condition as YAML, e.g. '{type: tcp, port: 6379}'
        #[arg(long = "wait", value_parser = parse_condition)]
        readiness: Option<ReadinessCondition>,
    },
    /// Print a container's recent logs
    Logs {
        /// Name, id or id prefix
        container: String,
        /// Number of lines
        #[arg(short = 'n', long, default_value_t = 50)]
        tail: usize,
    },
    /// Stop and remove a container
    Stop {
        /// Name, id or id prefix
        container: String,
    },
    /// Wait for a readiness condition
    #[command(subcommand)]
    Wait(WaitCommands),
    /// Health checks
    #[command(subcommand)]
    Health(HealthCommands),
    /// Environment snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
    /// Service templates
    #[command(subcommand)]
    Template(TemplateCommands),
}

#[derive(Subcommand)]
pub enum DependencyCommands {
    /// Record that a service waits for another one
    Define {
        service: String,
        /// Service it depends on
        #[arg(long = "on")]
        depends_on: String,
        /// Readiness condition as YAML, e.g. '{type: tcp, port: 5432}'
        #[arg(long, value_parser = parse_condition)]
        condition: Option<ReadinessCondition>,
    },
    /// Show a service's dependencies and whether it is running
    Status { service: String },
    /// List defined dependencies
    List,
    /// Forget a service's dependencies
    Remove { service: String },
}

#[derive(Subcommand)]
pub enum WaitCommands {
    /// Wait until a TCP port accepts connections
    Tcp {
        host: String,
        port: u16,
        #[command(flatten)]
        timeout: TimeoutArg,
    },
    /// Wait until a URL answers with a status below 400
    Http {
        url: String,
        #[command(flatten)]
        timeout: TimeoutArg,
    },
    /// Wait until a container's recent logs match a pattern
    Log {
        container: String,
        /// Case-insensitive regular expression
        pattern: String,
        #[command(flatten)]
        timeout: TimeoutArg,
    },
}

#[derive(Args)]
pub struct TimeoutArg {
    /// How long to wait (500ms, 30s, 5m)
    #[arg(short, long, default_value = "60s", value_parser = parse_duration)]
    pub timeout: Duration,
}

#[derive(Subcommand)]
pub enum HealthCommands {
    /// Probe a container's endpoint once
    Check {
        container: String,
        /// host:port or http(s) URL
        #[arg(short, long)]
        endpoint: String,
    },
    /// Supervise a container in the foreground until Ctrl-C, restarting it when unhealthy
    Watch {
        container: String,
        /// host:port or http(s) URL
        #[arg(short, long)]
        endpoint: String,
        /// Time between checks (defaults to health.default_interval)
        #[arg(short, long, value_parser = parse_duration)]
        interval: Option<Duration>,
    },
}

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Capture every running container
    Create { name: String },
    /// Recreate the containers of a snapshot
    Restore { name: String },
    /// List snapshots
    List,
    /// Show a snapshot's containers
    Show { name: String },
    /// Delete a snapshot
    Delete { name: String },
    /// Compare two snapshots
    Diff { from: String, to: String },
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// Create a template
    Create(TemplateArgs),
    /// Replace an existing template
    Update(TemplateArgs),
    /// Start a container from a template
    Run {
        template: String,
        /// Container name
        #[arg(long)]
        name: Option<String>,
        /// Image override
        #[arg(long)]
        image: Option<String>,
        /// Port override, CONTAINER:HOST (repeatable)
        #[arg(short, long = "port", value_parser = parse_pair::<':'>)]
        ports: Vec<(String, String)>,
        /// Environment override, KEY=VALUE (repeatable)
        #[arg(short, long = "env", value_parser = parse_pair::<'='>)]
        env: Vec<(String, String)>,
    },
    /// List templates
    List,
    /// Show a template
    Show { name: String },
    /// Delete a template
    Delete { name: String },
}

#[derive(Args)]
pub struct TemplateArgs {
    pub name: String,

    #[arg(long)]
    pub image: String,

    /// CONTAINER:HOST (repeatable)
    #[arg(short, long = "port", value_parser = parse_pair::<':'>)]
    pub ports: Vec<(String, String)>,

    /// KEY=VALUE (repeatable)
    #[arg(short, long = "env", value_parser = parse_pair::<'='>)]
    pub env: Vec<(String, String)>,

    /// Attach a health check; the endpoint is inferred when --health-endpoint is absent
    #[arg(long)]
    pub health: bool,

    /// host:port or http(s) URL (implies --health)
    #[arg(long)]
    pub health_endpoint: Option<String>,

    /// Time between health checks (implies --health)
    #[arg(long, value_parser = parse_duration)]
    pub health_interval: Option<Duration>,

    /// Restart unhealthy containers started from this template (implies --health)
    #[arg(long)]
    pub auto_restart: bool,
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    parse_duration_string(s).ok_or_else(|| format!("invalid duration '{}'", s))
}

fn parse_condition(s: &str) -> Result<ReadinessCondition, String> {
    let condition: ReadinessCondition =
        serde_yaml::from_str(s).map_err(|e| format!("invalid condition '{}': {}", s, e))?;
    condition.validate_shape().map_err(|e| e.to_string())?;
    Ok(condition)
}

fn parse_pair<const SEP: char>(s: &str) -> Result<(String, String), String> {
    match s.split_once(SEP) {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY{}VALUE, got '{}'", SEP, s)),
    }
}
