// thiserror's generated code for struct variants trips unused_assignments
// even though the fields are read by Display.
#![allow(unused_assignments)]

use crate::runtime::RuntimeError;
use miette::Diagnostic;
use serde::Serialize;
use std::fmt;
use std::io;
use thiserror::Error;

/// The kind of named entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Service,
    Container,
    Snapshot,
    Template,
    HealthCheck,
    Dependency,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Service => "Service",
            EntityKind::Container => "Container",
            EntityKind::Snapshot => "Snapshot",
            EntityKind::Template => "Template",
            EntityKind::HealthCheck => "Health check",
            EntityKind::Dependency => "Dependency",
        };
        f.write_str(label)
    }
}

/// Coarse error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RuntimeUnavailable,
    RuntimeFailure,
    DependencyNotMet,
    CycleOrMissingDependency,
    NotFound,
    AlreadyExists,
    InvalidInput,
}

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(conduct::config::error),
        help("Check conductor.yaml; durations accept 500ms, 30s, 5m or bare seconds")
    )]
    Config(String),

    #[error("Container runtime error: {0}")]
    #[diagnostic(
        code(conduct::runtime::error),
        help("Check that the container runtime is running with `docker ps`")
    )]
    Runtime(#[from] RuntimeError),

    #[error("Dependency not met for service '{service}': {condition}")]
    #[diagnostic(
        code(conduct::deploy::dependency_not_met),
        help("The container for '{service}' was removed. Check the dependency's logs and the readiness condition")
    )]
    DependencyNotMet { service: String, condition: String },

    #[error("Cycle or missing dependency among: {}", .0.join(", "))]
    #[diagnostic(
        code(conduct::dependency::cycle_or_missing),
        help("Every depends_on entry must name a service in the same batch, and services cannot depend on each other in a cycle")
    )]
    CycleOrMissingDependency(Vec<String>),

    #[error("{kind} '{name}' not found")]
    #[diagnostic(code(conduct::not_found))]
    NotFound { kind: EntityKind, name: String },

    #[error("{kind} '{name}' already exists")]
    #[diagnostic(code(conduct::already_exists))]
    AlreadyExists { kind: EntityKind, name: String },

    #[error("Invalid readiness condition: {0}")]
    #[diagnostic(
        code(conduct::probe::invalid_condition),
        help("tcp needs host and a non-zero port, http needs an absolute http(s) URL, log needs a container and a valid regex")
    )]
    InvalidCondition(String),

    #[error("Invalid service definition '{name}': {reason}")]
    #[diagnostic(code(conduct::definition::invalid))]
    InvalidDefinition { name: String, reason: String },

    #[error("Invalid {kind} name '{name}'")]
    #[diagnostic(
        code(conduct::invalid_name),
        help("Names may contain letters, digits, '.', '_' and '-', and cannot start with '.'")
    )]
    InvalidName { kind: EntityKind, name: String },

    #[error("Invalid health endpoint '{0}'")]
    #[diagnostic(
        code(conduct::health::invalid_endpoint),
        help("Use host:port for TCP checks or an http(s):// URL for HTTP checks")
    )]
    InvalidEndpoint(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: EntityKind, name: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub fn invalid_definition(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidDefinition {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Runtime(e) if e.is_unavailable() => ErrorKind::RuntimeUnavailable,
            Error::Runtime(_) => ErrorKind::RuntimeFailure,
            Error::DependencyNotMet { .. } => ErrorKind::DependencyNotMet,
            Error::CycleOrMissingDependency(_) => ErrorKind::CycleOrMissingDependency,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::Config(_)
            | Error::InvalidCondition(_)
            | Error::InvalidDefinition { .. }
            | Error::InvalidName { .. }
            | Error::InvalidEndpoint(_)
            | Error::Yaml(_)
            | Error::Json(_) => ErrorKind::InvalidInput,
            Error::Io(_) => ErrorKind::RuntimeFailure,
        }
    }

    /// The service, snapshot, template or container the error is about.
    pub fn entity(&self) -> Option<String> {
        match self {
            Error::Runtime(e) => e.container().map(str::to_string),
            Error::DependencyNotMet { service, .. } => Some(service.clone()),
            Error::CycleOrMissingDependency(names) => Some(names.join(", ")),
            Error::NotFound { name, .. } | Error::AlreadyExists { name, .. } => Some(name.clone()),
            Error::InvalidDefinition { name, .. } | Error::InvalidName { name, .. } => {
                Some(name.clone())
            }
            _ => None,
        }
    }

    /// Returns a context-aware suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::Runtime(e) if e.is_unavailable() => Some(
                "Start the Docker daemon, or set runtime.binary in conductor.yaml".to_string(),
            ),
            Error::NotFound {
                kind: EntityKind::Snapshot,
                ..
            } => Some("List snapshots with: conduct snapshot list".to_string()),
            Error::NotFound {
                kind: EntityKind::Template,
                ..
            } => Some("List templates with: conduct template list".to_string()),
            Error::AlreadyExists {
                kind: EntityKind::Snapshot,
                name,
            } => Some(format!(
                "Pick another name or delete the old one: conduct snapshot delete {}",
                name
            )),
            Error::DependencyNotMet { .. } => Some(
                "Re-run with RUST_LOG=debug to see each probe attempt".to_string(),
            ),
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

/// Serializable error body for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        ErrorReport {
            kind: err.kind(),
            message: err.to_string(),
            entity: err.entity(),
            hint: err.suggestion(),
        }
    }
}
