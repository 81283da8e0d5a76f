use std::fmt;
use std::time::Duration;

/// Structured error type for container runtime operations.
#[derive(Debug)]
pub enum RuntimeError {
    /// Runtime command timed out.
    Timeout { command: String, timeout: Duration },

    /// Runtime command ran but returned non-zero exit.
    CommandFailed {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// Runtime binary couldn't be executed (not in PATH, permission denied).
    ExecFailed {
        command: String,
        source: std::io::Error,
    },

    /// Container doesn't exist (parsed from "No such container" stderr).
    ContainerNotFound { container: String },

    /// Runtime daemon not responding.
    DaemonUnavailable,

    /// Runtime output could not be understood.
    InvalidOutput { command: String, reason: String },
}

const DAEMON_DOWN_MARKERS: [&str; 2] = [
    "Cannot connect to the Docker daemon",
    "Is the docker daemon running",
];

impl RuntimeError {
    /// Create a timeout error.
    pub fn timeout(cmd: impl Into<String>, dur: Duration) -> Self {
        RuntimeError::Timeout {
            command: cmd.into(),
            timeout: dur,
        }
    }

    /// Create a command-failed error from an `std::process::Output`.
    ///
    /// Daemon connection failures are reported as [`RuntimeError::DaemonUnavailable`].
    pub fn failed(cmd: impl Into<String>, output: &std::process::Output) -> Self {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if DAEMON_DOWN_MARKERS.iter().any(|m| stderr.contains(m)) {
            return RuntimeError::DaemonUnavailable;
        }
        RuntimeError::CommandFailed {
            command: cmd.into(),
            stderr,
            exit_code: output.status.code(),
        }
    }

    /// Create a command-failed error from a stderr string and optional exit code.
    pub fn cmd_failed(
        cmd: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        RuntimeError::CommandFailed {
            command: cmd.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Create an exec-failed error (binary not found / permission denied).
    pub fn exec_failed(cmd: impl Into<String>, err: std::io::Error) -> Self {
        RuntimeError::ExecFailed {
            command: cmd.into(),
            source: err,
        }
    }

    pub fn not_found(container: impl Into<String>) -> Self {
        RuntimeError::ContainerNotFound {
            container: container.into(),
        }
    }

    /// True when the runtime itself cannot be reached, as opposed to a
    /// single operation failing.
    pub fn is_unavailable(&self) -> bool {
        match self {
            RuntimeError::DaemonUnavailable => true,
            RuntimeError::ExecFailed { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
                    || source.kind() == std::io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }

    pub fn container(&self) -> Option<&str> {
        match self {
            RuntimeError::ContainerNotFound { container } => Some(container),
            _ => None,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Timeout { command, timeout } => {
                write!(
                    f,
                    "Timed out running '{}' (exceeded {} seconds)",
                    command,
                    timeout.as_secs()
                )
            }
            RuntimeError::CommandFailed {
                command,
                stderr,
                exit_code,
            } => {
                if let Some(code) = exit_code {
                    write!(f, "'{}' failed (exit code {}): {}", command, code, stderr)
                } else {
                    write!(f, "'{}' failed: {}", command, stderr)
                }
            }
            RuntimeError::ExecFailed { command, source } => {
                write!(f, "Failed to execute '{}': {}", command, source)
            }
            RuntimeError::ContainerNotFound { container } => {
                write!(f, "No such container: {}", container)
            }
            RuntimeError::DaemonUnavailable => {
                write!(f, "Container runtime daemon is not responding")
            }
            RuntimeError::InvalidOutput { command, reason } => {
                write!(f, "Unexpected output from '{}': {}", command, reason)
            }
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuntimeError::ExecFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_unavailable() {
        let err = RuntimeError::exec_failed(
            "docker ps",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.is_unavailable());
        assert!(!RuntimeError::cmd_failed("docker stop x", "boom", Some(1)).is_unavailable());
    }

    #[test]
    fn test_display_includes_exit_code() {
        let err = RuntimeError::cmd_failed("docker pull nope", "manifest unknown", Some(1));
        assert_eq!(
            err.to_string(),
            "'docker pull nope' failed (exit code 1): manifest unknown"
        );
    }
}
