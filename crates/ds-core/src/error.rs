use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{ProbeResult, Stage};

#[derive(Debug, thiserror::Error)]
pub enum DevstackError {
    #[error("no candidate port available (probed: {})", describe_probes(.probed))]
    ScanExhausted { probed: Vec<ProbeResult> },

    #[error(transparent)]
    ProcessStart(#[from] StartError),

    #[error("config file not found at {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("missing {name} directory at {path}")]
    MissingDirectory { name: String, path: PathBuf },

    #[error("signal handling failed: {0}")]
    Signal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DevstackError>;

/// Why a supervised process never reached `Ready`.
#[derive(Debug)]
pub enum StartFailure {
    Spawn(std::io::Error),
    FailurePattern { line: String },
    EarlyExit { code: Option<i32> },
    Timeout { after: Duration },
}

impl fmt::Display for StartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to spawn: {e}"),
            Self::FailurePattern { line } => write!(f, "failure pattern matched: {line}"),
            Self::EarlyExit { code: Some(code) } => {
                write!(f, "exited with code {code} before becoming ready")
            }
            Self::EarlyExit { code: None } => {
                write!(f, "terminated by signal before becoming ready")
            }
            Self::Timeout { after } => write!(
                f,
                "no readiness marker within {:.1}s",
                after.as_secs_f64()
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("process '{name}' failed to start: {failure}")]
pub struct StartError {
    pub name: String,
    pub failure: StartFailure,
    /// Most recent output lines, oldest first.
    pub recent_output: Vec<String>,
}

/// A fatal error pinned to the orchestration stage it interrupted.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: DevstackError,
}

impl StageError {
    pub fn new(stage: Stage, source: impl Into<DevstackError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    /// Lines worth showing the operator alongside the error.
    pub fn diagnostics(&self) -> Vec<String> {
        match &self.source {
            DevstackError::ScanExhausted { probed } => {
                probed.iter().map(|p| p.to_string()).collect()
            }
            DevstackError::ProcessStart(e) => e.recent_output.clone(),
            _ => Vec::new(),
        }
    }

    /// A concrete next step for the operator.
    pub fn hint(&self) -> String {
        match &self.source {
            DevstackError::ScanExhausted { probed } => {
                let ports: Vec<String> = probed.iter().map(|p| p.port.to_string()).collect();
                format!(
                    "no candidate port available - free one of: {}",
                    ports.join(", ")
                )
            }
            DevstackError::ProcessStart(e) => match &e.failure {
                StartFailure::Spawn(_) => format!(
                    "check that the command for '{}' is installed and on PATH",
                    e.name
                ),
                StartFailure::FailurePattern { .. } => format!(
                    "'{}' reported an error during boot; see its output above",
                    e.name
                ),
                StartFailure::EarlyExit { .. } => format!(
                    "'{}' exited on its own; run it by hand to see why",
                    e.name
                ),
                StartFailure::Timeout { .. } => format!(
                    "'{}' never printed its readiness marker; raise start_timeout_ms or fix the ready pattern",
                    e.name
                ),
            },
            DevstackError::MissingDirectory { name, .. } => {
                format!("create the {name} directory or set its cwd in .devstack.yaml")
            }
            DevstackError::InvalidConfig(_) => {
                "fix .devstack.yaml and retry".to_string()
            }
            _ => "re-run with --debug and inspect .devstack-debug.log".to_string(),
        }
    }
}

fn describe_probes(probed: &[ProbeResult]) -> String {
    if probed.is_empty() {
        return "none".to_string();
    }
    probed
        .iter()
        .map(|p| p.port.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProbeStatus, UnknownReason};

    #[test]
    fn scan_exhausted_lists_ports_in_message_and_hint() {
        let err = StageError::new(
            Stage::ResolvingPort,
            DevstackError::ScanExhausted {
                probed: vec![
                    ProbeResult::new(9000, ProbeStatus::Unknown(UnknownReason::Timeout), None),
                    ProbeResult::new(8000, ProbeStatus::Unknown(UnknownReason::HttpStatus(503)), None),
                ],
            },
        );
        assert_eq!(
            err.to_string(),
            "resolving port failed: no candidate port available (probed: 9000, 8000)"
        );
        assert!(err.hint().ends_with("free one of: 9000, 8000"));
        assert_eq!(err.diagnostics().len(), 2);
    }

    #[test]
    fn start_error_carries_output_into_diagnostics() {
        let err = StageError::new(
            Stage::StartingBackend,
            StartError {
                name: "backend".into(),
                failure: StartFailure::Timeout {
                    after: Duration::from_millis(1500),
                },
                recent_output: vec!["booting".into()],
            },
        );
        assert_eq!(
            err.to_string(),
            "starting backend failed: process 'backend' failed to start: no readiness marker within 1.5s"
        );
        assert_eq!(err.diagnostics(), vec!["booting".to_string()]);
        assert!(err.hint().contains("start_timeout_ms"));
    }
}
