use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A port considered during discovery, paired with its health-check path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortCandidate {
    pub port: u16,
    pub path: String,
}

impl PortCandidate {
    pub fn new(port: u16, path: impl Into<String>) -> Self {
        Self {
            port,
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownReason {
    Timeout,
    HttpStatus(u16),
    Io(String),
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timed out"),
            Self::HttpStatus(code) => write!(f, "http status {code}"),
            Self::Io(msg) => write!(f, "io error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// A healthy service answered with 2xx.
    Live,
    /// Nothing is listening; safe to bind.
    Free,
    /// Something is there but not healthy, or the probe could not tell.
    Unknown(UnknownReason),
}

impl ProbeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Free => "free",
            Self::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub port: u16,
    pub status: ProbeStatus,
    pub latency: Option<Duration>,
}

impl ProbeResult {
    pub fn new(port: u16, status: ProbeStatus, latency: Option<Duration>) -> Self {
        Self {
            port,
            status,
            latency,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == ProbeStatus::Live
    }

    pub fn is_free(&self) -> bool {
        self.status == ProbeStatus::Free
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {}: ", self.port)?;
        match &self.status {
            ProbeStatus::Unknown(reason) => write!(f, "unknown ({reason})")?,
            other => f.write_str(other.label())?,
        }
        if let Some(latency) = self.latency {
            write!(f, " in {}ms", latency.as_millis())?;
        }
        Ok(())
    }
}
