use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::probe::{ProbeResult, ProbeStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeEntry {
    pub port: u16,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl From<&ProbeResult> for ProbeEntry {
    fn from(result: &ProbeResult) -> Self {
        let detail = match &result.status {
            ProbeStatus::Unknown(reason) => Some(reason.to_string()),
            _ => None,
        };
        Self {
            port: result.port,
            status: result.status.label().to_string(),
            detail,
            latency_ms: result.latency.map(|d| d.as_millis() as u64),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileExistence {
    pub path: String,
    pub exists: bool,
}

/// Diagnostic snapshot written after every port resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub timestamp: DateTime<Utc>,
    pub detected_port: Option<u16>,
    pub resolution: Option<String>,
    pub checked_ports: Vec<u16>,
    pub probes: Vec<ProbeEntry>,
    pub config_files: Vec<FileExistence>,
}
