use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::Result;
use crate::models::{
    BackendMode, ConfigArtifact, DetectionReport, FileExistence, ProbeEntry, ProbeResult,
};

/// Assemble the diagnostic snapshot for one port resolution.
///
/// `resolved` is `None` when the scan was exhausted.
pub fn build_report(
    root: &Path,
    checked_ports: &[u16],
    probed: &[ProbeResult],
    resolved: Option<(u16, BackendMode)>,
    artifacts: &[ConfigArtifact],
) -> DetectionReport {
    let resolution = resolved.map(|(_, mode)| match mode {
        BackendMode::Adopt => "live".to_string(),
        BackendMode::Launch => "free".to_string(),
    });
    DetectionReport {
        timestamp: Utc::now(),
        detected_port: resolved.map(|(port, _)| port),
        resolution,
        checked_ports: checked_ports.to_vec(),
        probes: probed.iter().map(ProbeEntry::from).collect(),
        config_files: artifacts
            .iter()
            .map(|a| FileExistence {
                path: a
                    .path
                    .strip_prefix(root)
                    .unwrap_or(&a.path)
                    .display()
                    .to_string(),
                exists: a.path.exists(),
            })
            .collect(),
    }
}

pub struct ReportStore {
    report_path: PathBuf,
}

impl ReportStore {
    pub fn new(report_path: impl Into<PathBuf>) -> Self {
        Self {
            report_path: report_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.report_path
    }

    pub async fn save(&self, report: &DetectionReport) -> Result<()> {
        if let Some(parent) = self.report_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&self.report_path, json).await?;
        tracing::debug!(path = %self.report_path.display(), "detection report written");
        Ok(())
    }
}
