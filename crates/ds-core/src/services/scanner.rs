use futures::future::join_all;

use crate::error::{DevstackError, Result};
use crate::models::{BackendMode, PortCandidate, ProbeResult};
use crate::services::probe::Probe;

/// The port a scan settled on and every probe it took to get there.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub port: u16,
    pub result: ProbeResult,
    pub probed: Vec<ProbeResult>,
}

impl ScanOutcome {
    /// A live port is adopted; a free one is launched on.
    pub fn mode(&self) -> BackendMode {
        if self.result.is_live() {
            BackendMode::Adopt
        } else {
            BackendMode::Launch
        }
    }
}

/// Walks an ordered candidate list looking for a live service, then for a
/// free port. List order breaks ties, not port number.
pub struct PortScanner<P> {
    probe: P,
    host: String,
    parallel: bool,
}

impl<P: Probe> PortScanner<P> {
    pub fn new(probe: P, host: impl Into<String>) -> Self {
        Self {
            probe,
            host: host.into(),
            parallel: false,
        }
    }

    /// Probe every candidate at once. Selection still follows list order.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub async fn scan(&self, candidates: &[PortCandidate]) -> Result<ScanOutcome> {
        let probed = if self.parallel {
            join_all(
                candidates
                    .iter()
                    .map(|c| self.probe.probe(&self.host, c)),
            )
            .await
        } else {
            self.scan_sequential(candidates).await
        };

        // The free-port pass reuses first-pass results; no port is probed twice.
        if let Some(live) = probed.iter().find(|r| r.is_live()) {
            tracing::info!(port = live.port, "reusing running service");
            return Ok(outcome(live, probed.clone()));
        }
        if let Some(free) = probed.iter().find(|r| r.is_free()) {
            tracing::info!(port = free.port, "no running service, selected free port");
            return Ok(outcome(free, probed.clone()));
        }

        tracing::warn!(candidates = candidates.len(), "scan exhausted");
        Err(DevstackError::ScanExhausted { probed })
    }

    async fn scan_sequential(&self, candidates: &[PortCandidate]) -> Vec<ProbeResult> {
        let mut probed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            tracing::debug!(port = candidate.port, path = %candidate.path, "probing");
            let result = self.probe.probe(&self.host, candidate).await;
            let live = result.is_live();
            probed.push(result);
            if live {
                break;
            }
        }
        probed
    }
}

fn outcome(selected: &ProbeResult, probed: Vec<ProbeResult>) -> ScanOutcome {
    ScanOutcome {
        port: selected.port,
        result: selected.clone(),
        probed,
    }
}
