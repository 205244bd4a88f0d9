// Each test binary compiles this module independently and uses a different
// subset of helpers, so unused-function warnings are expected.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use ds_core::models::{
    ArtifactOutcome, ArtifactReport, BackendMode, ProbeResult, ProbeStatus, ServiceEndpoint,
    SyncReport,
};
use ds_core::services::orchestrator::{Resolution, StackSummary};

pub const ROOT: &str = "/proj";

pub fn root() -> &'static Path {
    Path::new(ROOT)
}

pub fn artifact_path(rel: &str) -> PathBuf {
    root().join(rel)
}

/// Sync report for the default artifact set with the given outcomes, in
/// `.env.development`, `.env.local`, `vite.config.js` order.
pub fn make_sync_report(outcomes: [ArtifactOutcome; 3]) -> SyncReport {
    let paths = [
        "frontend/.env.development",
        "frontend/.env.local",
        "frontend/vite.config.js",
    ];
    SyncReport {
        entries: paths
            .into_iter()
            .zip(outcomes)
            .map(|(rel, outcome)| ArtifactReport {
                path: artifact_path(rel),
                outcome,
            })
            .collect(),
    }
}

pub fn make_summary(mode: BackendMode, port: u16, frontend_url: Option<&str>) -> StackSummary {
    let endpoint = ServiceEndpoint::http("localhost", port);
    StackSummary {
        mode,
        backend_url: endpoint.base_url(),
        health_url: endpoint.url_for("/health"),
        docs_url: endpoint.url_for("/docs"),
        frontend_url: frontend_url.map(str::to_string),
    }
}

pub fn probe(port: u16, status: ProbeStatus, latency_ms: Option<u64>) -> ProbeResult {
    ProbeResult::new(port, status, latency_ms.map(Duration::from_millis))
}

pub fn make_resolution(port: u16, mode: BackendMode, probed: Vec<ProbeResult>) -> Resolution {
    Resolution {
        endpoint: ServiceEndpoint::http("localhost", port),
        mode,
        probed,
    }
}
