//! Plain-text console output. Everything here returns a `String` so the
//! exact wording can be snapshot-tested.

use std::fmt::Write;
use std::path::Path;

use ds_core::models::{ArtifactOutcome, StopOutcome, SyncReport};
use ds_core::services::checks::{CheckOutcome, CheckStatus};
use ds_core::services::orchestrator::{Resolution, StackSummary};
use ds_core::StageError;

pub fn summary(summary: &StackSummary, sync: &SyncReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "devstack is running");
    let _ = writeln!(out, "  backend   {} ({})", summary.backend_url, summary.mode);
    let _ = writeln!(out, "  health    {}", summary.health_url);
    let _ = writeln!(out, "  api docs  {}", summary.docs_url);
    let _ = writeln!(
        out,
        "  frontend  {}",
        summary.frontend_url.as_deref().unwrap_or("(no URL advertised)")
    );
    let _ = writeln!(out, "  config    {}", sync_counts(sync));
    let _ = writeln!(out, "Press Ctrl+C to stop.");
    out
}

fn sync_counts(sync: &SyncReport) -> String {
    let skipped = sync.count(|o| {
        matches!(
            o,
            ArtifactOutcome::SkippedMissing | ArtifactOutcome::SkippedUnchanged
        )
    });
    format!(
        "{} updated, {} skipped, {} failed",
        sync.updated(),
        skipped,
        sync.failed()
    )
}

pub fn sync_report(sync: &SyncReport, root: &Path) -> String {
    let mut out = String::new();
    for entry in &sync.entries {
        let path = entry.path.strip_prefix(root).unwrap_or(&entry.path);
        let _ = writeln!(out, "  {:<20} {}", entry.outcome.to_string(), path.display());
    }
    let _ = writeln!(out, "config: {}", sync_counts(sync));
    out
}

pub fn detection(resolution: &Resolution, report_path: &Path) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "backend port {} ({})",
        resolution.endpoint.port, resolution.mode
    );
    let _ = writeln!(out, "  url     {}", resolution.endpoint);
    for probe in &resolution.probed {
        let _ = writeln!(out, "  probe   {probe}");
    }
    let _ = writeln!(out, "  report  {}", report_path.display());
    out
}

pub fn stage_error(err: &StageError) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "error: {err}");
    for line in err.diagnostics() {
        let _ = writeln!(out, "  | {line}");
    }
    let _ = writeln!(out, "hint: {}", err.hint());
    out
}

pub fn checks(outcomes: &[CheckOutcome]) -> String {
    let mut out = String::new();
    let width = outcomes.iter().map(|o| o.name.len()).max().unwrap_or(0);
    for o in outcomes {
        let _ = writeln!(out, "{}  {:<width$}  {}", o.status, o.name, o.detail);
    }
    let count = |status: CheckStatus| outcomes.iter().filter(|o| o.status == status).count();
    let _ = writeln!(
        out,
        "{} passed, {} warnings, {} failed",
        count(CheckStatus::Pass),
        count(CheckStatus::Warn),
        count(CheckStatus::Fail)
    );
    out
}

pub fn shutdown(stopped: &[(String, StopOutcome)]) -> String {
    let mut out = String::new();
    for (name, outcome) in stopped {
        let how = match outcome {
            StopOutcome::Graceful => "stopped",
            StopOutcome::Forced => "killed after grace period",
            StopOutcome::AlreadyStopped => "already exited",
        };
        let _ = writeln!(out, "{name}: {how}");
    }
    out
}
