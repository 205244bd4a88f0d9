use std::path::Path;
use std::process::ExitCode;

use color_eyre::Result;

use ds_core::models::{DevstackConfig, Stage};
use ds_core::services::checks;
use ds_core::services::orchestrator::Orchestrator;
use ds_core::services::signals::ShutdownSignals;
use ds_core::StageError;

use crate::render;

/// Resolution or startup failure.
pub const EXIT_FAILURE: u8 = 1;

fn orchestrator(root: &Path, config: DevstackConfig) -> Orchestrator {
    let base_url = std::env::var(&config.base_url_env).ok();
    Orchestrator::new(root, config).with_base_url_override(base_url)
}

/// Full orchestration: start everything, block until a signal (or a child
/// dies), then stop in reverse order.
pub async fn up(root: &Path, config: DevstackConfig) -> Result<ExitCode> {
    let mut signals = ShutdownSignals::install()?;
    let orchestrator = orchestrator(root, config);

    let started = tokio::select! {
        result = orchestrator.start() => result,
        signal = signals.recv() => {
            // Dropping the start future kills whatever it had spawned.
            tracing::warn!(signal, "interrupted during startup");
            return Ok(ExitCode::SUCCESS);
        }
    };
    let mut stack = match started {
        Ok(stack) => stack,
        Err(err) => {
            eprint!("{}", render::stage_error(&err));
            return Ok(ExitCode::from(EXIT_FAILURE));
        }
    };

    let health_path = orchestrator.config().health_path.clone();
    println!(
        "{}",
        render::summary(&stack.summary(&health_path), stack.sync_report())
    );

    let code = tokio::select! {
        signal = signals.recv() => {
            tracing::info!(signal, "shutdown requested");
            ExitCode::SUCCESS
        }
        name = stack.wait_for_exit() => {
            tracing::error!(process = %name, "process exited unexpectedly, stopping the rest");
            ExitCode::from(EXIT_FAILURE)
        }
    };

    let stopped = stack.shutdown().await;
    print!("{}", render::shutdown(&stopped));
    Ok(code)
}

/// Resolve the backend port only; optionally rewrite config to match.
pub async fn detect(root: &Path, config: DevstackConfig, sync: bool) -> Result<ExitCode> {
    let orchestrator = orchestrator(root, config.for_detection());
    match orchestrator.resolve().await {
        Ok(resolution) => {
            print!(
                "{}",
                render::detection(&resolution, orchestrator.report_path())
            );
            if sync {
                let report = orchestrator.sync_config(&resolution.endpoint);
                print!("{}", render::sync_report(&report, root));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprint!(
                "{}",
                render::stage_error(&StageError::new(Stage::ResolvingPort, e))
            );
            Ok(ExitCode::from(EXIT_FAILURE))
        }
    }
}

pub fn check(root: &Path, config: &DevstackConfig) -> ExitCode {
    let outcomes = checks::run_checks(root, config, |name| std::env::var(name).ok());
    print!("{}", render::checks(&outcomes));
    if checks::all_passed(&outcomes) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILURE)
    }
}
