use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const DEBUG_LOG_FILENAME: &str = ".devstack-debug.log";

/// Console logging to stderr (`RUST_LOG`, default `info`), plus a
/// debug-level file under `root` when `debug` is set. Hold the returned
/// guard until exit so the file writer flushes.
pub fn init(root: &Path, debug: bool) -> Option<WorkerGuard> {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        );

    let (file, guard) = if debug {
        let file_appender = tracing_appender::rolling::never(root, DEBUG_LOG_FILENAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_filter(EnvFilter::new("debug"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry().with(console).with(file).init();
    guard
}
