use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{StartError, StartFailure};
use crate::models::{OutputStream, ProcessState, StopOutcome};
use crate::services::discovery::parse_advertised_url;
use crate::services::matcher::LinePredicate;
use crate::services::output::{start_draining, LogLine, OutputTail, DEFAULT_TAIL_LINES};
use crate::services::platform::{CommandSpec, NativeProcess, ProcessControl};

/// How long a killed process gets to be reaped before we stop waiting.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// How long output readers get to flush after the process is gone.
const DRAIN_WAIT: Duration = Duration::from_millis(500);

/// Everything needed to launch one process and decide when it is up.
pub struct LaunchSpec {
    pub name: String,
    pub command: CommandSpec,
    pub readiness: Box<dyn LinePredicate>,
    pub failure: Option<Box<dyn LinePredicate>>,
    pub start_timeout: Duration,
    pub tail_lines: usize,
}

impl LaunchSpec {
    pub fn new(
        name: impl Into<String>,
        command: CommandSpec,
        readiness: Box<dyn LinePredicate>,
        start_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            command,
            readiness,
            failure: None,
            start_timeout,
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }

    pub fn with_failure(mut self, failure: Option<Box<dyn LinePredicate>>) -> Self {
        self.failure = failure;
        self
    }
}

/// A process this run launched and is responsible for stopping.
pub struct ManagedProcess<C: ProcessControl = NativeProcess> {
    name: String,
    control: C,
    state: ProcessState,
    started_at: DateTime<Utc>,
    ready_at: Option<DateTime<Utc>>,
    advertised_url: Option<String>,
    tail: OutputTail,
    drains: Vec<JoinHandle<()>>,
}

impl<C: ProcessControl> fmt::Debug for ManagedProcess<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("pid", &self.control.pid())
            .field("advertised_url", &self.advertised_url)
            .finish()
    }
}

enum Verdict {
    Ready(String),
    Failed(StartFailure),
}

/// Launch a native OS process and wait for it to become ready.
pub async fn start(spec: LaunchSpec) -> Result<ManagedProcess, StartError> {
    start_with::<NativeProcess>(spec).await
}

/// Launch with an explicit process backend.
///
/// Returns once a readiness line is seen. A failure line, an early exit or
/// the start timeout kill the process and yield a [`StartError`] carrying the
/// most recent output.
pub async fn start_with<C: ProcessControl>(
    spec: LaunchSpec,
) -> Result<ManagedProcess<C>, StartError> {
    let LaunchSpec {
        name,
        command,
        readiness,
        failure,
        start_timeout,
        tail_lines,
    } = spec;

    tracing::info!(
        process = %name,
        program = %command.program,
        args = ?command.args,
        cwd = %command.cwd.display(),
        "starting process"
    );

    let tail = OutputTail::new(tail_lines);
    let (control, pipes) = C::start(&command).map_err(|e| StartError {
        name: name.clone(),
        failure: StartFailure::Spawn(e),
        recent_output: Vec::new(),
    })?;

    let (tx, mut rx) = mpsc::unbounded_channel::<LogLine>();
    let mut drains = Vec::with_capacity(2);
    if let Some(stdout) = pipes.stdout {
        drains.push(start_draining(
            BufReader::new(stdout),
            name.clone(),
            OutputStream::Stdout,
            tail.clone(),
            tx.clone(),
        ));
    }
    if let Some(stderr) = pipes.stderr {
        drains.push(start_draining(
            BufReader::new(stderr),
            name.clone(),
            OutputStream::Stderr,
            tail.clone(),
            tx.clone(),
        ));
    }
    drop(tx);

    let mut process = ManagedProcess {
        name,
        control,
        state: ProcessState::Starting,
        started_at: Utc::now(),
        ready_at: None,
        advertised_url: None,
        tail,
        drains,
    };
    tracing::debug!(process = %process.name, pid = ?process.control.pid(), "spawned");

    let deadline = Instant::now() + start_timeout;
    let verdict = loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => {
                    // Failure wins when one line matches both.
                    if let Some(failure) = &failure {
                        if failure.matches(&line.line) {
                            break Verdict::Failed(StartFailure::FailurePattern { line: line.line });
                        }
                    }
                    if readiness.matches(&line.line) {
                        break Verdict::Ready(line.line);
                    }
                }
                None => {
                    // Both streams closed; the process is gone or about to be.
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    break match process.control.wait_timeout(remaining).await {
                        Ok(Some(status)) => Verdict::Failed(StartFailure::EarlyExit { code: status.code() }),
                        Ok(None) => Verdict::Failed(StartFailure::Timeout { after: start_timeout }),
                        Err(e) => {
                            tracing::debug!(process = %process.name, error = %e, "wait failed");
                            Verdict::Failed(StartFailure::EarlyExit { code: None })
                        }
                    };
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                break Verdict::Failed(StartFailure::Timeout { after: start_timeout });
            }
        }
    };

    match verdict {
        Verdict::Ready(line) => {
            process.state = ProcessState::Ready;
            let ready_at = Utc::now();
            process.ready_at = Some(ready_at);
            process.advertised_url = parse_advertised_url(&line);
            tracing::info!(
                process = %process.name,
                matched = %readiness.describe(),
                startup_ms = (ready_at - process.started_at).num_milliseconds(),
                url = ?process.advertised_url,
                "process ready"
            );
            Ok(process)
        }
        Verdict::Failed(failure) => {
            tracing::error!(process = %process.name, %failure, "process failed to start");
            process.kill().await;
            process.finish_drains().await;
            process.state = ProcessState::Failed;
            Err(StartError {
                name: process.name.clone(),
                failure,
                recent_output: process.tail.snapshot(),
            })
        }
    }
}

impl<C: ProcessControl> ManagedProcess<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.control.pid()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.ready_at
    }

    /// URL parsed from the readiness line, if it carried one.
    pub fn advertised_url(&self) -> Option<&str> {
        self.advertised_url.as_deref()
    }

    pub fn recent_output(&self) -> Vec<String> {
        self.tail.snapshot()
    }

    /// Whether the process exited on its own since becoming ready.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.control.try_exit(), Ok(Some(_)))
    }

    /// Ask the process to stop, escalating to a kill once `grace` runs out.
    /// Safe to call repeatedly; later calls report `AlreadyStopped`.
    pub async fn stop(&mut self, grace: Duration) -> StopOutcome {
        if self.state.is_terminal() {
            return StopOutcome::AlreadyStopped;
        }
        if self.state == ProcessState::Starting {
            self.kill().await;
            self.finish_drains().await;
            self.state = ProcessState::Stopped;
            return StopOutcome::Forced;
        }

        if let Ok(Some(status)) = self.control.try_exit() {
            tracing::info!(process = %self.name, code = ?status.code(), "process had already exited");
            self.finish_drains().await;
            self.state = ProcessState::Stopped;
            return StopOutcome::AlreadyStopped;
        }

        self.state = ProcessState::Stopping;
        tracing::info!(process = %self.name, grace_ms = grace.as_millis() as u64, "stopping process");
        if let Err(e) = self.control.signal_graceful() {
            tracing::warn!(process = %self.name, error = %e, "graceful signal failed");
        }

        let outcome = match self.control.wait_timeout(grace).await {
            Ok(Some(status)) => {
                tracing::info!(process = %self.name, code = ?status.code(), "process stopped");
                StopOutcome::Graceful
            }
            Ok(None) => {
                tracing::warn!(
                    process = %self.name,
                    grace_ms = grace.as_millis() as u64,
                    "process ignored shutdown request, killing"
                );
                self.kill().await;
                StopOutcome::Forced
            }
            Err(e) => {
                tracing::warn!(process = %self.name, error = %e, "wait failed, killing");
                self.kill().await;
                StopOutcome::Forced
            }
        };
        self.finish_drains().await;
        self.state = ProcessState::Stopped;
        outcome
    }

    async fn kill(&mut self) {
        if let Err(e) = self.control.signal_kill() {
            tracing::warn!(process = %self.name, error = %e, "kill failed");
        }
        match self.control.wait_timeout(KILL_WAIT).await {
            Ok(Some(_)) => {}
            Ok(None) => tracing::error!(process = %self.name, "process survived kill"),
            Err(e) => tracing::warn!(process = %self.name, error = %e, "wait after kill failed"),
        }
    }

    async fn finish_drains(&mut self) {
        for mut handle in std::mem::take(&mut self.drains) {
            if tokio::time::timeout(DRAIN_WAIT, &mut handle).await.is_err() {
                handle.abort();
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::MatchRule;
    use crate::services::matcher::LineMatcher;

    fn sh_spec(name: &str, script: &str, ready: &str, timeout: Duration) -> LaunchSpec {
        let command = CommandSpec {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            cwd: std::env::temp_dir(),
            env: Vec::new(),
        };
        let readiness = LineMatcher::compile(&MatchRule::contains(ready)).unwrap();
        LaunchSpec::new(name, command, Box::new(readiness), timeout)
    }

    fn failure(text: &str) -> Option<Box<dyn LinePredicate>> {
        Some(Box::new(
            LineMatcher::compile(&MatchRule::contains(text)).unwrap(),
        ))
    }

    #[tokio::test]
    async fn ready_line_moves_to_ready_and_captures_url() {
        let spec = sh_spec(
            "web",
            "echo booting; echo '  Local:   http://localhost:3002/'; sleep 30",
            "Local:",
            Duration::from_secs(10),
        );
        let mut process = start(spec).await.unwrap();
        assert_eq!(process.state(), ProcessState::Ready);
        assert_eq!(process.advertised_url(), Some("http://localhost:3002"));
        assert!(process.ready_at().is_some());

        assert_eq!(process.stop(Duration::from_secs(5)).await, StopOutcome::Graceful);
        assert_eq!(process.state(), ProcessState::Stopped);
        assert!(process.recent_output().contains(&"booting".to_string()));
    }

    #[tokio::test]
    async fn coloured_ready_line_still_matches() {
        let spec = sh_spec(
            "web",
            "printf '  \\033[32m>\\033[39m  \\033[1mLocal\\033[22m:   \\033[36mhttp://localhost:5173/\\033[39m\\n'; sleep 30",
            "Local:",
            Duration::from_secs(5),
        );
        let mut process = start(spec).await.unwrap();
        assert_eq!(process.advertised_url(), Some("http://localhost:5173"));
        assert_eq!(
            process.recent_output(),
            vec!["  >  Local:   http://localhost:5173/".to_string()]
        );
        process.stop(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn readiness_is_seen_on_stderr() {
        let spec = sh_spec(
            "api",
            "echo 'INFO: Uvicorn running on http://0.0.0.0:9000' >&2; sleep 30",
            "Uvicorn running",
            Duration::from_secs(10),
        );
        let mut process = start(spec).await.unwrap();
        assert_eq!(process.advertised_url(), Some("http://0.0.0.0:9000"));
        process.stop(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn failure_pattern_before_ready_fails() {
        let spec = sh_spec(
            "api",
            "echo 'Address already in use' >&2; sleep 1; echo ready; sleep 30",
            "ready",
            Duration::from_secs(10),
        )
        .with_failure(failure("already in use"));
        let err = start(spec).await.unwrap_err();
        assert!(matches!(err.failure, StartFailure::FailurePattern { .. }));
        assert_eq!(err.name, "api");
        assert!(err
            .recent_output
            .iter()
            .any(|l| l.contains("Address already in use")));
    }

    #[tokio::test]
    async fn failure_wins_over_readiness_on_same_line() {
        let spec = sh_spec(
            "api",
            "echo 'ready but Address already in use'; sleep 30",
            "ready",
            Duration::from_secs(10),
        )
        .with_failure(failure("already in use"));
        let err = start(spec).await.unwrap_err();
        assert!(matches!(err.failure, StartFailure::FailurePattern { .. }));
    }

    #[tokio::test]
    async fn silent_process_times_out() {
        let spec = sh_spec("api", "sleep 30", "never", Duration::from_millis(300));
        let err = start(spec).await.unwrap_err();
        assert!(matches!(err.failure, StartFailure::Timeout { .. }));
    }

    #[tokio::test]
    async fn early_exit_reports_exit_code() {
        let spec = sh_spec("api", "echo dying; exit 3", "never", Duration::from_secs(10));
        let err = start(spec).await.unwrap_err();
        match err.failure {
            StartFailure::EarlyExit { code } => assert_eq!(code, Some(3)),
            other => panic!("unexpected failure: {other}"),
        }
        assert_eq!(err.recent_output, vec!["dying".to_string()]);
    }

    #[tokio::test]
    async fn missing_program_is_spawn_failure() {
        let mut spec = sh_spec("api", "", "never", Duration::from_secs(1));
        spec.command.program = "devstack-no-such-binary".into();
        let err = start(spec).await.unwrap_err();
        assert!(matches!(err.failure, StartFailure::Spawn(_)));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let spec = sh_spec("web", "echo up; sleep 30", "up", Duration::from_secs(10));
        let mut process = start(spec).await.unwrap();
        assert_eq!(process.stop(Duration::from_secs(5)).await, StopOutcome::Graceful);
        assert_eq!(
            process.stop(Duration::from_secs(5)).await,
            StopOutcome::AlreadyStopped
        );
        assert_eq!(process.state(), ProcessState::Stopped);
    }

    #[tokio::test]
    async fn stubborn_process_is_killed_after_grace() {
        let spec = sh_spec(
            "web",
            "trap '' TERM; echo up; while true; do sleep 1; done",
            "up",
            Duration::from_secs(10),
        );
        let mut process = start(spec).await.unwrap();
        let outcome = process.stop(Duration::from_millis(300)).await;
        assert_eq!(outcome, StopOutcome::Forced);
        assert_eq!(process.state(), ProcessState::Stopped);
    }
}
