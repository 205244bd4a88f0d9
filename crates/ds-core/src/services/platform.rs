//! Host-specific process primitives. Everything that differs between
//! platforms (process groups, signals) stays behind [`ProcessControl`].

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

/// What to run and where.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Overlaid on the parent environment.
    pub env: Vec<(String, String)>,
}

pub type OutputPipe = Box<dyn AsyncRead + Send + Unpin>;

/// The child's output streams, handed over once at spawn time.
pub struct ChildPipes {
    pub stdout: Option<OutputPipe>,
    pub stderr: Option<OutputPipe>,
}

pub trait ProcessControl: Send + Sized {
    fn start(spec: &CommandSpec) -> io::Result<(Self, ChildPipes)>;

    fn pid(&self) -> Option<u32>;

    /// Non-blocking exit check.
    fn try_exit(&mut self) -> io::Result<Option<ExitStatus>>;

    /// Ask the process to shut down cooperatively.
    fn signal_graceful(&mut self) -> io::Result<()>;

    /// Terminate unconditionally.
    fn signal_kill(&mut self) -> io::Result<()>;

    /// `Ok(None)` when the process is still running after `timeout`.
    fn wait_timeout(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = io::Result<Option<ExitStatus>>> + Send;
}

/// A real OS child. On unix it leads its own process group so signals reach
/// the whole tree (`npm run dev` forks the actual server).
pub struct NativeProcess {
    child: Child,
    pid: Option<u32>,
}

impl ProcessControl for NativeProcess {
    fn start(spec: &CommandSpec) -> io::Result<(Self, ChildPipes)> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let pipes = ChildPipes {
            stdout: child.stdout.take().map(|s| Box::new(s) as OutputPipe),
            stderr: child.stderr.take().map(|s| Box::new(s) as OutputPipe),
        };
        let pid = child.id();
        Ok((Self { child, pid }, pipes))
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn try_exit(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    fn signal_graceful(&mut self) -> io::Result<()> {
        if self.try_exit()?.is_some() {
            return Ok(());
        }
        #[cfg(unix)]
        {
            match self.pid {
                Some(pid) => send_signal(pid, libc::SIGTERM),
                None => Ok(()),
            }
        }
        #[cfg(not(unix))]
        {
            // No cooperative signal for detached console children.
            self.child.start_kill()
        }
    }

    fn signal_kill(&mut self) -> io::Result<()> {
        if self.try_exit()?.is_some() {
            return Ok(());
        }
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            if let Err(e) = send_signal(pid, libc::SIGKILL) {
                tracing::debug!(pid, error = %e, "group kill failed");
            }
        }
        self.child.start_kill()
    }

    async fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => status.map(Some),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for NativeProcess {
    fn drop(&mut self) {
        // Reaches the rest of the group; kill_on_drop only hits the leader.
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.signal_kill();
        }
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // Negative pid addresses the process group created at spawn.
    if unsafe { libc::kill(-pid, signal) } == 0 {
        return Ok(());
    }
    if unsafe { libc::kill(pid, signal) } == 0 {
        return Ok(());
    }
    Err(io::Error::last_os_error())
}
