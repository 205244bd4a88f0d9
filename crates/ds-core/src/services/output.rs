use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::models::OutputStream;
use crate::services::discovery::strip_ansi;

pub const DEFAULT_TAIL_LINES: usize = 40;

/// One line of child output, tagged with the process and stream it came from.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub process: String,
    pub stream: OutputStream,
    pub line: String,
}

/// Bounded buffer of the most recent output lines of one process.
#[derive(Debug, Clone)]
pub struct OutputTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().cloned().collect()
    }
}

impl Default for OutputTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_LINES)
    }
}

/// Drain a child stream line by line until EOF.
///
/// Colour escapes are stripped first. Every line is then logged, recorded in
/// `tail` and forwarded to `tx`. A closed
/// channel does not stop the drain: output keeps being logged for the whole
/// life of the process.
pub fn start_draining<R>(
    reader: R,
    process: String,
    stream: OutputStream,
    tail: OutputTail,
    tx: mpsc::UnboundedSender<LogLine>,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = reader;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = strip_ansi(String::from_utf8_lossy(&buf).trim_end_matches(['\n', '\r']));
                    if line.trim().is_empty() {
                        continue;
                    }
                    match stream {
                        OutputStream::Stdout => {
                            tracing::info!(process = %process, stream = %stream, "{line}")
                        }
                        OutputStream::Stderr => {
                            tracing::warn!(process = %process, stream = %stream, "{line}")
                        }
                    }
                    tail.push(line.clone());
                    let _ = tx.send(LogLine {
                        process: process.clone(),
                        stream,
                        line,
                    });
                }
                Err(e) => {
                    tracing::debug!(process = %process, stream = %stream, error = %e, "output stream closed");
                    break;
                }
            }
        }
    })
}
