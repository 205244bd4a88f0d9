use std::future::Future;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::net::TcpStream;

use crate::models::{PortCandidate, ProbeResult, ProbeStatus, UnknownReason};

/// Answers "is a service already live on this candidate".
///
/// Implementations perform exactly one bounded check and never retry;
/// retry policy belongs to callers.
pub trait Probe: Send + Sync {
    fn probe(
        &self,
        host: &str,
        candidate: &PortCandidate,
    ) -> impl Future<Output = ProbeResult> + Send;
}

impl<P: Probe> Probe for &P {
    fn probe(
        &self,
        host: &str,
        candidate: &PortCandidate,
    ) -> impl Future<Output = ProbeResult> + Send {
        (**self).probe(host, candidate)
    }
}

/// HTTP health probe: a TCP connect to tell "nothing listening" apart from
/// "something listening", then a GET to the candidate's path.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        // Builder only fails when the TLS backend cannot initialise, and no
        // TLS backend is compiled in.
        let client = Client::builder()
            .no_proxy()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_default();
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Probe for HttpProbe {
    async fn probe(&self, host: &str, candidate: &PortCandidate) -> ProbeResult {
        let started = Instant::now();
        let port = candidate.port;

        let status = match tokio::time::timeout(self.timeout, TcpStream::connect((host, port))).await
        {
            Err(_) => ProbeStatus::Unknown(UnknownReason::Timeout),
            Ok(Err(e)) if is_refusal(e.kind()) => ProbeStatus::Free,
            Ok(Err(e)) => ProbeStatus::Unknown(UnknownReason::Io(e.to_string())),
            Ok(Ok(stream)) => {
                drop(stream);
                let remaining = self.timeout.saturating_sub(started.elapsed());
                self.http_check(host, candidate, remaining).await
            }
        };

        let latency = started.elapsed();
        log_outcome(port, &status, latency);
        let latency = match status {
            ProbeStatus::Live | ProbeStatus::Free => Some(latency),
            ProbeStatus::Unknown(_) => None,
        };
        ProbeResult::new(port, status, latency)
    }
}

impl HttpProbe {
    async fn http_check(
        &self,
        host: &str,
        candidate: &PortCandidate,
        timeout: Duration,
    ) -> ProbeStatus {
        if timeout.is_zero() {
            return ProbeStatus::Unknown(UnknownReason::Timeout);
        }
        let url = health_url(host, candidate);
        match self.client.get(&url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => ProbeStatus::Live,
            Ok(response) => {
                ProbeStatus::Unknown(UnknownReason::HttpStatus(response.status().as_u16()))
            }
            Err(e) if e.is_timeout() => ProbeStatus::Unknown(UnknownReason::Timeout),
            Err(e) => ProbeStatus::Unknown(UnknownReason::Io(e.to_string())),
        }
    }
}

fn is_refusal(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset)
}

fn health_url(host: &str, candidate: &PortCandidate) -> String {
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    let path = if candidate.path.starts_with('/') {
        candidate.path.clone()
    } else {
        format!("/{}", candidate.path)
    };
    format!("http://{host}:{}{path}", candidate.port)
}

fn log_outcome(port: u16, status: &ProbeStatus, latency: Duration) {
    let latency_ms = latency.as_millis() as u64;
    match status {
        ProbeStatus::Live => tracing::info!(port, latency_ms, "service live"),
        ProbeStatus::Free => tracing::info!(port, latency_ms, "port free"),
        ProbeStatus::Unknown(UnknownReason::Timeout) => {
            tracing::warn!(port, latency_ms, "probe timed out")
        }
        ProbeStatus::Unknown(UnknownReason::HttpStatus(code)) => {
            tracing::warn!(port, code, "unhealthy response")
        }
        ProbeStatus::Unknown(UnknownReason::Io(error)) => {
            tracing::debug!(port, %error, "probe io error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_status(status_line: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status_line}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok"
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        port
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn healthy_service_is_live() {
        let port = serve_status("200 OK").await;
        let probe = HttpProbe::new(Duration::from_secs(2));
        let result = probe
            .probe("127.0.0.1", &PortCandidate::new(port, "/health"))
            .await;
        assert_eq!(result.status, ProbeStatus::Live);
        assert!(result.latency.is_some());
    }

    #[tokio::test]
    async fn error_status_is_unknown() {
        let port = serve_status("503 Service Unavailable").await;
        let probe = HttpProbe::new(Duration::from_secs(2));
        let result = probe
            .probe("127.0.0.1", &PortCandidate::new(port, "/health"))
            .await;
        assert_eq!(
            result.status,
            ProbeStatus::Unknown(UnknownReason::HttpStatus(503))
        );
    }

    #[tokio::test]
    async fn nothing_listening_is_free() {
        let port = free_port();
        let probe = HttpProbe::new(Duration::from_secs(2));
        let result = probe
            .probe("127.0.0.1", &PortCandidate::new(port, "/health"))
            .await;
        assert_eq!(result.status, ProbeStatus::Free);
    }

    #[tokio::test]
    async fn silent_listener_times_out_as_unknown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = HttpProbe::new(Duration::from_millis(300));
        let result = probe
            .probe("127.0.0.1", &PortCandidate::new(port, "/health"))
            .await;
        assert_eq!(result.status, ProbeStatus::Unknown(UnknownReason::Timeout));
        drop(listener);
    }

    #[test]
    fn health_url_normalises_path_and_ipv6_host() {
        assert_eq!(
            health_url("localhost", &PortCandidate::new(8000, "health")),
            "http://localhost:8000/health"
        );
        assert_eq!(
            health_url("::1", &PortCandidate::new(8000, "/health")),
            "http://[::1]:8000/health"
        );
    }
}
