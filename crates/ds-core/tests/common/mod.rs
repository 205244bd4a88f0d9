// Each test binary compiles this module independently and uses a different
// subset of helpers, so unused-function warnings are expected.
#![allow(dead_code)]

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use ds_core::models::{BackendConfig, DevstackConfig, FrontendConfig, MatchRule};

pub const VITE_CONFIG: &str = r#"import { defineConfig } from "vite";

export default defineConfig({
  server: {
    port: 3002,
    proxy: {
      "/api": {
        target: "http://localhost:9000",
        changeOrigin: true,
      },
    },
  },
});
"#;

/// Serve `200 ok` to every request until the test ends.
pub async fn serve_health() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                    )
                    .await;
                let _ = stream.shutdown().await;
            });
        }
    });
    port
}

/// A port with nothing listening on it (at the time of the call).
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Accepts connections at the kernel level but never answers. Keep the
/// returned listener alive for as long as the port must stay occupied.
pub fn silent_listener() -> (std::net::TcpListener, u16) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Lay out a minimal backend/frontend project.
pub fn project(root: &Path) {
    std::fs::create_dir_all(root.join("backend")).unwrap();
    std::fs::create_dir_all(root.join("frontend")).unwrap();
    std::fs::write(
        root.join("frontend/.env.development"),
        "# dev\nVITE_API_BASE_URL=http://localhost:9000\nVITE_APP_TITLE=Demo\n",
    )
    .unwrap();
    std::fs::write(root.join("frontend/vite.config.js"), VITE_CONFIG).unwrap();
}

/// Config whose backend and frontend are `sh -c` scripts.
pub fn sh_config(candidates: &[u16], backend_script: &str, frontend_script: &str) -> DevstackConfig {
    DevstackConfig {
        host: "127.0.0.1".into(),
        probe_timeout_ms: 300,
        candidates: candidates.to_vec(),
        grace_timeout_ms: 2000,
        backend: BackendConfig {
            command: "sh".into(),
            args: vec!["-c".into(), backend_script.into()],
            ready: MatchRule::contains("Uvicorn running"),
            failure: Some(MatchRule::contains("Address already in use")),
            start_timeout_ms: 5000,
            ..BackendConfig::default()
        },
        frontend: FrontendConfig {
            command: "sh".into(),
            args: vec!["-c".into(), frontend_script.into()],
            ready: MatchRule::contains("Local:"),
            start_timeout_ms: 5000,
            ..FrontendConfig::default()
        },
        ..DevstackConfig::default()
    }
}

/// Whether a process with this pid still exists.
#[cfg(unix)]
pub fn pid_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}
