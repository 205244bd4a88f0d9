use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::artifact::{ArtifactFormat, ConfigArtifact};
use super::probe::PortCandidate;

/// Contents of `.devstack.yaml`. Every field is optional; the defaults
/// describe a `backend/` + `frontend/` layout with a Python API and a Vite UI.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevstackConfig {
    pub host: String,
    pub health_path: String,
    pub probe_timeout_ms: u64,
    pub parallel_probe: bool,
    pub candidates: Vec<u16>,
    /// Ports detect mode probes after `candidates`.
    pub detect_extra_candidates: Vec<u16>,
    pub base_url_env: String,
    pub backend: BackendConfig,
    pub frontend: FrontendConfig,
    pub artifacts: Vec<ArtifactConfig>,
    pub report_path: String,
    pub grace_timeout_ms: u64,
    pub checks: ChecksConfig,
}

impl Default for DevstackConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            health_path: "/health".into(),
            probe_timeout_ms: 2000,
            parallel_probe: false,
            candidates: vec![9000, 8000, 8001, 8080],
            detect_extra_candidates: vec![3001, 5000],
            base_url_env: "DEVSTACK_API_BASE_URL".into(),
            backend: BackendConfig::default(),
            frontend: FrontendConfig::default(),
            artifacts: vec![
                ArtifactConfig::env_file("frontend/.env.development", "VITE_API_BASE_URL"),
                ArtifactConfig::env_file("frontend/.env.local", "VITE_API_BASE_URL"),
                ArtifactConfig {
                    path: "frontend/vite.config.js".into(),
                    format: ArtifactKind::BuildConfig,
                    key: None,
                    scope: None,
                    required: true,
                },
            ],
            report_path: "port-detection-report.json".into(),
            grace_timeout_ms: 5000,
            checks: ChecksConfig::default(),
        }
    }
}

impl DevstackConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn grace_timeout(&self) -> Duration {
        Duration::from_millis(self.grace_timeout_ms)
    }

    pub fn port_candidates(&self) -> Vec<PortCandidate> {
        self.candidates
            .iter()
            .map(|&port| PortCandidate::new(port, self.health_path.clone()))
            .collect()
    }

    /// The config detect mode scans with: `candidates` followed by any
    /// extra detect-only ports not already listed.
    pub fn for_detection(mut self) -> Self {
        for port in std::mem::take(&mut self.detect_extra_candidates) {
            if !self.candidates.contains(&port) {
                self.candidates.push(port);
            }
        }
        self
    }

    /// Artifacts with paths resolved against the project root.
    pub fn config_artifacts(&self, root: &Path) -> Vec<ConfigArtifact> {
        self.artifacts.iter().map(|a| a.resolve(root)).collect()
    }
}

/// A line predicate as written in YAML: exactly one of `contains` or `regex`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MatchRule {
    pub contains: Option<String>,
    pub regex: Option<String>,
}

impl MatchRule {
    pub fn contains(text: impl Into<String>) -> Self {
        Self {
            contains: Some(text.into()),
            regex: None,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            contains: None,
            regex: Some(pattern.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub ready: MatchRule,
    pub failure: Option<MatchRule>,
    pub port_env: String,
    pub start_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: "python".into(),
            args: vec!["main.py".into()],
            cwd: "backend".into(),
            ready: MatchRule::contains("Uvicorn running"),
            failure: Some(MatchRule::regex("Address already in use|端口被占用")),
            port_env: "PORT".into(),
            start_timeout_ms: 30_000,
        }
    }
}

impl BackendConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub ready: MatchRule,
    pub failure: Option<MatchRule>,
    pub url_env: String,
    pub start_timeout_ms: u64,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            command: "npm".into(),
            args: vec!["run".into(), "dev".into()],
            cwd: "frontend".into(),
            ready: MatchRule::contains("Local:"),
            failure: None,
            url_env: "VITE_API_BASE_URL".into(),
            start_timeout_ms: 60_000,
        }
    }
}

impl FrontendConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    EnvFile,
    BuildConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    pub path: String,
    pub format: ArtifactKind,
    /// Env key for `env-file`; literal key for `build-config` (default `target`).
    #[serde(default)]
    pub key: Option<String>,
    /// Section holding the key for `build-config` (default `proxy`).
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl ArtifactConfig {
    fn env_file(path: &str, key: &str) -> Self {
        Self {
            path: path.into(),
            format: ArtifactKind::EnvFile,
            key: Some(key.into()),
            scope: None,
            required: false,
        }
    }

    pub fn resolve(&self, root: &Path) -> ConfigArtifact {
        let format = match self.format {
            ArtifactKind::EnvFile => ArtifactFormat::EnvFile {
                key: self
                    .key
                    .clone()
                    .unwrap_or_else(|| "VITE_API_BASE_URL".into()),
            },
            ArtifactKind::BuildConfig => ArtifactFormat::BuildConfig {
                scope: self.scope.clone().unwrap_or_else(|| "proxy".into()),
                key: self.key.clone().unwrap_or_else(|| "target".into()),
            },
        };
        ConfigArtifact {
            path: root.join(&self.path),
            format,
            required: self.required,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    pub required_files: Vec<String>,
    pub env_vars: Vec<EnvVarCheck>,
    pub advisories: Vec<AdvisoryCheck>,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            required_files: [
                "frontend/package.json",
                "frontend/src/config/index.js",
                "frontend/.env.example",
                "backend/main.py",
                "backend/requirements.txt",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            env_vars: vec![
                EnvVarCheck {
                    name: "VITE_API_BASE_URL".into(),
                    required: true,
                    pattern: Some("^https?://".into()),
                },
                EnvVarCheck {
                    name: "VITE_APP_TITLE".into(),
                    required: false,
                    pattern: None,
                },
                EnvVarCheck {
                    name: "VITE_APP_VERSION".into(),
                    required: false,
                    pattern: None,
                },
            ],
            advisories: vec![
                AdvisoryCheck {
                    path: "frontend/node_modules".into(),
                    hint: "run: cd frontend && npm install".into(),
                },
                AdvisoryCheck {
                    path: "backend/venv".into(),
                    hint: "run: cd backend && python -m venv venv".into(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvVarCheck {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvisoryCheck {
    pub path: String,
    #[serde(default)]
    pub hint: String,
}
