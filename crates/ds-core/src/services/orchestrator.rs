use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{DevstackError, Result, StageError};
use crate::models::{
    BackendMode, ConfigArtifact, DevstackConfig, MatchRule, PortCandidate, ProbeResult,
    ServiceEndpoint, Stage, StopOutcome, SyncReport,
};
use crate::services::config_sync;
use crate::services::matcher::{LineMatcher, LinePredicate};
use crate::services::platform::CommandSpec;
use crate::services::probe::{HttpProbe, Probe};
use crate::services::report::{build_report, ReportStore};
use crate::services::scanner::PortScanner;
use crate::services::supervisor::{self, LaunchSpec, ManagedProcess};

/// How often a running stack checks whether a child died on its own.
const EXIT_POLL: Duration = Duration::from_millis(500);

/// Where the backend lives and how it got there. Computed once per run.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub endpoint: ServiceEndpoint,
    pub mode: BackendMode,
    pub probed: Vec<ProbeResult>,
}

/// Drives one run: resolve the backend port, sync config, start the
/// backend (unless adopted) and then the frontend.
pub struct Orchestrator<P = HttpProbe> {
    root: PathBuf,
    config: DevstackConfig,
    probe: P,
    base_url_override: Option<String>,
    reports: ReportStore,
}

impl Orchestrator<HttpProbe> {
    pub fn new(root: impl Into<PathBuf>, config: DevstackConfig) -> Self {
        let probe = HttpProbe::new(config.probe_timeout());
        Orchestrator::with_probe(root, config, probe)
    }
}

impl<P: Probe> Orchestrator<P> {
    pub fn with_probe(root: impl Into<PathBuf>, config: DevstackConfig, probe: P) -> Self {
        let root = root.into();
        let reports = ReportStore::new(root.join(&config.report_path));
        Self {
            root,
            config,
            probe,
            base_url_override: None,
            reports,
        }
    }

    /// Raw value of the base-URL override variable, if set.
    pub fn with_base_url_override(mut self, raw: Option<String>) -> Self {
        self.base_url_override = raw.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &DevstackConfig {
        &self.config
    }

    pub fn report_path(&self) -> &Path {
        self.reports.path()
    }

    pub fn artifacts(&self) -> Vec<ConfigArtifact> {
        self.config.config_artifacts(&self.root)
    }

    fn override_endpoint(&self) -> Option<ServiceEndpoint> {
        let raw = self.base_url_override.as_deref()?;
        match ServiceEndpoint::parse(raw) {
            Some(endpoint) => {
                tracing::info!(var = %self.config.base_url_env, url = %endpoint, "using base URL override");
                Some(endpoint)
            }
            None => {
                tracing::warn!(
                    var = %self.config.base_url_env,
                    value = raw,
                    "ignoring malformed base URL override"
                );
                None
            }
        }
    }

    /// Scan the candidates (or the override's single port) and write the
    /// detection report, whatever the outcome.
    pub async fn resolve(&self) -> Result<Resolution> {
        let overridden = self.override_endpoint();
        let (host, candidates) = match &overridden {
            Some(endpoint) => (
                endpoint.host.clone(),
                vec![PortCandidate::new(
                    endpoint.port,
                    self.config.health_path.clone(),
                )],
            ),
            None => (self.config.host.clone(), self.config.port_candidates()),
        };
        let checked: Vec<u16> = candidates.iter().map(|c| c.port).collect();
        tracing::info!(host = %host, candidates = ?checked, "scanning for backend");

        let scanned = PortScanner::new(&self.probe, host)
            .parallel(self.config.parallel_probe)
            .scan(&candidates)
            .await;

        let resolution = match (scanned, overridden) {
            (Ok(outcome), Some(endpoint)) => Ok(Resolution {
                mode: outcome.mode(),
                probed: outcome.probed,
                endpoint,
            }),
            (Ok(outcome), None) => Ok(Resolution {
                endpoint: ServiceEndpoint::http(self.config.host.clone(), outcome.port),
                mode: outcome.mode(),
                probed: outcome.probed,
            }),
            (Err(DevstackError::ScanExhausted { probed }), Some(endpoint)) => {
                tracing::warn!(url = %endpoint, "override did not pass the health check, adopting it as given");
                Ok(Resolution {
                    endpoint,
                    mode: BackendMode::Adopt,
                    probed,
                })
            }
            (Err(e), _) => Err(e),
        };

        let (probed, resolved) = match &resolution {
            Ok(r) => (r.probed.as_slice(), Some((r.endpoint.port, r.mode))),
            Err(DevstackError::ScanExhausted { probed }) => (probed.as_slice(), None),
            Err(_) => (&[][..], None),
        };
        let report = build_report(&self.root, &checked, probed, resolved, &self.artifacts());
        if let Err(e) = self.reports.save(&report).await {
            tracing::warn!(path = %self.reports.path().display(), error = %e, "could not write detection report");
        }

        if let Ok(r) = &resolution {
            tracing::info!(port = r.endpoint.port, mode = %r.mode, endpoint = %r.endpoint, "backend port resolved");
        }
        resolution
    }

    pub fn sync_config(&self, endpoint: &ServiceEndpoint) -> SyncReport {
        let report = config_sync::sync(endpoint, &self.artifacts());
        if report.failed() > 0 {
            tracing::warn!(failed = report.failed(), "some config artifacts were not updated");
        }
        report
    }

    /// Walk every stage up to `Running`. A failure at any stage stops what
    /// was already started before the error is returned.
    pub async fn start(&self) -> std::result::Result<RunningStack, StageError> {
        enter(Stage::Init);
        self.check_directories()
            .map_err(|e| StageError::new(Stage::Init, e))?;

        enter(Stage::ResolvingPort);
        let resolution = self
            .resolve()
            .await
            .map_err(|e| StageError::new(Stage::ResolvingPort, e))?;
        let endpoint = resolution.endpoint.clone();

        enter(Stage::SyncingConfig);
        let sync = self.sync_config(&endpoint);

        enter(Stage::StartingBackend);
        let backend = match resolution.mode {
            BackendMode::Adopt => {
                tracing::info!(url = %endpoint, "adopting running backend, not launching one");
                None
            }
            BackendMode::Launch => {
                let spec = self
                    .backend_spec(&endpoint)
                    .map_err(|e| StageError::new(Stage::StartingBackend, e))?;
                let process = supervisor::start(spec)
                    .await
                    .map_err(|e| StageError::new(Stage::StartingBackend, e))?;
                Some(process)
            }
        };

        enter(Stage::StartingFrontend);
        let frontend = match self.frontend_spec(&endpoint) {
            Ok(spec) => supervisor::start(spec).await.map_err(DevstackError::from),
            Err(e) => Err(e),
        };
        let frontend = match frontend {
            Ok(process) => process,
            Err(e) => {
                let err = StageError::new(Stage::StartingFrontend, e);
                if let Some(mut backend) = backend {
                    enter(Stage::ShuttingDown);
                    backend.stop(self.config.grace_timeout()).await;
                }
                return Err(err);
            }
        };

        enter(Stage::Running);
        Ok(RunningStack {
            endpoint,
            mode: resolution.mode,
            sync,
            backend,
            frontend,
            grace: self.config.grace_timeout(),
        })
    }

    fn check_directories(&self) -> Result<()> {
        let dirs = [
            ("project", self.root.clone()),
            ("backend", self.root.join(&self.config.backend.cwd)),
            ("frontend", self.root.join(&self.config.frontend.cwd)),
        ];
        for (name, path) in dirs {
            if !path.is_dir() {
                return Err(DevstackError::MissingDirectory {
                    name: name.to_string(),
                    path,
                });
            }
        }
        Ok(())
    }

    fn backend_spec(&self, endpoint: &ServiceEndpoint) -> Result<LaunchSpec> {
        let backend = &self.config.backend;
        let command = CommandSpec {
            program: backend.command.clone(),
            args: backend.args.clone(),
            cwd: self.root.join(&backend.cwd),
            env: vec![
                (backend.port_env.clone(), endpoint.port.to_string()),
                (self.config.base_url_env.clone(), endpoint.base_url()),
            ],
        };
        Ok(
            LaunchSpec::new("backend", command, predicate(&backend.ready)?, backend.start_timeout())
                .with_failure(backend.failure.as_ref().map(predicate).transpose()?),
        )
    }

    fn frontend_spec(&self, endpoint: &ServiceEndpoint) -> Result<LaunchSpec> {
        let frontend = &self.config.frontend;
        let command = CommandSpec {
            program: frontend.command.clone(),
            args: frontend.args.clone(),
            cwd: self.root.join(&frontend.cwd),
            env: vec![(frontend.url_env.clone(), endpoint.base_url())],
        };
        Ok(
            LaunchSpec::new("frontend", command, predicate(&frontend.ready)?, frontend.start_timeout())
                .with_failure(frontend.failure.as_ref().map(predicate).transpose()?),
        )
    }
}

fn predicate(rule: &MatchRule) -> Result<Box<dyn LinePredicate>> {
    Ok(Box::new(LineMatcher::compile(rule)?))
}

fn enter(stage: Stage) {
    tracing::info!(stage = %stage, "entering stage");
}

/// The URLs an operator cares about once everything is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSummary {
    pub mode: BackendMode,
    pub backend_url: String,
    pub health_url: String,
    pub docs_url: String,
    pub frontend_url: Option<String>,
}

/// A fully started stack. Stopping it is the caller's job; dropping it kills
/// the children without a grace period.
pub struct RunningStack {
    endpoint: ServiceEndpoint,
    mode: BackendMode,
    sync: SyncReport,
    backend: Option<ManagedProcess>,
    frontend: ManagedProcess,
    grace: Duration,
}

impl RunningStack {
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    pub fn sync_report(&self) -> &SyncReport {
        &self.sync
    }

    pub fn backend(&self) -> Option<&ManagedProcess> {
        self.backend.as_ref()
    }

    pub fn frontend(&self) -> &ManagedProcess {
        &self.frontend
    }

    pub fn summary(&self, health_path: &str) -> StackSummary {
        StackSummary {
            mode: self.mode,
            backend_url: self.endpoint.base_url(),
            health_url: self.endpoint.url_for(health_path),
            docs_url: self.endpoint.url_for("/docs"),
            frontend_url: self.frontend.advertised_url().map(str::to_string),
        }
    }

    /// Resolves with the name of the first managed process that exits on
    /// its own. Pending forever while everything keeps running.
    pub async fn wait_for_exit(&mut self) -> String {
        loop {
            tokio::time::sleep(EXIT_POLL).await;
            if self.frontend.has_exited() {
                return self.frontend.name().to_string();
            }
            if let Some(backend) = self.backend.as_mut() {
                if backend.has_exited() {
                    return backend.name().to_string();
                }
            }
        }
    }

    /// Stop the frontend, then the backend, sharing one grace window.
    pub async fn shutdown(mut self) -> Vec<(String, StopOutcome)> {
        enter(Stage::ShuttingDown);
        let deadline = Instant::now() + self.grace;
        let mut outcomes = Vec::with_capacity(2);

        let remaining = deadline.saturating_duration_since(Instant::now());
        let outcome = self.frontend.stop(remaining).await;
        outcomes.push((self.frontend.name().to_string(), outcome));

        if let Some(backend) = self.backend.as_mut() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = backend.stop(remaining).await;
            outcomes.push((backend.name().to_string(), outcome));
        }

        enter(Stage::Done);
        outcomes
    }
}
