use std::fmt;
use std::path::Path;

use regex::Regex;

use crate::models::{ArtifactFormat, ConfigArtifact, DevstackConfig};
use crate::services::config_sync::{has_build_target, parse_env_entries};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("PASS"),
            Self::Warn => f.write_str("WARN"),
            Self::Fail => f.write_str("FAIL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckOutcome {
    fn new(status: CheckStatus, name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }
}

/// True when nothing failed. Warnings do not count.
pub fn all_passed(outcomes: &[CheckOutcome]) -> bool {
    outcomes.iter().all(|o| o.status != CheckStatus::Fail)
}

/// Validate the project layout, config artifacts and environment without
/// touching any network port. `env` looks variables up in the process
/// environment (injected so tests stay hermetic).
pub fn run_checks(
    root: &Path,
    config: &DevstackConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Vec<CheckOutcome> {
    let mut artifacts = config.config_artifacts(root);
    // A required file that is also an artifact gets one row: the artifact's.
    let mut required_files = Vec::new();
    for rel in &config.checks.required_files {
        match artifacts.iter_mut().find(|a| a.path == root.join(rel)) {
            Some(artifact) => artifact.required = true,
            None => required_files.push(rel.clone()),
        }
    }
    let mut outcomes = Vec::new();
    outcomes.extend(check_required_files(root, &required_files));
    outcomes.extend(artifacts.iter().map(|a| check_artifact(root, a)));
    outcomes.extend(check_env_vars(config, &artifacts, env));
    outcomes.extend(config.checks.advisories.iter().map(|advisory| {
        let name = advisory.path.clone();
        if root.join(&advisory.path).exists() {
            CheckOutcome::new(CheckStatus::Pass, name, "present")
        } else {
            CheckOutcome::new(CheckStatus::Warn, name, format!("missing; {}", advisory.hint))
        }
    }));

    for outcome in &outcomes {
        tracing::debug!(check = %outcome.name, status = %outcome.status, detail = %outcome.detail);
    }
    outcomes
}

fn check_required_files(root: &Path, files: &[String]) -> Vec<CheckOutcome> {
    files
        .iter()
        .map(|rel| {
            let path = root.join(rel);
            if !path.is_file() {
                return CheckOutcome::new(CheckStatus::Fail, rel, "required file missing");
            }
            if !rel.ends_with(".json") {
                return CheckOutcome::new(CheckStatus::Pass, rel, "present");
            }
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| {
                    serde_json::from_str::<serde_json::Value>(&s).map_err(|e| e.to_string())
                }) {
                Ok(_) => CheckOutcome::new(CheckStatus::Pass, rel, "present, valid JSON"),
                Err(e) => CheckOutcome::new(CheckStatus::Fail, rel, format!("invalid JSON: {e}")),
            }
        })
        .collect()
}

fn check_artifact(root: &Path, artifact: &ConfigArtifact) -> CheckOutcome {
    let name = display_path(root, &artifact.path);
    let content = match std::fs::read_to_string(&artifact.path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let status = if artifact.required {
                CheckStatus::Fail
            } else {
                CheckStatus::Warn
            };
            return CheckOutcome::new(status, name, "missing");
        }
        Err(e) => return CheckOutcome::new(CheckStatus::Fail, name, format!("unreadable: {e}")),
    };

    match &artifact.format {
        ArtifactFormat::EnvFile { .. } => match parse_env_entries(&content) {
            Ok(entries) => CheckOutcome::new(
                CheckStatus::Pass,
                name,
                format!("{} entries", entries.len()),
            ),
            Err(line) => {
                CheckOutcome::new(CheckStatus::Fail, name, format!("malformed line {line}"))
            }
        },
        ArtifactFormat::BuildConfig { scope, key } => {
            if has_build_target(&content, scope, key) {
                CheckOutcome::new(CheckStatus::Pass, name, format!("{scope}.{key} present"))
            } else {
                CheckOutcome::new(
                    CheckStatus::Fail,
                    name,
                    format!("no `{key}` URL inside `{scope}`"),
                )
            }
        }
    }
}

fn check_env_vars(
    config: &DevstackConfig,
    artifacts: &[ConfigArtifact],
    env: impl Fn(&str) -> Option<String>,
) -> Vec<CheckOutcome> {
    let file_entries: Vec<Vec<(String, String)>> = artifacts
        .iter()
        .filter(|a| matches!(a.format, ArtifactFormat::EnvFile { .. }))
        .filter_map(|a| std::fs::read_to_string(&a.path).ok())
        .filter_map(|content| parse_env_entries(&content).ok())
        .collect();

    config
        .checks
        .env_vars
        .iter()
        .map(|check| {
            let value = env(&check.name).or_else(|| {
                file_entries.iter().find_map(|entries| {
                    entries
                        .iter()
                        .find(|(k, _)| *k == check.name)
                        .map(|(_, v)| v.clone())
                })
            });
            let problem_status = if check.required {
                CheckStatus::Fail
            } else {
                CheckStatus::Warn
            };
            let Some(value) = value else {
                return CheckOutcome::new(problem_status, &check.name, "not set");
            };
            match check.pattern.as_deref().map(Regex::new) {
                Some(Ok(re)) if !re.is_match(&value) => CheckOutcome::new(
                    problem_status,
                    &check.name,
                    format!("{value:?} does not match {}", re.as_str()),
                ),
                Some(Err(e)) => {
                    CheckOutcome::new(CheckStatus::Fail, &check.name, format!("bad pattern: {e}"))
                }
                _ => CheckOutcome::new(CheckStatus::Pass, &check.name, value),
            }
        })
        .collect()
}

fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
