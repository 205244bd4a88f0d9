use std::path::{Path, PathBuf};

use crate::error::{DevstackError, Result};
use crate::models::DevstackConfig;
use crate::services::matcher::LineMatcher;

pub const CONFIG_FILENAME: &str = ".devstack.yaml";

/// Load `.devstack.yaml` from the project root.
pub fn load(root: &Path) -> Result<DevstackConfig> {
    load_from(&root.join(CONFIG_FILENAME))
}

pub fn load_from(config_path: &Path) -> Result<DevstackConfig> {
    if !config_path.exists() {
        return Err(DevstackError::ConfigNotFound(config_path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(config_path)?;
    let config: DevstackConfig = if contents.trim().is_empty() {
        DevstackConfig::default()
    } else {
        serde_yaml::from_str(&contents)
            .map_err(|e| DevstackError::InvalidConfig(e.to_string()))?
    };
    validate(&config)?;
    Ok(config)
}

/// Resolve the config for a run. An explicit path must exist; the implicit
/// project file is optional and falls back to defaults.
pub fn resolve(root: &Path, explicit: Option<&Path>) -> Result<(DevstackConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        return load_from(path).map(|c| (c, Some(path.to_path_buf())));
    }
    match load(root) {
        Ok(config) => Ok((config, Some(root.join(CONFIG_FILENAME)))),
        Err(DevstackError::ConfigNotFound(path)) => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok((DevstackConfig::default(), None))
        }
        Err(e) => Err(e),
    }
}

fn validate(config: &DevstackConfig) -> Result<()> {
    if config.candidates.is_empty() {
        return Err(DevstackError::InvalidConfig(
            "candidates must list at least one port".into(),
        ));
    }
    if config.candidates.contains(&0) || config.detect_extra_candidates.contains(&0) {
        return Err(DevstackError::InvalidConfig(
            "candidates must not contain port 0".into(),
        ));
    }
    if config.backend.command.is_empty() || config.frontend.command.is_empty() {
        return Err(DevstackError::InvalidConfig(
            "backend.command and frontend.command are required".into(),
        ));
    }
    LineMatcher::compile(&config.backend.ready)?;
    LineMatcher::compile(&config.frontend.ready)?;
    for rule in [&config.backend.failure, &config.frontend.failure]
        .into_iter()
        .flatten()
    {
        LineMatcher::compile(rule)?;
    }
    for check in &config.checks.env_vars {
        if let Some(pattern) = &check.pattern {
            regex::Regex::new(pattern).map_err(|e| {
                DevstackError::InvalidConfig(format!("env var pattern for {}: {e}", check.name))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtifactKind, MatchRule};
    use crate::services::matcher::LinePredicate;
    use std::fs;

    #[test]
    fn parse_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
host: 127.0.0.1
candidates: [7000, 7001]
probe_timeout_ms: 500
backend:
  command: cargo
  args: [run]
  cwd: api
  ready:
    regex: "listening on \\d+"
  port_env: API_PORT
frontend:
  ready:
    contains: "ready in"
  url_env: PUBLIC_API_URL
artifacts:
  - path: web/.env
    format: env-file
    key: PUBLIC_API_URL
  - path: web/vite.config.ts
    format: build-config
    required: true
"#;
        fs::write(dir.path().join(CONFIG_FILENAME), yaml).unwrap();
        let config = load(dir.path()).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.candidates, vec![7000, 7001]);
        assert_eq!(config.backend.command, "cargo");
        assert_eq!(config.backend.cwd, "api");
        assert_eq!(config.backend.ready, MatchRule::regex("listening on \\d+"));
        // untouched fields keep their defaults
        assert_eq!(config.backend.start_timeout_ms, 30_000);
        assert_eq!(config.frontend.command, "npm");
        assert_eq!(config.frontend.url_env, "PUBLIC_API_URL");
        assert_eq!(config.artifacts.len(), 2);
        assert_eq!(config.artifacts[1].format, ArtifactKind::BuildConfig);
        assert!(config.artifacts[1].required);
    }

    #[test]
    fn parse_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "candidates: [9000]\n").unwrap();
        let config = load(dir.path()).unwrap();
        assert_eq!(config.candidates, vec![9000]);
        assert_eq!(config.health_path, "/health");
        assert_eq!(config.artifacts.len(), 3);
    }

    #[test]
    fn detection_appends_extra_ports_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            "candidates: [9000, 5000]\ndetect_extra_candidates: [3001, 5000]\n",
        )
        .unwrap();
        let config = load(dir.path()).unwrap().for_detection();
        assert_eq!(config.candidates, vec![9000, 5000, 3001]);
        assert!(config.detect_extra_candidates.is_empty());

        let defaults = DevstackConfig::default().for_detection();
        assert_eq!(defaults.candidates, vec![9000, 8000, 8001, 8080, 3001, 5000]);
    }

    #[test]
    fn default_backend_failure_matches_both_messages() {
        let failure = DevstackConfig::default().backend.failure.unwrap();
        let matcher = LineMatcher::compile(&failure).unwrap();
        assert!(matcher.matches("OSError: [Errno 98] Address already in use"));
        assert!(matcher.matches("错误: 端口被占用"));
        assert!(!matcher.matches("Uvicorn running on http://0.0.0.0:9000"));
    }

    #[test]
    fn missing_config_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(dir.path()),
            Err(DevstackError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn resolve_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, path) = resolve(dir.path(), None).unwrap();
        assert!(path.is_none());
        assert_eq!(config.candidates, vec![9000, 8000, 8001, 8080]);
    }

    #[test]
    fn resolve_requires_explicit_path_to_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(matches!(
            resolve(dir.path(), Some(&missing)),
            Err(DevstackError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn bad_regex_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            "backend:\n  ready:\n    regex: \"(unclosed\"\n",
        )
        .unwrap();
        assert!(matches!(
            load(dir.path()),
            Err(DevstackError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_candidates_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "candidates: []\n").unwrap();
        assert!(matches!(
            load(dir.path()),
            Err(DevstackError::InvalidConfig(_))
        ));
    }
}
