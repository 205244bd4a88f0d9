use std::fmt;
use std::path::PathBuf;

/// How an artifact is rewritten to carry the resolved base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// `KEY=value` lines; the line for `key` is replaced or appended.
    EnvFile { key: String },
    /// A source file where `key: "<url>"` literals inside the `scope`
    /// section are replaced; everything else is left untouched.
    BuildConfig { scope: String, key: String },
}

impl ArtifactFormat {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::EnvFile { .. } => "env-file",
            Self::BuildConfig { .. } => "build-config",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigArtifact {
    pub path: PathBuf,
    pub format: ArtifactFormat,
    /// Whether `check` treats a missing file as a failure.
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    Updated,
    SkippedMissing,
    SkippedUnchanged,
    Failed { reason: String },
}

impl fmt::Display for ArtifactOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Updated => f.write_str("updated"),
            Self::SkippedMissing => f.write_str("skipped (missing)"),
            Self::SkippedUnchanged => f.write_str("skipped (unchanged)"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReport {
    pub path: PathBuf,
    pub outcome: ArtifactOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub entries: Vec<ArtifactReport>,
}

impl SyncReport {
    pub fn count(&self, pred: impl Fn(&ArtifactOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }

    pub fn updated(&self) -> usize {
        self.count(|o| *o == ArtifactOutcome::Updated)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ArtifactOutcome::Failed { .. }))
    }

    pub fn outcome_for(&self, path: &std::path::Path) -> Option<&ArtifactOutcome> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| &e.outcome)
    }
}
