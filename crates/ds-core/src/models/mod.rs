pub mod artifact;
pub mod config;
pub mod endpoint;
pub mod probe;
pub mod process;
pub mod report;
pub mod stage;

pub use artifact::{ArtifactFormat, ArtifactOutcome, ArtifactReport, ConfigArtifact, SyncReport};
pub use config::{
    AdvisoryCheck, ArtifactConfig, ArtifactKind, BackendConfig, ChecksConfig, DevstackConfig,
    EnvVarCheck, FrontendConfig, MatchRule,
};
pub use endpoint::ServiceEndpoint;
pub use probe::{PortCandidate, ProbeResult, ProbeStatus, UnknownReason};
pub use process::{OutputStream, ProcessState, StopOutcome};
pub use report::{DetectionReport, FileExistence, ProbeEntry};
pub use stage::{BackendMode, Stage};
