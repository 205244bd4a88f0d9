use std::fmt;

/// Orchestration stages, in the order a run walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    ResolvingPort,
    SyncingConfig,
    StartingBackend,
    StartingFrontend,
    Running,
    ShuttingDown,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::ResolvingPort => "resolving port",
            Self::SyncingConfig => "syncing config",
            Self::StartingBackend => "starting backend",
            Self::StartingFrontend => "starting frontend",
            Self::Running => "running",
            Self::ShuttingDown => "shutting down",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Whether the backend was found running or has to be launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Adopt,
    Launch,
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adopt => f.write_str("adopted"),
            Self::Launch => f.write_str("launched"),
        }
    }
}
