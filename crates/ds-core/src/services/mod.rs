pub mod checks;
pub mod config_loader;
pub mod config_sync;
pub mod discovery;
pub mod matcher;
pub mod orchestrator;
pub mod output;
pub mod platform;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod signals;
pub mod supervisor;
