mod action;
mod disk;
mod executor;
mod locks;
mod pause;
mod progress;
mod queue;

pub use action::{Action, ActionKind, FileOperation, Outcome};
pub use disk::{DiskSpace, format_bytes};
pub use executor::{ActionEngine, CompletionListener, RunReport};
pub use locks::PathLocks;
pub use pause::PauseGate;
pub use progress::{ActiveAction, ProgressSnapshot, QueueProgress, group_percent};
pub use queue::ActionQueue;

use std::path::PathBuf;

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error types
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("an episode download for {} is already queued", .0.display())]
    DuplicateDestination(PathBuf),

    #[error("episode is still missing")]
    StillMissing,

    #[error("Configuration error: {0}")]
    Config(String),
}
