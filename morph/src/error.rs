//! Faults that abort a plan execution.
//!
//! Process failures are not errors: they are carried as data in
//! [`CommandResult`](crate::core::types::CommandResult). Everything here ends
//! the current execution with a single `OverallFailed` event.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::io::generator::GeneratorError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No workspace root was configured for the executor.
    #[error("no workspace folder open")]
    WorkspaceUnavailable,

    #[error("cannot read target {}: {source}", .path.display())]
    TargetUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("target {} is not valid UTF-8", .path.display())]
    TargetNotUtf8 { path: PathBuf },

    #[error("target {} is already being executed (lock {})", .target.display(), .lock.display())]
    TargetBusy { target: PathBuf, lock: PathBuf },

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error("{action} {}: {source}", .path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("execution cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn filesystem(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        EngineError::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }
}
