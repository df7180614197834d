//! Orchestrator error types.

use crate::sequencer::RunState;
use crate::session::SessionState;

/// Errors produced while selecting files or driving an upload run.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no files selected")]
    EmptySelection,

    #[error("an existing file can only receive one file, {count} selected")]
    TargetCardinality { count: usize },

    #[error("an upload run is already active")]
    RunActive,

    #[error("cannot {action} while the run is {state:?}")]
    InvalidState {
        action: &'static str,
        state: RunState,
    },

    #[error("cannot {action} a session that is {state:?}")]
    InvalidSession {
        action: &'static str,
        state: SessionState,
    },

    #[error("no session for file {0}")]
    NoSession(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] uplink_transfer::TransferError),
}
