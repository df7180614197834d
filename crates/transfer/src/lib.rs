//! Transfer Agent contract and a directory-backed implementation.
//!
//! The orchestrator drives every byte movement through [`TransferAgent`].
//! [`LocalStore`] implements it on top of a local directory tree with
//! chunked, resumable, checksum-verified writes.

mod agent;
mod chunked;
mod local;
mod types;
mod validation;

pub use agent::{AgentFuture, TransferAgent};
pub use chunked::{ChunkReader, ChunkWriter, calculate_file_checksum, checksum_bytes};
pub use local::{LocalStore, LocalStoreOptions};
pub use types::{Chunk, TransferRequest};
pub use validation::validate_store_path;

/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Directory under a store root that holds partial uploads.
pub const RESERVATIONS_DIR: &str = ".reservations";

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("unknown record: {0}")]
    UnknownRecord(String),

    #[error("unknown reservation: {0}")]
    UnknownReservation(String),

    #[error("cannot resume at byte {requested}: only {committed} bytes committed")]
    ResumeOffset { requested: u64, committed: u64 },

    #[error("source changed: expected {expected} bytes, found {actual}")]
    SourceChanged { expected: u64, actual: u64 },

    #[error("cancelled")]
    Cancelled,
}
