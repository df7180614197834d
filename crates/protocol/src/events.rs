use serde::{Deserialize, Serialize};

use crate::types::{FileDescriptor, Reservation};

/// Low-level event raised by a Transfer Agent while it moves one file.
///
/// `Reserved`, `ChunkSent` and `Progress` may fire any number of times
/// before exactly one of `Complete`, `Error` or `ErrorStarting`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TransferEvent {
    /// The remote side acknowledged the transfer and handed out a reservation.
    Reserved { reservation: Reservation },
    /// `bytes` more bytes of this file are durably committed remotely.
    ChunkSent { bytes: u64 },
    /// Transport tick: `loaded` bytes of the chunk starting at `start_byte`
    /// are on the wire. Observational only.
    Progress {
        start_byte: u64,
        loaded: u64,
        total: u64,
    },
    /// The file is fully transferred and committed as `record_id`.
    Complete {
        record_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum: Option<String>,
    },
    /// Interrupted after the reservation was obtained.
    Error { message: String },
    /// No usable reservation could be obtained.
    ErrorStarting { message: String },
}

/// Recovery path available for a halted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Continue the same session from its last acknowledged byte.
    Resumable,
    /// Discard the session and restart the file from byte zero.
    Fatal,
}

/// Progress numbers for the file in flight and for the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Zero-based position of the current file.
    pub file_index: usize,
    pub file_count: usize,
    pub file_name: String,
    pub file_bytes: u64,
    pub file_size: u64,
    pub file_percent: u8,
    pub overall_bytes: u64,
    pub total_bytes: u64,
    pub overall_percent: u8,
}

/// Event raised by the orchestration core to its host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostEvent {
    /// The selection was replaced (possibly with nothing).
    FilesChanged {
        files: Vec<FileDescriptor>,
        total_size: u64,
    },
    UploadStarted {
        file_count: usize,
        total_size: u64,
    },
    Progress(ProgressSnapshot),
    ItemComplete {
        index: usize,
        name: String,
        record_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum: Option<String>,
    },
    /// The run halted; the host must pick the recovery action for `kind`.
    UploadError {
        index: usize,
        kind: FailureKind,
        message: String,
    },
    UploadAborted { index: usize },
    UploadFinished {
        file_count: usize,
        total_size: u64,
    },
}
