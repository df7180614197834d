//! Per-file upload session state machine.
//!
//! ```text
//! Pending ──begin──▶ Transferring ──complete──────▶ Completed
//!                      │    ▲
//!                      │    └──resume── ErrorResumable ◀──error──┐
//!                      ├────────────────────────────────────────┘
//!                      └──errorStarting──▶ ErrorFatal
//! ```
//!
//! Transitions are driven only by [`TransferEvent`]s. A fatal session is
//! never revived; restarting a file creates a new session.

use serde::Serialize;
use tracing::{debug, warn};
use uplink_protocol::{FailureKind, FileDescriptor, Reservation, TransferEvent, TransferTarget};
use uplink_transfer::TransferRequest;

use crate::error::UploadError;

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Transferring,
    Completed,
    ErrorResumable,
    ErrorFatal,
    /// Cancelled or aborted; its reservation has been handed back.
    Discarded,
}

/// Effect of one transfer event on a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStep {
    /// The agent acknowledged the transfer with a reservation.
    Reserved,
    /// `bytes` more bytes of this file are committed.
    Acknowledged { bytes: u64 },
    /// Transport position within the file; observational only.
    Progress { position: u64 },
    Completed {
        record_id: String,
        checksum: Option<String>,
    },
    Failed { kind: FailureKind, message: String },
    /// The event did not apply to the current state and was dropped.
    Ignored,
}

/// Transfer of exactly one file of the selection.
#[derive(Debug, Clone)]
pub struct UploadSession {
    file_index: usize,
    file: FileDescriptor,
    target: TransferTarget,
    state: SessionState,
    reservation: Option<Reservation>,
    bytes_sent: u64,
    start_byte: u64,
    error: Option<String>,
}

impl UploadSession {
    /// Creates a pending session for the file at `file_index`.
    pub fn new(file_index: usize, file: FileDescriptor, target: TransferTarget) -> Self {
        Self {
            file_index,
            file,
            target,
            state: SessionState::Pending,
            reservation: None,
            bytes_sent: 0,
            start_byte: 0,
            error: None,
        }
    }

    /// Moves `Pending → Transferring` and returns the request for a fresh
    /// transfer from byte zero.
    pub fn begin(&mut self) -> Result<TransferRequest, UploadError> {
        if self.state != SessionState::Pending {
            return Err(UploadError::InvalidSession {
                action: "begin",
                state: self.state,
            });
        }
        self.state = SessionState::Transferring;
        self.start_byte = 0;
        Ok(TransferRequest::begin(self.target.clone(), self.file.clone()))
    }

    /// Moves `ErrorResumable → Transferring` and returns the request that
    /// continues the same reservation at the last acknowledged byte.
    pub fn resume(&mut self) -> Result<TransferRequest, UploadError> {
        let reservation = match (&self.state, &self.reservation) {
            (SessionState::ErrorResumable, Some(r)) => r.clone(),
            _ => {
                return Err(UploadError::InvalidSession {
                    action: "resume",
                    state: self.state,
                });
            }
        };
        self.state = SessionState::Transferring;
        self.start_byte = self.bytes_sent;
        self.error = None;
        debug!(
            index = self.file_index,
            file = %self.file.name,
            start_byte = self.start_byte,
            "resuming session"
        );
        Ok(TransferRequest::resume(
            self.target.clone(),
            self.file.clone(),
            self.start_byte,
            reservation,
        ))
    }

    /// Applies one agent event.
    pub fn apply(&mut self, event: TransferEvent) -> SessionStep {
        if self.state != SessionState::Transferring {
            warn!(
                index = self.file_index,
                state = ?self.state,
                event = ?event,
                "dropping transfer event outside of a transfer"
            );
            return SessionStep::Ignored;
        }

        match event {
            TransferEvent::Reserved { reservation } => {
                if let Some(previous) = &self.reservation
                    && *previous != reservation
                {
                    warn!(
                        index = self.file_index,
                        previous = %previous,
                        current = %reservation,
                        "agent replaced the reservation"
                    );
                }
                self.reservation = Some(reservation);
                SessionStep::Reserved
            }
            TransferEvent::ChunkSent { bytes } => {
                if self.reservation.is_none() {
                    warn!(index = self.file_index, bytes, "chunk acknowledged before reservation");
                    return SessionStep::Ignored;
                }
                let accepted = bytes.min(self.file.size.saturating_sub(self.bytes_sent));
                if accepted < bytes {
                    warn!(
                        index = self.file_index,
                        bytes,
                        accepted,
                        "agent acknowledged more bytes than the file holds"
                    );
                }
                self.bytes_sent += accepted;
                SessionStep::Acknowledged { bytes: accepted }
            }
            TransferEvent::Progress {
                start_byte, loaded, ..
            } => {
                if self.reservation.is_none() {
                    return SessionStep::Ignored;
                }
                let position = start_byte.saturating_add(loaded).min(self.file.size);
                SessionStep::Progress { position }
            }
            TransferEvent::Complete {
                record_id,
                checksum,
            } => {
                self.state = SessionState::Completed;
                self.bytes_sent = self.file.size;
                SessionStep::Completed {
                    record_id,
                    checksum,
                }
            }
            TransferEvent::Error { message } => {
                // Without a reservation there is nothing to resume into.
                let kind = if self.reservation.is_some() {
                    FailureKind::Resumable
                } else {
                    FailureKind::Fatal
                };
                self.fail(kind, message)
            }
            TransferEvent::ErrorStarting { message } => {
                if self.bytes_sent > 0 {
                    warn!(
                        index = self.file_index,
                        bytes_sent = self.bytes_sent,
                        "start failure after bytes were acknowledged"
                    );
                }
                self.fail(FailureKind::Fatal, message)
            }
        }
    }

    /// Classifies a transfer call that ended without a terminal event.
    pub fn interrupted(&mut self) -> SessionStep {
        if self.state != SessionState::Transferring {
            return SessionStep::Ignored;
        }
        let kind = if self.reservation.is_some() {
            FailureKind::Resumable
        } else {
            FailureKind::Fatal
        };
        self.fail(kind, "transfer ended without a result".into())
    }

    /// Moves the session to `Discarded` and hands back its reservation.
    pub fn discard(&mut self) -> Option<Reservation> {
        self.state = SessionState::Discarded;
        self.reservation.take()
    }

    fn fail(&mut self, kind: FailureKind, message: String) -> SessionStep {
        self.state = match kind {
            FailureKind::Resumable => SessionState::ErrorResumable,
            FailureKind::Fatal => SessionState::ErrorFatal,
        };
        self.error = Some(message.clone());
        SessionStep::Failed { kind, message }
    }

    pub fn file_index(&self) -> usize {
        self.file_index
    }

    pub fn file(&self) -> &FileDescriptor {
        &self.file
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn reservation(&self) -> Option<&Reservation> {
        self.reservation.as_ref()
    }

    /// Bytes of this file acknowledged across every call of this session.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Offset the latest call started at.
    pub fn start_byte(&self) -> u64 {
        self.start_byte
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
