//! Shared types for the upload orchestration core.
//!
//! Everything that crosses a crate boundary lives here: file descriptors,
//! upload targets, the events a Transfer Agent raises, and the events the
//! orchestrator raises to its host. All of it serializes to camelCase JSON
//! so a UI layer can consume it directly.

pub mod events;
pub mod types;

pub use events::{FailureKind, HostEvent, ProgressSnapshot, TransferEvent};
pub use types::{FileDescriptor, Reservation, TransferTarget, UploadTarget};
