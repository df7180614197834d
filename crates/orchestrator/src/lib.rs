//! Upload orchestration: selection, sequencing, sessions and progress.
//!
//! This crate owns the decisions of an upload run and none of the bytes.
//! The host supplies a [`TransferAgent`](uplink_transfer::TransferAgent)
//! that moves file contents; the [`Sequencer`] feeds it one file at a time
//! and reports back through [`HostEvent`](uplink_protocol::HostEvent)s.
//!
//! # Run lifecycle
//!
//! 1. **Select** a [`SelectionSet`] (files, paths or a dropped directory)
//! 2. **Start** against a folder or a single existing file
//! 3. **Sequence** files in order, one [`UploadSession`] at a time
//! 4. **Halt** on error and wait for `resume`, `restart` or `abort`
//! 5. **Finish** once the last file completes

pub mod config;
pub mod error;
pub mod progress;
pub mod selection;
pub mod sequencer;
pub mod session;

pub use config::UploaderConfig;
pub use error::UploadError;
pub use progress::{ProgressAggregator, percent_ceil};
pub use selection::SelectionSet;
pub use sequencer::{RunState, RunStatus, Sequencer};
pub use session::{SessionState, SessionStep, UploadSession};
