//! Transfer Agent trait.
//!
//! A Transfer Agent moves the bytes of one file into one remote record.
//! The orchestrator never talks to storage directly: it hands the agent a
//! [`TransferRequest`] and reacts to the [`TransferEvent`]s the agent raises.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use uplink_protocol::{Reservation, TransferEvent};

use crate::TransferError;
use crate::types::TransferRequest;

/// Boxed future returned by [`TransferAgent`] methods.
pub type AgentFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Performs the chunked upload or update of one file at a time.
///
/// Implementations bridge to the real transport; the trait keeps the
/// orchestration logic decoupled from it and testable with mocks.
pub trait TransferAgent: Send + Sync {
    /// Begins a fresh transfer, or resumes one when the request carries a
    /// reservation and a nonzero `start_byte`.
    ///
    /// Every outcome is reported through `events`: `Reserved` once the
    /// remote side acknowledged the transfer, then any number of
    /// `ChunkSent`/`Progress`, then exactly one terminal event. The returned
    /// future resolves once the agent is done sending events. Dropping it
    /// cancels the transfer.
    fn begin_or_resume(
        &self,
        request: TransferRequest,
        events: mpsc::Sender<TransferEvent>,
    ) -> AgentFuture<'_, ()>;

    /// Best-effort release of a reservation and any partial bytes it holds.
    fn abort(&self, reservation: Reservation) -> AgentFuture<'_, Result<(), TransferError>>;
}
