//! Sequencer: drives a selection through one upload session at a time.
//!
//! Files are processed strictly in selection order. A completed session
//! advances the run; a failed one halts it until the host picks the
//! recovery matching the failure: `resume` continues the same session from
//! its last acknowledged byte, `restart` replaces it with a fresh one.
//! Nothing is retried automatically.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uplink_protocol::{
    FailureKind, FileDescriptor, HostEvent, ProgressSnapshot, Reservation, UploadTarget,
};
use uplink_transfer::{TransferAgent, TransferRequest};

use crate::config::UploaderConfig;
use crate::error::UploadError;
use crate::progress::ProgressAggregator;
use crate::selection::SelectionSet;
use crate::session::{SessionState, SessionStep, UploadSession};

/// Capacity of the channel between the agent and the sequencer for one call.
const TRANSFER_EVENT_BUFFER: usize = 64;

/// Where the sequencer stands within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run; the selection may be replaced.
    Idle,
    /// Started with `override_start`; waiting for the host to call `run`.
    Ready,
    /// A session is being driven.
    Running,
    /// Halted on a resumable error; `resume` or `abort`.
    AwaitingResume,
    /// Halted on a fatal start error; `restart` or `abort`.
    AwaitingRestart,
}

impl RunState {
    pub fn is_active(self) -> bool {
        self != Self::Idle
    }
}

/// How a call into the sequencer left the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Started but deferred; the host calls `run` to proceed.
    Ready,
    /// Every file was uploaded.
    Finished,
    /// The file at `index` failed; the host must `resume`, `restart` or
    /// `abort` depending on `kind`.
    Halted {
        index: usize,
        kind: FailureKind,
        message: String,
    },
    /// The run was cancelled while the file at `index` was in flight.
    Aborted { index: usize },
}

enum DriveOutcome {
    Completed {
        record_id: String,
        checksum: Option<String>,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
    Cancelled,
}

/// Owns the selection, the current index, the single session slot and the
/// progress counters of an upload run.
pub struct Sequencer {
    agent: Arc<dyn TransferAgent>,
    config: UploaderConfig,
    selection: SelectionSet,
    target: Option<UploadTarget>,
    state: RunState,
    current_index: usize,
    session: Option<UploadSession>,
    progress: ProgressAggregator,
    events_tx: mpsc::Sender<HostEvent>,
    events_rx: Option<mpsc::Receiver<HostEvent>>,
    cancel: CancellationToken,
}

impl Sequencer {
    /// Creates an idle sequencer with nothing selected.
    pub fn new(agent: Arc<dyn TransferAgent>, config: UploaderConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));
        Self {
            agent,
            config,
            selection: SelectionSet::default(),
            target: None,
            state: RunState::Idle,
            current_index: 0,
            session: None,
            progress: ProgressAggregator::default(),
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the host event receiver. Can only be called once.
    ///
    /// Events raised before the receiver is taken are dropped. The channel
    /// is bounded and `start`/`resume`/`restart` wait on it while they run,
    /// so drain the receiver from another task than the one driving them.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<HostEvent>> {
        self.events_rx.take()
    }

    /// Returns the token that cancels the transfer in flight.
    ///
    /// A cancelled token is replaced once the run has been torn down, so
    /// fetch it again before the next run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn target(&self) -> Option<&UploadTarget> {
        self.target.as_ref()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// The session in the slot, if any. Retained while halted.
    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    pub fn progress(&self) -> &ProgressAggregator {
        &self.progress
    }

    /// Current progress numbers, if a session occupies the slot.
    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        let session = self.session.as_ref()?;
        Some(ProgressSnapshot {
            file_index: session.file_index(),
            file_count: self.selection.len(),
            file_name: session.file().name.clone(),
            file_bytes: self.progress.file_bytes(),
            file_size: session.file().size,
            file_percent: self.progress.file_percent(),
            overall_bytes: self.progress.overall_bytes(),
            total_bytes: self.progress.total_size(),
            overall_percent: self.progress.overall_percent(),
        })
    }

    /// Replaces the selection with `files`.
    pub async fn set_files(&mut self, files: Vec<FileDescriptor>) -> Result<(), UploadError> {
        self.set_selection(SelectionSet::new(files)).await
    }

    /// Replaces the selection and signals `FilesChanged`, also when the new
    /// selection is empty. Rejected while a run is active.
    pub async fn set_selection(&mut self, selection: SelectionSet) -> Result<(), UploadError> {
        if self.state.is_active() {
            return Err(UploadError::RunActive);
        }
        self.selection = selection;
        debug!(
            files = self.selection.len(),
            total_bytes = self.selection.total_size(),
            "selection changed"
        );
        self.emit(HostEvent::FilesChanged {
            files: self.selection.files().to_vec(),
            total_size: self.selection.total_size(),
        })
        .await;
        Ok(())
    }

    /// Starts a run over the current selection.
    ///
    /// Validation happens before anything is signalled or transferred: the
    /// selection must be non-empty, an existing-file target takes exactly one
    /// file, and no other run may be active. Unless `override_start` is set,
    /// processing begins immediately and this returns once the run finishes,
    /// halts or is cancelled.
    pub async fn start(&mut self, target: UploadTarget) -> Result<RunStatus, UploadError> {
        if self.state.is_active() {
            return Err(UploadError::RunActive);
        }
        if self.selection.is_empty() {
            return Err(UploadError::EmptySelection);
        }
        if target.is_existing_file() && self.selection.len() > 1 {
            return Err(UploadError::TargetCardinality {
                count: self.selection.len(),
            });
        }

        self.current_index = 0;
        self.session = None;
        self.progress = ProgressAggregator::new(self.selection.total_size());
        info!(
            files = self.selection.len(),
            total_bytes = self.selection.total_size(),
            target = ?target,
            "upload started"
        );
        self.target = Some(target);
        self.state = RunState::Ready;
        self.emit(HostEvent::UploadStarted {
            file_count: self.selection.len(),
            total_size: self.selection.total_size(),
        })
        .await;

        if self.config.override_start {
            return Ok(RunStatus::Ready);
        }
        self.process().await
    }

    /// Begins processing a run started with `override_start`.
    pub async fn run(&mut self) -> Result<RunStatus, UploadError> {
        self.expect_state("run", RunState::Ready)?;
        self.process().await
    }

    /// Continues the halted session from its last acknowledged byte.
    pub async fn resume(&mut self) -> Result<RunStatus, UploadError> {
        self.expect_state("resume", RunState::AwaitingResume)?;
        info!(index = self.current_index, "resuming upload");
        self.process().await
    }

    /// Discards the failed session and uploads the same file again from
    /// byte zero under a new reservation.
    pub async fn restart(&mut self) -> Result<RunStatus, UploadError> {
        self.expect_state("restart", RunState::AwaitingRestart)?;
        info!(index = self.current_index, "restarting upload");
        self.discard_session().await;
        self.progress.restart_file();
        self.process().await
    }

    /// Abandons the run, releasing the reservation of the current session.
    ///
    /// Used when the host surface goes away while the run waits for a
    /// decision; the partial upload is unreachable afterwards. A no-op when
    /// no run is active.
    pub async fn abort(&mut self) -> Result<(), UploadError> {
        if !self.state.is_active() {
            return Ok(());
        }
        let index = self.current_index;
        info!(index, state = ?self.state, "aborting upload");
        self.discard_session().await;
        self.emit(HostEvent::UploadAborted { index }).await;
        self.reset();
        Ok(())
    }

    fn expect_state(&self, action: &'static str, expected: RunState) -> Result<(), UploadError> {
        if self.state != expected {
            return Err(UploadError::InvalidState {
                action,
                state: self.state,
            });
        }
        Ok(())
    }

    async fn process(&mut self) -> Result<RunStatus, UploadError> {
        self.state = RunState::Running;

        loop {
            if self.current_index >= self.selection.len() {
                return Ok(self.finish().await);
            }

            let request = self.prepare_request()?;
            match self.drive(request).await? {
                DriveOutcome::Completed {
                    record_id,
                    checksum,
                } => {
                    self.progress.settle_file();
                    self.emit_progress().await;
                    let finished = self.advance()?;
                    info!(
                        index = finished.file_index(),
                        file = %finished.file().name,
                        record = %record_id,
                        "file uploaded"
                    );
                    self.emit(HostEvent::ItemComplete {
                        index: finished.file_index(),
                        name: finished.file().name.clone(),
                        record_id,
                        checksum,
                    })
                    .await;
                }
                DriveOutcome::Failed { kind, message } => {
                    let index = self.current_index;
                    self.state = match kind {
                        FailureKind::Resumable => RunState::AwaitingResume,
                        FailureKind::Fatal => RunState::AwaitingRestart,
                    };
                    warn!(index, kind = ?kind, error = %message, "upload halted");
                    self.emit(HostEvent::UploadError {
                        index,
                        kind,
                        message: message.clone(),
                    })
                    .await;
                    return Ok(RunStatus::Halted {
                        index,
                        kind,
                        message,
                    });
                }
                DriveOutcome::Cancelled => {
                    let index = self.current_index;
                    info!(index, "upload cancelled");
                    self.discard_session().await;
                    self.emit(HostEvent::UploadAborted { index }).await;
                    self.reset();
                    self.cancel = CancellationToken::new();
                    return Ok(RunStatus::Aborted { index });
                }
            }
        }
    }

    /// Fills the session slot for the current index if it is empty and
    /// returns the request that drives it.
    fn prepare_request(&mut self) -> Result<TransferRequest, UploadError> {
        let index = self.current_index;

        if self.session.is_none() {
            let file = self
                .selection
                .get(index)
                .cloned()
                .ok_or(UploadError::NoSession(index))?;
            let target = self
                .target
                .as_ref()
                .ok_or(UploadError::InvalidState {
                    action: "process",
                    state: self.state,
                })?
                .resolve(&file);
            debug!(index, file = %file.name, size = file.size, "new session");
            self.progress.begin_file(file.size);
            self.session = Some(UploadSession::new(index, file, target));
        }

        let Some(session) = self.session.as_mut() else {
            return Err(UploadError::NoSession(index));
        };
        match session.state() {
            SessionState::Pending => session.begin(),
            SessionState::ErrorResumable => {
                let request = session.resume()?;
                self.progress.resume_file();
                Ok(request)
            }
            state => Err(UploadError::InvalidSession {
                action: "drive",
                state,
            }),
        }
    }

    /// Runs one agent call for the current session until it reaches a
    /// terminal step or the run is cancelled.
    async fn drive(&mut self, request: TransferRequest) -> Result<DriveOutcome, UploadError> {
        let agent = Arc::clone(&self.agent);
        let cancel = self.cancel.clone();
        let (tx, mut rx) = mpsc::channel(TRANSFER_EVENT_BUFFER);
        let mut transfer = agent.begin_or_resume(request, tx);
        let mut agent_done = false;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Ok(DriveOutcome::Cancelled),

                event = rx.recv() => {
                    let index = self.current_index;
                    let session = self.session.as_mut().ok_or(UploadError::NoSession(index))?;
                    let Some(event) = event else {
                        // The agent hung up without a terminal event.
                        let state = session.state();
                        let step = session.interrupted();
                        return match self.handle_step(step).await {
                            Some(outcome) => Ok(outcome),
                            None => Err(UploadError::InvalidSession { action: "drive", state }),
                        };
                    };
                    trace!(index, event = ?event, "transfer event");
                    let step = session.apply(event);
                    if let Some(outcome) = self.handle_step(step).await {
                        return Ok(outcome);
                    }
                }

                _ = &mut transfer, if !agent_done => agent_done = true,
            }
        }
    }

    /// Routes a session step to the progress aggregator and returns the
    /// outcome if the step ended the agent call.
    async fn handle_step(&mut self, step: SessionStep) -> Option<DriveOutcome> {
        match step {
            SessionStep::Reserved | SessionStep::Ignored => None,
            SessionStep::Acknowledged { bytes } => {
                self.progress.acknowledge(bytes);
                self.emit_progress().await;
                None
            }
            SessionStep::Progress { position } => {
                self.progress.observe(position);
                self.emit_progress().await;
                None
            }
            SessionStep::Completed {
                record_id,
                checksum,
            } => Some(DriveOutcome::Completed {
                record_id,
                checksum,
            }),
            SessionStep::Failed { kind, message } => Some(DriveOutcome::Failed { kind, message }),
        }
    }

    /// Moves past a completed session and returns it.
    ///
    /// Only valid right after a `Complete` event; any other session state is
    /// rejected and left in the slot.
    fn advance(&mut self) -> Result<UploadSession, UploadError> {
        match self.session.take() {
            Some(session) if session.state() == SessionState::Completed => {
                self.progress.complete_file();
                self.current_index += 1;
                Ok(session)
            }
            Some(session) => {
                let state = session.state();
                self.session = Some(session);
                Err(UploadError::InvalidSession {
                    action: "advance past",
                    state,
                })
            }
            None => Err(UploadError::NoSession(self.current_index)),
        }
    }

    async fn finish(&mut self) -> RunStatus {
        info!(
            files = self.selection.len(),
            total_bytes = self.selection.total_size(),
            "upload finished"
        );
        self.emit(HostEvent::UploadFinished {
            file_count: self.selection.len(),
            total_size: self.selection.total_size(),
        })
        .await;
        self.reset();
        RunStatus::Finished
    }

    /// Empties the session slot, releasing any reservation it holds.
    async fn discard_session(&mut self) {
        if let Some(mut session) = self.session.take()
            && let Some(reservation) = session.discard()
        {
            self.release(reservation).await;
        }
        self.progress.discard_file();
    }

    async fn release(&self, reservation: Reservation) {
        match self.agent.abort(reservation.clone()).await {
            Ok(()) => debug!(reservation = %reservation, "reservation released"),
            Err(e) => warn!(reservation = %reservation, error = %e, "failed to release reservation"),
        }
    }

    fn reset(&mut self) {
        self.state = RunState::Idle;
        self.session = None;
        self.target = None;
    }

    async fn emit_progress(&self) {
        if let Some(snapshot) = self.snapshot() {
            self.emit(HostEvent::Progress(snapshot)).await;
        }
    }

    async fn emit(&self, event: HostEvent) {
        if self.events_rx.is_some() {
            trace!(event = ?event, "no host listening, dropping event");
            return;
        }
        let _ = self.events_tx.send(event).await;
    }
}
