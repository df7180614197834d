//! Directory-backed Transfer Agent.
//!
//! Folders are directories under the store root and records are files.
//! Every transfer first reserves a partial file under `.reservations/`,
//! writes chunks into it at exact offsets, and on completion moves it onto
//! the final record path in one rename.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uplink_protocol::{Reservation, TransferEvent, TransferTarget};

use crate::agent::{AgentFuture, TransferAgent};
use crate::chunked::{ChunkReader, ChunkWriter, calculate_file_checksum};
use crate::types::TransferRequest;
use crate::validation::validate_store_path;
use crate::{DEFAULT_CHUNK_SIZE, RESERVATIONS_DIR, TransferError};

/// Tuning for [`LocalStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalStoreOptions {
    /// Bytes per chunk; 0 means [`DEFAULT_CHUNK_SIZE`].
    pub chunk_size: usize,
    /// Checksum every chunk and verify it before writing.
    pub verify_checksums: bool,
}

impl Default for LocalStoreOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            verify_checksums: true,
        }
    }
}

/// A Transfer Agent that stores records in a local directory tree.
pub struct LocalStore {
    root: PathBuf,
    options: LocalStoreOptions,
}

impl LocalStore {
    /// Creates a store rooted at `root`. The directory must already exist.
    pub fn new(root: impl Into<PathBuf>, options: LocalStoreOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    /// Returns the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the on-disk path of a reservation.
    pub fn reservation_path(&self, reservation: &Reservation) -> Result<PathBuf, TransferError> {
        let id = reservation.as_str();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(TransferError::UnknownReservation(id.to_string()));
        }
        Ok(self.root.join(RESERVATIONS_DIR).join(id))
    }

    /// Resolves the final path and record id for a transfer target.
    fn resolve(&self, target: &TransferTarget) -> Result<(PathBuf, String), TransferError> {
        match target {
            TransferTarget::CreateIn { folder_id, name } => {
                validate_store_path(folder_id)?;
                validate_store_path(name)?;
                let folder = self.root.join(folder_id);
                if !folder.is_dir() {
                    return Err(TransferError::UnknownRecord(folder_id.clone()));
                }
                let record_id = format!("{}/{name}", folder_id.trim_end_matches('/'));
                Ok((folder.join(name), record_id))
            }
            TransferTarget::Overwrite { file_id } => {
                validate_store_path(file_id)?;
                let path = self.root.join(file_id);
                if !path.is_file() {
                    return Err(TransferError::UnknownRecord(file_id.clone()));
                }
                Ok((path, file_id.clone()))
            }
        }
    }

    /// Obtains the reservation for a request: a new one for a fresh
    /// transfer, or the existing one cut back to `start_byte` for a resume.
    async fn reserve(
        &self,
        request: &TransferRequest,
    ) -> Result<(Reservation, ChunkWriter), TransferError> {
        self.resolve(&request.target)?;

        match &request.reservation {
            Some(reservation) => {
                let path = self.reservation_path(reservation)?;
                let mut writer = match ChunkWriter::open(&path).await {
                    Ok(w) => w,
                    Err(TransferError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                        return Err(TransferError::UnknownReservation(
                            reservation.to_string(),
                        ));
                    }
                    Err(e) => return Err(e),
                };
                if writer.written() < request.start_byte {
                    return Err(TransferError::ResumeOffset {
                        requested: request.start_byte,
                        committed: writer.written(),
                    });
                }
                writer.truncate(request.start_byte).await?;
                Ok((reservation.clone(), writer))
            }
            None => {
                if request.start_byte != 0 {
                    return Err(TransferError::ResumeOffset {
                        requested: request.start_byte,
                        committed: 0,
                    });
                }
                let reservation = Reservation(uuid::Uuid::new_v4().simple().to_string());
                let path = self.reservation_path(&reservation)?;
                tokio::fs::create_dir_all(self.root.join(RESERVATIONS_DIR)).await?;
                tokio::fs::File::create(&path).await?;
                let writer = ChunkWriter::open(&path).await?;
                Ok((reservation, writer))
            }
        }
    }

    /// Streams the file from `start_byte` into the reservation and commits it.
    async fn transfer(
        &self,
        request: &TransferRequest,
        mut writer: ChunkWriter,
        events: &mpsc::Sender<TransferEvent>,
    ) -> Result<TransferEvent, TransferError> {
        let (final_path, record_id) = self.resolve(&request.target)?;
        let total = request.file.size;

        let mut reader = ChunkReader::open(&request.file.source, self.options.chunk_size)
            .await?
            .with_checksums(self.options.verify_checksums);
        if reader.file_size() != total {
            return Err(TransferError::SourceChanged {
                expected: total,
                actual: reader.file_size(),
            });
        }
        reader.seek_to(request.start_byte).await?;

        while let Some(chunk) = reader.next_chunk().await? {
            send(
                events,
                TransferEvent::Progress {
                    start_byte: chunk.offset,
                    loaded: 0,
                    total,
                },
            )
            .await?;

            writer.write_chunk(&chunk).await?;

            send(
                events,
                TransferEvent::Progress {
                    start_byte: chunk.offset,
                    loaded: chunk.size as u64,
                    total,
                },
            )
            .await?;
            send(
                events,
                TransferEvent::ChunkSent {
                    bytes: chunk.size as u64,
                },
            )
            .await?;
        }

        if writer.written() != total {
            return Err(TransferError::SourceChanged {
                expected: total,
                actual: writer.written(),
            });
        }
        writer.sync().await?;

        let checksum = calculate_file_checksum(writer.path()).await?;
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(writer.path(), &final_path).await?;
        info!(record = %record_id, bytes = total, "record committed");

        Ok(TransferEvent::Complete {
            record_id,
            checksum: Some(checksum),
        })
    }
}

async fn send(
    events: &mpsc::Sender<TransferEvent>,
    event: TransferEvent,
) -> Result<(), TransferError> {
    events.send(event).await.map_err(|_| TransferError::Cancelled)
}

impl TransferAgent for LocalStore {
    fn begin_or_resume(
        &self,
        request: TransferRequest,
        events: mpsc::Sender<TransferEvent>,
    ) -> AgentFuture<'_, ()> {
        Box::pin(async move {
            let (reservation, writer) = match self.reserve(&request).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(file = %request.file.name, error = %e, "could not reserve upload");
                    let _ = events
                        .send(TransferEvent::ErrorStarting {
                            message: e.to_string(),
                        })
                        .await;
                    return;
                }
            };

            debug!(
                file = %request.file.name,
                reservation = %reservation,
                start_byte = request.start_byte,
                resume = request.is_resume(),
                "transfer reserved"
            );
            if send(&events, TransferEvent::Reserved { reservation })
                .await
                .is_err()
            {
                return;
            }

            let terminal = match self.transfer(&request, writer, &events).await {
                Ok(complete) => complete,
                Err(TransferError::Cancelled) => return,
                Err(e) => {
                    warn!(file = %request.file.name, error = %e, "transfer interrupted");
                    TransferEvent::Error {
                        message: e.to_string(),
                    }
                }
            };
            let _ = events.send(terminal).await;
        })
    }

    fn abort(&self, reservation: Reservation) -> AgentFuture<'_, Result<(), TransferError>> {
        Box::pin(async move {
            let path = self.reservation_path(&reservation)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    info!(reservation = %reservation, "reservation released");
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}
