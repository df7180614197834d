use uplink_protocol::{FileDescriptor, Reservation, TransferTarget};

/// A chunk of file data read for transfer.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Byte offset within the file.
    pub offset: u64,
    /// Size of this chunk in bytes.
    pub size: usize,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// SHA-256 hex checksum of `data` (empty means no verification).
    pub checksum: String,
}

impl Chunk {
    /// Offset of the first byte after this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.size as u64
    }
}

/// One invocation of a Transfer Agent for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Remote record the bytes go into.
    pub target: TransferTarget,
    /// File being moved.
    pub file: FileDescriptor,
    /// First byte to send; nonzero only when resuming.
    pub start_byte: u64,
    /// Reservation from an earlier call of the same session (resume only).
    pub reservation: Option<Reservation>,
}

impl TransferRequest {
    /// A fresh transfer from byte zero with no reservation.
    pub fn begin(target: TransferTarget, file: FileDescriptor) -> Self {
        Self {
            target,
            file,
            start_byte: 0,
            reservation: None,
        }
    }

    /// Continues an interrupted transfer at `start_byte` under `reservation`.
    pub fn resume(
        target: TransferTarget,
        file: FileDescriptor,
        start_byte: u64,
        reservation: Reservation,
    ) -> Self {
        Self {
            target,
            file,
            start_byte,
            reservation: Some(reservation),
        }
    }

    /// Returns `true` if this request continues an earlier reservation.
    pub fn is_resume(&self) -> bool {
        self.reservation.is_some()
    }
}
