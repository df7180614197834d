use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::types::Chunk;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub async fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a local file in fixed-size chunks, optionally checksumming each one.
pub struct ChunkReader {
    file: File,
    chunk_size: usize,
    offset: u64,
    file_size: u64,
    checksums: bool,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = File::open(path).await?;
        let file_size = file.metadata().await?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size,
            checksums: true,
        })
    }

    /// Enables or disables per-chunk SHA-256 checksums.
    pub fn with_checksums(mut self, enabled: bool) -> Self {
        self.checksums = enabled;
        self
    }

    /// Seeks to the given byte offset (for resume).
    pub async fn seek_to(&mut self, offset: u64) -> Result<(), TransferError> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.offset = offset;
        Ok(())
    }

    /// Reads the next chunk. Returns `None` at EOF.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; read_size];
        let n = self.file.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);

        let checksum = if self.checksums {
            checksum_bytes(&buf)
        } else {
            String::new()
        };
        let chunk = Chunk {
            offset: self.offset,
            size: n,
            data: buf,
            checksum,
        };
        self.offset += n as u64;
        Ok(Some(chunk))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.offset)
    }
}

// ---------------------------------------------------------------------------
// ChunkWriter
// ---------------------------------------------------------------------------

/// Writes chunks into one reservation file at exact offsets.
pub struct ChunkWriter {
    path: PathBuf,
    file: File,
    written: u64,
}

impl ChunkWriter {
    /// Opens an existing reservation file without truncating it.
    pub async fn open(path: &Path) -> Result<Self, TransferError> {
        let file = OpenOptions::new()
            .write(true)
            .truncate(false)
            .open(path)
            .await?;
        let written = file.metadata().await?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written,
        })
    }

    /// Writes a chunk at its offset, verifying the checksum if non-empty.
    pub async fn write_chunk(&mut self, chunk: &Chunk) -> Result<(), TransferError> {
        if !chunk.checksum.is_empty() && checksum_bytes(&chunk.data) != chunk.checksum {
            return Err(TransferError::ChecksumMismatch);
        }

        self.file.seek(SeekFrom::Start(chunk.offset)).await?;
        self.file.write_all(&chunk.data).await?;
        self.file.flush().await?;

        self.written = self.written.max(chunk.end());
        Ok(())
    }

    /// Discards everything from `len` on, so a resumed transfer overwrites
    /// bytes that were never acknowledged.
    pub async fn truncate(&mut self, len: u64) -> Result<(), TransferError> {
        self.file.set_len(len).await?;
        self.written = len;
        Ok(())
    }

    /// Flushes file contents and metadata to disk.
    pub async fn sync(&mut self) -> Result<(), TransferError> {
        self.file.sync_all().await?;
        Ok(())
    }

    /// Highest byte offset written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Path of the reservation file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn checksum_bytes_deterministic() {
        let c1 = checksum_bytes(b"hello world");
        let c2 = checksum_bytes(b"hello world");
        assert_eq!(c1, c2);
        assert_eq!(c1.len(), 64);
        assert_ne!(c1, checksum_bytes(b"hello"));
    }

    #[tokio::test]
    async fn file_checksum_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let data = b"test content for checksum";
        let path = create_test_file(dir.path(), "test.bin", data);

        let file_cs = calculate_file_checksum(&path).await.unwrap();
        assert_eq!(file_cs, checksum_bytes(data));
    }

    #[tokio::test]
    async fn reader_reads_all_chunks() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert_eq!(reader.file_size(), 10);

        let c1 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!((c1.offset, c1.size), (0, 4));
        assert_eq!(&c1.data, b"AABB");
        assert!(!c1.checksum.is_empty());

        let c2 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c2.offset, 4);
        assert_eq!(&c2.data, b"CCDD");

        let c3 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c3.end(), 10);
        assert_eq!(&c3.data, b"EE");

        assert!(reader.next_chunk().await.unwrap().is_none());
        assert_eq!(reader.remaining(), 0);
    }

    #[tokio::test]
    async fn reader_seek_and_resume() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        reader.seek_to(6).await.unwrap();
        assert_eq!(reader.remaining(), 4);

        let c = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c.offset, 6);
        assert_eq!(&c.data, b"6789");
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reader_without_checksums() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"abc");

        let mut reader = ChunkReader::open(&path, 0).await.unwrap().with_checksums(false);
        let c = reader.next_chunk().await.unwrap().unwrap();
        assert!(c.checksum.is_empty());
        assert_eq!(c.size, 3);
    }

    #[tokio::test]
    async fn empty_file_has_no_chunks() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");
        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writer_writes_at_offset() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "out.bin", b"");
        let mut writer = ChunkWriter::open(&path).await.unwrap();

        let hello = Chunk {
            offset: 0,
            size: 5,
            data: b"Hello".to_vec(),
            checksum: String::new(),
        };
        let world = Chunk {
            offset: 5,
            size: 6,
            data: b" World".to_vec(),
            checksum: checksum_bytes(b" World"),
        };
        writer.write_chunk(&hello).await.unwrap();
        writer.write_chunk(&world).await.unwrap();
        writer.sync().await.unwrap();
        assert_eq!(writer.written(), 11);

        assert_eq!(std::fs::read(&path).unwrap(), b"Hello World");
    }

    #[tokio::test]
    async fn writer_rejects_bad_checksum() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "out.bin", b"");
        let mut writer = ChunkWriter::open(&path).await.unwrap();

        let chunk = Chunk {
            offset: 0,
            size: 4,
            data: b"data".to_vec(),
            checksum: "0".repeat(64),
        };
        let result = writer.write_chunk(&chunk).await;
        assert!(matches!(result, Err(TransferError::ChecksumMismatch)));
        assert_eq!(std::fs::read(&path).unwrap(), b"");
    }

    #[tokio::test]
    async fn writer_truncates_unacknowledged_tail() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "out.bin", b"0123456789");
        let mut writer = ChunkWriter::open(&path).await.unwrap();
        assert_eq!(writer.written(), 10);

        writer.truncate(4).await.unwrap();
        assert_eq!(writer.written(), 4);
        assert_eq!(std::fs::read(&path).unwrap(), b"0123");
    }

    #[tokio::test]
    async fn writer_requires_existing_file() {
        let dir = TempDir::new().unwrap();
        let result = ChunkWriter::open(&dir.path().join("missing.bin")).await;
        assert!(matches!(result, Err(TransferError::Io(_))));
    }
}
