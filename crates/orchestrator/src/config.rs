//! Uploader configuration.
//!
//! Read from a JSON file whose fields are all optional; anything missing
//! falls back to the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uplink_transfer::{DEFAULT_CHUNK_SIZE, LocalStoreOptions};

use crate::error::UploadError;

/// Default capacity of the host event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Settings for one [`Sequencer`](crate::Sequencer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UploaderConfig {
    /// `start` only validates and signals `UploadStarted`; the host calls
    /// `run` itself when it is ready.
    pub override_start: bool,

    /// Capacity of the host event channel.
    pub event_buffer: usize,

    /// Chunk size used by the local store agent.
    pub chunk_size: usize,

    /// Checksum every chunk before it is written.
    pub verify_checksums: bool,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            override_start: false,
            event_buffer: DEFAULT_EVENT_BUFFER,
            chunk_size: DEFAULT_CHUNK_SIZE,
            verify_checksums: true,
        }
    }
}

impl UploaderConfig {
    /// Loads configuration from `path`.
    ///
    /// A missing file yields the defaults. A file that cannot be parsed is
    /// logged and also yields the defaults.
    pub fn load(path: &Path) -> Result<Self, UploadError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        match Self::from_json(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse uploader config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    /// Parses configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, UploadError> {
        let mut config: Self = serde_json::from_str(content)?;
        if config.event_buffer == 0 {
            config.event_buffer = DEFAULT_EVENT_BUFFER;
        }
        Ok(config)
    }

    /// Options for a [`LocalStore`](uplink_transfer::LocalStore) built from
    /// this configuration.
    pub fn local_store_options(&self) -> LocalStoreOptions {
        LocalStoreOptions {
            chunk_size: self.chunk_size,
            verify_checksums: self.verify_checksums,
        }
    }
}
