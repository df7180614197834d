use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A local file captured into a selection.
///
/// `name` and `size` are fixed at capture time; the Transfer Agent reads
/// the bytes from `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "path_is_empty")]
    pub source: PathBuf,
}

fn path_is_empty(p: &Path) -> bool {
    p.as_os_str().is_empty()
}

impl FileDescriptor {
    /// Creates a descriptor from already-known attributes.
    pub fn new(name: impl Into<String>, size: u64, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            size,
            source: source.into(),
        }
    }

    /// Captures a descriptor for a file on disk, using its file name and
    /// current length.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            size: metadata.len(),
            source: path.to_path_buf(),
        })
    }
}

/// Where the bytes of an upload run go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UploadTarget {
    /// A new record is created inside this folder for every file.
    Folder { id: String },
    /// The selected file replaces the contents of this record.
    ExistingFile { id: String },
}

impl UploadTarget {
    pub fn folder(id: impl Into<String>) -> Self {
        Self::Folder { id: id.into() }
    }

    pub fn existing_file(id: impl Into<String>) -> Self {
        Self::ExistingFile { id: id.into() }
    }

    /// Returns the container or record id.
    pub fn id(&self) -> &str {
        match self {
            Self::Folder { id } | Self::ExistingFile { id } => id,
        }
    }

    /// Returns `true` if every session writes into one fixed record.
    pub fn is_existing_file(&self) -> bool {
        matches!(self, Self::ExistingFile { .. })
    }

    /// Resolves the remote record a file's bytes go into.
    pub fn resolve(&self, file: &FileDescriptor) -> TransferTarget {
        match self {
            Self::Folder { id } => TransferTarget::CreateIn {
                folder_id: id.clone(),
                name: file.name.clone(),
            },
            Self::ExistingFile { id } => TransferTarget::Overwrite {
                file_id: id.clone(),
            },
        }
    }
}

/// Remote record descriptor handed to the Transfer Agent for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TransferTarget {
    /// Allocate a new record named `name` inside `folder_id`.
    CreateIn { folder_id: String, name: String },
    /// Reuse the fixed record `file_id`.
    Overwrite { file_id: String },
}

/// Remote-side handle identifying where a file's bytes are written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reservation(pub String);

impl Reservation {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Reservation {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Reservation {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_target_field_names() {
        let target = UploadTarget::folder("f1");
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, r#"{"kind":"folder","id":"f1"}"#);

        let parsed: UploadTarget =
            serde_json::from_str(r#"{"kind":"existingFile","id":"r9"}"#).unwrap();
        assert_eq!(parsed, UploadTarget::existing_file("r9"));
        assert!(parsed.is_existing_file());
        assert_eq!(parsed.id(), "r9");
    }

    #[test]
    fn folder_target_creates_record_per_file() {
        let target = UploadTarget::folder("photos");
        let file = FileDescriptor::new("a.png", 10, "/tmp/a.png");
        assert_eq!(
            target.resolve(&file),
            TransferTarget::CreateIn {
                folder_id: "photos".into(),
                name: "a.png".into(),
            }
        );
    }

    #[test]
    fn existing_file_target_reuses_record() {
        let target = UploadTarget::existing_file("doc.txt");
        let a = FileDescriptor::new("a.txt", 1, "/tmp/a.txt");
        let b = FileDescriptor::new("b.txt", 2, "/tmp/b.txt");
        assert_eq!(target.resolve(&a), target.resolve(&b));
    }

    #[test]
    fn file_descriptor_omits_empty_source() {
        let file = FileDescriptor::new("a.bin", 3, PathBuf::new());
        let json = serde_json::to_string(&file).unwrap();
        assert_eq!(json, r#"{"name":"a.bin","size":3}"#);
    }

    #[test]
    fn file_descriptor_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let file = FileDescriptor::from_path(&path).unwrap();
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.size, 5);
        assert_eq!(file.source, path);

        assert!(FileDescriptor::from_path(dir.path()).is_err());
    }

    #[test]
    fn transfer_target_field_names() {
        let t = TransferTarget::CreateIn {
            folder_id: "f".into(),
            name: "n".into(),
        };
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"folderId\":\"f\""));
        assert!(json.contains("\"mode\":\"createIn\""));
    }
}
