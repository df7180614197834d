//! The batch of files chosen for one upload run.
//!
//! Insertion order is upload order. The aggregate size is computed once
//! when the set is built, so the total used for overall percentages is
//! always the sum of the sizes captured at selection time.

use std::path::Path;

use serde::Serialize;
use uplink_protocol::FileDescriptor;

use crate::error::UploadError;

/// Ordered, immutable set of files plus their total size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSet {
    files: Vec<FileDescriptor>,
    total_size: u64,
}

impl SelectionSet {
    /// Builds a selection in the given order.
    pub fn new(files: Vec<FileDescriptor>) -> Self {
        let total_size = files.iter().map(|f| f.size).sum();
        Self { files, total_size }
    }

    /// Captures descriptors for the given paths, keeping their order.
    pub fn from_paths<I, P>(paths: I) -> Result<Self, UploadError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let files = paths
            .into_iter()
            .map(|p| FileDescriptor::from_path(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(files))
    }

    /// Scans a dropped directory recursively.
    ///
    /// Names are paths relative to `root` with `/` as separator (even on
    /// Windows). Entries are visited in name order so repeated scans of the
    /// same tree upload in the same order.
    pub fn scan_dir(root: &Path) -> Result<Self, UploadError> {
        let mut files = Vec::new();
        walk_dir(root, root, &mut files)?;
        Ok(Self::new(files))
    }

    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    pub fn get(&self, index: usize) -> Option<&FileDescriptor> {
        self.files.get(index)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// An empty set means "nothing selected".
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of all file sizes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }
}

fn walk_dir(root: &Path, current: &Path, files: &mut Vec<FileDescriptor>) -> Result<(), UploadError> {
    let mut entries = std::fs::read_dir(current)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            walk_dir(root, &path, files)?;
        } else if metadata.is_file() {
            let rel_path = path.strip_prefix(root).map_err(std::io::Error::other)?;
            let name = rel_path.to_string_lossy().replace('\\', "/");
            files.push(FileDescriptor::new(name, metadata.len(), path));
        }
    }

    Ok(())
}
