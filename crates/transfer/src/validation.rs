use std::path::{Component, Path};

use crate::{RESERVATIONS_DIR, TransferError};

/// Validates a folder or record id before it is joined onto the store root.
///
/// Ids are relative, `/`-separated paths. Rejects:
/// - Empty ids
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Ids inside the reservation area
pub fn validate_store_path(id: &str) -> Result<(), TransferError> {
    if id.is_empty() {
        return Err(TransferError::InvalidPath("empty id".into()));
    }

    let path = Path::new(id);
    if path.is_absolute() {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {id}"
        )));
    }

    let mut first = true;
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {id}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "absolute path not allowed: {id}"
                )));
            }
            Component::Normal(name) => {
                if first && name == RESERVATIONS_DIR {
                    return Err(TransferError::InvalidPath(format!(
                        "reserved path not allowed: {id}"
                    )));
                }
                first = false;
            }
            Component::CurDir => {}
        }
    }

    Ok(())
}
