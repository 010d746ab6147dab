//! Atomic JSON document persistence.
//!
//! Mutation durability contract: serialize to `<target>.tmp` in the same
//! directory, fsync the temp file, rename over the target. Readers either
//! see the previous document or the new one, never a torn write.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StoreError, StoreResult};

/// Write a JSON document atomically.
///
/// # Errors
///
/// Returns `StoreError::Io` when the temp file cannot be created, written,
/// synced, or renamed, and `StoreError::Codec` when encoding fails.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Codec {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let tmp_path = path.with_extension("tmp");
    let io_err = |source| StoreError::Io {
        path: tmp_path.clone(),
        source,
    };

    let mut file = File::create(&tmp_path).map_err(io_err)?;
    file.write_all(&json).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a JSON document, returning `None` when the file does not exist.
///
/// # Errors
///
/// Returns `StoreError::Io` on read failures other than absence and
/// `StoreError::Codec` when the document cannot be parsed.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|source| StoreError::Codec {
            path: path.to_path_buf(),
            source,
        })
}
