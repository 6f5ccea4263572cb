//! File persistence with the serialization format selected by extension.
//!
//! `.json` files are read and written as JSON, `.data` files with a compact
//! binary encoding. All access is serialized through a process-wide lock so
//! concurrent savers never interleave partial writes.

use std::fs;
use std::path::Path;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::result::AppResult;

static FILE_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Serialization format chosen from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `.json`
    Json,
    /// `.data`
    Binary,
}

impl FileFormat {
    /// Returns the format for `path`, or `None` for unknown extensions.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(Self::Json),
            Some("data") => Some(Self::Binary),
            _ => None,
        }
    }
}

/// Checks whether `path` exists, optionally creating it (and its parent
/// directories) as an empty file.
pub fn exists(path: &Path, create: bool) -> AppResult<bool> {
    let _guard = FILE_LOCK.lock();
    exists_locked(path, create)
}

fn exists_locked(path: &Path, create: bool) -> AppResult<bool> {
    if path.as_os_str().is_empty() {
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            if !create {
                return Ok(false);
            }
            fs::create_dir_all(parent)?;
        }
    }

    if path.exists() {
        return Ok(true);
    }
    if !create {
        return Ok(false);
    }

    fs::File::create(path)?;
    Ok(true)
}

/// Loads a value from `path`.
///
/// Missing, empty or undecodable files yield `T::default()`.
pub fn load<T>(path: impl AsRef<Path>) -> T
where
    T: DeserializeOwned + Default,
{
    let path = path.as_ref();
    match try_load(path) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to load file, using default value");
            T::default()
        }
    }
}

fn try_load<T: DeserializeOwned>(path: &Path) -> AppResult<Option<T>> {
    let format = FileFormat::from_path(path).ok_or_else(|| {
        AppError::validation(format!("Unsupported file extension: {}", path.display()))
    })?;

    let _guard = FILE_LOCK.lock();
    if !exists_locked(path, false)? {
        return Ok(None);
    }

    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        return Ok(None);
    }

    let value = match format {
        FileFormat::Json => serde_json::from_slice(&bytes)?,
        FileFormat::Binary => bincode::deserialize(&bytes)?,
    };
    Ok(Some(value))
}

/// Saves `value` to `path`, creating parent directories as needed.
pub fn save<T: Serialize>(path: impl AsRef<Path>, value: &T) -> AppResult<()> {
    let path = path.as_ref();
    let format = FileFormat::from_path(path).ok_or_else(|| {
        AppError::validation(format!("Unsupported file extension: {}", path.display()))
    })?;

    let bytes = match format {
        FileFormat::Json => serde_json::to_vec_pretty(value)?,
        FileFormat::Binary => bincode::serialize(value)?,
    };

    let _guard = FILE_LOCK.lock();
    exists_locked(path, true)?;
    fs::write(path, bytes)?;

    debug!(path = %path.display(), "File saved");
    Ok(())
}
