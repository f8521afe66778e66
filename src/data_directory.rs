//! Data directory resolution
//!
//! CA databases live in a per-user application data directory resolved via
//! the `directories` crate (e.g. `~/.local/share/devpki` on Linux,
//! `~/Library/Application Support/devpki` on macOS). An explicit path from
//! the CLI or configuration takes precedence.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{DevPkiError, Result};

const APPLICATION_NAME: &str = "devpki";

#[derive(Debug, Clone)]
pub struct DataDirectory {
    path: PathBuf,
}

impl DataDirectory {
    /// Use `path` as the data directory, creating it if needed
    pub fn at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|e| {
            DevPkiError::RecordStore(format!(
                "Failed to create data directory {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { path })
    }

    /// Explicit override if given, platform default otherwise
    pub fn resolve(override_path: Option<&Path>) -> Result<Self> {
        Self::at(Self::locate(override_path, None)?)
    }

    /// Path the data directory would have, without creating anything
    ///
    /// An explicit override wins over a configured path, which wins over the
    /// platform default.
    pub fn locate(override_path: Option<&Path>, configured: Option<&Path>) -> Result<PathBuf> {
        match override_path.or(configured) {
            Some(path) => Ok(path.to_path_buf()),
            None => platform_default_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn absolute_path_for(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }
}

fn platform_default_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", APPLICATION_NAME).ok_or_else(|| {
        DevPkiError::RecordStore("Unable to determine a home directory".to_string())
    })?;
    Ok(dirs.data_dir().to_path_buf())
}
