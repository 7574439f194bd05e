//! Persists rendered inventories.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Errors raised while writing an inventory file.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum WriteError {
    /// The target path has no file name component.
    #[error("inventory path {path} is missing a file name")]
    MissingFileName {
        /// Offending path.
        path: String,
    },
    /// Filesystem failure.
    #[error("failed to write inventory to {path}: {message}")]
    Io {
        /// Path being written.
        path: String,
        /// Operating system error string.
        message: String,
    },
}

/// Destination for rendered inventory text.
pub trait InventoryWriter {
    /// Writes `content` to `path`; a `None` path persists nothing.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`] when the file cannot be written.
    fn write(&self, path: Option<&Utf8Path>, content: &str) -> Result<(), WriteError>;
}

/// Writes inventories to the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileInventoryWriter;

impl InventoryWriter for FileInventoryWriter {
    fn write(&self, path: Option<&Utf8Path>, content: &str) -> Result<(), WriteError> {
        let Some(target) = path else {
            return Ok(());
        };
        let parent = target
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let file_name = target
            .file_name()
            .ok_or_else(|| WriteError::MissingFileName {
                path: target.to_string(),
            })?;

        let dir =
            Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| WriteError::Io {
                path: parent.to_string(),
                message: err.to_string(),
            })?;
        dir.write(file_name, content).map_err(|err| WriteError::Io {
            path: target.to_string(),
            message: err.to_string(),
        })
    }
}
