//! Legacy server list (one `host/group` per line).

use std::path::{Path, PathBuf};

/// Load legacy entries. A missing file gives an empty list.
pub fn read_legacy_servers(path: &Path) -> Result<Vec<String>, LegacyError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(source) => {
            return Err(LegacyError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    Ok(content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Delete the legacy list once its entries have been migrated.
pub fn remove_legacy(path: &Path) -> Result<(), LegacyError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LegacyError::RemoveFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LegacyError {
    #[error("Failed to read legacy servers {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to remove legacy servers {}: {source}", .path.display())]
    RemoveFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}
