//! Resource layers: where servers documents are read from and written to.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::paths::Paths;

/// One source document in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLayer {
    /// Label used in reports and logs (usually a path).
    pub name: String,
    /// `None` when the layer has nothing to offer; the registry skips it.
    pub content: Option<String>,
    pub writable: bool,
}

/// Read/write access to the layered servers resources.
pub trait ResourceStore {
    /// All layers, highest priority first.
    fn layers(&self) -> Vec<ResourceLayer>;

    /// Current writable content, or `default_content` when none exists yet.
    fn writable_content(&self, default_content: &str) -> String;

    /// Rebind the in-memory writable content. `layers()` reflects it from now on.
    fn set_writable_content(&mut self, content: String);

    /// Persist the writable content.
    fn write_writable(&mut self) -> Result<(), ResourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("No writable resource configured")]
    NoWritable,
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// File-backed layers: one writable user file plus read-only files.
#[derive(Debug, Clone)]
pub struct FileResources {
    writable: Option<PathBuf>,
    read_only: Vec<PathBuf>,
    pending: Option<String>,
}

impl FileResources {
    pub fn new(writable: Option<PathBuf>, read_only: Vec<PathBuf>) -> Self {
        Self {
            writable,
            read_only,
            pending: None,
        }
    }

    /// User file (writable), configured extra layers, then the system defaults.
    pub fn from_paths(paths: &Paths, config: &Config) -> Self {
        let mut read_only = config.extra_layers.clone();
        read_only.push(paths.system_servers_path().to_path_buf());
        Self::new(Some(paths.user_servers_path().to_path_buf()), read_only)
    }
}

impl ResourceStore for FileResources {
    fn layers(&self) -> Vec<ResourceLayer> {
        let mut layers = Vec::new();
        if let Some(ref path) = self.writable {
            let content = self.pending.clone().or_else(|| read_layer_file(path));
            layers.push(ResourceLayer {
                name: path.display().to_string(),
                content,
                writable: true,
            });
        }
        for path in &self.read_only {
            layers.push(ResourceLayer {
                name: path.display().to_string(),
                content: read_layer_file(path),
                writable: false,
            });
        }
        layers
    }

    fn writable_content(&self, default_content: &str) -> String {
        self.pending
            .clone()
            .or_else(|| self.writable.as_deref().and_then(read_layer_file))
            .unwrap_or_else(|| default_content.to_string())
    }

    fn set_writable_content(&mut self, content: String) {
        self.pending = Some(content);
    }

    fn write_writable(&mut self) -> Result<(), ResourceError> {
        let path = self.writable.clone().ok_or(ResourceError::NoWritable)?;
        let content = self.pending.clone().unwrap_or_default();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ResourceError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        std::fs::write(&path, content).map_err(|source| ResourceError::WriteFailed { path, source })
    }
}

fn read_layer_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(c) if !c.trim().is_empty() => Some(c),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Layer not readable");
            None
        }
    }
}

/// In-memory layers for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryResources {
    /// Persisted writable content; only updated by a successful write.
    pub stored: Option<String>,
    /// Content bound by `set_writable_content`, not yet written.
    pub pending: Option<String>,
    pub read_only: Vec<(String, Option<String>)>,
    /// When set, `write_writable` fails.
    pub fail_writes: bool,
    has_writable: bool,
}

impl MemoryResources {
    /// A store whose writable layer starts with `stored`.
    pub fn with_writable(stored: Option<&str>) -> Self {
        Self {
            stored: stored.map(String::from),
            has_writable: true,
            ..Self::default()
        }
    }

    /// Append a read-only layer after any already present.
    pub fn push_layer(mut self, name: &str, content: Option<&str>) -> Self {
        self.read_only.push((name.to_string(), content.map(String::from)));
        self
    }
}

impl ResourceStore for MemoryResources {
    fn layers(&self) -> Vec<ResourceLayer> {
        let mut layers = Vec::new();
        if self.has_writable {
            layers.push(ResourceLayer {
                name: "memory:writable".to_string(),
                content: self.pending.clone().or_else(|| self.stored.clone()),
                writable: true,
            });
        }
        for (name, content) in &self.read_only {
            layers.push(ResourceLayer {
                name: name.clone(),
                content: content.clone(),
                writable: false,
            });
        }
        layers
    }

    fn writable_content(&self, default_content: &str) -> String {
        self.pending
            .clone()
            .or_else(|| self.stored.clone())
            .unwrap_or_else(|| default_content.to_string())
    }

    fn set_writable_content(&mut self, content: String) {
        self.pending = Some(content);
    }

    fn write_writable(&mut self) -> Result<(), ResourceError> {
        if !self.has_writable {
            return Err(ResourceError::NoWritable);
        }
        if self.fail_writes {
            return Err(ResourceError::WriteFailed {
                path: PathBuf::from("memory:writable"),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "writes disabled",
                ),
            });
        }
        self.stored = self.pending.clone();
        Ok(())
    }
}
