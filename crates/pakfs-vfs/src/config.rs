//! VFS configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Result, VfsError};

/// Default extension of pak archives
pub const DEFAULT_PAK_EXTENSION: &str = "pak";

/// Default extension of IoStore tables of contents
pub const DEFAULT_TOC_EXTENSION: &str = "utoc";

/// Prefix stripped from archive mount points
pub const DEFAULT_MOUNT_PREFIX: &str = "../../../";

/// Configuration for the virtual file system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Directories scanned for archives
    pub directories: Vec<PathBuf>,

    /// Descend into subdirectories during discovery
    pub recursive: bool,

    /// Extension of pak archives, without the dot
    pub pak_extension: String,

    /// Extension of IoStore tables of contents, without the dot
    pub toc_extension: String,

    /// Prefix removed from mount points before paths are resolved
    pub mount_prefix: String,

    /// Worker threads for decode and mount work (0 uses all cores)
    pub worker_threads: usize,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            recursive: false,
            pak_extension: DEFAULT_PAK_EXTENSION.to_string(),
            toc_extension: DEFAULT_TOC_EXTENSION.to_string(),
            mount_prefix: DEFAULT_MOUNT_PREFIX.to_string(),
            worker_threads: 0,
        }
    }
}

impl VfsConfig {
    /// Create a configuration scanning a single directory
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directories: vec![directory.into()],
            ..Default::default()
        }
    }

    /// Add a directory to scan
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directories.push(directory.into());
        self
    }

    /// Enable or disable recursive discovery
    #[must_use]
    pub const fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set the number of worker threads
    #[must_use]
    pub const fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the prefix stripped from mount points
    #[must_use]
    pub fn with_mount_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.mount_prefix = prefix.into();
        self
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            VfsError::Config(format!("Cannot read config {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            VfsError::Config(format!("Cannot parse config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, extension) in [
            ("pak_extension", &self.pak_extension),
            ("toc_extension", &self.toc_extension),
        ] {
            if extension.is_empty() {
                return Err(VfsError::Config(format!("{name} must not be empty")));
            }
            if extension.starts_with('.') {
                return Err(VfsError::Config(format!(
                    "{name} must not start with a dot: {extension}"
                )));
            }
        }

        if self.pak_extension.eq_ignore_ascii_case(&self.toc_extension) {
            return Err(VfsError::Config(
                "pak_extension and toc_extension must differ".to_string(),
            ));
        }

        Ok(())
    }

    /// Normalize a mount point read from an archive index
    ///
    /// The configured prefix and any leading slash are removed, and a
    /// non-empty result always ends with `/`.
    ///
    /// ```
    /// use pakfs_vfs::VfsConfig;
    ///
    /// let config = VfsConfig::default();
    /// assert_eq!(config.normalize_mount_point("../../../Game/Content"), "Game/Content/");
    /// assert_eq!(config.normalize_mount_point("../../../"), "");
    /// assert_eq!(config.normalize_mount_point("/"), "");
    /// ```
    pub fn normalize_mount_point(&self, raw: &str) -> String {
        let stripped = if self.mount_prefix.is_empty() {
            raw
        } else {
            raw.strip_prefix(self.mount_prefix.as_str()).unwrap_or(raw)
        };

        let mut mount = stripped.trim_start_matches('/').to_string();
        if !mount.is_empty() && !mount.ends_with('/') {
            mount.push('/');
        }
        mount
    }
}
