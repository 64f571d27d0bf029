//! Context object tying keys, archives and workers together

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pakfs_crypto::{AesKey, KeyGuid, KeyRing};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::info;

use crate::archive::ArchiveInfo;
use crate::config::VfsConfig;
use crate::mount::{DiscoverySummary, MountManager};
use crate::reader::FileHandle;
use crate::{Result, VfsError};

/// Virtual file system over pak archives
///
/// A `Vfs` owns the key ring, the archive sets and the worker pool used for
/// mounting and block decoding. It is `Send + Sync`; share it behind an
/// [`Arc`] to read from several threads.
pub struct Vfs {
    config: VfsConfig,
    keys: Arc<KeyRing>,
    pool: Arc<ThreadPool>,
    mounts: MountManager,
}

impl Vfs {
    /// Create a VFS with no archives
    pub fn new(config: VfsConfig) -> Result<Self> {
        config.validate()?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("pakfs-worker-{i}"))
            .build()
            .map_err(|e| VfsError::Config(format!("Cannot start worker pool: {e}")))?;
        let pool = Arc::new(pool);
        let keys = Arc::new(KeyRing::new());

        info!(
            "Created VFS with {} worker threads over {} directories",
            pool.current_num_threads(),
            config.directories.len()
        );

        Ok(Self {
            mounts: MountManager::new(config.clone(), Arc::clone(&keys), Arc::clone(&pool)),
            config,
            keys,
            pool,
        })
    }

    /// Configuration in use
    pub const fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// Registered keys
    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    /// Number of worker threads
    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Mount manager
    pub const fn mounts(&self) -> &MountManager {
        &self.mounts
    }

    /// Scan the configured directories
    pub fn discover_configured(&self) -> DiscoverySummary {
        self.mounts.discover(self.config.directories.as_slice())
    }

    /// Scan additional directories
    pub fn discover<P: AsRef<Path>>(&self, directories: &[P]) -> DiscoverySummary {
        self.mounts.discover(directories)
    }

    /// Mount every archive that has its key or needs none
    pub fn mount_all(&self) -> usize {
        self.mounts.mount_all()
    }

    /// Register keys and mount archives waiting for them
    pub fn submit_keys(&self, keys: HashMap<KeyGuid, AesKey>) -> usize {
        self.mounts.submit_keys(keys)
    }

    /// Open a file by logical path
    pub fn open(&self, logical_path: &str) -> Result<FileHandle> {
        self.mounts.open(logical_path)
    }

    /// Read a whole file by logical path
    pub fn read_file(&self, logical_path: &str) -> Result<Vec<u8>> {
        self.open(logical_path)?.read_all()
    }

    /// Whether a logical path resolves to a mounted file
    pub fn exists(&self, logical_path: &str) -> bool {
        self.open(logical_path).is_ok()
    }

    /// Summaries of every known archive
    pub fn archives(&self) -> Vec<ArchiveInfo> {
        self.mounts.archives()
    }

    /// Keys that unloaded archives are waiting for
    pub fn required_keys(&self) -> HashMap<KeyGuid, Vec<PathBuf>> {
        self.mounts.required_keys()
    }

    /// Keys that failed the index check of every archive they unlocked
    pub fn rejected_keys(&self) -> Vec<KeyGuid> {
        self.mounts.rejected_keys()
    }
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("config", &self.config)
            .field("workers", &self.pool.current_num_threads())
            .field("mounts", &self.mounts)
            .finish_non_exhaustive()
    }
}
