//! Virtual file system over pak archives.
//!
//! This crate discovers pak containers on disk, mounts them as keys become
//! available, and serves their files through one logical namespace:
//!
//! - **Mount Manager**: tracks unloaded and mounted archives and the keys they need
//! - **Block Reader**: decrypts and decompresses only the blocks a read touches
//! - **Scratch Buffers**: thread-local decode workspace reused across reads
//! - **Facade**: [`Vfs`] owns the key ring, archive sets and worker pool
//!
//! # Archive Lifecycle
//!
//! An archive with a plaintext index is parsed when it is discovered. An
//! archive whose index is encrypted is only recorded until its key is
//! submitted. Both wait in the unloaded set until [`Vfs::mount_all`] or
//! [`Vfs::submit_keys`] moves them to the mounted set.
//!
//! # Example
//!
//! ```no_run
//! use pakfs_vfs::{Vfs, VfsConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let vfs = Vfs::new(VfsConfig::new("/path/to/Paks"))?;
//! vfs.discover_configured();
//! let mounted = vfs.mount_all();
//! println!("Mounted {mounted} archives");
//!
//! let handle = vfs.open("Game/Config.json")?;
//! let header = handle.read(0, 16)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

use std::path::PathBuf;

use pakfs_crypto::{CryptoError, KeyGuid};
use pakfs_formats::{PakError, TocError};
use thiserror::Error;

// Archive kinds and their shared interface
pub mod archive;

// Configuration
pub mod config;

// Mount manager
pub mod mount;

// Block and stored entry readers
pub mod reader;

// Thread-local decode buffers
pub mod scratch;

// Reference-counted file mappings
pub mod shared;

// Context object and facade
mod vfs;

pub use archive::{Archive, ArchiveInfo, ArchiveKind, ArchiveState};
pub use config::VfsConfig;
pub use mount::{DiscoverySummary, MountManager};
pub use reader::FileHandle;
pub use vfs::Vfs;

/// Result type for VFS operations.
pub type Result<T> = std::result::Result<T, VfsError>;

/// Errors that can occur during VFS operations.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Directory could not be enumerated.
    #[error("Cannot read directory {path}: {source}")]
    Discovery {
        /// Directory that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Archive structure is invalid.
    #[error("Invalid archive format: {0}")]
    Format(#[from] PakError),

    /// IoStore table of contents is invalid.
    #[error("Invalid TOC: {0}")]
    Toc(#[from] TocError),

    /// Decryption needs a key that is not registered.
    #[error("Encryption key not registered: {0}")]
    KeyMissing(KeyGuid),

    /// Archive cannot be decoded.
    #[error("Cannot decode archive: {0}")]
    Decode(String),

    /// Logical path is not in any mounted archive.
    #[error("File not found: {0}")]
    NotFound(String),

    /// Read range lies outside the file.
    #[error("Read of {length} bytes at {offset} is outside {path} ({size} bytes)")]
    OutOfRange {
        /// Logical path of the file
        path: String,
        /// Requested offset
        offset: u64,
        /// Requested length
        length: u64,
        /// File size
        size: u64,
    },

    /// Cryptographic error.
    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant was broken.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CryptoError> for VfsError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::KeyNotFound(guid) => Self::KeyMissing(guid),
            other => Self::Crypto(other),
        }
    }
}

impl VfsError {
    /// Whether this error reports a missing logical path.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
