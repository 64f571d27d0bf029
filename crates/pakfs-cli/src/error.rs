//! Error types for the command-line host.

use std::path::PathBuf;

use pakfs_crypto::CryptoError;
use pakfs_vfs::VfsError;
use thiserror::Error;

/// Command-line errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid command-line configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Keychain file could not be loaded
    #[error("Failed to load keychain {path}: {reason}")]
    Keychain {
        /// Path to the keychain file
        path: PathBuf,
        /// Reason for the failure
        reason: String,
    },

    /// Key or GUID text is malformed
    #[error("Invalid key: {0}")]
    Key(#[from] CryptoError),

    /// VFS operation failed
    #[error(transparent)]
    Vfs(#[from] VfsError),

    /// Output could not be written
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for command-line operations.
pub type Result<T> = std::result::Result<T, CliError>;
