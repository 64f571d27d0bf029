//! Error types for cryptographic operations

use thiserror::Error;

use crate::guid::KeyGuid;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key size
    #[error("Invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize {
        /// Expected key size in bytes
        expected: usize,
        /// Actual key size in bytes
        actual: usize,
    },

    /// Key not found
    #[error("Encryption key not found: {0}")]
    KeyNotFound(KeyGuid),

    /// Invalid key format
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Invalid key GUID format
    #[error("Invalid key GUID: {0}")]
    InvalidGuid(String),

    /// Buffer length is not a multiple of the cipher block size
    #[error("Buffer length {0} is not aligned to the AES block size")]
    UnalignedBuffer(usize),
}
