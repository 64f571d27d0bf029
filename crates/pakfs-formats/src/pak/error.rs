//! Pak error types

use pakfs_crypto::{CryptoError, KeyGuid};
use thiserror::Error;

/// Pak-specific error type
#[derive(Debug, Error)]
pub enum PakError {
    /// File is too small to hold a footer
    #[error("file too small for pak footer: {0} bytes")]
    TooSmall(u64),

    /// Invalid footer magic
    #[error("invalid pak magic: expected 0x5A6F12E1, got 0x{0:08X}")]
    InvalidMagic(u32),

    /// Unsupported pak version
    #[error("unsupported pak version: {0}")]
    UnsupportedVersion(u32),

    /// Index range does not fit inside the file
    #[error("index range {offset}+{size} exceeds data limit {limit}")]
    IndexOutOfBounds {
        /// Index offset from the footer
        offset: u64,
        /// Index size from the footer
        size: u64,
        /// Bytes available before the footer
        limit: u64,
    },

    /// Encrypted index size is not a multiple of the AES block size
    #[error("encrypted index size {0} is not AES aligned")]
    UnalignedIndex(u64),

    /// Index hash does not match the footer
    #[error("index hash mismatch: expected {expected}, got {actual}")]
    IndexHashMismatch {
        /// Hash recorded in the footer
        expected: String,
        /// Hash of the index bytes
        actual: String,
    },

    /// Index is encrypted and no key was supplied
    #[error("index is encrypted with key {0} but no key was supplied")]
    MissingKey(KeyGuid),

    /// Invalid length-prefixed string
    #[error("invalid string: {0}")]
    InvalidString(String),

    /// Entry failed validation
    #[error("invalid entry '{path}': {reason}")]
    InvalidEntry {
        /// Entry path
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// Same path stored twice
    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Bytes left after the last index record
    #[error("{0} unexpected bytes after the last index entry")]
    TrailingIndexData(usize),

    /// Compression method index points at an empty table slot
    #[error("unknown compression method index: {0}")]
    UnknownCompressionMethod(u32),

    /// Compression method name is not supported
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(String),

    /// Compression table cannot be written
    #[error("invalid compression table: {0}")]
    InvalidCompressionTable(String),

    /// Compression error
    #[error("compression error: {0}")]
    CompressionError(String),

    /// Decompression failed
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// Cryptographic error
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for pak operations
pub type PakResult<T> = Result<T, PakError>;
