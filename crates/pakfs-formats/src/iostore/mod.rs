//! IoStore table-of-contents header
//!
//! IoStore containers split into a `.utoc` table of contents and a `.ucas`
//! payload file. Only the TOC header is read here: it names the container,
//! counts its chunks and identifies the key the container is encrypted with.
//! Chunk directories and payload decoding are not handled.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};
use pakfs_crypto::KeyGuid;
use thiserror::Error;

/// TOC magic
pub const TOC_MAGIC: [u8; 16] = *b"-==--==--==--==-";

/// Bytes occupied by the fields of [`TocHeader`]
pub const TOC_HEADER_FIELDS_SIZE: usize = 16 + 4 + 4 * 9 + 8 + 16 + 1;

/// Header size recorded by [`TocHeader::new`]
pub const TOC_HEADER_SIZE: u32 = 144;

/// Container is compressed
pub const CONTAINER_FLAG_COMPRESSED: u8 = 0x01;
/// Container is encrypted
pub const CONTAINER_FLAG_ENCRYPTED: u8 = 0x02;
/// Container is signed
pub const CONTAINER_FLAG_SIGNED: u8 = 0x04;
/// Container carries a directory index
pub const CONTAINER_FLAG_INDEXED: u8 = 0x08;

/// IoStore error type
#[derive(Debug, Error)]
pub enum TocError {
    /// File is too small to hold a header
    #[error("file too small for TOC header: {0} bytes")]
    TooSmall(usize),

    /// Invalid magic
    #[error("invalid TOC magic: {0:02X?}")]
    InvalidMagic([u8; 16]),

    /// Recorded header size is smaller than the fields it must hold
    #[error("invalid TOC header size: {0}")]
    InvalidHeaderSize(u32),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for IoStore operations
pub type TocResult<T> = Result<T, TocError>;

/// IoStore TOC header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct TocHeader {
    /// Magic, must be [`TOC_MAGIC`]
    pub magic: [u8; 16],
    /// TOC version
    pub version: u8,
    /// Reserved
    pub reserved0: u8,
    /// Reserved
    pub reserved1: u16,
    /// Size of the header on disk
    pub header_size: u32,
    /// Number of chunk entries
    pub entry_count: u32,
    /// Number of compressed block entries
    pub compressed_block_entry_count: u32,
    /// Size of one compressed block entry
    pub compressed_block_entry_size: u32,
    /// Number of compression method names
    pub compression_method_name_count: u32,
    /// Width of one compression method name
    pub compression_method_name_length: u32,
    /// Compression block size
    pub compression_block_size: u32,
    /// Size of the directory index
    pub directory_index_size: u32,
    /// Number of `.ucas` partitions
    pub partition_count: u32,
    /// Container id
    pub container_id: u64,
    /// GUID of the key protecting the container
    #[br(map = KeyGuid::from_bytes)]
    #[bw(map = |g: &KeyGuid| *g.as_bytes())]
    pub encryption_key_guid: KeyGuid,
    /// Container flags
    pub container_flags: u8,
}

impl TocHeader {
    /// Create a header for a container with `entry_count` chunks
    pub fn new(container_id: u64, entry_count: u32) -> Self {
        Self {
            magic: TOC_MAGIC,
            version: 1,
            reserved0: 0,
            reserved1: 0,
            header_size: TOC_HEADER_SIZE,
            entry_count,
            compressed_block_entry_count: 0,
            compressed_block_entry_size: 12,
            compression_method_name_count: 0,
            compression_method_name_length: 32,
            compression_block_size: 64 * 1024,
            directory_index_size: 0,
            partition_count: 1,
            container_id,
            encryption_key_guid: KeyGuid::ZERO,
            container_flags: 0,
        }
    }

    /// Mark the container as encrypted with `guid`
    #[must_use]
    pub const fn with_encryption(mut self, guid: KeyGuid) -> Self {
        self.encryption_key_guid = guid;
        self.container_flags |= CONTAINER_FLAG_ENCRYPTED;
        self
    }

    /// Parse the header at the start of a `.utoc` file
    pub fn parse(data: &[u8]) -> TocResult<Self> {
        if data.len() < TOC_HEADER_FIELDS_SIZE {
            return Err(TocError::TooSmall(data.len()));
        }

        let header = Self::read(&mut Cursor::new(data))?;
        if header.magic != TOC_MAGIC {
            return Err(TocError::InvalidMagic(header.magic));
        }
        if (header.header_size as usize) < TOC_HEADER_FIELDS_SIZE {
            return Err(TocError::InvalidHeaderSize(header.header_size));
        }
        Ok(header)
    }

    /// Serialize the header, zero padded to `header_size`
    pub fn build(&self) -> TocResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(self.header_size as usize));
        self.write(&mut cursor)?;
        let mut bytes = cursor.into_inner();
        if bytes.len() < self.header_size as usize {
            bytes.resize(self.header_size as usize, 0);
        }
        Ok(bytes)
    }

    /// Whether the container is encrypted
    pub const fn is_encrypted(&self) -> bool {
        self.container_flags & CONTAINER_FLAG_ENCRYPTED != 0
    }

    /// Whether the container is compressed
    pub const fn is_compressed(&self) -> bool {
        self.container_flags & CONTAINER_FLAG_COMPRESSED != 0
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_toc_header_round_trip() {
        let guid = KeyGuid::from_bytes([0x33; 16]);
        let header = TocHeader::new(0xDEAD_BEEF, 12).with_encryption(guid);

        let bytes = header.build().expect("Build should succeed");
        assert_eq!(bytes.len(), TOC_HEADER_SIZE as usize);

        let parsed = TocHeader::parse(&bytes).expect("Parse should succeed");
        assert_eq!(parsed, header);
        assert!(parsed.is_encrypted());
        assert!(!parsed.is_compressed());
        assert_eq!(parsed.encryption_key_guid, guid);
    }

    #[test]
    fn test_toc_rejects_bad_magic() {
        let mut bytes = TocHeader::new(1, 0).build().expect("Build should succeed");
        bytes[0] = b'X';
        assert!(matches!(
            TocHeader::parse(&bytes),
            Err(TocError::InvalidMagic(_))
        ));
        assert!(matches!(
            TocHeader::parse(&bytes[..10]),
            Err(TocError::TooSmall(10))
        ));
    }
}
