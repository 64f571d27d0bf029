//! Pak footer parsing and building
//!
//! The footer is a fixed 221-byte little-endian record at the very end of the
//! file. It locates the index and names the key and compression methods the
//! archive uses:
//!
//! | Field | Size |
//! |---|---|
//! | encryption key GUID | 16 |
//! | encrypted index flag | 1 |
//! | magic `0x5A6F12E1` | 4 |
//! | version | 4 |
//! | index offset | 8 |
//! | index size | 8 |
//! | index SHA-1 | 20 |
//! | compression method names | 5 x 32 |

use std::io::Cursor;

use binrw::{BinRead, BinWrite};
use pakfs_crypto::KeyGuid;

use super::compression::CompressionMethod;
use super::error::{PakError, PakResult};

/// Footer magic
pub const PAK_MAGIC: u32 = 0x5A6F_12E1;

/// Size of the footer in bytes
pub const FOOTER_SIZE: usize = 16 + 1 + 4 + 4 + 8 + 8 + 20 + COMPRESSION_METHOD_SLOTS * METHOD_NAME_LEN;

/// Block offsets are absolute file offsets
pub const VERSION_ABSOLUTE_BLOCK_OFFSETS: u32 = 1;

/// Block offsets are relative to the entry offset
pub const VERSION_RELATIVE_BLOCK_OFFSETS: u32 = 2;

/// Version written by [`PakBuilder`](super::PakBuilder)
pub const PAK_VERSION_LATEST: u32 = VERSION_RELATIVE_BLOCK_OFFSETS;

/// Number of compression method name slots
pub const COMPRESSION_METHOD_SLOTS: usize = 5;

/// Width of one compression method name slot
pub const METHOD_NAME_LEN: usize = 32;

/// Pak footer
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct PakFooter {
    /// GUID of the key protecting the index and encrypted entries
    #[br(map = KeyGuid::from_bytes)]
    #[bw(map = |g: &KeyGuid| *g.as_bytes())]
    pub encryption_key_guid: KeyGuid,

    /// Whether the index is encrypted
    #[br(map = |x: u8| x != 0)]
    #[bw(map = |x: &bool| u8::from(*x))]
    pub encrypted_index: bool,

    /// Footer magic, must be [`PAK_MAGIC`]
    pub magic: u32,

    /// Format version
    pub version: u32,

    /// Offset of the index
    pub index_offset: u64,

    /// Size of the index as stored, including AES padding
    pub index_size: u64,

    /// SHA-1 of the decrypted index bytes
    pub index_hash: [u8; 20],

    /// Compression method names; slot `k` is method index `k + 1`
    #[br(map = |raw: [[u8; METHOD_NAME_LEN]; COMPRESSION_METHOD_SLOTS]| decode_method_names(&raw))]
    #[bw(map = |names: &Vec<String>| encode_method_names(names))]
    pub compression_methods: Vec<String>,
}

impl PakFooter {
    /// Parse and validate the footer of a complete pak file
    pub fn parse(data: &[u8]) -> PakResult<Self> {
        let file_size = data.len() as u64;
        if data.len() < FOOTER_SIZE {
            return Err(PakError::TooSmall(file_size));
        }

        let mut cursor = Cursor::new(&data[data.len() - FOOTER_SIZE..]);
        let footer = Self::read(&mut cursor)?;
        footer.validate(file_size)?;
        Ok(footer)
    }

    /// Serialize the footer
    pub fn build(&self) -> PakResult<Vec<u8>> {
        if self.compression_methods.len() > COMPRESSION_METHOD_SLOTS {
            return Err(PakError::InvalidCompressionTable(format!(
                "{} methods, at most {COMPRESSION_METHOD_SLOTS} fit",
                self.compression_methods.len()
            )));
        }
        if let Some(name) = self
            .compression_methods
            .iter()
            .find(|name| name.len() >= METHOD_NAME_LEN || !name.is_ascii())
        {
            return Err(PakError::InvalidCompressionTable(format!(
                "method name '{name}' does not fit a {METHOD_NAME_LEN}-byte slot"
            )));
        }

        let mut cursor = Cursor::new(Vec::with_capacity(FOOTER_SIZE));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Check the footer against the size of the file it was read from
    pub fn validate(&self, file_size: u64) -> PakResult<()> {
        if self.magic != PAK_MAGIC {
            return Err(PakError::InvalidMagic(self.magic));
        }

        if !(VERSION_ABSOLUTE_BLOCK_OFFSETS..=PAK_VERSION_LATEST).contains(&self.version) {
            return Err(PakError::UnsupportedVersion(self.version));
        }

        let limit = file_size.saturating_sub(FOOTER_SIZE as u64);
        let in_bounds = self
            .index_offset
            .checked_add(self.index_size)
            .is_some_and(|end| end <= limit);
        if !in_bounds {
            return Err(PakError::IndexOutOfBounds {
                offset: self.index_offset,
                size: self.index_size,
                limit,
            });
        }

        if self.encrypted_index && self.index_size % pakfs_crypto::AES_BLOCK_SIZE as u64 != 0 {
            return Err(PakError::UnalignedIndex(self.index_size));
        }

        Ok(())
    }

    /// Whether block offsets are relative to the entry offset
    pub const fn has_relative_block_offsets(&self) -> bool {
        self.version >= VERSION_RELATIVE_BLOCK_OFFSETS
    }

    /// Resolve a compression method index from an entry
    ///
    /// Index 0 means the entry is stored without compression.
    pub fn compression_method(&self, index: u32) -> PakResult<CompressionMethod> {
        if index == 0 {
            return Ok(CompressionMethod::None);
        }

        let name = (index as usize)
            .checked_sub(1)
            .and_then(|slot| self.compression_methods.get(slot))
            .filter(|name| !name.is_empty())
            .ok_or(PakError::UnknownCompressionMethod(index))?;

        CompressionMethod::from_name(name)
            .ok_or_else(|| PakError::UnsupportedCompression(name.clone()))
    }
}

fn decode_method_names(raw: &[[u8; METHOD_NAME_LEN]; COMPRESSION_METHOD_SLOTS]) -> Vec<String> {
    let mut names: Vec<String> = raw
        .iter()
        .map(|slot| {
            let end = slot.iter().position(|b| *b == 0).unwrap_or(METHOD_NAME_LEN);
            String::from_utf8_lossy(&slot[..end]).into_owned()
        })
        .collect();

    while names.last().is_some_and(String::is_empty) {
        names.pop();
    }
    names
}

fn encode_method_names(names: &[String]) -> [[u8; METHOD_NAME_LEN]; COMPRESSION_METHOD_SLOTS] {
    let mut raw = [[0u8; METHOD_NAME_LEN]; COMPRESSION_METHOD_SLOTS];
    for (slot, name) in raw.iter_mut().zip(names) {
        // Keep one byte for the terminator
        let len = name.len().min(METHOD_NAME_LEN - 1);
        slot[..len].copy_from_slice(&name.as_bytes()[..len]);
    }
    raw
}
