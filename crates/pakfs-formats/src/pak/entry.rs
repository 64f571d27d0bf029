//! Pak index entries
//!
//! An entry describes one logical file. Compressed entries carry a table of
//! `(start, end)` ranges, one per compression block; block `i` holds the
//! uncompressed bytes `[i * block_size, min((i + 1) * block_size, size))`.

use std::io::{Read, Seek, Write};

use binrw::{BinRead, BinResult, BinWrite, Endian};
use pakfs_crypto::{align_u64, checked_align_u64};

use super::error::{PakError, PakResult};

/// Entry flag: payload is AES encrypted
pub const ENTRY_FLAG_ENCRYPTED: u8 = 0x01;

/// Compressed byte range of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedBlock {
    /// Start of the compressed bytes
    pub compressed_start: u64,
    /// End of the compressed bytes (exclusive, without AES padding)
    pub compressed_end: u64,
}

impl CompressedBlock {
    /// Compressed length in bytes
    pub const fn len(&self) -> u64 {
        self.compressed_end.saturating_sub(self.compressed_start)
    }

    /// Whether the block has no compressed bytes
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One logical file inside a pak
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PakEntry {
    /// Offset of the entry payload; base for relative block offsets
    pub offset: u64,
    /// Total compressed size, without AES padding
    pub compressed_size: u64,
    /// Uncompressed size
    pub uncompressed_size: u64,
    /// Compression method index into the footer table, 0 for stored
    pub compression_method: u32,
    /// Compression blocks, empty for stored entries
    pub blocks: Vec<CompressedBlock>,
    /// Whether the payload is encrypted
    pub encrypted: bool,
    /// Uncompressed size of every block but the last
    pub compression_block_size: u32,
}

impl PakEntry {
    /// Whether the entry is stored in compression blocks
    pub const fn is_compressed(&self) -> bool {
        self.compression_method != 0
    }

    /// Offset block ranges are relative to
    pub const fn block_base(&self, relative_offsets: bool) -> u64 {
        if relative_offsets { self.offset } else { 0 }
    }

    /// Bytes read from disk for a block, including AES padding
    ///
    /// Only meaningful for entries that passed [`Self::validate`].
    pub const fn block_read_size(&self, block: &CompressedBlock) -> u64 {
        if self.encrypted {
            align_u64(block.len())
        } else {
            block.len()
        }
    }

    /// Uncompressed length of block `index`
    pub fn block_uncompressed_len(&self, index: usize) -> u64 {
        let block_size = u64::from(self.compression_block_size);
        let start = index as u64 * block_size;
        self.uncompressed_size.saturating_sub(start).min(block_size)
    }

    /// Check the entry against the data region of its archive
    ///
    /// `data_limit` is the first byte past the payload area (the index offset).
    pub fn validate(&self, path: &str, data_limit: u64, relative_offsets: bool) -> PakResult<()> {
        let invalid = |reason: String| PakError::InvalidEntry {
            path: path.to_string(),
            reason,
        };

        if !self.is_compressed() {
            let stored = if self.encrypted {
                checked_align_u64(self.uncompressed_size).ok_or_else(|| {
                    invalid(format!(
                        "encrypted size {} overflows when padded",
                        self.uncompressed_size
                    ))
                })?
            } else {
                self.uncompressed_size
            };
            return match self.offset.checked_add(stored) {
                Some(end) if end <= data_limit => Ok(()),
                _ => Err(invalid(format!(
                    "stored payload {}+{stored} exceeds data limit {data_limit}",
                    self.offset
                ))),
            };
        }

        if !self.compression_block_size.is_power_of_two() {
            return Err(invalid(format!(
                "block size {} is not a power of two",
                self.compression_block_size
            )));
        }

        let expected = self
            .uncompressed_size
            .div_ceil(u64::from(self.compression_block_size));
        if self.blocks.len() as u64 != expected {
            return Err(invalid(format!(
                "{} blocks for {} bytes, expected {expected}",
                self.blocks.len(),
                self.uncompressed_size
            )));
        }

        let base = self.block_base(relative_offsets);
        for (index, block) in self.blocks.iter().enumerate() {
            if block.compressed_start > block.compressed_end {
                return Err(invalid(format!("block {index} has an inverted range")));
            }
            let read_size = if self.encrypted {
                checked_align_u64(block.len())
            } else {
                Some(block.len())
            };
            let end = base
                .checked_add(block.compressed_start)
                .zip(read_size)
                .and_then(|(start, size)| start.checked_add(size));
            if !end.is_some_and(|end| end <= data_limit) {
                return Err(invalid(format!(
                    "block {index} exceeds data limit {data_limit}"
                )));
            }
        }

        Ok(())
    }
}

impl BinRead for PakEntry {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<Self> {
        let offset = u64::read_options(reader, endian, ())?;
        let compressed_size = u64::read_options(reader, endian, ())?;
        let uncompressed_size = u64::read_options(reader, endian, ())?;
        let compression_method = u32::read_options(reader, endian, ())?;

        let mut blocks = Vec::new();
        if compression_method != 0 {
            let count = u32::read_options(reader, endian, ())?;
            // Count is untrusted; let the reader run dry before allocating for it
            blocks.reserve((count as usize).min(1024));
            for _ in 0..count {
                blocks.push(CompressedBlock {
                    compressed_start: u64::read_options(reader, endian, ())?,
                    compressed_end: u64::read_options(reader, endian, ())?,
                });
            }
        }

        let flags = u8::read_options(reader, endian, ())?;
        let compression_block_size = u32::read_options(reader, endian, ())?;

        Ok(Self {
            offset,
            compressed_size,
            uncompressed_size,
            compression_method,
            blocks,
            encrypted: flags & ENTRY_FLAG_ENCRYPTED != 0,
            compression_block_size,
        })
    }
}

impl BinWrite for PakEntry {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<()> {
        self.offset.write_options(writer, endian, ())?;
        self.compressed_size.write_options(writer, endian, ())?;
        self.uncompressed_size.write_options(writer, endian, ())?;
        self.compression_method.write_options(writer, endian, ())?;

        if self.is_compressed() {
            (self.blocks.len() as u32).write_options(writer, endian, ())?;
            for block in &self.blocks {
                block.compressed_start.write_options(writer, endian, ())?;
                block.compressed_end.write_options(writer, endian, ())?;
            }
        }

        let flags = if self.encrypted { ENTRY_FLAG_ENCRYPTED } else { 0 };
        flags.write_options(writer, endian, ())?;
        self.compression_block_size.write_options(writer, endian, ())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use binrw::{BinReaderExt, BinWriterExt};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn compressed_entry() -> PakEntry {
        PakEntry {
            offset: 100,
            compressed_size: 30,
            uncompressed_size: 10_000,
            compression_method: 1,
            blocks: vec![
                CompressedBlock {
                    compressed_start: 0,
                    compressed_end: 10,
                },
                CompressedBlock {
                    compressed_start: 10,
                    compressed_end: 20,
                },
                CompressedBlock {
                    compressed_start: 20,
                    compressed_end: 30,
                },
            ],
            encrypted: false,
            compression_block_size: 4096,
        }
    }

    #[test]
    fn test_entry_round_trip() {
        let entry = compressed_entry();
        let mut cursor = Cursor::new(Vec::new());
        cursor.write_le(&entry).expect("Write should succeed");

        let bytes = cursor.into_inner();
        assert_eq!(bytes.len(), 8 * 3 + 4 + 4 + 3 * 16 + 1 + 4);

        let parsed: PakEntry = Cursor::new(&bytes).read_le().expect("Read should succeed");
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_stored_entry_has_no_block_table() {
        let entry = PakEntry {
            offset: 0,
            compressed_size: 5,
            uncompressed_size: 5,
            compression_method: 0,
            blocks: Vec::new(),
            encrypted: true,
            compression_block_size: 0,
        };
        let mut cursor = Cursor::new(Vec::new());
        cursor.write_le(&entry).expect("Write should succeed");
        assert_eq!(cursor.get_ref().len(), 8 * 3 + 4 + 1 + 4);

        // Encrypted stored payloads occupy a whole AES block
        assert!(entry.validate("a", 16, true).is_ok());
        assert!(entry.validate("a", 15, true).is_err());
    }

    #[test]
    fn test_block_lengths() {
        let entry = compressed_entry();
        assert_eq!(entry.block_uncompressed_len(0), 4096);
        assert_eq!(entry.block_uncompressed_len(1), 4096);
        assert_eq!(entry.block_uncompressed_len(2), 10_000 - 8192);
        assert_eq!(entry.block_base(true), 100);
        assert_eq!(entry.block_base(false), 0);
    }

    #[test]
    fn test_validate_block_table() {
        let entry = compressed_entry();
        assert!(entry.validate("a", 130, true).is_ok());
        assert!(entry.validate("a", 129, true).is_err());

        let mut wrong_count = compressed_entry();
        wrong_count.blocks.pop();
        assert!(wrong_count.validate("a", 1000, true).is_err());

        let mut odd_size = compressed_entry();
        odd_size.compression_block_size = 3000;
        assert!(odd_size.validate("a", 1000, true).is_err());

        let mut inverted = compressed_entry();
        inverted.blocks[1].compressed_end = 5;
        assert!(inverted.validate("a", 1000, true).is_err());
    }

    #[test]
    fn test_encrypted_blocks_read_padded() {
        let mut entry = compressed_entry();
        entry.encrypted = true;
        assert_eq!(entry.block_read_size(&entry.blocks[0]), 16);
        // Last block starts at 120 and reads 16 bytes
        assert!(entry.validate("a", 136, true).is_ok());
        assert!(entry.validate("a", 135, true).is_err());
    }

    #[test]
    fn test_padded_size_overflow_rejected() {
        let stored = PakEntry {
            offset: 0,
            compressed_size: u64::MAX - 2,
            uncompressed_size: u64::MAX - 2,
            compression_method: 0,
            blocks: Vec::new(),
            encrypted: true,
            compression_block_size: 0,
        };
        let err = stored.validate("huge.bin", u64::MAX, true).expect_err("Padding overflows");
        assert!(matches!(err, PakError::InvalidEntry { ref path, .. } if path == "huge.bin"));

        let mut block = compressed_entry();
        block.encrypted = true;
        block.uncompressed_size = 4096;
        block.blocks = vec![CompressedBlock {
            compressed_start: 0,
            compressed_end: u64::MAX - 1,
        }];
        assert!(matches!(
            block.validate("a", u64::MAX, false),
            Err(PakError::InvalidEntry { .. })
        ));
    }
}
