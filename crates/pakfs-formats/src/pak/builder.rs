//! Pak archive builder
//!
//! Produces complete pak files for fixtures and tooling. Files are laid out in
//! insertion order, followed by the index and the footer.

use std::path::Path;

use pakfs_crypto::{AesKey, BlockCipher, KeyGuid, align};
use sha1::{Digest, Sha1};

use super::compression::CompressionMethod;
use super::entry::{CompressedBlock, PakEntry};
use super::error::{PakError, PakResult};
use super::footer::{
    PAK_MAGIC, PAK_VERSION_LATEST, PakFooter, VERSION_ABSOLUTE_BLOCK_OFFSETS,
    VERSION_RELATIVE_BLOCK_OFFSETS,
};
use super::index::PakIndex;

/// Default compression block size (64 KiB)
pub const DEFAULT_BLOCK_SIZE: u32 = 64 * 1024;

/// Builder for pak files
#[derive(Debug, Clone)]
pub struct PakBuilder {
    mount_point: String,
    block_size: u32,
    compression: CompressionMethod,
    key: Option<(KeyGuid, AesKey)>,
    encrypt_index: bool,
    encrypt_entries: bool,
    version: u32,
    files: Vec<(String, Vec<u8>)>,
}

impl PakBuilder {
    /// Create a builder for an archive mounted at `mount_point`
    pub fn new(mount_point: impl Into<String>) -> Self {
        Self {
            mount_point: mount_point.into(),
            block_size: DEFAULT_BLOCK_SIZE,
            compression: CompressionMethod::Zlib,
            key: None,
            encrypt_index: false,
            encrypt_entries: false,
            version: PAK_VERSION_LATEST,
            files: Vec::new(),
        }
    }

    /// Set the compression block size (must be a power of two)
    #[must_use]
    pub const fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the compression method for all files
    #[must_use]
    pub const fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }

    /// Encrypt the index and every file with `key`
    #[must_use]
    pub const fn with_encryption(mut self, guid: KeyGuid, key: AesKey) -> Self {
        self.key = Some((guid, key));
        self.encrypt_index = true;
        self.encrypt_entries = true;
        self
    }

    /// Choose whether the index is encrypted (needs a key)
    #[must_use]
    pub const fn with_index_encryption(mut self, enabled: bool) -> Self {
        self.encrypt_index = enabled;
        self
    }

    /// Choose whether file payloads are encrypted (needs a key)
    #[must_use]
    pub const fn with_entry_encryption(mut self, enabled: bool) -> Self {
        self.encrypt_entries = enabled;
        self
    }

    /// Write absolute instead of entry-relative block offsets
    #[must_use]
    pub const fn with_absolute_block_offsets(mut self) -> Self {
        self.version = VERSION_ABSOLUTE_BLOCK_OFFSETS;
        self
    }

    /// Add a file
    #[must_use]
    pub fn add_file(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.files.push((path.into(), data.into()));
        self
    }

    /// Build the archive bytes
    pub fn build(&self) -> PakResult<Vec<u8>> {
        if self.compression != CompressionMethod::None && !self.block_size.is_power_of_two() {
            return Err(PakError::InvalidEntry {
                path: String::new(),
                reason: format!("block size {} is not a power of two", self.block_size),
            });
        }

        let cipher = self.key.map(|(_, key)| BlockCipher::new(&key));
        let entry_cipher = cipher.as_ref().filter(|_| self.encrypt_entries);
        let index_cipher = cipher.as_ref().filter(|_| self.encrypt_index);
        if (self.encrypt_entries || self.encrypt_index) && cipher.is_none() {
            return Err(PakError::MissingKey(KeyGuid::ZERO));
        }

        let mut out = Vec::new();
        let mut index = PakIndex::new(self.mount_point.clone());

        for (path, data) in &self.files {
            let entry = if self.compression == CompressionMethod::None {
                write_stored(&mut out, data, entry_cipher)?
            } else {
                self.write_compressed(&mut out, data, entry_cipher)?
            };
            index.insert(path.clone(), entry)?;
        }

        let index_offset = out.len() as u64;
        let mut index_bytes = index.build()?;
        if index_cipher.is_some() {
            index_bytes.resize(align(index_bytes.len()), 0);
        }
        let index_hash: [u8; 20] = Sha1::digest(&index_bytes).into();
        if let Some(cipher) = index_cipher {
            cipher.encrypt_in_place(&mut index_bytes)?;
        }
        out.extend_from_slice(&index_bytes);

        let compression_methods = if self.compression == CompressionMethod::None {
            Vec::new()
        } else {
            vec![self.compression.name().to_string()]
        };

        let footer = PakFooter {
            encryption_key_guid: self.key.map_or(KeyGuid::ZERO, |(guid, _)| guid),
            encrypted_index: index_cipher.is_some(),
            magic: PAK_MAGIC,
            version: self.version,
            index_offset,
            index_size: index_bytes.len() as u64,
            index_hash,
            compression_methods,
        };
        out.extend(footer.build()?);

        Ok(out)
    }

    /// Build the archive and write it to `path`
    pub fn write_to(&self, path: impl AsRef<Path>) -> PakResult<()> {
        std::fs::write(path, self.build()?)?;
        Ok(())
    }

    fn write_compressed(
        &self,
        out: &mut Vec<u8>,
        data: &[u8],
        cipher: Option<&BlockCipher>,
    ) -> PakResult<PakEntry> {
        let offset = out.len() as u64;
        let base = if self.version >= VERSION_RELATIVE_BLOCK_OFFSETS {
            offset
        } else {
            0
        };

        let mut blocks = Vec::new();
        let mut compressed_size = 0u64;
        for chunk in data.chunks(self.block_size as usize) {
            let mut compressed = self.compression.compress(chunk)?;
            let len = compressed.len() as u64;
            let start = out.len() as u64 - base;

            if let Some(cipher) = cipher {
                compressed.resize(align(compressed.len()), 0);
                cipher.encrypt_in_place(&mut compressed)?;
            }
            out.extend_from_slice(&compressed);

            blocks.push(CompressedBlock {
                compressed_start: start,
                compressed_end: start + len,
            });
            compressed_size += len;
        }

        Ok(PakEntry {
            offset,
            compressed_size,
            uncompressed_size: data.len() as u64,
            // Method index 1: the only slot in the footer table
            compression_method: 1,
            blocks,
            encrypted: cipher.is_some(),
            compression_block_size: self.block_size,
        })
    }
}

fn write_stored(
    out: &mut Vec<u8>,
    data: &[u8],
    cipher: Option<&BlockCipher>,
) -> PakResult<PakEntry> {
    let offset = out.len() as u64;
    let mut payload = data.to_vec();
    if let Some(cipher) = cipher {
        payload.resize(align(payload.len()), 0);
        cipher.encrypt_in_place(&mut payload)?;
    }
    out.extend_from_slice(&payload);

    Ok(PakEntry {
        offset,
        compressed_size: data.len() as u64,
        uncompressed_size: data.len() as u64,
        compression_method: 0,
        blocks: Vec::new(),
        encrypted: cipher.is_some(),
        compression_block_size: 0,
    })
}
