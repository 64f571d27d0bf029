//! Pak index parsing and building
//!
//! The index follows the payload area and maps paths, relative to the
//! archive's mount point, to [`PakEntry`] records:
//!
//! ```text
//! mount_point: string
//! entry_count: u32
//! entry_count x { path: string, entry: PakEntry }
//! ```
//!
//! When the footer marks the index as encrypted the whole region is AES
//! encrypted and zero padded to the block size. The footer's SHA-1 covers the
//! decrypted bytes, so a wrong key shows up as a hash mismatch.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::Cursor;

use binrw::{BinReaderExt, BinWriterExt};
use pakfs_crypto::BlockCipher;
use sha1::{Digest, Sha1};

use super::entry::PakEntry;
use super::error::{PakError, PakResult};
use super::footer::PakFooter;
use super::string::PakString;

/// Smallest possible serialized entry: empty path plus a stored record
const MIN_RECORD_SIZE: usize = 4 + 8 * 3 + 4 + 1 + 4;

/// Parsed pak index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PakIndex {
    mount_point: String,
    entries: HashMap<String, PakEntry>,
}

impl PakIndex {
    /// Create an empty index
    pub fn new(mount_point: impl Into<String>) -> Self {
        Self {
            mount_point: mount_point.into(),
            entries: HashMap::new(),
        }
    }

    /// Parse the index of a complete pak file
    ///
    /// `cipher` is required when the footer marks the index as encrypted.
    pub fn parse(data: &[u8], footer: &PakFooter, cipher: Option<&BlockCipher>) -> PakResult<Self> {
        let limit = data.len() as u64;
        let range = usize::try_from(footer.index_offset)
            .ok()
            .zip(usize::try_from(footer.index_size).ok())
            .and_then(|(start, size)| Some(start..start.checked_add(size)?))
            .filter(|range| range.end <= data.len())
            .ok_or(PakError::IndexOutOfBounds {
                offset: footer.index_offset,
                size: footer.index_size,
                limit,
            })?;

        let mut bytes = data[range].to_vec();
        if footer.encrypted_index {
            let cipher = cipher.ok_or(PakError::MissingKey(footer.encryption_key_guid))?;
            cipher.decrypt_in_place(&mut bytes)?;
        }

        let actual: [u8; 20] = Sha1::digest(&bytes).into();
        if actual != footer.index_hash {
            return Err(PakError::IndexHashMismatch {
                expected: hex::encode(footer.index_hash),
                actual: hex::encode(actual),
            });
        }

        Self::parse_records(
            &bytes,
            footer.index_offset,
            footer.has_relative_block_offsets(),
            footer.encrypted_index,
        )
    }

    /// Parse decrypted index bytes
    ///
    /// Entries are validated against `data_limit`, the first byte past the
    /// payload area.
    pub fn parse_records(
        bytes: &[u8],
        data_limit: u64,
        relative_offsets: bool,
        padded: bool,
    ) -> PakResult<Self> {
        let mut cursor = Cursor::new(bytes);

        let mount_point = read_string(&mut cursor)?;
        let count: u32 = cursor.read_le()?;

        let capacity = (count as usize).min(bytes.len() / MIN_RECORD_SIZE);
        let mut entries = HashMap::with_capacity(capacity);

        for _ in 0..count {
            let path = read_string(&mut cursor)?;
            let entry: PakEntry = cursor.read_le()?;
            entry.validate(&path, data_limit, relative_offsets)?;

            match entries.entry(path) {
                Entry::Occupied(occupied) => {
                    return Err(PakError::DuplicateEntry(occupied.key().clone()));
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(entry);
                }
            }
        }

        let consumed = usize::try_from(cursor.position()).unwrap_or(bytes.len());
        let rest = &bytes[consumed.min(bytes.len())..];
        let padding_ok =
            padded && rest.len() < pakfs_crypto::AES_BLOCK_SIZE && rest.iter().all(|b| *b == 0);
        if !rest.is_empty() && !padding_ok {
            return Err(PakError::TrailingIndexData(rest.len()));
        }

        Ok(Self {
            mount_point,
            entries,
        })
    }

    /// Serialize the index, entries sorted by path
    pub fn build(&self) -> PakResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        cursor.write_le(&PakString(self.mount_point.clone()))?;
        cursor.write_le(&(self.entries.len() as u32))?;

        let mut paths: Vec<&String> = self.entries.keys().collect();
        paths.sort();
        for path in paths {
            cursor.write_le(&PakString(path.clone()))?;
            cursor.write_le(&self.entries[path])?;
        }

        Ok(cursor.into_inner())
    }

    /// Add an entry
    pub fn insert(&mut self, path: impl Into<String>, entry: PakEntry) -> PakResult<()> {
        match self.entries.entry(path.into()) {
            Entry::Occupied(occupied) => Err(PakError::DuplicateEntry(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    /// Mount point as stored in the index
    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// Look up an entry by its path relative to the mount point
    pub fn get(&self, path: &str) -> Option<&PakEntry> {
        self.entries.get(path)
    }

    /// Look up a logical path under `mount_point`
    ///
    /// ```
    /// use pakfs_formats::pak::{PakEntry, PakIndex};
    ///
    /// let mut index = PakIndex::new("../../../Game/");
    /// let entry = PakEntry {
    ///     offset: 0,
    ///     compressed_size: 0,
    ///     uncompressed_size: 0,
    ///     compression_method: 0,
    ///     blocks: Vec::new(),
    ///     encrypted: false,
    ///     compression_block_size: 0,
    /// };
    /// index.insert("Config.json", entry).unwrap();
    ///
    /// assert!(index.find("Game/Config.json", "Game/").is_some());
    /// assert!(index.find("Other/Config.json", "Game/").is_none());
    /// ```
    pub fn find(&self, logical_path: &str, mount_point: &str) -> Option<&PakEntry> {
        logical_path
            .strip_prefix(mount_point)
            .and_then(|relative| self.entries.get(relative))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(relative path, entry)` pairs in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PakEntry)> {
        self.entries.iter().map(|(path, entry)| (path.as_str(), entry))
    }
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> PakResult<String> {
    let value: PakString = cursor.read_le().map_err(|e| match e {
        binrw::Error::AssertFail { message, .. } => PakError::InvalidString(message),
        other => PakError::BinRw(other),
    })?;
    Ok(value.into_inner())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pak::entry::CompressedBlock;
    use pretty_assertions::assert_eq;

    fn stored(offset: u64, size: u64) -> PakEntry {
        PakEntry {
            offset,
            compressed_size: size,
            uncompressed_size: size,
            compression_method: 0,
            blocks: Vec::new(),
            encrypted: false,
            compression_block_size: 0,
        }
    }

    #[test]
    fn test_index_round_trip() {
        let mut index = PakIndex::new("../../../Game/");
        index.insert("Config.json", stored(0, 10)).expect("insert");
        index
            .insert(
                "Maps/World.umap",
                PakEntry {
                    offset: 10,
                    compressed_size: 4,
                    uncompressed_size: 100,
                    compression_method: 1,
                    blocks: vec![CompressedBlock {
                        compressed_start: 0,
                        compressed_end: 4,
                    }],
                    encrypted: false,
                    compression_block_size: 65536,
                },
            )
            .expect("insert");

        let bytes = index.build().expect("Build should succeed");
        let parsed = PakIndex::parse_records(&bytes, 14, true, false).expect("Parse should succeed");

        assert_eq!(parsed, index);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.mount_point(), "../../../Game/");
        assert_eq!(parsed.get("Config.json"), Some(&stored(0, 10)));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut index = PakIndex::new("/");
        index.insert("a.txt", stored(0, 1)).expect("insert");
        assert!(matches!(
            index.insert("a.txt", stored(1, 1)),
            Err(PakError::DuplicateEntry(path)) if path == "a.txt"
        ));
    }

    #[test]
    fn test_entry_outside_data_region_rejected() {
        let mut index = PakIndex::new("/");
        index.insert("a.txt", stored(0, 100)).expect("insert");
        let bytes = index.build().expect("Build should succeed");

        let err = PakIndex::parse_records(&bytes, 50, true, false).expect_err("Should fail");
        assert!(matches!(err, PakError::InvalidEntry { .. }));
    }

    #[test]
    fn test_truncated_index_rejected() {
        let mut index = PakIndex::new("/");
        index.insert("a.txt", stored(0, 1)).expect("insert");
        let bytes = index.build().expect("Build should succeed");

        assert!(PakIndex::parse_records(&bytes[..bytes.len() - 3], 10, true, false).is_err());
    }

    #[test]
    fn test_trailing_bytes() {
        let index = PakIndex::new("/");
        let mut bytes = index.build().expect("Build should succeed");
        bytes.extend_from_slice(&[0; 5]);

        // Zero padding is only acceptable after decryption
        assert!(PakIndex::parse_records(&bytes, 0, true, true).is_ok());
        assert!(matches!(
            PakIndex::parse_records(&bytes, 0, true, false),
            Err(PakError::TrailingIndexData(5))
        ));
    }

    #[test]
    fn test_find_requires_mount_prefix() {
        let mut index = PakIndex::new("../../../Game/");
        index.insert("Config.json", stored(0, 1)).expect("insert");

        assert!(index.find("Game/Config.json", "Game/").is_some());
        assert!(index.find("Config.json", "Game/").is_none());
        assert!(index.find("Game/Missing.json", "Game/").is_none());
    }
}
