//! Reading file contents out of mounted archives
//!
//! [`FileHandle`] is returned by a successful lookup. It holds the entry
//! record, the key the entry needs and an accessor to the archive mapping,
//! so reads never touch the mount manager's lock.

mod blocks;
mod stored;

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use pakfs_crypto::BlockCipher;
use pakfs_formats::pak::{CompressionMethod, PakEntry};
use rayon::ThreadPool;

use crate::shared::ArchiveBytes;
use crate::{Result, VfsError};

pub use blocks::ReadStats;

use blocks::{BlockSource, read_blocks};
use stored::read_stored;

/// Open file inside a mounted pak archive
pub struct FileHandle {
    path: String,
    archive_name: String,
    bytes: ArchiveBytes,
    entry: PakEntry,
    method: CompressionMethod,
    cipher: Option<BlockCipher>,
    base: u64,
    archive_hash: [u8; 20],
    pool: Arc<ThreadPool>,
    position: u64,
}

/// Parts of a [`FileHandle`] resolved by the owning archive
pub(crate) struct HandleParts {
    pub path: String,
    pub archive_name: String,
    pub bytes: ArchiveBytes,
    pub entry: PakEntry,
    pub method: CompressionMethod,
    pub cipher: Option<BlockCipher>,
    pub base: u64,
    pub archive_hash: [u8; 20],
}

impl FileHandle {
    pub(crate) fn new(parts: HandleParts, pool: Arc<ThreadPool>) -> Self {
        Self {
            path: parts.path,
            archive_name: parts.archive_name,
            bytes: parts.bytes,
            entry: parts.entry,
            method: parts.method,
            cipher: parts.cipher,
            base: parts.base,
            archive_hash: parts.archive_hash,
            pool,
            position: 0,
        }
    }

    /// Logical path the handle was opened with
    pub fn path(&self) -> &str {
        &self.path
    }

    /// File name of the archive serving this file
    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    /// Uncompressed size of the file
    pub fn size(&self) -> u64 {
        self.entry.uncompressed_size
    }

    /// Compression method of the entry
    pub const fn compression(&self) -> CompressionMethod {
        self.method
    }

    /// Whether the entry is encrypted on disk
    pub const fn is_encrypted(&self) -> bool {
        self.entry.encrypted
    }

    /// Read `length` bytes starting at `offset`
    pub fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; length];
        self.read_into(offset, &mut out)?;
        Ok(out)
    }

    /// Read the whole file
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let size = usize::try_from(self.size())
            .map_err(|_| VfsError::Internal(format!("{} does not fit in memory", self.path)))?;
        self.read(0, size)
    }

    /// Fill `out` with the bytes starting at `offset`
    pub fn read_into(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        self.read_with_stats(offset, out).map(|_| ())
    }

    /// Fill `out` and report how the blocks were obtained
    ///
    /// Stored entries report no blocks.
    pub fn read_with_stats(&self, offset: u64, out: &mut [u8]) -> Result<ReadStats> {
        let length = out.len() as u64;
        let in_range = offset
            .checked_add(length)
            .is_some_and(|end| end <= self.size());
        if !in_range {
            return Err(VfsError::OutOfRange {
                path: self.path.clone(),
                offset,
                length,
                size: self.size(),
            });
        }

        if self.entry.is_compressed() {
            let source = BlockSource {
                bytes: &self.bytes,
                entry: &self.entry,
                method: self.method,
                cipher: self.cipher.as_ref(),
                base: self.base,
                archive: self.archive_hash,
            };
            read_blocks(&source, &self.pool, offset, out)
        } else {
            read_stored(&self.bytes, &self.entry, self.cipher.as_ref(), offset, out)?;
            Ok(ReadStats::default())
        }
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.size().saturating_sub(self.position);
        let len = buf.len().min(usize::try_from(available).unwrap_or(usize::MAX));
        if len == 0 {
            return Ok(0);
        }

        self.read_into(self.position, &mut buf[..len])
            .map_err(io::Error::other)?;
        self.position += len as u64;
        Ok(len)
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };

        let target = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        self.position = target;
        Ok(target)
    }
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("archive", &self.archive_name)
            .field("size", &self.size())
            .field("method", &self.method)
            .field("encrypted", &self.entry.encrypted)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}
