//! Block-compressed entry reader
//!
//! A read touches the contiguous run of blocks covering the requested range.
//! Compressed blocks are read into two alternating working slots so the read
//! of block `n + 1` overlaps the decryption and decompression of block `n` on
//! the worker pool. The last block always decodes on the calling thread.
//!
//! A block that the destination covers completely decodes straight into it.
//! Any other block decodes into the thread's temporary buffer and the needed
//! sub-range is copied out; the temporary buffer then keeps that block so a
//! following read of the same block on this thread skips the decode.

use pakfs_crypto::{BlockCipher, align};
use pakfs_formats::pak::{CompressionMethod, PakEntry};
use rayon::ThreadPool;
use tracing::trace;

use crate::scratch::{CacheTag, ScratchBuffers};
use crate::shared::ArchiveBytes;
use crate::{Result, VfsError};

/// Decode statistics for one read
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadStats {
    /// Blocks decrypted and decompressed
    pub blocks_decoded: usize,
    /// Blocks copied from the thread's cached block
    pub cache_hits: usize,
}

/// Where an entry's blocks live and how they decode
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockSource<'a> {
    pub bytes: &'a ArchiveBytes,
    pub entry: &'a PakEntry,
    pub method: CompressionMethod,
    pub cipher: Option<&'a BlockCipher>,
    /// Offset block ranges are relative to
    pub base: u64,
    /// Index hash of the owning archive
    pub archive: [u8; 20],
}

/// Fill `out` with the entry's bytes starting at `position`
///
/// The caller guarantees the range lies inside the entry.
pub(crate) fn read_blocks(
    source: &BlockSource<'_>,
    pool: &ThreadPool,
    position: u64,
    out: &mut [u8],
) -> Result<ReadStats> {
    let mut stats = ReadStats::default();
    if out.is_empty() {
        return Ok(stats);
    }

    let entry = source.entry;
    let block_size = entry.compression_block_size as usize;
    if block_size == 0 {
        return Err(VfsError::Internal(
            "compressed entry has a zero block size".to_string(),
        ));
    }

    let first = (position / block_size as u64) as usize;
    let last = ((position + out.len() as u64 - 1) / block_size as u64) as usize;
    let blocks = entry.blocks.get(first..=last).ok_or_else(|| {
        VfsError::Internal(format!(
            "blocks {first}..={last} requested from an entry with {} blocks",
            entry.blocks.len()
        ))
    })?;

    let largest_read = blocks
        .iter()
        .map(|block| entry.block_read_size(block))
        .max()
        .unwrap_or(0) as usize;
    let bound = source.method.compressed_bound(block_size);
    let slot_size = align(largest_read.max(bound + bound / 10));

    let mut scratch = ScratchBuffers::acquire();
    // Only buffers that already held a block of this size can hold a cached block
    let temp_was_valid = scratch.temp.len() >= block_size;
    scratch.ensure_space(block_size, slot_size * 2);

    let buffers = &mut *scratch;
    let (even, odd) = buffers.working[..slot_size * 2].split_at_mut(slot_size);
    let mut workspace = Workspace {
        slots: [Some(even), Some(odd)],
        temp: Some(&mut buffers.temp[..block_size]),
        tag: &mut buffers.tag,
    };

    let mut remaining = out;
    let mut skip = (position % block_size as u64) as usize;
    let mut pending: Option<DecodeJob<'_>> = None;
    let mut decoding = false;

    for (index, block) in (first..).zip(blocks) {
        let block_len = entry.block_uncompressed_len(index) as usize;
        let direct = skip == 0 && remaining.len() >= block_size;
        let write_len = (block_len - skip).min(remaining.len());
        let (chunk, rest) = std::mem::take(&mut remaining).split_at_mut(write_len);
        remaining = rest;

        let tag = CacheTag {
            archive: source.archive,
            entry_offset: entry.offset,
            block: index,
        };

        if temp_was_valid
            && !decoding
            && !direct
            && let Some(cached) = workspace.cached(&tag)
        {
            chunk.copy_from_slice(&cached[skip..skip + write_len]);
            stats.cache_hits += 1;
            trace!("Block {index} of entry at {} served from cache", entry.offset);
            skip = 0;
            continue;
        }

        let slot = workspace.take_slot(index)?;
        let read_len = entry.block_read_size(block) as usize;
        let location = source.base + block.compressed_start;

        let slot = match pending.take() {
            Some(job) => {
                let (decoded, read) = pool.install(move || {
                    rayon::join(
                        move || job.run(source.method, source.cipher),
                        move || read_block(source.bytes, location, read_len, slot),
                    )
                });
                workspace.finish(decoded?, &mut stats);
                read?
            }
            None => read_block(source.bytes, location, read_len, slot)?,
        };

        workspace.invalidate();
        decoding = true;

        let target = if direct {
            Target::Direct(chunk)
        } else {
            Target::Staged {
                temp: workspace.take_temp()?,
                block_len,
                skip,
                out: chunk,
            }
        };
        let job = DecodeJob {
            tag,
            slot,
            read_len,
            compressed_len: block.len() as usize,
            target,
        };

        if remaining.is_empty() {
            let finished = job.run(source.method, source.cipher)?;
            workspace.finish(finished, &mut stats);
        } else {
            pending = Some(job);
        }
        skip = 0;
    }

    if let Some(job) = pending {
        let finished = job.run(source.method, source.cipher)?;
        workspace.finish(finished, &mut stats);
    }

    Ok(stats)
}

fn read_block<'s>(
    bytes: &ArchiveBytes,
    location: u64,
    len: usize,
    slot: &'s mut [u8],
) -> Result<&'s mut [u8]> {
    bytes.read_at(location, &mut slot[..len])?;
    Ok(slot)
}

/// Buffers lent out of the thread's scratch space for one read
struct Workspace<'a> {
    slots: [Option<&'a mut [u8]>; 2],
    temp: Option<&'a mut [u8]>,
    tag: &'a mut Option<CacheTag>,
}

impl<'a> Workspace<'a> {
    fn take_slot(&mut self, index: usize) -> Result<&'a mut [u8]> {
        self.slots[index & 1].take().ok_or_else(|| {
            VfsError::Internal(format!("working slot {} is still in use", index & 1))
        })
    }

    fn take_temp(&mut self) -> Result<&'a mut [u8]> {
        self.temp
            .take()
            .ok_or_else(|| VfsError::Internal("temporary block buffer is still in use".to_string()))
    }

    fn cached(&self, tag: &CacheTag) -> Option<&[u8]> {
        if self.tag.as_ref() == Some(tag) {
            self.temp.as_deref()
        } else {
            None
        }
    }

    fn invalidate(&mut self) {
        *self.tag = None;
    }

    fn finish(&mut self, finished: Finished<'a>, stats: &mut ReadStats) {
        self.slots[finished.tag.block & 1] = Some(finished.slot);
        if let Some(temp) = finished.temp {
            self.temp = Some(temp);
            *self.tag = Some(finished.tag);
        }
        stats.blocks_decoded += 1;
    }
}

enum Target<'a> {
    /// Destination covers the whole block
    Direct(&'a mut [u8]),
    /// Decode into `temp`, then copy `out.len()` bytes from `skip`
    Staged {
        temp: &'a mut [u8],
        block_len: usize,
        skip: usize,
        out: &'a mut [u8],
    },
}

struct DecodeJob<'a> {
    tag: CacheTag,
    slot: &'a mut [u8],
    read_len: usize,
    compressed_len: usize,
    target: Target<'a>,
}

struct Finished<'a> {
    tag: CacheTag,
    slot: &'a mut [u8],
    temp: Option<&'a mut [u8]>,
}

impl<'a> DecodeJob<'a> {
    fn run(self, method: CompressionMethod, cipher: Option<&BlockCipher>) -> Result<Finished<'a>> {
        let Self {
            tag,
            slot,
            read_len,
            compressed_len,
            target,
        } = self;

        if let Some(cipher) = cipher {
            cipher.decrypt_in_place(&mut slot[..read_len])?;
        }
        let compressed = &slot[..compressed_len];

        let temp = match target {
            Target::Direct(out) => {
                method.decompress_into(compressed, out)?;
                None
            }
            Target::Staged {
                temp,
                block_len,
                skip,
                out,
            } => {
                method.decompress_into(compressed, &mut temp[..block_len])?;
                let end = skip + out.len();
                out.copy_from_slice(&temp[skip..end]);
                Some(temp)
            }
        };

        Ok(Finished { tag, slot, temp })
    }
}
