//! Reader for entries stored without compression

use pakfs_crypto::{AES_BLOCK_SIZE, BlockCipher, align_u64};
use pakfs_formats::pak::PakEntry;

use crate::Result;
use crate::scratch::ScratchBuffers;
use crate::shared::ArchiveBytes;

/// Fill `out` with the entry's bytes starting at `position`
///
/// Encrypted entries are decrypted over the AES-aligned window that covers
/// the request, so any offset and length can be served.
pub(crate) fn read_stored(
    bytes: &ArchiveBytes,
    entry: &PakEntry,
    cipher: Option<&BlockCipher>,
    position: u64,
    out: &mut [u8],
) -> Result<()> {
    if out.is_empty() {
        return Ok(());
    }

    let Some(cipher) = cipher else {
        bytes.read_at(entry.offset + position, out)?;
        return Ok(());
    };

    let start = position - position % AES_BLOCK_SIZE as u64;
    let end = align_u64(position + out.len() as u64);
    let window = (end - start) as usize;
    let skip = (position - start) as usize;

    let mut scratch = ScratchBuffers::acquire();
    scratch.ensure_space(window, 0);
    // The temporary buffer no longer holds a decoded block
    scratch.tag = None;

    let buffer = &mut scratch.temp[..window];
    bytes.read_at(entry.offset + start, buffer)?;
    cipher.decrypt_in_place(buffer)?;
    out.copy_from_slice(&buffer[skip..skip + out.len()]);

    Ok(())
}
