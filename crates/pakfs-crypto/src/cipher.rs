//! AES-256 block cipher adapter
//!
//! Pak indexes and payloads are encrypted with AES-256 in ECB mode, one
//! 16-byte block at a time. Every encrypted region is padded to the block
//! size on disk, so reads are widened with [`align`] before decrypting.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use std::fmt;

use crate::error::CryptoError;
use crate::guid::KeyGuid;
use crate::keys::AesKey;
use crate::provider::KeyProvider;

/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

/// Round a length up to the AES block size
///
/// ```
/// use pakfs_crypto::align;
///
/// assert_eq!(align(0), 0);
/// assert_eq!(align(1), 16);
/// assert_eq!(align(32), 32);
/// ```
pub const fn align(size: usize) -> usize {
    (size + AES_BLOCK_SIZE - 1) & !(AES_BLOCK_SIZE - 1)
}

/// [`align`] for file offsets and sizes
///
/// The caller guarantees the result fits in a `u64`; use
/// [`checked_align_u64`] for sizes read from untrusted input.
pub const fn align_u64(size: u64) -> u64 {
    let block = AES_BLOCK_SIZE as u64;
    (size + block - 1) & !(block - 1)
}

/// [`align_u64`] returning `None` when the padded size overflows
///
/// ```
/// use pakfs_crypto::checked_align_u64;
///
/// assert_eq!(checked_align_u64(17), Some(32));
/// assert_eq!(checked_align_u64(u64::MAX - 2), None);
/// ```
pub const fn checked_align_u64(size: u64) -> Option<u64> {
    size.checked_next_multiple_of(AES_BLOCK_SIZE as u64)
}

/// AES-256 ECB cipher bound to one key
#[derive(Clone)]
pub struct BlockCipher {
    cipher: Aes256,
}

impl BlockCipher {
    /// Create a cipher for the given key
    pub fn new(key: &AesKey) -> Self {
        Self {
            cipher: Aes256::new(GenericArray::from_slice(key.as_bytes())),
        }
    }

    /// Look up `guid` and create a cipher for it
    pub fn for_guid<P>(provider: &P, guid: &KeyGuid) -> Result<Self, CryptoError>
    where
        P: KeyProvider + ?Sized,
    {
        provider
            .get_key(guid)
            .map(|key| Self::new(&key))
            .ok_or(CryptoError::KeyNotFound(*guid))
    }

    /// Decrypt data in place
    ///
    /// The buffer length must be a multiple of [`AES_BLOCK_SIZE`].
    pub fn decrypt_in_place(&self, data: &mut [u8]) -> Result<(), CryptoError> {
        check_aligned(data)?;
        for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            self.cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }

    /// Encrypt data in place
    ///
    /// The buffer length must be a multiple of [`AES_BLOCK_SIZE`].
    pub fn encrypt_in_place(&self, data: &mut [u8]) -> Result<(), CryptoError> {
        check_aligned(data)?;
        for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }
}

impl fmt::Debug for BlockCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlockCipher(AES-256-ECB)")
    }
}

/// Decrypt `data` in place with the key registered for `guid`
///
/// Fails with [`CryptoError::KeyNotFound`] when the provider has no such key.
pub fn decrypt<P>(provider: &P, data: &mut [u8], guid: &KeyGuid) -> Result<(), CryptoError>
where
    P: KeyProvider + ?Sized,
{
    BlockCipher::for_guid(provider, guid)?.decrypt_in_place(data)
}

fn check_aligned(data: &[u8]) -> Result<(), CryptoError> {
    if data.len() % AES_BLOCK_SIZE == 0 {
        Ok(())
    } else {
        Err(CryptoError::UnalignedBuffer(data.len()))
    }
}
