//! AES key management
//!
//! Archive keys are 256-bit AES keys written as `0x` followed by 64 hex
//! digits. The [`KeyRing`] is the append-only registry consulted whenever an
//! index or entry has to be decrypted.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

use crate::error::CryptoError;
use crate::guid::KeyGuid;
use crate::provider::KeyProvider;

/// Size of an AES-256 key in bytes
pub const AES_KEY_SIZE: usize = 32;

/// A 256-bit AES key
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AesKey([u8; AES_KEY_SIZE]);

impl AesKey {
    /// Create a key from raw bytes
    pub const fn new(bytes: [u8; AES_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    pub const fn as_bytes(&self) -> &[u8; AES_KEY_SIZE] {
        &self.0
    }

    /// Parse key from hex string
    ///
    /// The `0x` prefix used by keychain files is optional.
    ///
    /// ```
    /// use pakfs_crypto::AesKey;
    ///
    /// let key = AesKey::from_hex(
    ///     "0x000102030405060708090A0B0C0D0E0F101112131415161718191A1B1C1D1E1F",
    /// ).unwrap();
    /// assert_eq!(key.as_bytes()[31], 0x1F);
    /// ```
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let hex = hex.trim();
        let hex = hex
            .strip_prefix("0x")
            .or_else(|| hex.strip_prefix("0X"))
            .unwrap_or(hex);

        let bytes = hex::decode(hex)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid hex: {e}")))?;

        if bytes.len() != AES_KEY_SIZE {
            return Err(CryptoError::InvalidKeySize {
                expected: AES_KEY_SIZE,
                actual: bytes.len(),
            });
        }

        let mut key = [0u8; AES_KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }

    /// Hex form with the `0x` prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode_upper(self.0))
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(<redacted>)")
    }
}

/// Outcome of registering a key with a [`KeyRing`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The key was not known and has been added
    Added,
    /// The same key was already registered under this GUID
    AlreadyPresent,
    /// A different key is registered under this GUID; the existing one is kept
    Conflict,
}

/// Thread-safe, append-only registry of AES keys
#[derive(Default)]
pub struct KeyRing {
    keys: RwLock<HashMap<KeyGuid, AesKey>>,
}

impl KeyRing {
    /// Create an empty key ring
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key
    ///
    /// Keys are never replaced. Registering a different value under a GUID
    /// that is already known reports [`Registration::Conflict`] and leaves
    /// the registry unchanged.
    pub fn register(&self, guid: KeyGuid, key: AesKey) -> Registration {
        let mut keys = self.keys.write();
        match keys.get(&guid) {
            Some(existing) if *existing == key => Registration::AlreadyPresent,
            Some(_) => Registration::Conflict,
            None => {
                keys.insert(guid, key);
                Registration::Added
            }
        }
    }

    /// Get a key by GUID
    pub fn get(&self, guid: &KeyGuid) -> Option<AesKey> {
        self.keys.read().get(guid).copied()
    }

    /// Check whether a key is registered
    pub fn contains(&self, guid: &KeyGuid) -> bool {
        self.keys.read().contains_key(guid)
    }

    /// Get the number of registered keys
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Check if the key ring is empty
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// GUIDs of all registered keys
    pub fn guids(&self) -> Vec<KeyGuid> {
        let mut guids: Vec<KeyGuid> = self.keys.read().keys().copied().collect();
        guids.sort_unstable();
        guids
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("keys", &self.guids())
            .finish()
    }
}

impl KeyProvider for KeyRing {
    fn get_key(&self, guid: &KeyGuid) -> Option<AesKey> {
        self.get(guid)
    }
}
