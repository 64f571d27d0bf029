//! Pluggable key lookup
//!
//! The cipher adapter does not care where keys live. Anything that can map a
//! [`KeyGuid`] to an [`AesKey`] can back it: the in-memory [`KeyRing`], a
//! fixed map in tests, or an application-specific store.
//!
//! [`KeyRing`]: crate::KeyRing

use std::collections::HashMap;

use crate::guid::KeyGuid;
use crate::keys::AesKey;

/// Trait for AES key lookup backends
pub trait KeyProvider: Send + Sync {
    /// Get a key by GUID
    fn get_key(&self, guid: &KeyGuid) -> Option<AesKey>;

    /// Check if a key exists
    fn contains_key(&self, guid: &KeyGuid) -> bool {
        self.get_key(guid).is_some()
    }
}

impl KeyProvider for HashMap<KeyGuid, AesKey> {
    fn get_key(&self, guid: &KeyGuid) -> Option<AesKey> {
        self.get(guid).copied()
    }
}
