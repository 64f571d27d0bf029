//! Encryption key identifiers
//!
//! Archives name the key that protects them with a 128-bit GUID. The
//! all-zero GUID identifies the main key of a build.

use std::fmt;
use std::str::FromStr;

use crate::error::CryptoError;

/// 128-bit identifier correlating an archive with its encryption key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct KeyGuid([u8; 16]);

impl KeyGuid {
    /// Size of a GUID in bytes
    pub const SIZE: usize = 16;

    /// The zero GUID, used for the main key
    pub const ZERO: Self = Self([0u8; 16]);

    /// Create a GUID from raw bytes
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw GUID bytes as stored on disk
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Whether this is the zero (main key) GUID
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 16]
    }

    /// Parse a GUID from 32 hex digits
    ///
    /// Dashes and an optional `0x` prefix are ignored, so both
    /// `0123456789ABCDEF0123456789ABCDEF` and the dashed form are accepted.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        let text = text.trim();
        let text = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        let digits: String = text.chars().filter(|c| *c != '-').collect();

        let bytes = hex::decode(&digits)
            .map_err(|e| CryptoError::InvalidGuid(format!("invalid hex '{text}': {e}")))?;

        let bytes: [u8; 16] = bytes.try_into().map_err(|b: Vec<u8>| {
            CryptoError::InvalidGuid(format!("expected 16 bytes, got {}", b.len()))
        })?;

        Ok(Self(bytes))
    }
}

impl FromStr for KeyGuid {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for KeyGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl fmt::Debug for KeyGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyGuid({self})")
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_display_is_upper_hex() {
        let guid = KeyGuid::from_bytes([
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
            0xcd, 0xef,
        ]);
        assert_eq!(guid.to_string(), "0123456789ABCDEF0123456789ABCDEF");
    }

    #[test]
    fn test_guid_parse_dashed() {
        let guid: KeyGuid = "01234567-89AB-CDEF-0123-456789abcdef"
            .parse()
            .expect("Dashed GUID should parse");
        assert_eq!(guid.to_string(), "0123456789ABCDEF0123456789ABCDEF");
    }

    #[test]
    fn test_guid_rejects_wrong_length() {
        assert!(KeyGuid::from_hex("0123").is_err());
        assert!(KeyGuid::from_hex("zz23456789ABCDEF0123456789ABCDEF").is_err());
    }

    #[test]
    fn test_zero_guid() {
        assert!(KeyGuid::ZERO.is_zero());
        assert!(KeyGuid::default().is_zero());
        assert!(!KeyGuid::from_bytes([1; 16]).is_zero());
    }
}
