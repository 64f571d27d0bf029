//! Keychain files and key arguments.
//!
//! A keychain is a JSON document listing the main key and any number of
//! per-archive keys:
//!
//! ```json
//! {
//!   "mainKey": "0x0123...",
//!   "dynamicKeys": [
//!     { "guid": "A1B2...", "key": "0x4567...", "fileName": "pakchunk1-Windows.pak" }
//!   ]
//! }
//! ```
//!
//! The main key is registered under the zero GUID.

use std::collections::HashMap;
use std::path::Path;

use pakfs_crypto::{AesKey, KeyGuid};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CliError, Result};

/// Keychain document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keychain {
    /// Key for archives with the zero GUID
    #[serde(default)]
    pub main_key: Option<String>,

    /// Keys for archives with their own GUID
    #[serde(default)]
    pub dynamic_keys: Vec<DynamicKey>,
}

/// One GUID-addressed key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicKey {
    /// Key GUID as 32 hex digits
    pub guid: String,
    /// AES key as 64 hex digits
    pub key: String,
    /// Archive the key was published for, informational only
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Keychain {
    /// Parse a keychain document
    pub fn parse(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Load a keychain file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CliError::Keychain {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text).map_err(|e| CliError::Keychain {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Decode every key in the keychain
    pub fn keys(&self) -> Result<HashMap<KeyGuid, AesKey>> {
        let mut keys = HashMap::new();

        if let Some(main) = self.main_key.as_deref().filter(|k| !k.trim().is_empty()) {
            keys.insert(KeyGuid::ZERO, AesKey::from_hex(main)?);
        }

        for dynamic in &self.dynamic_keys {
            let guid = KeyGuid::from_hex(&dynamic.guid)?;
            let key = AesKey::from_hex(&dynamic.key)?;
            debug!(
                "Keychain entry {guid} for {}",
                dynamic.file_name.as_deref().unwrap_or("unnamed archive")
            );
            keys.insert(guid, key);
        }

        Ok(keys)
    }
}

/// Parse a `GUID=KEY` argument
///
/// The GUID may be left empty (`=0x...`) to address the main key.
pub fn parse_key_arg(arg: &str) -> Result<(KeyGuid, AesKey)> {
    let (guid, key) = arg.split_once('=').ok_or_else(|| {
        CliError::Config(format!("expected GUID=KEY, got '{arg}'"))
    })?;

    let guid = if guid.trim().is_empty() {
        KeyGuid::ZERO
    } else {
        KeyGuid::from_hex(guid)?
    };
    Ok((guid, AesKey::from_hex(key.trim())?))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KEY_HEX: &str = "0x000102030405060708090A0B0C0D0E0F101112131415161718191A1B1C1D1E1F";

    #[test]
    fn test_keychain_keys() {
        let text = format!(
            r#"{{
                "mainKey": "{KEY_HEX}",
                "dynamicKeys": [
                    {{ "guid": "A1A1A1A1-A1A1A1A1-A1A1A1A1-A1A1A1A1", "key": "{KEY_HEX}", "fileName": "dlc.pak" }},
                    {{ "guid": "B2B2B2B2B2B2B2B2B2B2B2B2B2B2B2B2", "key": "{}" }}
                ]
            }}"#,
            "FF".repeat(32)
        );

        let keychain = Keychain::parse(&text).expect("Keychain should parse");
        assert_eq!(keychain.dynamic_keys[0].file_name.as_deref(), Some("dlc.pak"));
        assert_eq!(keychain.dynamic_keys[1].file_name, None);

        let keys = keychain.keys().expect("Keys should decode");
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[&KeyGuid::ZERO].as_bytes()[31], 0x1F);
        assert_eq!(keys[&KeyGuid::from_bytes([0xA1; 16])], keys[&KeyGuid::ZERO]);
        assert_eq!(keys[&KeyGuid::from_bytes([0xB2; 16])], AesKey::new([0xFF; 32]));
    }

    #[test]
    fn test_empty_keychain() {
        let keychain = Keychain::parse(r#"{ "mainKey": "" }"#).expect("Keychain should parse");
        assert!(keychain.keys().expect("No keys").is_empty());
    }

    #[test]
    fn test_bad_key_rejected() {
        let keychain = Keychain {
            main_key: Some("0x1234".to_string()),
            dynamic_keys: Vec::new(),
        };
        assert!(matches!(keychain.keys(), Err(CliError::Key(_))));
    }

    #[test]
    fn test_parse_key_arg() {
        let (guid, key) =
            parse_key_arg(&format!("A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1={KEY_HEX}")).expect("Argument should parse");
        assert_eq!(guid, KeyGuid::from_bytes([0xA1; 16]));
        assert_eq!(key.as_bytes()[0], 0x00);

        let (guid, _) = parse_key_arg(&format!("={KEY_HEX}")).expect("Main key argument");
        assert!(guid.is_zero());

        assert!(matches!(parse_key_arg(KEY_HEX), Err(CliError::Config(_))));
        assert!(matches!(parse_key_arg("zz=00"), Err(CliError::Key(_))));
    }

    #[test]
    fn test_missing_keychain_file() {
        let err = Keychain::from_json_file(Path::new("/nonexistent/keys.json"))
            .expect_err("Missing file should fail");
        assert!(matches!(err, CliError::Keychain { .. }));
    }
}
