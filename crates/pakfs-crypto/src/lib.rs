//! Cryptographic operations for pak archives
//!
//! This crate provides the key handling and block cipher used to read
//! encrypted pak indexes and payloads.
//!
//! # Components
//!
//! - **Key identifiers**: [`KeyGuid`], the 128-bit id an archive names its key by
//! - **Keys**: [`AesKey`], parsed from the `0x`-prefixed hex form found in keychains
//! - **Key Management**: [`KeyRing`], an append-only registry shared across threads
//! - **Encryption**: [`BlockCipher`], AES-256 over 16-byte aligned buffers
//!
//! # Key Lookup
//!
//! Decryption goes through the [`KeyProvider`] trait, so the cipher adapter can
//! be backed by any key source.
//!
//! # Examples
//!
//! ```
//! use pakfs_crypto::{AesKey, BlockCipher, KeyGuid, KeyRing, align};
//!
//! let ring = KeyRing::new();
//! let guid = KeyGuid::from_hex("11111111222222223333333344444444").unwrap();
//! ring.register(guid, AesKey::new([7; 32]));
//!
//! let mut data = vec![0u8; align(40)];
//! let cipher = BlockCipher::for_guid(&ring, &guid).unwrap();
//! cipher.encrypt_in_place(&mut data).unwrap();
//! cipher.decrypt_in_place(&mut data).unwrap();
//! assert!(data.iter().all(|b| *b == 0));
//! ```

#![warn(missing_docs)]

pub mod cipher;
pub mod error;
pub mod guid;
pub mod keys;
pub mod provider;

pub use error::CryptoError;

// Re-export commonly used types
pub use cipher::{AES_BLOCK_SIZE, BlockCipher, align, align_u64, checked_align_u64, decrypt};
pub use guid::KeyGuid;
pub use keys::{AES_KEY_SIZE, AesKey, KeyRing, Registration};
pub use provider::KeyProvider;
