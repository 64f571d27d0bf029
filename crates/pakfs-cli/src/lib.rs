//! Command-line host for the pak virtual file system.
//!
//! The `pakfs` binary is a thin wrapper around this library:
//!
//! - [`config`]: argument and environment parsing
//! - [`keychain`]: loading keys from JSON keychains and `GUID=KEY` arguments
//! - [`commands`]: listing archives and keys, inspecting and extracting files

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

pub mod commands;
pub mod config;
pub mod error;
pub mod keychain;

pub use config::{CliConfig, Command};
pub use error::{CliError, Result};
pub use keychain::Keychain;
