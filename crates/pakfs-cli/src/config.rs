//! Command-line configuration.
//!
//! Options can be given as arguments or through environment variables
//! (`PAKFS_DIRS`, `PAKFS_KEYS`, ...). A JSON VFS configuration file may be
//! supplied with `--config`; directories and flags given on the command line
//! are applied on top of it.
//!
//! # Example
//!
//! ```no_run
//! use pakfs_cli::CliConfig;
//!
//! let config = CliConfig::from_args();
//! config.validate().expect("Invalid configuration");
//!
//! let vfs_config = config.vfs_config().expect("Invalid VFS configuration");
//! println!("Scanning {} directories", vfs_config.directories.len());
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pakfs_crypto::{AesKey, KeyGuid};
use pakfs_vfs::VfsConfig;

use crate::error::{CliError, Result};
use crate::keychain::{Keychain, parse_key_arg};

/// Command-line configuration
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pakfs",
    about = "Browse and extract files from collections of pak archives",
    version
)]
pub struct CliConfig {
    /// JSON VFS configuration file
    #[arg(long, env = "PAKFS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory to scan for archives (repeatable)
    #[arg(long = "dir", env = "PAKFS_DIRS", value_delimiter = ',')]
    pub dirs: Vec<PathBuf>,

    /// Scan subdirectories as well
    #[arg(long)]
    pub recursive: bool,

    /// Worker threads for decoding (0 uses all cores)
    #[arg(long, env = "PAKFS_THREADS")]
    pub threads: Option<usize>,

    /// Keychain JSON file
    #[arg(long, env = "PAKFS_KEYS")]
    pub keys: Option<PathBuf>,

    /// Key given as GUID=KEY (repeatable, empty GUID for the main key)
    #[arg(long = "key", value_name = "GUID=KEY")]
    pub key_args: Vec<String>,

    /// Action to perform
    #[command(subcommand)]
    pub command: Command,
}

/// Actions supported by the command line
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List every known archive and its state
    Archives,

    /// List key GUIDs still needed by unloaded archives
    Keys,

    /// Show details about a file
    Info {
        /// Logical path of the file
        path: String,
    },

    /// Write a file, or part of it, to disk or stdout
    Extract {
        /// Logical path of the file
        path: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// First byte to extract
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Number of bytes to extract (rest of the file when omitted)
        #[arg(long)]
        length: Option<u64>,
    },
}

impl CliConfig {
    /// Parse configuration from command-line arguments.
    #[must_use]
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `CliError::Config` if:
    /// - No directory is given and no config file is supplied
    /// - A directory, config file or keychain file doesn't exist
    pub fn validate(&self) -> Result<()> {
        if self.dirs.is_empty() && self.config.is_none() {
            return Err(CliError::Config(
                "no archive directory given (use --dir or --config)".to_string(),
            ));
        }

        for dir in &self.dirs {
            if !dir.is_dir() {
                return Err(CliError::Config(format!(
                    "directory not found: {}",
                    dir.display()
                )));
            }
        }

        for (what, file) in [("config file", &self.config), ("keychain", &self.keys)] {
            if let Some(file) = file
                && !file.is_file()
            {
                return Err(CliError::Config(format!(
                    "{what} not found: {}",
                    file.display()
                )));
            }
        }

        Ok(())
    }

    /// Build the VFS configuration
    pub fn vfs_config(&self) -> Result<VfsConfig> {
        let mut config = match &self.config {
            Some(path) => VfsConfig::from_json_file(path)?,
            None => VfsConfig::default(),
        };

        config.directories.extend(self.dirs.iter().cloned());
        if self.recursive {
            config.recursive = true;
        }
        if let Some(threads) = self.threads {
            config.worker_threads = threads;
        }

        Ok(config)
    }

    /// Gather keys from the keychain file and `--key` arguments
    ///
    /// Keys given on the command line replace keychain entries with the same
    /// GUID.
    pub fn collect_keys(&self) -> Result<HashMap<KeyGuid, AesKey>> {
        let mut keys = match &self.keys {
            Some(path) => Keychain::from_json_file(path)?.keys()?,
            None => HashMap::new(),
        };

        for arg in &self.key_args {
            let (guid, key) = parse_key_arg(arg)?;
            keys.insert(guid, key);
        }

        Ok(keys)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> CliConfig {
        CliConfig::try_parse_from(std::iter::once("pakfs").chain(args.iter().copied()))
            .expect("Arguments should parse")
    }

    #[test]
    fn test_extract_arguments() {
        let config = parse(&[
            "--dir", "/a", "--dir", "/b", "--threads", "2", "extract", "Game/x.bin", "-o",
            "out.bin", "--offset", "10", "--length", "20",
        ]);

        assert_eq!(config.dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(
            config.command,
            Command::Extract {
                path: "Game/x.bin".to_string(),
                output: Some(PathBuf::from("out.bin")),
                offset: 10,
                length: Some(20),
            }
        );

        let vfs = config.vfs_config().expect("Config should build");
        assert_eq!(vfs.directories.len(), 2);
        assert_eq!(vfs.worker_threads, 2);
        assert!(!vfs.recursive);
    }

    #[test]
    fn test_validate_requires_directory() {
        let config = parse(&["archives"]);
        assert!(matches!(config.validate(), Err(CliError::Config(_))));

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = parse(&["--dir", dir.path().to_str().unwrap(), "keys"]);
        config.validate().expect("Existing directory is valid");

        let config = parse(&["--dir", "/nonexistent/pakfs", "keys"]);
        assert!(matches!(config.validate(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_config_file_merged_with_arguments() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("vfs.json");
        std::fs::write(&path, r#"{ "directories": ["/data"], "pak_extension": "PAK" }"#)
            .expect("Failed to write config");

        let config = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--dir",
            "/extra",
            "--recursive",
            "archives",
        ]);
        let vfs = config.vfs_config().expect("Config should load");

        assert_eq!(vfs.directories, vec![PathBuf::from("/data"), PathBuf::from("/extra")]);
        assert_eq!(vfs.pak_extension, "PAK");
        assert!(vfs.recursive);
    }

    #[test]
    fn test_key_arguments_override_keychain() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("keys.json");
        let guid = "C3C3C3C3C3C3C3C3C3C3C3C3C3C3C3C3";
        std::fs::write(
            &path,
            format!(
                r#"{{ "mainKey": "{}", "dynamicKeys": [{{ "guid": "{guid}", "key": "{}" }}] }}"#,
                "11".repeat(32),
                "22".repeat(32)
            ),
        )
        .expect("Failed to write keychain");

        let key_arg = format!("{guid}={}", "33".repeat(32));
        let config = parse(&["--keys", path.to_str().unwrap(), "--key", &key_arg, "keys"]);
        let keys = config.collect_keys().expect("Keys should load");

        assert_eq!(keys.len(), 2);
        assert_eq!(keys[&KeyGuid::ZERO], AesKey::new([0x11; 32]));
        assert_eq!(keys[&KeyGuid::from_bytes([0xC3; 16])], AesKey::new([0x33; 32]));
    }
}
