//! pakfs binary entry point.
//!
//! This is a thin wrapper around the pakfs-cli library that:
//! 1. Initializes logging
//! 2. Parses and validates the configuration
//! 3. Discovers and mounts archives, submitting any configured keys
//! 4. Runs the requested command

use anyhow::{Context, Result};
use pakfs_cli::{CliConfig, commands};
use pakfs_vfs::Vfs;

fn main() -> Result<()> {
    // Logs go to stderr so extracted data can be piped from stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig::from_args();
    config.validate()?;

    let vfs = Vfs::new(config.vfs_config()?).context("Failed to start VFS")?;
    let summary = vfs.discover_configured();
    if summary.discovered == 0 {
        tracing::warn!("No archives found in the configured directories");
    }

    vfs.mount_all();

    let keys = config.collect_keys()?;
    if !keys.is_empty() {
        vfs.submit_keys(keys);
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    commands::run(&vfs, &config.command, &mut out)?;

    Ok(())
}
