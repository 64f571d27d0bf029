//! Command implementations.

use std::fs::File;
use std::io::{BufWriter, Write};

use pakfs_vfs::{FileHandle, Vfs, VfsError};
use tracing::info;

use crate::config::Command;
use crate::error::Result;

/// Bytes read per request while extracting
const EXTRACT_CHUNK: u64 = 1024 * 1024;

/// Run `command` against a populated VFS, writing the report to `out`
pub fn run<W: Write>(vfs: &Vfs, command: &Command, out: &mut W) -> Result<()> {
    match command {
        Command::Archives => list_archives(vfs, out),
        Command::Keys => list_required_keys(vfs, out),
        Command::Info { path } => show_info(&vfs.open(path)?, out),
        Command::Extract {
            path,
            output,
            offset,
            length,
        } => {
            let handle = vfs.open(path)?;
            let length = length.unwrap_or_else(|| handle.size().saturating_sub(*offset));
            // Nothing is written, and no output file created, for a bad range
            check_range(&handle, *offset, length)?;

            if let Some(output) = output {
                let mut file = BufWriter::new(File::create(output)?);
                extract(&handle, *offset, length, &mut file)?;
                file.flush()?;
                info!("Wrote {length} bytes of {path} to {}", output.display());
                Ok(())
            } else {
                extract(&handle, *offset, length, out)
            }
        }
    }
}

fn list_archives<W: Write>(vfs: &Vfs, out: &mut W) -> Result<()> {
    for archive in vfs.archives() {
        let key = archive
            .key_guid
            .map_or_else(|| "-".to_string(), |guid| guid.to_string());
        let files = archive
            .file_count
            .map_or_else(|| "?".to_string(), |count| count.to_string());

        writeln!(
            out,
            "{:<9} {:<7} {:>12} {:>6} {:<32} {} {}",
            archive.state,
            archive.kind,
            archive.size,
            files,
            key,
            archive.name,
            archive.mount_point.as_deref().unwrap_or(""),
        )?;
    }
    Ok(())
}

fn list_required_keys<W: Write>(vfs: &Vfs, out: &mut W) -> Result<()> {
    let mut required: Vec<_> = vfs.required_keys().into_iter().collect();
    required.sort();

    for (guid, mut paths) in required {
        paths.sort();
        writeln!(out, "{guid}")?;
        for path in paths {
            writeln!(out, "  {}", path.display())?;
        }
    }

    for guid in vfs.rejected_keys() {
        writeln!(out, "{guid} rejected: key failed the index check")?;
    }
    Ok(())
}

fn show_info<W: Write>(handle: &FileHandle, out: &mut W) -> Result<()> {
    writeln!(out, "path:        {}", handle.path())?;
    writeln!(out, "archive:     {}", handle.archive_name())?;
    writeln!(out, "size:        {}", handle.size())?;
    writeln!(out, "compression: {}", handle.compression())?;
    writeln!(out, "encrypted:   {}", handle.is_encrypted())?;
    Ok(())
}

fn check_range(handle: &FileHandle, offset: u64, length: u64) -> Result<()> {
    let in_range = offset
        .checked_add(length)
        .is_some_and(|end| end <= handle.size());
    if in_range {
        Ok(())
    } else {
        Err(VfsError::OutOfRange {
            path: handle.path().to_string(),
            offset,
            length,
            size: handle.size(),
        }
        .into())
    }
}

/// Copy `length` bytes of the file starting at `offset` into `out`
///
/// The range must already have passed [`check_range`].
fn extract<W: Write>(handle: &FileHandle, offset: u64, length: u64, out: &mut W) -> Result<()> {
    let end = offset + length;
    let mut position = offset;
    while position < end {
        let chunk = (end - position).min(EXTRACT_CHUNK);
        let data = handle.read(position, usize::try_from(chunk).unwrap_or(usize::MAX))?;
        out.write_all(&data)?;
        position += chunk;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use pakfs_formats::pak::PakBuilder;
    use pakfs_vfs::VfsConfig;
    use pretty_assertions::assert_eq;

    fn fixture() -> (tempfile::TempDir, Vfs, Vec<u8>) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let data: Vec<u8> = (0..3_000_000u32).map(|i| (i % 251) as u8).collect();
        PakBuilder::new("../../../Game/")
            .add_file("Content/big.bin", data.clone())
            .add_file("Content/empty.bin", Vec::new())
            .write_to(dir.path().join("base.pak"))
            .expect("Failed to write archive");

        let vfs = Vfs::new(VfsConfig::new(dir.path())).expect("Vfs should start");
        vfs.discover_configured();
        vfs.mount_all();
        (dir, vfs, data)
    }

    #[test]
    fn test_extract_spans_chunks() {
        let (_dir, vfs, data) = fixture();
        let mut out = Vec::new();

        run(
            &vfs,
            &Command::Extract {
                path: "Game/Content/big.bin".to_string(),
                output: None,
                offset: 1000,
                length: None,
            },
            &mut out,
        )
        .expect("Extract should succeed");

        assert_eq!(out.len(), data.len() - 1000);
        assert!(out == data[1000..]);
    }

    #[test]
    fn test_extract_to_file() {
        let (dir, vfs, data) = fixture();
        let target = dir.path().join("out.bin");

        run(
            &vfs,
            &Command::Extract {
                path: "Game/Content/big.bin".to_string(),
                output: Some(target.clone()),
                offset: 5,
                length: Some(100),
            },
            &mut std::io::sink(),
        )
        .expect("Extract should succeed");

        assert_eq!(std::fs::read(target).expect("Output exists"), &data[5..105]);
    }

    #[test]
    fn test_extract_rejects_out_of_range() {
        let (_dir, vfs, _) = fixture();
        let command = Command::Extract {
            path: "Game/Content/empty.bin".to_string(),
            output: None,
            offset: 1,
            length: None,
        };

        let err = run(&vfs, &command, &mut Vec::new()).expect_err("Offset past end");
        assert!(matches!(err, CliError::Vfs(VfsError::OutOfRange { .. })));
    }

    #[test]
    fn test_extract_past_end_writes_nothing() {
        let (dir, vfs, data) = fixture();
        let too_long = Command::Extract {
            path: "Game/Content/big.bin".to_string(),
            output: None,
            offset: 0,
            length: Some(data.len() as u64 + 1),
        };

        let mut out = Vec::new();
        let err = run(&vfs, &too_long, &mut out).expect_err("Length past end");
        assert!(matches!(
            err,
            CliError::Vfs(VfsError::OutOfRange { size: 3_000_000, .. })
        ));
        assert!(out.is_empty());

        let target = dir.path().join("partial.bin");
        let to_file = Command::Extract {
            path: "Game/Content/big.bin".to_string(),
            output: Some(target.clone()),
            offset: 2_000_000,
            length: Some(1_000_001),
        };
        run(&vfs, &to_file, &mut std::io::sink()).expect_err("Length past end");
        assert!(!target.exists());
    }

    #[test]
    fn test_info_report() {
        let (_dir, vfs, _) = fixture();
        let mut out = Vec::new();
        run(
            &vfs,
            &Command::Info {
                path: "Game/Content/big.bin".to_string(),
            },
            &mut out,
        )
        .expect("Info should succeed");

        let text = String::from_utf8(out).expect("Report is UTF-8");
        assert!(text.contains("archive:     base.pak"));
        assert!(text.contains("size:        3000000"));
        assert!(text.contains("compression: Zlib"));
        assert!(text.contains("encrypted:   false"));
    }
}
