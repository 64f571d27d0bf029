//! Reference-counted archive file mappings
//!
//! Every read acquires an [`ArchiveBytes`] accessor for its archive. The
//! first acquisition maps the file; later ones share that mapping for as
//! long as any accessor is alive. When the last accessor drops, the mapping
//! is released and the next read maps the file again.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use memmap2::{Mmap, MmapOptions};
use parking_lot::Mutex;
use tracing::debug;

/// Lazily mapped archive file shared by concurrent readers
#[derive(Debug)]
pub struct SharedFile {
    path: PathBuf,
    live: Mutex<Weak<Mmap>>,
}

impl SharedFile {
    /// Create a handle for `path` without opening it
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            live: Mutex::new(Weak::new()),
        }
    }

    /// Path of the archive file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get an accessor, mapping the file if no reader holds it
    pub fn acquire(&self) -> io::Result<ArchiveBytes> {
        let mut live = self.live.lock();
        if let Some(map) = live.upgrade() {
            return Ok(ArchiveBytes { map });
        }

        let file = File::open(&self.path)?;
        // Archives are treated as immutable while the VFS is running
        #[allow(unsafe_code)]
        let map = unsafe { MmapOptions::new().map(&file)? };
        debug!("Mapped {} ({} bytes)", self.path.display(), map.len());

        let map = Arc::new(map);
        *live = Arc::downgrade(&map);
        Ok(ArchiveBytes { map })
    }

    /// Whether a reader currently holds the mapping
    pub fn is_mapped(&self) -> bool {
        self.live.lock().strong_count() > 0
    }
}

/// Read access to a mapped archive
#[derive(Debug, Clone)]
pub struct ArchiveBytes {
    map: Arc<Mmap>,
}

impl ArchiveBytes {
    /// Whole file contents
    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    /// File size in bytes
    pub fn len(&self) -> u64 {
        self.map.len() as u64
    }

    /// Whether the file is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Fill `buf` with the bytes at `offset`
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let source = usize::try_from(offset)
            .ok()
            .and_then(|start| self.map.get(start..start.checked_add(buf.len())?))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "read of {} bytes at {offset} past end of archive ({} bytes)",
                        buf.len(),
                        self.map.len()
                    ),
                )
            })?;
        buf.copy_from_slice(source);
        Ok(())
    }

    /// Number of live accessors sharing this mapping
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.map)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mapping_shared_and_released() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").expect("Failed to write file");

        let file = SharedFile::new(&path);
        assert!(!file.is_mapped());

        let first = file.acquire().expect("First acquire should map");
        let second = file.acquire().expect("Second acquire should share");
        assert_eq!(first.handle_count(), 2);
        assert!(file.is_mapped());

        drop(first);
        drop(second);
        assert!(!file.is_mapped());

        let again = file.acquire().expect("Acquire after release should remap");
        assert_eq!(again.handle_count(), 1);
        assert_eq!(again.len(), 10);
    }

    #[test]
    fn test_read_at_bounds() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").expect("Failed to write file");

        let bytes = SharedFile::new(&path).acquire().expect("Acquire should succeed");
        let mut buf = [0u8; 4];
        bytes.read_at(3, &mut buf).expect("In-bounds read");
        assert_eq!(&buf, b"3456");

        let err = bytes.read_at(8, &mut buf).expect_err("Read past end should fail");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_missing_file() {
        let file = SharedFile::new("/nonexistent/archive.pak");
        assert!(file.acquire().is_err());
    }
}
