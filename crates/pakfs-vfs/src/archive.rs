//! Archive kinds and their shared interface
//!
//! Two kinds of container are discovered: pak archives, which serve files,
//! and IoStore containers, whose TOC header is read so they can take part in
//! key tracking and listing but which serve no paths.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pakfs_crypto::{BlockCipher, KeyGuid, KeyRing};
use pakfs_formats::iostore::{TOC_HEADER_SIZE, TocHeader};
use pakfs_formats::pak::{FOOTER_SIZE, PakEntry, PakError, PakFooter, PakIndex};
use rayon::ThreadPool;
use tracing::debug;

use crate::config::VfsConfig;
use crate::reader::{FileHandle, HandleParts};
use crate::shared::SharedFile;
use crate::{Result, VfsError};

/// Kind of container
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArchiveKind {
    /// `.pak` archive
    Pak,
    /// `.utoc`/`.ucas` container
    IoStore,
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pak => f.write_str("pak"),
            Self::IoStore => f.write_str("iostore"),
        }
    }
}

/// Where an archive is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveState {
    /// Discovered, waiting to be mounted
    Unloaded,
    /// A mount task is running
    Mounting,
    /// Serving files
    Mounted,
}

impl fmt::Display for ArchiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unloaded => f.write_str("unloaded"),
            Self::Mounting => f.write_str("mounting"),
            Self::Mounted => f.write_str("mounted"),
        }
    }
}

/// Summary of a known archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    /// File name
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Container kind
    pub kind: ArchiveKind,
    /// Lifecycle state
    pub state: ArchiveState,
    /// Size on disk in bytes
    pub size: u64,
    /// GUID of the archive's key, `None` for the zero GUID
    pub key_guid: Option<KeyGuid>,
    /// Whether a key is needed before the archive can mount
    pub requires_key: bool,
    /// Mount point, once the index has been read
    pub mount_point: Option<String>,
    /// Number of files, once the index has been read
    pub file_count: Option<usize>,
}

/// A discovered container
#[derive(Debug)]
pub enum Archive {
    /// Pak archive
    Pak(PakArchive),
    /// IoStore container
    IoStore(IoStoreContainer),
}

impl Archive {
    /// Read the structure of the container at `path`
    ///
    /// Pak archives with a plaintext index are parsed completely. For an
    /// encrypted index only the footer is read.
    pub fn open(path: &Path, kind: ArchiveKind) -> Result<Self> {
        match kind {
            ArchiveKind::Pak => PakArchive::open(path).map(Self::Pak),
            ArchiveKind::IoStore => IoStoreContainer::open(path).map(Self::IoStore),
        }
    }

    /// Full path of the container
    pub fn path(&self) -> &Path {
        match self {
            Self::Pak(pak) => &pak.path,
            Self::IoStore(toc) => &toc.path,
        }
    }

    /// File name of the container
    pub fn name(&self) -> &str {
        match self {
            Self::Pak(pak) => &pak.name,
            Self::IoStore(toc) => &toc.name,
        }
    }

    /// Size on disk in bytes
    pub fn size(&self) -> u64 {
        match self {
            Self::Pak(pak) => pak.size,
            Self::IoStore(toc) => toc.size,
        }
    }

    /// Container kind
    pub const fn kind(&self) -> ArchiveKind {
        match self {
            Self::Pak(_) => ArchiveKind::Pak,
            Self::IoStore(_) => ArchiveKind::IoStore,
        }
    }

    /// GUID of the key protecting the container
    pub fn encryption_key_guid(&self) -> KeyGuid {
        match self {
            Self::Pak(pak) => pak.footer.encryption_key_guid,
            Self::IoStore(toc) => toc.header.encryption_key_guid,
        }
    }

    /// Whether a key must be registered before the container can mount
    pub fn requires_key(&self) -> bool {
        match self {
            Self::Pak(pak) => pak.footer.encrypted_index,
            Self::IoStore(toc) => toc.header.is_encrypted(),
        }
    }

    /// Whether the container can mount with the keys in `keys`
    pub fn can_mount(&self, keys: &KeyRing) -> bool {
        !self.requires_key() || keys.contains(&self.encryption_key_guid())
    }

    /// Mount point, once known
    pub fn mount_point(&self) -> Option<&str> {
        match self {
            Self::Pak(pak) => pak.index.as_ref().map(|_| pak.mount_point.as_str()),
            Self::IoStore(_) => None,
        }
    }

    /// Number of files, once the index has been read
    pub fn file_count(&self) -> Option<usize> {
        match self {
            Self::Pak(pak) => pak.index.as_ref().map(PakIndex::len),
            Self::IoStore(_) => None,
        }
    }

    /// Whether the container serves `logical_path`
    pub fn contains(&self, logical_path: &str) -> bool {
        match self {
            Self::Pak(pak) => pak.find(logical_path).is_some(),
            Self::IoStore(_) => false,
        }
    }

    /// Open a file for reading
    ///
    /// Returns `Ok(None)` when the container does not hold the path.
    pub fn open_read(
        &self,
        logical_path: &str,
        keys: &KeyRing,
        pool: &Arc<ThreadPool>,
    ) -> Result<Option<FileHandle>> {
        match self {
            Self::Pak(pak) => pak.open_read(logical_path, keys, pool),
            Self::IoStore(_) => Ok(None),
        }
    }

    /// Summarize the container
    pub fn info(&self, state: ArchiveState) -> ArchiveInfo {
        let guid = self.encryption_key_guid();
        ArchiveInfo {
            name: self.name().to_string(),
            path: self.path().to_path_buf(),
            kind: self.kind(),
            state,
            size: self.size(),
            key_guid: (!guid.is_zero()).then_some(guid),
            requires_key: self.requires_key(),
            mount_point: self.mount_point().map(str::to_string),
            file_count: self.file_count(),
        }
    }

    /// Finish loading the container so it can serve reads
    pub(crate) fn mount(self, keys: &KeyRing, config: &VfsConfig) -> Result<Self> {
        match self {
            Self::Pak(pak) => pak.mount(keys, config).map(Self::Pak),
            Self::IoStore(toc) => toc.mount(keys).map(Self::IoStore),
        }
    }
}

impl PartialEq for Archive {
    fn eq(&self, other: &Self) -> bool {
        self.path() == other.path()
    }
}

impl Eq for Archive {}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Pak archive
#[derive(Debug)]
pub struct PakArchive {
    path: PathBuf,
    name: String,
    size: u64,
    footer: PakFooter,
    index: Option<PakIndex>,
    mount_point: String,
    file: SharedFile,
}

impl PakArchive {
    fn open(path: &Path) -> Result<Self> {
        let size = std::fs::metadata(path)?.len();
        if size < FOOTER_SIZE as u64 {
            return Err(PakError::TooSmall(size).into());
        }

        let file = SharedFile::new(path);
        let bytes = file.acquire()?;
        let footer = PakFooter::parse(bytes.as_slice())?;
        let index = if footer.encrypted_index {
            debug!("{} has an encrypted index, deferring parse", path.display());
            None
        } else {
            Some(PakIndex::parse(bytes.as_slice(), &footer, None)?)
        };
        drop(bytes);

        Ok(Self {
            path: path.to_path_buf(),
            name: file_name(path),
            size,
            mount_point: index
                .as_ref()
                .map(|index| index.mount_point().to_string())
                .unwrap_or_default(),
            footer,
            index,
            file,
        })
    }

    /// Footer of the archive
    pub const fn footer(&self) -> &PakFooter {
        &self.footer
    }

    /// Parsed index, if available
    pub const fn index(&self) -> Option<&PakIndex> {
        self.index.as_ref()
    }

    fn find(&self, logical_path: &str) -> Option<&PakEntry> {
        self.index.as_ref()?.find(logical_path, &self.mount_point)
    }

    fn mount(mut self, keys: &KeyRing, config: &VfsConfig) -> Result<Self> {
        let index = match self.index.take() {
            Some(index) => index,
            None => {
                let cipher = BlockCipher::for_guid(keys, &self.footer.encryption_key_guid)?;
                let bytes = self.file.acquire()?;
                PakIndex::parse(bytes.as_slice(), &self.footer, Some(&cipher))?
            }
        };

        self.check_compression(&index)?;
        self.mount_point = config.normalize_mount_point(index.mount_point());
        self.index = Some(index);
        Ok(self)
    }

    /// Every compression method used by an entry must be decodable
    fn check_compression(&self, index: &PakIndex) -> Result<()> {
        let used: BTreeSet<u32> = index
            .iter()
            .map(|(_, entry)| entry.compression_method)
            .collect();

        for method in used {
            self.footer
                .compression_method(method)
                .map_err(|err| match err {
                    PakError::UnsupportedCompression(name) => VfsError::Decode(format!(
                        "{} uses unsupported compression method {name}",
                        self.name
                    )),
                    other => other.into(),
                })?;
        }
        Ok(())
    }

    fn open_read(
        &self,
        logical_path: &str,
        keys: &KeyRing,
        pool: &Arc<ThreadPool>,
    ) -> Result<Option<FileHandle>> {
        let Some(entry) = self.find(logical_path) else {
            return Ok(None);
        };

        let method = self.footer.compression_method(entry.compression_method)?;
        let cipher = if entry.encrypted {
            Some(BlockCipher::for_guid(keys, &self.footer.encryption_key_guid)?)
        } else {
            None
        };

        let parts = HandleParts {
            path: logical_path.to_string(),
            archive_name: self.name.clone(),
            bytes: self.file.acquire()?,
            entry: entry.clone(),
            method,
            cipher,
            base: entry.block_base(self.footer.has_relative_block_offsets()),
            archive_hash: self.footer.index_hash,
        };
        Ok(Some(FileHandle::new(parts, Arc::clone(pool))))
    }
}

/// IoStore container
#[derive(Debug)]
pub struct IoStoreContainer {
    path: PathBuf,
    name: String,
    size: u64,
    header: TocHeader,
}

impl IoStoreContainer {
    fn open(path: &Path) -> Result<Self> {
        let mut data = Vec::with_capacity(TOC_HEADER_SIZE as usize);
        File::open(path)?
            .take(u64::from(TOC_HEADER_SIZE))
            .read_to_end(&mut data)?;
        let header = TocHeader::parse(&data)?;

        // Payload lives in the sibling .ucas file
        let size = match std::fs::metadata(path.with_extension("ucas")) {
            Ok(cas) => cas.len(),
            Err(_) => std::fs::metadata(path)?.len(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            name: file_name(path),
            size,
            header,
        })
    }

    /// TOC header
    pub const fn header(&self) -> &TocHeader {
        &self.header
    }

    fn mount(self, keys: &KeyRing) -> Result<Self> {
        if self.header.is_encrypted() && !keys.contains(&self.header.encryption_key_guid) {
            return Err(VfsError::KeyMissing(self.header.encryption_key_guid));
        }
        Ok(self)
    }
}
