//! Mount manager
//!
//! Archives move through two sets guarded by one lock:
//!
//! ```text
//! discover ──> unloaded ──(key present or not needed)──> mounted
//!                 │
//!                 └──(mount fails)──> dropped
//! ```
//!
//! An archive is in exactly one set at a time. While its mount task runs it
//! stays in the unloaded set, marked as mounting, so neither a concurrent
//! discovery nor a second mount request picks it up again. Parsing and key
//! work happen outside the lock on the worker pool.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pakfs_crypto::{AesKey, KeyGuid, KeyRing, Registration};
use pakfs_formats::pak::PakError;
use parking_lot::Mutex;
use rayon::ThreadPool;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive::{Archive, ArchiveInfo, ArchiveKind, ArchiveState};
use crate::config::VfsConfig;
use crate::reader::FileHandle;
use crate::{Result, VfsError};

/// Outcome of a discovery pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverySummary {
    /// New archives added to the unloaded set
    pub discovered: usize,
    /// Candidates whose structure was invalid
    pub rejected: usize,
    /// Directories that could not be read
    pub skipped_directories: usize,
}

enum Pending {
    Idle(Archive),
    Mounting(ArchiveInfo),
}

#[derive(Default)]
struct ArchiveSets {
    unloaded: BTreeMap<PathBuf, Pending>,
    mounted: BTreeMap<PathBuf, Arc<Archive>>,
    /// Keys that failed the index check of every archive they unlocked
    rejected_keys: BTreeSet<KeyGuid>,
}

/// Result of one archive's mount task
struct MountOutcome {
    guid: KeyGuid,
    mounted: bool,
    wrong_key: bool,
}

impl ArchiveSets {
    fn contains(&self, path: &Path) -> bool {
        self.unloaded.contains_key(path) || self.mounted.contains_key(path)
    }
}

/// Tracks unloaded and mounted archives
pub struct MountManager {
    config: VfsConfig,
    keys: Arc<KeyRing>,
    pool: Arc<ThreadPool>,
    sets: Mutex<ArchiveSets>,
}

impl MountManager {
    /// Create an empty manager
    pub fn new(config: VfsConfig, keys: Arc<KeyRing>, pool: Arc<ThreadPool>) -> Self {
        Self {
            config,
            keys,
            pool,
            sets: Mutex::new(ArchiveSets::default()),
        }
    }

    /// Scan directories and add new archives to the unloaded set
    ///
    /// Paths already known in either set are skipped. Unreadable directories
    /// and invalid archives are logged and counted, never fatal.
    pub fn discover<P: AsRef<Path>>(&self, directories: &[P]) -> DiscoverySummary {
        let mut summary = DiscoverySummary::default();
        let mut candidates = Vec::new();

        for directory in directories {
            match self.scan_directory(directory.as_ref()) {
                Ok(found) => candidates.extend(found),
                Err(e) => {
                    warn!("Skipping archive directory: {e}");
                    summary.skipped_directories += 1;
                }
            }
        }

        candidates.sort();
        candidates.dedup();
        {
            let sets = self.sets.lock();
            candidates.retain(|(path, _)| !sets.contains(path));
        }

        let opened: Vec<(PathBuf, Result<Archive>)> = self.pool.install(|| {
            candidates
                .into_par_iter()
                .map(|(path, kind)| {
                    let archive = Archive::open(&path, kind);
                    (path, archive)
                })
                .collect()
        });

        let mut sets = self.sets.lock();
        for (path, opened) in opened {
            match opened {
                Ok(archive) => {
                    if sets.contains(&path) {
                        continue;
                    }
                    debug!(
                        "Discovered {} ({}, key {})",
                        archive.name(),
                        archive.kind(),
                        if archive.requires_key() { "required" } else { "not required" }
                    );
                    sets.unloaded.insert(path, Pending::Idle(archive));
                    summary.discovered += 1;
                }
                Err(e) => {
                    warn!("Rejected archive {}: {e}", path.display());
                    summary.rejected += 1;
                }
            }
        }
        drop(sets);

        info!(
            "Discovered {} archives ({} rejected, {} directories skipped)",
            summary.discovered, summary.rejected, summary.skipped_directories
        );
        summary
    }

    fn scan_directory(&self, directory: &Path) -> Result<Vec<(PathBuf, ArchiveKind)>> {
        std::fs::read_dir(directory).map_err(|source| VfsError::Discovery {
            path: directory.to_path_buf(),
            source,
        })?;

        let max_depth = if self.config.recursive { usize::MAX } else { 1 };
        let mut found = Vec::new();

        for entry in WalkDir::new(directory)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(true)
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable path under {}: {e}", directory.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(kind) = self.classify(entry.path()) {
                found.push((entry.into_path(), kind));
            }
        }

        Ok(found)
    }

    fn classify(&self, path: &Path) -> Option<ArchiveKind> {
        let extension = path.extension().and_then(OsStr::to_str)?;
        if extension.eq_ignore_ascii_case(&self.config.pak_extension) {
            Some(ArchiveKind::Pak)
        } else if extension.eq_ignore_ascii_case(&self.config.toc_extension) {
            Some(ArchiveKind::IoStore)
        } else {
            None
        }
    }

    /// Mount every unloaded archive whose key is registered or not needed
    ///
    /// Returns the number of archives mounted by this call.
    pub fn mount_all(&self) -> usize {
        let selected = self.take_matching(|archive| archive.can_mount(&self.keys));
        let outcomes = self.mount_selected(selected);
        outcomes.iter().filter(|outcome| outcome.mounted).count()
    }

    /// Register keys and mount the unloaded archives that needed them
    ///
    /// Only archives whose key was newly registered by this call are
    /// mounted; archives waiting on keys registered earlier are left for
    /// [`Self::mount_all`]. A key that conflicts with an already registered
    /// value is ignored.
    pub fn submit_keys<I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = (KeyGuid, AesKey)>,
    {
        let mut accepted = BTreeSet::new();
        for (guid, key) in keys {
            match self.keys.register(guid, key) {
                Registration::Added => {
                    debug!("Registered key {guid}");
                    accepted.insert(guid);
                }
                Registration::AlreadyPresent => {
                    debug!("Key {guid} is already registered");
                }
                Registration::Conflict => {
                    warn!("Ignoring key for {guid}: a different key is already registered");
                }
            }
        }

        if accepted.is_empty() {
            return 0;
        }

        let selected = self.take_matching(|archive| {
            archive.requires_key() && accepted.contains(&archive.encryption_key_guid())
        });
        let outcomes = self.mount_selected(selected);
        self.flag_rejected_keys(&accepted, &outcomes);

        let mounted = outcomes.iter().filter(|outcome| outcome.mounted).count();
        info!("Registered {} new keys, mounted {mounted} archives", accepted.len());
        mounted
    }

    /// Remember new keys whose every archive failed the index hash check
    fn flag_rejected_keys(&self, accepted: &BTreeSet<KeyGuid>, outcomes: &[MountOutcome]) {
        for guid in accepted {
            let mut unlocked = outcomes.iter().filter(|outcome| outcome.guid == *guid).peekable();
            if unlocked.peek().is_none() {
                continue;
            }

            let (total, wrong) = unlocked.fold((0usize, 0usize), |(total, wrong), outcome| {
                (total + 1, wrong + usize::from(outcome.wrong_key))
            });
            if wrong == total {
                warn!(
                    "Key for {guid} failed the index check of all {total} archives it unlocked; \
                     it is probably wrong and blocks any later key for this GUID"
                );
                self.sets.lock().rejected_keys.insert(*guid);
            }
        }
    }

    /// Mark matching idle archives as mounting and take them out for work
    fn take_matching(&self, mut predicate: impl FnMut(&Archive) -> bool) -> Vec<(PathBuf, Archive)> {
        let mut sets = self.sets.lock();
        let mut selected = Vec::new();

        for (path, pending) in &mut sets.unloaded {
            let info = match &*pending {
                Pending::Idle(archive) if predicate(archive) => archive.info(ArchiveState::Mounting),
                _ => continue,
            };
            if let Pending::Idle(archive) = std::mem::replace(pending, Pending::Mounting(info)) {
                selected.push((path.clone(), archive));
            }
        }

        selected
    }

    fn mount_selected(&self, selected: Vec<(PathBuf, Archive)>) -> Vec<MountOutcome> {
        if selected.is_empty() {
            return Vec::new();
        }

        let requested = selected.len();
        let outcomes: Vec<MountOutcome> = self.pool.install(|| {
            selected
                .into_par_iter()
                .map(|(path, archive)| {
                    let guid = archive.encryption_key_guid();
                    let result = archive.mount(&self.keys, &self.config);
                    let wrong_key = matches!(
                        result,
                        Err(VfsError::Format(PakError::IndexHashMismatch { .. }))
                    );
                    MountOutcome {
                        guid,
                        mounted: self.complete_mount(path, result),
                        wrong_key,
                    }
                })
                .collect()
        });

        let mounted = outcomes.iter().filter(|outcome| outcome.mounted).count();
        info!("Mounted {mounted} of {requested} archives");
        outcomes
    }

    fn complete_mount(&self, path: PathBuf, result: Result<Archive>) -> bool {
        match result {
            Ok(archive) => {
                info!(
                    "Mounted {} at '{}' ({} files)",
                    archive.name(),
                    archive.mount_point().unwrap_or_default(),
                    archive.file_count().unwrap_or(0)
                );
                let mut sets = self.sets.lock();
                sets.unloaded.remove(&path);
                sets.mounted.insert(path, Arc::new(archive));
                true
            }
            Err(e) => {
                warn!("Failed to mount {}: {e}", path.display());
                self.sets.lock().unloaded.remove(&path);
                false
            }
        }
    }

    /// Open a file from the first mounted archive that holds it
    ///
    /// When several archives hold the same path, which one serves it is
    /// unspecified.
    pub fn open(&self, logical_path: &str) -> Result<FileHandle> {
        let archive = {
            let sets = self.sets.lock();
            sets.mounted
                .values()
                .find(|archive| archive.contains(logical_path))
                .cloned()
        };

        let archive = archive.ok_or_else(|| VfsError::NotFound(logical_path.to_string()))?;
        archive
            .open_read(logical_path, &self.keys, &self.pool)?
            .ok_or_else(|| VfsError::NotFound(logical_path.to_string()))
    }

    /// Summaries of every known archive, unloaded first
    pub fn archives(&self) -> Vec<ArchiveInfo> {
        let sets = self.sets.lock();
        let unloaded = sets.unloaded.values().map(|pending| match pending {
            Pending::Idle(archive) => archive.info(ArchiveState::Unloaded),
            Pending::Mounting(info) => info.clone(),
        });
        let mounted = sets
            .mounted
            .values()
            .map(|archive| archive.info(ArchiveState::Mounted));
        unloaded.chain(mounted).collect()
    }

    /// Key GUIDs that unloaded archives are waiting for, with the archives
    pub fn required_keys(&self) -> HashMap<KeyGuid, Vec<PathBuf>> {
        let sets = self.sets.lock();
        let mut required: HashMap<KeyGuid, Vec<PathBuf>> = HashMap::new();
        for (path, pending) in &sets.unloaded {
            if let Pending::Idle(archive) = pending
                && !archive.can_mount(&self.keys)
            {
                required
                    .entry(archive.encryption_key_guid())
                    .or_default()
                    .push(path.clone());
            }
        }
        required
    }

    /// Keys that failed the index check of every archive they unlocked
    ///
    /// The key ring keeps the first key registered for a GUID, so a key
    /// listed here stays in effect for the rest of the session.
    pub fn rejected_keys(&self) -> Vec<KeyGuid> {
        self.sets.lock().rejected_keys.iter().copied().collect()
    }

    /// Number of mounted archives
    pub fn mounted_count(&self) -> usize {
        self.sets.lock().mounted.len()
    }

    /// Number of unloaded archives, including those being mounted
    pub fn unloaded_count(&self) -> usize {
        self.sets.lock().unloaded.len()
    }

    /// Whether the archive at `path` is mounted
    pub fn is_mounted(&self, path: &Path) -> bool {
        self.sets.lock().mounted.contains_key(path)
    }
}

impl std::fmt::Debug for MountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sets = self.sets.lock();
        f.debug_struct("MountManager")
            .field("unloaded", &sets.unloaded.len())
            .field("mounted", &sets.mounted.len())
            .field("keys", &self.keys.len())
            .finish_non_exhaustive()
    }
}
