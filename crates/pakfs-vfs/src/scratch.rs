//! Thread-local decode buffers
//!
//! Each thread owns one primary set of buffers that persists between reads,
//! so the last decoded block stays available for the next read on that
//! thread. A read that starts while the primary set is lent out (a nested
//! read) gets a fresh set pushed onto the thread's stack and dropped again
//! on release.
//!
//! The guard returned by [`ScratchBuffers::acquire`] is neither `Send` nor
//! `Sync`: buffers go back to the thread they were taken from.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

thread_local! {
    static SCRATCH: RefCell<ScratchStack> = RefCell::new(ScratchStack::default());
}

#[derive(Default)]
struct ScratchStack {
    /// Parked primary buffers, `None` while lent out
    primary: Option<ScratchBuffers>,
    primary_in_use: bool,
    /// Levels of outstanding nested acquisitions
    nested: Vec<usize>,
}

/// Identifies the block held in the temporary buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheTag {
    /// Index hash of the archive the block came from
    pub archive: [u8; 20],
    /// Offset of the entry within its archive
    pub entry_offset: u64,
    /// Block index within the entry
    pub block: usize,
}

/// Decode workspace
#[derive(Debug, Default)]
pub struct ScratchBuffers {
    /// Holds one decompressed block
    pub temp: Vec<u8>,
    /// Holds two compressed blocks side by side
    pub working: Vec<u8>,
    /// Block currently held in `temp`, if its contents are valid
    pub tag: Option<CacheTag>,
}

impl ScratchBuffers {
    /// Borrow this thread's buffers
    pub fn acquire() -> ScratchGuard {
        SCRATCH.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.primary_in_use {
                let level = stack.nested.len() + 1;
                stack.nested.push(level);
                ScratchGuard::new(Self::default(), level)
            } else {
                stack.primary_in_use = true;
                let buffers = stack.primary.take().unwrap_or_default();
                ScratchGuard::new(buffers, 0)
            }
        })
    }

    /// Grow the buffers to at least the given sizes
    ///
    /// Buffers never shrink, and growing `temp` keeps its contents.
    pub fn ensure_space(&mut self, temp: usize, working: usize) {
        if self.temp.len() < temp {
            self.temp.resize(temp, 0);
        }
        if self.working.len() < working {
            self.working.resize(working, 0);
        }
    }

    /// Number of nested acquisitions outstanding on this thread
    pub fn nesting_depth() -> usize {
        SCRATCH.with(|stack| stack.borrow().nested.len())
    }
}

/// Scoped loan of a thread's scratch buffers
///
/// Dropping the guard returns primary buffers to the thread and discards
/// nested ones.
pub struct ScratchGuard {
    buffers: ScratchBuffers,
    level: usize,
    _not_send: PhantomData<*const ()>,
}

impl ScratchGuard {
    fn new(buffers: ScratchBuffers, level: usize) -> Self {
        Self {
            buffers,
            level,
            _not_send: PhantomData,
        }
    }

    /// Whether these are the thread's primary buffers
    pub const fn is_primary(&self) -> bool {
        self.level == 0
    }
}

impl Deref for ScratchGuard {
    type Target = ScratchBuffers;

    fn deref(&self) -> &ScratchBuffers {
        &self.buffers
    }
}

impl DerefMut for ScratchGuard {
    fn deref_mut(&mut self) -> &mut ScratchBuffers {
        &mut self.buffers
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        let buffers = std::mem::take(&mut self.buffers);
        let level = self.level;
        // The thread-local is gone if the guard outlives thread teardown
        let _ = SCRATCH.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            if level == 0 {
                stack.primary = Some(buffers);
                stack.primary_in_use = false;
            } else {
                let top = stack.nested.pop();
                debug_assert_eq!(top, Some(level), "scratch buffers released out of order");
            }
        });
    }
}

impl std::fmt::Debug for ScratchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchGuard")
            .field("level", &self.level)
            .field("temp", &self.buffers.temp.len())
            .field("working", &self.buffers.working.len())
            .field("tag", &self.buffers.tag)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tag(block: usize) -> CacheTag {
        CacheTag {
            archive: [7; 20],
            entry_offset: 128,
            block,
        }
    }

    #[test]
    fn test_primary_buffers_persist() {
        std::thread::spawn(|| {
            {
                let mut scratch = ScratchBuffers::acquire();
                assert!(scratch.is_primary());
                scratch.ensure_space(100, 300);
                scratch.temp[..4].copy_from_slice(b"data");
                scratch.tag = Some(tag(3));
            }

            let scratch = ScratchBuffers::acquire();
            assert!(scratch.is_primary());
            assert_eq!(scratch.temp.len(), 100);
            assert_eq!(scratch.working.len(), 300);
            assert_eq!(&scratch.temp[..4], b"data");
            assert_eq!(scratch.tag, Some(tag(3)));
        })
        .join()
        .expect("Thread should not panic");
    }

    #[test]
    fn test_nested_acquisition_gets_fresh_buffers() {
        std::thread::spawn(|| {
            let mut outer = ScratchBuffers::acquire();
            outer.ensure_space(64, 0);
            outer.tag = Some(tag(1));

            {
                let inner = ScratchBuffers::acquire();
                assert!(!inner.is_primary());
                assert!(inner.temp.is_empty());
                assert_eq!(inner.tag, None);
                assert_eq!(ScratchBuffers::nesting_depth(), 1);

                let innermost = ScratchBuffers::acquire();
                assert!(!innermost.is_primary());
                assert_eq!(ScratchBuffers::nesting_depth(), 2);
            }

            assert_eq!(ScratchBuffers::nesting_depth(), 0);
            assert_eq!(outer.temp.len(), 64);
            assert_eq!(outer.tag, Some(tag(1)));
        })
        .join()
        .expect("Thread should not panic");
    }

    #[test]
    fn test_threads_have_separate_buffers() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    let mut scratch = ScratchBuffers::acquire();
                    assert!(scratch.is_primary());
                    assert!(scratch.temp.is_empty());
                    scratch.ensure_space(16 * (i + 1), 0);
                    scratch.temp.len()
                })
            })
            .collect();

        let sizes: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("Thread should not panic"))
            .collect();
        assert_eq!(sizes, vec![16, 32, 48, 64]);
    }

    #[test]
    fn test_ensure_space_never_shrinks() {
        let mut buffers = ScratchBuffers::default();
        buffers.ensure_space(50, 50);
        buffers.ensure_space(10, 10);
        assert_eq!(buffers.temp.len(), 50);
        assert_eq!(buffers.working.len(), 50);
    }
}
