//! Native handle bookkeeping.
//!
//! The device hands out opaque [`RawHandle`]s from a [`HandleRegistry`]. Every object in the
//! crate owns exactly one handle through a [`NativeResource`], which releases it exactly once:
//! either through an explicit [`NativeResource::destroy`] or when the wrapper is dropped.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// Opaque identifier of a native device object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawHandle(NonZeroU64);

impl RawHandle {
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0.get())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    CommandQueue,
    CommandBuffer,
    Event,
}

/// Allocation table for native handles of one device.
#[derive(Debug)]
pub struct HandleRegistry {
    next: AtomicU64,
    live: Mutex<HashMap<RawHandle, HandleKind>>,
    released: AtomicU64,
    max_live: usize,
}

impl HandleRegistry {
    pub fn new(max_live: usize) -> Self {
        Self {
            next: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
            released: AtomicU64::new(0),
            max_live,
        }
    }

    pub fn allocate(&self, kind: HandleKind) -> Result<RawHandle> {
        let mut live = self
            .live
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if live.len() >= self.max_live {
            return Err(SyncError::ResourceExhausted {
                resource: "native handle",
                limit: self.max_live,
            });
        }

        let id = self.next.fetch_add(1, Ordering::Relaxed);
        // `next` starts at 1 and would need 2^64 allocations to wrap.
        let Some(id) = NonZeroU64::new(id) else {
            return Err(SyncError::ResourceExhausted {
                resource: "native handle id",
                limit: usize::MAX,
            });
        };
        let handle = RawHandle(id);
        live.insert(handle, kind);
        debug!(%handle, ?kind, "allocated native handle");
        Ok(handle)
    }

    /// Release `handle`. Returns `false` (and leaves the table untouched) if it is not live.
    pub fn release(&self, handle: RawHandle) -> bool {
        let removed = self
            .live
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&handle);
        match removed {
            Some(kind) => {
                self.released.fetch_add(1, Ordering::Relaxed);
                debug!(%handle, ?kind, "released native handle");
                true
            }
            None => {
                warn!(%handle, "ignoring release of a handle that is not live");
                false
            }
        }
    }

    pub fn is_live(&self, handle: RawHandle) -> bool {
        self.live
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(&handle)
    }

    pub fn live_count(&self) -> usize {
        self.live
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn live_count_of(&self, kind: HandleKind) -> usize {
        self.live
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|k| **k == kind)
            .count()
    }

    pub fn released_count(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}

/// Exclusive owner of one native handle.
///
/// Equality and hashing use handle identity only.
pub struct NativeResource {
    raw: RawHandle,
    kind: HandleKind,
    live: AtomicBool,
    registry: Arc<HandleRegistry>,
}

impl NativeResource {
    pub fn allocate(registry: &Arc<HandleRegistry>, kind: HandleKind) -> Result<Self> {
        let raw = registry.allocate(kind)?;
        Ok(Self {
            raw,
            kind,
            live: AtomicBool::new(true),
            registry: registry.clone(),
        })
    }

    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn is_destroyed(&self) -> bool {
        !self.live.load(Ordering::Acquire)
    }

    /// Release the native handle. Calling this again (or dropping afterwards) is a no-op.
    pub fn destroy(&self) {
        if self.live.swap(false, Ordering::AcqRel) {
            self.registry.release(self.raw);
        }
    }
}

impl Drop for NativeResource {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl PartialEq for NativeResource {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for NativeResource {}

impl Hash for NativeResource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Debug for NativeResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeResource")
            .field("raw", &self.raw)
            .field("kind", &self.kind)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
