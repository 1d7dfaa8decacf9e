//! Shared events: monotonic counters that order work across command buffers and queues.
//!
//! An [`Event`] carries a `u64` value that only ever moves forward. Command buffers reference
//! events through [`CommandBuffer::encode_signal_event`] and
//! [`CommandBuffer::encode_wait_for_event`]; the host can also raise the value directly with
//! [`Event::signal`]. There is no host-side wait: waits are always expressed by a
//! command buffer.
//!
//! [`CommandBuffer::encode_signal_event`]: crate::CommandBuffer::encode_signal_event
//! [`CommandBuffer::encode_wait_for_event`]: crate::CommandBuffer::encode_wait_for_event

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use crate::counter::MonotonicCounter;
use crate::device::Device;
use crate::handle::{HandleKind, NativeResource, RawHandle};
use crate::Result;

/// Clonable handle to a shared event. Clones refer to the same counter.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

struct EventInner {
    resource: NativeResource,
    counter: MonotonicCounter,
    label: Mutex<Option<String>>,
    device: Device,
}

impl Event {
    pub(crate) fn new(device: &Device, initial_value: u64) -> Result<Self> {
        let resource = NativeResource::allocate(device.handles(), HandleKind::Event)?;
        device.stats().inc_events_created();
        Ok(Self {
            inner: Arc::new(EventInner {
                resource,
                counter: MonotonicCounter::new(initial_value),
                label: Mutex::new(None),
                device: device.clone(),
            }),
        })
    }

    /// Latest signaled value.
    pub fn value(&self) -> u64 {
        self.inner.counter.load()
    }

    /// Raise the value to `max(current, value)`, waking any command buffer waiting for it.
    ///
    /// Returns `true` if the value advanced.
    pub fn signal(&self, value: u64) -> bool {
        let previous = self.inner.counter.raise(value);
        self.inner.device.stats().inc_event_signals();
        let advanced = value > previous;
        trace!(event = %self.handle(), previous, value, advanced, "event signal");
        advanced
    }

    /// Block the calling device thread until the value reaches `target`.
    ///
    /// Returns `true` if the caller stalled.
    pub(crate) fn wait_for(&self, target: u64) -> bool {
        trace!(event = %self.handle(), target, current = self.value(), "event wait");
        let stalled = self.inner.counter.wait_for(target);
        self.inner.device.stats().record_event_wait(stalled);
        stalled
    }

    pub(crate) fn downgrade(&self) -> WeakEvent {
        WeakEvent(Arc::downgrade(&self.inner))
    }

    pub fn handle(&self) -> RawHandle {
        self.inner.resource.raw()
    }

    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    pub fn label(&self) -> Option<String> {
        self.inner
            .label
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_label(&self, label: Option<String>) {
        *self
            .inner
            .label
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = label;
    }

    /// Release the native handle now instead of when the last clone drops.
    ///
    /// The counter itself stays usable for command buffers that already reference it.
    pub fn destroy(&self) {
        self.inner.resource.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.resource.is_destroyed()
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.inner.resource == other.inner.resource
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.resource.hash(state);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("handle", &self.handle())
            .field("label", &self.label())
            .field("value", &self.value())
            .finish()
    }
}

/// Non-owning event reference held by command buffers created without retained references.
#[derive(Clone)]
pub(crate) struct WeakEvent(Weak<EventInner>);

impl WeakEvent {
    pub(crate) fn upgrade(&self) -> Option<Event> {
        self.0.upgrade().map(|inner| Event { inner })
    }
}
