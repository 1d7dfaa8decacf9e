use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::clock::{Clock, ClockSource};
use crate::event::Event;
use crate::handle::HandleRegistry;
use crate::queue::{CommandQueue, CommandQueueConfig};
use crate::stats::SyncStats;
use crate::Result;

#[derive(Clone, Debug)]
pub struct DeviceConfig {
    pub name: String,
    pub clock: ClockSource,
    /// Upper bound on native handles (queues, buffers and events) alive at once.
    pub max_live_handles: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "cmdsync simulated device".to_string(),
            clock: ClockSource::Host,
            max_live_handles: 1 << 16,
        }
    }
}

/// Simulated command-processing device.
///
/// Owns the handle table, timebase and telemetry shared by every queue, buffer and event created
/// from it. Clones refer to the same device.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    name: String,
    handles: Arc<HandleRegistry>,
    clock: Arc<dyn Clock>,
    stats: SyncStats,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Self {
        debug!(name = %config.name, max_live_handles = config.max_live_handles, "creating device");
        Self {
            inner: Arc::new(DeviceInner {
                name: config.name,
                handles: Arc::new(HandleRegistry::new(config.max_live_handles)),
                clock: config.clock.build(),
                stats: SyncStats::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn handles(&self) -> &Arc<HandleRegistry> {
        &self.inner.handles
    }

    pub fn stats(&self) -> &SyncStats {
        &self.inner.stats
    }

    pub fn new_command_queue(&self) -> Result<CommandQueue> {
        CommandQueue::new(self, CommandQueueConfig::default())
    }

    pub fn new_command_queue_with_config(&self, config: CommandQueueConfig) -> Result<CommandQueue> {
        CommandQueue::new(self, config)
    }

    pub fn new_event(&self) -> Result<Event> {
        Event::new(self, 0)
    }

    pub fn new_event_with_value(&self, initial_value: u64) -> Result<Event> {
        Event::new(self, initial_value)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Device {}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.inner.name)
            .field("live_handles", &self.inner.handles.live_count())
            .finish()
    }
}
