use std::sync::atomic::{AtomicU64, Ordering};

/// Telemetry counters for one device.
///
/// Updated from producer threads, the queue dispatchers and the execution threads, so every
/// counter is a relaxed atomic; readers take a [`SyncStatsSnapshot`].
#[derive(Debug, Default)]
pub struct SyncStats {
    buffers_created: AtomicU64,
    buffers_committed: AtomicU64,
    buffers_completed: AtomicU64,
    buffers_errored: AtomicU64,
    slots_abandoned: AtomicU64,

    events_created: AtomicU64,
    event_signals: AtomicU64,
    event_waits: AtomicU64,
    /// Waits that found the event below target and had to park.
    event_wait_stalls: AtomicU64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_buffers_created(&self) {
        self.buffers_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_buffers_committed(&self) {
        self.buffers_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_buffers_completed(&self) {
        self.buffers_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_buffers_errored(&self) {
        self.buffers_errored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_slots_abandoned(&self) {
        self.slots_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events_created(&self) {
        self.events_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_event_signals(&self) {
        self.event_signals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_wait(&self, stalled: bool) {
        self.event_waits.fetch_add(1, Ordering::Relaxed);
        if stalled {
            self.event_wait_stalls.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            buffers_created: self.buffers_created.load(Ordering::Relaxed),
            buffers_committed: self.buffers_committed.load(Ordering::Relaxed),
            buffers_completed: self.buffers_completed.load(Ordering::Relaxed),
            buffers_errored: self.buffers_errored.load(Ordering::Relaxed),
            slots_abandoned: self.slots_abandoned.load(Ordering::Relaxed),
            events_created: self.events_created.load(Ordering::Relaxed),
            event_signals: self.event_signals.load(Ordering::Relaxed),
            event_waits: self.event_waits.load(Ordering::Relaxed),
            event_wait_stalls: self.event_wait_stalls.load(Ordering::Relaxed),
        }
    }

    /// Returns a JSON object as a string.
    pub fn to_json(&self) -> String {
        self.snapshot().to_json()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStatsSnapshot {
    pub buffers_created: u64,
    pub buffers_committed: u64,
    pub buffers_completed: u64,
    pub buffers_errored: u64,
    pub slots_abandoned: u64,

    pub events_created: u64,
    pub event_signals: u64,
    pub event_waits: u64,
    pub event_wait_stalls: u64,
}

impl SyncStatsSnapshot {
    /// Buffers that were committed but have not reached a terminal state yet.
    pub fn buffers_in_flight(self) -> u64 {
        self.buffers_committed
            .saturating_sub(self.buffers_completed + self.buffers_errored)
    }

    pub fn to_json(self) -> String {
        format!(
            "{{\"buffers_created\":{},\"buffers_committed\":{},\"buffers_completed\":{},\"buffers_errored\":{},\"slots_abandoned\":{},\"events_created\":{},\"event_signals\":{},\"event_waits\":{},\"event_wait_stalls\":{}}}",
            self.buffers_created,
            self.buffers_committed,
            self.buffers_completed,
            self.buffers_errored,
            self.slots_abandoned,
            self.events_created,
            self.event_signals,
            self.event_waits,
            self.event_wait_stalls,
        )
    }
}
