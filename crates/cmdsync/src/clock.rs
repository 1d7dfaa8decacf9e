//! Device timebase used for command buffer timestamps.
//!
//! Readings are nanoseconds. A reading of `0` is reserved as the "milestone not reached" sentinel
//! for timestamps, so both clocks start at 1 or later.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ns(&self) -> u64;

    /// Let `ns` nanoseconds of device time pass while the caller executes work.
    fn elapse(&self, ns: u64);
}

/// Wall-clock timebase: readings follow `Instant`, and elapsing sleeps the executing thread.
#[derive(Debug)]
pub struct HostClock {
    origin: Instant,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HostClock {
    fn now_ns(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX - 1);
        elapsed + 1
    }

    fn elapse(&self, ns: u64) {
        if ns != 0 {
            std::thread::sleep(Duration::from_nanos(ns));
        }
    }
}

/// Simulated timebase that only moves when told to.
///
/// Work items advance it by their cost, and tests advance it explicitly to model time spent
/// stalled on an event.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ns.max(1)),
        }
    }

    pub fn advance(&self, ns: u64) -> u64 {
        self.now.fetch_add(ns, Ordering::AcqRel) + ns
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }

    fn elapse(&self, ns: u64) {
        self.advance(ns);
    }
}

/// Which timebase a device uses.
#[derive(Clone, Debug, Default)]
pub enum ClockSource {
    #[default]
    Host,
    Shared(Arc<dyn Clock>),
}

impl ClockSource {
    pub fn manual(clock: &Arc<ManualClock>) -> Self {
        ClockSource::Shared(clock.clone())
    }

    pub(crate) fn build(&self) -> Arc<dyn Clock> {
        match self {
            ClockSource::Host => Arc::new(HostClock::new()),
            ClockSource::Shared(clock) => clock.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_ns(), 100);
        clock.elapse(25);
        assert_eq!(clock.now_ns(), 125);
        assert_eq!(clock.advance(5), 130);
    }

    #[test]
    fn manual_clock_never_reads_zero() {
        assert_eq!(ManualClock::new(0).now_ns(), 1);
    }

    #[test]
    fn host_clock_is_monotonic_and_nonzero() {
        let clock = HostClock::new();
        let a = clock.now_ns();
        clock.elapse(1_000);
        let b = clock.now_ns();
        assert!(a >= 1);
        assert!(b > a);
    }

    #[test]
    fn shared_clock_source_reuses_the_same_clock() {
        let manual = Arc::new(ManualClock::new(7));
        let built = ClockSource::manual(&manual).build();
        manual.advance(3);
        assert_eq!(built.now_ns(), 10);
    }
}
