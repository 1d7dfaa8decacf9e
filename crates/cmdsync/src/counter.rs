//! Monotonic 64-bit counter with blocking waiters.
//!
//! This is the only explicitly shared mutable state in the synchronization core. Updates are a
//! `fetch_max` performed while holding the waiter lock, so a waiter that observed a stale value
//! under the lock is guaranteed to be parked on the condvar before the wake-up is sent.

#[cfg(all(feature = "loom", test))]
use loom::sync::{atomic::AtomicU64, Condvar, Mutex};
#[cfg(not(all(feature = "loom", test)))]
use std::sync::{atomic::AtomicU64, Condvar, Mutex};

use std::sync::atomic::Ordering;

#[derive(Debug)]
pub(crate) struct MonotonicCounter {
    value: AtomicU64,
    waiters: Mutex<()>,
    wake: Condvar,
}

impl MonotonicCounter {
    pub(crate) fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
            waiters: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    pub(crate) fn load(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Raise the counter to `max(current, value)` and return the previous value.
    pub(crate) fn raise(&self, value: u64) -> u64 {
        let _guard = self
            .waiters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = self.value.fetch_max(value, Ordering::AcqRel);
        if value > previous {
            self.wake.notify_all();
        }
        previous
    }

    /// Block until the counter reaches `target`.
    ///
    /// Returns `true` if the caller had to park at least once.
    pub(crate) fn wait_for(&self, target: u64) -> bool {
        if self.load() >= target {
            return false;
        }

        let mut guard = self
            .waiters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut stalled = false;
        while self.value.load(Ordering::Acquire) < target {
            stalled = true;
            guard = self
                .wake
                .wait(guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        stalled
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn raise_keeps_running_maximum() {
        let counter = MonotonicCounter::new(0);
        assert_eq!(counter.raise(5), 0);
        assert_eq!(counter.raise(3), 5);
        assert_eq!(counter.load(), 5);
        assert_eq!(counter.raise(9), 5);
        assert_eq!(counter.load(), 9);
    }

    #[test]
    fn wait_for_satisfied_target_does_not_park() {
        let counter = MonotonicCounter::new(7);
        assert!(!counter.wait_for(7));
        assert!(!counter.wait_for(0));
    }

    #[test]
    fn waiter_wakes_only_once_target_is_reached() {
        let counter = Arc::new(MonotonicCounter::new(0));

        let waiter_counter = counter.clone();
        let waiter = thread::spawn(move || waiter_counter.wait_for(10));

        counter.raise(4);
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished(), "waiter woke before target");

        counter.raise(10);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn concurrent_raisers_never_lower_the_value() {
        let counter = Arc::new(MonotonicCounter::new(0));
        let writers: Vec<_> = (0..4u64)
            .map(|offset| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for step in 0..1_000u64 {
                        counter.raise(step * 4 + offset);
                    }
                })
            })
            .collect();

        let reader_counter = counter.clone();
        let reader = thread::spawn(move || {
            let mut last = 0;
            for _ in 0..10_000 {
                let now = reader_counter.load();
                assert!(now >= last, "observed decrease {last} -> {now}");
                last = now;
            }
        });

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(counter.load(), 999 * 4 + 3);
    }
}

#[cfg(all(test, feature = "loom"))]
mod loom_tests {
    use super::*;

    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn concurrent_raise_converges_to_maximum_and_wakes_waiter() {
        loom::model(|| {
            let counter = Arc::new(MonotonicCounter::new(0));

            let a = {
                let counter = counter.clone();
                thread::spawn(move || {
                    counter.raise(1);
                })
            };
            let b = {
                let counter = counter.clone();
                thread::spawn(move || {
                    counter.raise(2);
                })
            };

            counter.wait_for(2);
            assert!(counter.load() >= 2);

            a.join().unwrap();
            b.join().unwrap();
            assert_eq!(counter.load(), 2);
        });
    }

    #[test]
    fn readers_never_observe_a_decrease() {
        loom::model(|| {
            let counter = Arc::new(MonotonicCounter::new(0));

            let writer = {
                let counter = counter.clone();
                thread::spawn(move || {
                    counter.raise(3);
                    counter.raise(1);
                })
            };

            let first = counter.load();
            let second = counter.load();
            assert!(second >= first);

            writer.join().unwrap();
            assert_eq!(counter.load(), 3);
        });
    }
}
