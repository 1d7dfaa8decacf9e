//! Shared helpers for `cmdsync` integration tests.

#![allow(dead_code)]

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cmdsync::{ClockSource, CommandBufferView, Device, DeviceConfig, ManualClock};

/// Generous bound for anything that is expected to finish.
pub const FINISH_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to watch a buffer that is expected to stay blocked.
pub const STALL_WINDOW: Duration = Duration::from_millis(100);

pub fn host_device() -> Device {
    Device::new(DeviceConfig::default())
}

/// Device on a manual clock starting at 1000ns. Work items advance the clock by their cost.
pub fn simulated_device() -> (Device, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000));
    let device = Device::new(DeviceConfig {
        name: "test device".to_string(),
        clock: ClockSource::manual(&clock),
        ..Default::default()
    });
    (device, clock)
}

/// Block until `view` completes, panicking instead of hanging the test binary.
pub fn wait_completed(view: &CommandBufferView) {
    let (done_tx, done_rx) = mpsc::channel();
    let waiter = view.clone();
    thread::spawn(move || {
        waiter.wait_until_completed();
        let _ = done_tx.send(());
    });
    if done_rx.recv_timeout(FINISH_TIMEOUT).is_err() {
        panic!(
            "command buffer {} did not complete within {FINISH_TIMEOUT:?} (status {:?})",
            view.handle(),
            view.status()
        );
    }
}

/// Assert that `view` does not reach a terminal state within [`STALL_WINDOW`].
pub fn assert_stays_pending(view: &CommandBufferView) {
    thread::sleep(STALL_WINDOW);
    assert!(
        !view.status().is_terminal(),
        "command buffer {} finished early with status {:?}",
        view.handle(),
        view.status()
    );
}
