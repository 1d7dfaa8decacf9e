//! `cmdsync` models the command-buffer lifecycle of a GPU command processor and the shared events
//! used to order work across queues.
//!
//! Currently this crate provides:
//! - A simulated [`Device`] with a native handle table, a pluggable timebase and telemetry
//!   (see [`stats::SyncStats`]).
//! - [`CommandQueue`]s that schedule committed buffers in enqueue order.
//! - [`CommandBuffer`]s with a `NotEnqueued -> Enqueued -> Committed -> Scheduled ->
//!   Completed | Error` lifecycle, encoded work, scheduled/completed handlers and timestamps.
//! - Monotonic [`Event`]s that command buffers signal and wait on.

#![forbid(unsafe_code)]

mod command_buffer;
mod counter;
mod device;
mod encoder;
mod error;
mod event;
mod executor;
mod queue;

pub mod clock;
pub mod handle;
pub mod stats;

pub use clock::{Clock, ClockSource, HostClock, ManualClock};
pub use command_buffer::{
    CommandBuffer, CommandBufferDescriptor, CommandBufferStatus, CommandBufferTimestamps,
    CommandBufferView, MilestoneHandler,
};
pub use device::{Device, DeviceConfig};
pub use encoder::{KernelResult, Work, WorkEncoder};
pub use error::{CommandBufferError, Result, SyncError};
pub use event::Event;
pub use handle::{HandleKind, HandleRegistry, NativeResource, RawHandle};
pub use queue::{CommandQueue, CommandQueueConfig};
pub use stats::{SyncStats, SyncStatsSnapshot};
