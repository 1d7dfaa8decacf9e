//! Opaque work items and the encoder that records them into a command buffer.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::trace;

use crate::clock::Clock;
use crate::command_buffer::CommandBuffer;
use crate::error::CommandBufferError;

pub type KernelResult = std::result::Result<(), String>;

type Kernel = Box<dyn FnOnce() -> KernelResult + Send + 'static>;

/// A unit of device work. The device only sees its cost and, optionally, a kernel to run.
///
/// A kernel returning `Err` moves the owning buffer to `Error`.
pub struct Work {
    label: String,
    cost_ns: u64,
    kernel: Option<Kernel>,
}

impl Work {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            cost_ns: 0,
            kernel: None,
        }
    }

    /// Device time the item takes to execute.
    pub fn with_cost_ns(mut self, cost_ns: u64) -> Self {
        self.cost_ns = cost_ns;
        self
    }

    pub fn with_kernel<F>(mut self, kernel: F) -> Self
    where
        F: FnOnce() -> KernelResult + Send + 'static,
    {
        self.kernel = Some(Box::new(kernel));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cost_ns(&self) -> u64 {
        self.cost_ns
    }

    pub(crate) fn run(self, clock: &dyn Clock) -> Result<(), CommandBufferError> {
        clock.elapse(self.cost_ns);
        match self.kernel {
            Some(kernel) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(kernel))
                    .unwrap_or_else(|payload| Err(panic_message(payload.as_ref())));
                outcome.map_err(|message| CommandBufferError::WorkFailed {
                    label: self.label,
                    message,
                })
            }
            None => Ok(()),
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked with a non-string payload".to_string()
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Work")
            .field("label", &self.label)
            .field("cost_ns", &self.cost_ns)
            .field("has_kernel", &self.kernel.is_some())
            .finish()
    }
}

/// Records work items into a command buffer.
///
/// The encoder mutably borrows its buffer, so event signals and waits can only be encoded once it
/// has ended.
pub struct WorkEncoder<'a> {
    buffer: &'a mut CommandBuffer,
    dispatched: usize,
}

impl<'a> WorkEncoder<'a> {
    pub(crate) fn new(buffer: &'a mut CommandBuffer) -> Self {
        Self {
            buffer,
            dispatched: 0,
        }
    }

    pub fn dispatch(&mut self, work: Work) -> &mut Self {
        self.buffer.push_work(work);
        self.dispatched += 1;
        self
    }

    /// Items dispatched through this encoder so far.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn end_encoding(self) {
        trace!(buffer = %self.buffer.handle(), dispatched = self.dispatched, "ended work encoding");
    }
}
