//! Device side of a queue: the dispatcher that schedules in slot order and the per-buffer
//! execution threads.
//!
//! Execution always makes forward progress. Once a work item fails, the remaining work in that
//! buffer is skipped, but its event waits and signals still execute so buffers on other queues
//! that depend on them are not wedged.

use std::collections::BTreeMap;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Receiver;
use std::thread;

use tracing::{debug, trace, warn};

use crate::command_buffer::{Command, CommandBufferStatus, CommandBufferView, MilestoneHandler};
use crate::device::Device;
use crate::encoder::panic_message;
use crate::error::CommandBufferError;
use crate::queue::{QueueMessage, Submission};

/// Slots received out of order, keyed by slot. `None` marks an abandoned slot.
type Pending = BTreeMap<u64, Option<Submission>>;

pub(crate) fn run_dispatcher(receiver: Receiver<QueueMessage>, device: Device) {
    let mut next_slot = 0u64;
    let mut pending = Pending::new();

    while let Ok(message) = receiver.recv() {
        match message {
            QueueMessage::Submit(submission) => {
                trace!(slot = submission.slot, next_slot, "dispatcher received submission");
                pending.insert(submission.slot, Some(submission));
            }
            QueueMessage::Abandon { slot } => {
                pending.insert(slot, None);
            }
        }

        while let Some(entry) = pending.remove(&next_slot) {
            next_slot += 1;
            if let Some(submission) = entry {
                schedule(submission, &device);
            }
        }
    }

    // Every queue handle is gone, so missing slots can never be filled.
    if !pending.is_empty() {
        debug!(
            remaining = pending.len(),
            next_slot, "queue released; flushing submissions behind unfilled slots"
        );
    }
    for submission in pending.into_values().flatten() {
        schedule(submission, &device);
    }
    trace!("dispatcher exiting");
}

fn schedule(mut submission: Submission, device: &Device) {
    let buffer = submission.buffer.clone();
    buffer.mark_scheduled(device.clock().now_ns());
    debug!(buffer = %buffer.handle(), slot = submission.slot, "scheduled command buffer");

    let view = CommandBufferView::from_shared(buffer.clone());
    run_handlers(mem::take(&mut submission.scheduled_handlers), &view, "scheduled");

    let queue = submission.queue.clone();
    let exec_device = device.clone();
    let spawned = thread::Builder::new()
        .name(format!("cmdsync-exec-{}", buffer.handle()))
        .spawn(move || execute(submission, &exec_device));

    if let Err(err) = spawned {
        warn!(buffer = %buffer.handle(), error = %err, "failed to spawn execution thread");
        let clock = device.clock();
        buffer.mark_gpu_start(clock.now_ns());
        buffer.finish(
            clock.now_ns(),
            Some(CommandBufferError::ExecutionUnavailable {
                message: err.to_string(),
            }),
        );
        device.stats().inc_buffers_errored();
        buffer.retire(&queue);
        buffer.deliver_completion();
    }
}

fn execute(submission: Submission, device: &Device) {
    let Submission {
        slot,
        buffer,
        commands,
        completed_handlers,
        queue,
        ..
    } = submission;
    let clock = device.clock();
    buffer.mark_gpu_start(clock.now_ns());

    let mut failure: Option<CommandBufferError> = None;
    for command in commands {
        match command {
            Command::Work(work) => {
                if failure.is_some() {
                    trace!(buffer = %buffer.handle(), work = work.label(), "skipping work after failure");
                    continue;
                }
                if let Err(err) = work.run(clock.as_ref()) {
                    warn!(buffer = %buffer.handle(), error = %err, "work item failed");
                    failure = Some(err);
                }
            }
            Command::SignalEvent { event, value } => match event.resolve() {
                Some(event) => {
                    event.signal(value);
                }
                None => {
                    warn!(buffer = %buffer.handle(), value, "unretained event released before signal");
                }
            },
            Command::WaitForEvent { event, value } => match event.resolve() {
                Some(event) => {
                    event.wait_for(value);
                }
                None => {
                    warn!(buffer = %buffer.handle(), value, "unretained event released before wait");
                    failure.get_or_insert(CommandBufferError::EventReleased { operation: "wait" });
                }
            },
        }
    }

    let status = buffer.finish(clock.now_ns(), failure);
    match status {
        CommandBufferStatus::Completed => device.stats().inc_buffers_completed(),
        _ => device.stats().inc_buffers_errored(),
    }
    debug!(buffer = %buffer.handle(), slot, ?status, "command buffer finished");

    let view = CommandBufferView::from_shared(buffer.clone());
    run_handlers(completed_handlers, &view, "completed");
    buffer.retire(&queue);
    buffer.deliver_completion();
}

/// Run milestone handlers. A panicking handler is logged and skipped so the dispatcher and
/// execution threads keep running.
fn run_handlers(
    handlers: Vec<MilestoneHandler>,
    view: &CommandBufferView,
    milestone: &'static str,
) {
    for handler in handlers {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(view))) {
            warn!(
                buffer = %view.handle(),
                milestone,
                panic = %panic_message(payload.as_ref()),
                "command buffer handler panicked"
            );
        }
    }
}
