//! Command buffer lifecycle.
//!
//! ```text
//! NotEnqueued ──enqueue──▶ Enqueued ──commit──▶ Committed ──▶ Scheduled ──▶ Completed
//!      │                                  ▲                        │
//!      └──────────────commit──────────────┘                        └──────▶ Error
//! ```
//!
//! The producer drives the first three states through `&mut CommandBuffer`; the device drives
//! the rest asynchronously. Status, error and timestamps live in state shared with the device and
//! can be observed from any thread through a [`CommandBufferView`].

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};

use tracing::{debug, warn};

use crate::device::Device;
use crate::encoder::{Work, WorkEncoder};
use crate::error::{CommandBufferError, Result, SyncError};
use crate::event::{Event, WeakEvent};
use crate::handle::{NativeResource, RawHandle};
use crate::queue::{CommandQueue, QueueShared, Submission};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandBufferStatus {
    NotEnqueued,
    Enqueued,
    Committed,
    Scheduled,
    Completed,
    Error,
}

impl CommandBufferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandBufferStatus::Completed | CommandBufferStatus::Error)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: CommandBufferStatus) -> bool {
        use CommandBufferStatus::*;
        matches!(
            (self, next),
            (NotEnqueued, Enqueued)
                | (NotEnqueued, Committed)
                | (Enqueued, Committed)
                | (Committed, Scheduled)
                | (Scheduled, Completed)
                | (Scheduled, Error)
        )
    }
}

/// Device clock readings (nanoseconds) for the buffer's milestones. `0` means not reached yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandBufferTimestamps {
    /// Commit time.
    pub kernel_start_ns: u64,
    /// Time the buffer reached `Scheduled`.
    pub kernel_end_ns: u64,
    /// Time device execution began.
    pub gpu_start_ns: u64,
    /// Time the buffer reached a terminal state.
    pub gpu_end_ns: u64,
}

#[derive(Clone, Debug)]
pub struct CommandBufferDescriptor {
    /// Hold strong references to every event the buffer encodes until it finishes executing.
    pub retain_references: bool,
    pub label: Option<String>,
}

impl Default for CommandBufferDescriptor {
    fn default() -> Self {
        Self {
            retain_references: true,
            label: None,
        }
    }
}

pub(crate) enum EventRef {
    Retained(Event),
    Unretained(WeakEvent),
}

impl EventRef {
    fn new(event: &Event, retain: bool) -> Self {
        if retain {
            EventRef::Retained(event.clone())
        } else {
            EventRef::Unretained(event.downgrade())
        }
    }

    pub(crate) fn resolve(&self) -> Option<Event> {
        match self {
            EventRef::Retained(event) => Some(event.clone()),
            EventRef::Unretained(weak) => weak.upgrade(),
        }
    }
}

/// One encoded operation, executed in encode order.
pub(crate) enum Command {
    Work(Work),
    SignalEvent { event: EventRef, value: u64 },
    WaitForEvent { event: EventRef, value: u64 },
}

pub type MilestoneHandler = Box<dyn FnOnce(&CommandBufferView) + Send + 'static>;

struct BufferState {
    status: CommandBufferStatus,
    error: Option<CommandBufferError>,
    timestamps: CommandBufferTimestamps,
    /// Completed handlers have run; `wait_until_completed` returns after this.
    completion_delivered: bool,
}

pub(crate) struct BufferShared {
    resource: NativeResource,
    device: Device,
    retained_references: bool,
    label: Mutex<Option<String>>,
    state: Mutex<BufferState>,
    milestone: Condvar,
    /// Counts against the owning queue's `max_command_buffer_count` until retired.
    outstanding: AtomicBool,
}

impl BufferShared {
    fn lock_state(&self) -> MutexGuard<'_, BufferState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn handle(&self) -> RawHandle {
        self.resource.raw()
    }

    fn update(&self, f: impl FnOnce(&mut BufferState)) {
        let mut state = self.lock_state();
        f(&mut state);
        drop(state);
        self.milestone.notify_all();
    }

    fn advance(state: &mut BufferState, next: CommandBufferStatus) {
        debug_assert!(
            state.status.can_transition_to(next),
            "invalid command buffer transition {:?} -> {next:?}",
            state.status
        );
        state.status = next;
    }

    fn set_enqueued(&self) {
        self.update(|state| Self::advance(state, CommandBufferStatus::Enqueued));
    }

    fn set_committed(&self, now_ns: u64) {
        self.update(|state| {
            Self::advance(state, CommandBufferStatus::Committed);
            state.timestamps.kernel_start_ns = now_ns;
        });
    }

    /// Undo `set_committed` when the submission never reached the device.
    fn revert_commit(&self, previous: CommandBufferStatus) {
        self.update(|state| {
            state.status = previous;
            state.timestamps.kernel_start_ns = 0;
        });
    }

    pub(crate) fn mark_scheduled(&self, now_ns: u64) {
        self.update(|state| {
            Self::advance(state, CommandBufferStatus::Scheduled);
            state.timestamps.kernel_end_ns = now_ns;
        });
    }

    pub(crate) fn mark_gpu_start(&self, now_ns: u64) {
        self.update(|state| state.timestamps.gpu_start_ns = now_ns);
    }

    /// Move to the terminal state. Returns the state reached.
    pub(crate) fn finish(
        &self,
        now_ns: u64,
        error: Option<CommandBufferError>,
    ) -> CommandBufferStatus {
        let mut reached = CommandBufferStatus::Completed;
        self.update(|state| {
            reached = if error.is_some() {
                CommandBufferStatus::Error
            } else {
                CommandBufferStatus::Completed
            };
            Self::advance(state, reached);
            state.error = error;
            state.timestamps.gpu_end_ns = now_ns;
        });
        reached
    }

    pub(crate) fn deliver_completion(&self) {
        self.update(|state| state.completion_delivered = true);
    }

    /// Stop counting against the queue's buffer limit. Only the first call has an effect.
    pub(crate) fn retire(&self, queue: &Weak<QueueShared>) {
        if self.outstanding.swap(false, Ordering::AcqRel) {
            if let Some(queue) = queue.upgrade() {
                queue.release_outstanding();
            }
        }
    }

    fn wait_while(&self, mut condition: impl FnMut(&BufferState) -> bool) {
        let mut state = self.lock_state();
        while condition(&*state) {
            state = self
                .milestone
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

/// Read-only, thread-safe view of a command buffer's execution state.
#[derive(Clone)]
pub struct CommandBufferView {
    shared: Arc<BufferShared>,
}

impl CommandBufferView {
    pub(crate) fn from_shared(shared: Arc<BufferShared>) -> Self {
        Self { shared }
    }

    pub fn status(&self) -> CommandBufferStatus {
        self.shared.lock_state().status
    }

    /// Execution failure detail; only set in the `Error` state.
    pub fn error(&self) -> Option<CommandBufferError> {
        self.shared.lock_state().error.clone()
    }

    pub fn timestamps(&self) -> CommandBufferTimestamps {
        self.shared.lock_state().timestamps
    }

    pub fn kernel_start_time(&self) -> u64 {
        self.timestamps().kernel_start_ns
    }

    pub fn kernel_end_time(&self) -> u64 {
        self.timestamps().kernel_end_ns
    }

    pub fn gpu_start_time(&self) -> u64 {
        self.timestamps().gpu_start_ns
    }

    pub fn gpu_end_time(&self) -> u64 {
        self.timestamps().gpu_end_ns
    }

    pub fn handle(&self) -> RawHandle {
        self.shared.handle()
    }

    pub fn device(&self) -> &Device {
        &self.shared.device
    }

    pub fn retained_references(&self) -> bool {
        self.shared.retained_references
    }

    pub fn label(&self) -> Option<String> {
        self.shared
            .label
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Block until the buffer has been scheduled (or has already moved past `Scheduled`).
    ///
    /// A buffer is scheduled once every buffer enqueued before it on the same queue has been
    /// scheduled. Its own encoded event waits are resolved later, during execution, so a
    /// scheduled buffer may still be blocked on an event.
    ///
    /// Blocks until some thread commits the buffer if it is not committed yet.
    pub fn wait_until_scheduled(&self) {
        self.shared
            .wait_while(|state| state.status < CommandBufferStatus::Scheduled);
    }

    /// Block until the buffer is `Completed` or `Error` and its completed handlers have run.
    ///
    /// Blocks until some thread commits the buffer if it is not committed yet.
    pub fn wait_until_completed(&self) {
        self.shared
            .wait_while(|state| !(state.status.is_terminal() && state.completion_delivered));
    }
}

impl fmt::Debug for CommandBufferView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBufferView")
            .field("handle", &self.handle())
            .field("status", &self.status())
            .finish()
    }
}

/// One unit of work submitted to a [`CommandQueue`].
///
/// Created by the queue in `NotEnqueued`. Operations are encoded in order, then the buffer is
/// committed once; the device reports progress through [`status`](Self::status) and the blocking
/// `wait_until_*` calls.
pub struct CommandBuffer {
    view: CommandBufferView,
    queue: Weak<QueueShared>,
    slot: Option<u64>,
    commands: Vec<Command>,
    scheduled_handlers: Vec<MilestoneHandler>,
    completed_handlers: Vec<MilestoneHandler>,
}

impl CommandBuffer {
    pub(crate) fn new(
        queue: &Arc<QueueShared>,
        descriptor: &CommandBufferDescriptor,
    ) -> Result<Self> {
        let resource = queue.allocate_buffer(descriptor.retain_references)?;
        let device = queue.device().clone();
        device.stats().inc_buffers_created();
        debug!(
            buffer = %resource.raw(),
            retain_references = descriptor.retain_references,
            "created command buffer"
        );

        let shared = Arc::new(BufferShared {
            resource,
            device,
            retained_references: descriptor.retain_references,
            label: Mutex::new(descriptor.label.clone()),
            state: Mutex::new(BufferState {
                status: CommandBufferStatus::NotEnqueued,
                error: None,
                timestamps: CommandBufferTimestamps::default(),
                completion_delivered: false,
            }),
            milestone: Condvar::new(),
            outstanding: AtomicBool::new(true),
        });

        Ok(Self {
            view: CommandBufferView::from_shared(shared),
            queue: Arc::downgrade(queue),
            slot: None,
            commands: Vec::new(),
            scheduled_handlers: Vec::new(),
            completed_handlers: Vec::new(),
        })
    }

    fn shared(&self) -> &BufferShared {
        &self.view.shared
    }

    fn rejected(&self, operation: &'static str, status: CommandBufferStatus) -> SyncError {
        warn!(buffer = %self.handle(), operation, ?status, "rejected command buffer operation");
        SyncError::InvalidState { operation, status }
    }

    /// Common precondition for everything that mutates the encoded contents.
    fn check_open(&self, operation: &'static str) -> Result<()> {
        if self.is_destroyed() {
            return Err(SyncError::Destroyed {
                object: "command buffer",
            });
        }
        match self.status() {
            CommandBufferStatus::NotEnqueued | CommandBufferStatus::Enqueued => Ok(()),
            status => Err(self.rejected(operation, status)),
        }
    }

    /// Reserve this buffer's position in the queue's execution order without submitting it.
    ///
    /// Valid once, and only before commit.
    pub fn enqueue(&mut self) -> Result<()> {
        let status = self.status();
        if status != CommandBufferStatus::NotEnqueued {
            return Err(self.rejected("enqueue", status));
        }
        self.check_open("enqueue")?;
        let queue = self.queue.upgrade().ok_or(SyncError::QueueReleased)?;

        let slot = queue.reserve_slot();
        self.slot = Some(slot);
        self.shared().set_enqueued();
        debug!(buffer = %self.handle(), slot, "enqueued command buffer");
        Ok(())
    }

    /// Submit the encoded operations for execution.
    ///
    /// Keeps the slot reserved by [`enqueue`](Self::enqueue), or reserves one now.
    pub fn commit(&mut self) -> Result<()> {
        self.check_open("commit")?;
        let previous = self.status();
        let queue = self.queue.upgrade().ok_or(SyncError::QueueReleased)?;

        let slot = match self.slot {
            Some(slot) => slot,
            None => {
                let slot = queue.reserve_slot();
                self.slot = Some(slot);
                slot
            }
        };

        let device = self.device().clone();
        self.shared().set_committed(device.clock().now_ns());

        let submission = Submission {
            slot,
            buffer: self.view.shared.clone(),
            commands: mem::take(&mut self.commands),
            scheduled_handlers: mem::take(&mut self.scheduled_handlers),
            completed_handlers: mem::take(&mut self.completed_handlers),
            queue: self.queue.clone(),
        };

        match queue.submit(submission) {
            Ok(()) => {
                device.stats().inc_buffers_committed();
                debug!(buffer = %self.handle(), slot, "committed command buffer");
                Ok(())
            }
            Err(rejected) => {
                warn!(buffer = %self.handle(), slot, "queue dispatcher is gone; commit rejected");
                if let Some(rejected) = rejected {
                    self.commands = rejected.commands;
                    self.scheduled_handlers = rejected.scheduled_handlers;
                    self.completed_handlers = rejected.completed_handlers;
                }
                self.shared().revert_commit(previous);
                Err(SyncError::DeviceLost)
            }
        }
    }

    /// Encode a signal: once every earlier operation of this buffer has executed, raise `event`
    /// to `max(current, value)`.
    ///
    /// Must not be called while a [`WorkEncoder`] is open; the encoder's mutable borrow of the
    /// buffer enforces this.
    pub fn encode_signal_event(&mut self, event: &Event, value: u64) -> Result<()> {
        self.check_open("encode_signal_event")?;
        let event = EventRef::new(event, self.retained_references());
        self.commands.push(Command::SignalEvent { event, value });
        Ok(())
    }

    /// Encode a wait: operations encoded after this point do not execute until `event` reaches
    /// `value`. Earlier operations are unaffected.
    pub fn encode_wait_for_event(&mut self, event: &Event, value: u64) -> Result<()> {
        self.check_open("encode_wait_for_event")?;
        let event = EventRef::new(event, self.retained_references());
        self.commands.push(Command::WaitForEvent { event, value });
        Ok(())
    }

    /// Open an encoder for opaque work items.
    pub fn work_encoder(&mut self) -> Result<WorkEncoder<'_>> {
        self.check_open("work_encoder")?;
        Ok(WorkEncoder::new(self))
    }

    pub(crate) fn push_work(&mut self, work: Work) {
        self.commands.push(Command::Work(work));
    }

    /// Number of operations encoded and not yet committed.
    pub fn encoded_len(&self) -> usize {
        self.commands.len()
    }

    /// Register a callback run on the device side when the buffer is scheduled.
    ///
    /// Handlers of buffers on the same queue run in scheduling order.
    pub fn add_scheduled_handler<F>(&mut self, handler: F) -> Result<()>
    where
        F: FnOnce(&CommandBufferView) + Send + 'static,
    {
        self.check_open("add_scheduled_handler")?;
        self.scheduled_handlers.push(Box::new(handler));
        Ok(())
    }

    /// Register a callback run on the device side once the buffer reaches a terminal state.
    pub fn add_completed_handler<F>(&mut self, handler: F) -> Result<()>
    where
        F: FnOnce(&CommandBufferView) + Send + 'static,
    {
        self.check_open("add_completed_handler")?;
        self.completed_handlers.push(Box::new(handler));
        Ok(())
    }

    pub fn status(&self) -> CommandBufferStatus {
        self.view.status()
    }

    pub fn error(&self) -> Option<CommandBufferError> {
        self.view.error()
    }

    pub fn timestamps(&self) -> CommandBufferTimestamps {
        self.view.timestamps()
    }

    pub fn kernel_start_time(&self) -> u64 {
        self.view.kernel_start_time()
    }

    pub fn kernel_end_time(&self) -> u64 {
        self.view.kernel_end_time()
    }

    pub fn gpu_start_time(&self) -> u64 {
        self.view.gpu_start_time()
    }

    pub fn gpu_end_time(&self) -> u64 {
        self.view.gpu_end_time()
    }

    pub fn retained_references(&self) -> bool {
        self.view.retained_references()
    }

    pub fn label(&self) -> Option<String> {
        self.view.label()
    }

    pub fn set_label(&self, label: Option<String>) {
        *self
            .shared()
            .label
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = label;
    }

    pub fn device(&self) -> &Device {
        self.view.device()
    }

    /// The queue that created this buffer, if it still exists.
    pub fn command_queue(&self) -> Option<CommandQueue> {
        self.queue.upgrade().map(CommandQueue::from_shared)
    }

    pub fn handle(&self) -> RawHandle {
        self.view.handle()
    }

    /// A clonable view for observing this buffer from other threads.
    pub fn view(&self) -> CommandBufferView {
        self.view.clone()
    }

    /// Block until the buffer is scheduled. See [`CommandBufferView::wait_until_scheduled`].
    ///
    /// Fails with `InvalidState` on an uncommitted buffer.
    pub fn wait_until_scheduled(&self) -> Result<()> {
        self.check_committed("wait_until_scheduled")?;
        self.view.wait_until_scheduled();
        Ok(())
    }

    /// Block until the buffer is terminal and its completed handlers have run.
    ///
    /// Fails with `InvalidState` on an uncommitted buffer.
    pub fn wait_until_completed(&self) -> Result<()> {
        self.check_committed("wait_until_completed")?;
        self.view.wait_until_completed();
        Ok(())
    }

    fn check_committed(&self, operation: &'static str) -> Result<()> {
        match self.status() {
            status @ (CommandBufferStatus::NotEnqueued | CommandBufferStatus::Enqueued) => {
                Err(self.rejected(operation, status))
            }
            _ => Ok(()),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared().resource.is_destroyed()
    }

    /// Release the native handle. Idempotent and valid in any state.
    ///
    /// An uncommitted buffer gives up its reserved slot and can no longer be committed. A
    /// committed buffer keeps executing.
    pub fn destroy(&mut self) {
        self.retire_uncommitted();
        self.shared().resource.destroy();
    }

    fn retire_uncommitted(&mut self) {
        if self.status() > CommandBufferStatus::Enqueued {
            return;
        }
        if let Some(slot) = self.slot.take() {
            if let Some(queue) = self.queue.upgrade() {
                warn!(buffer = %self.handle(), slot, "abandoning enqueued command buffer");
                queue.abandon(slot);
            }
        }
        self.commands.clear();
        self.scheduled_handlers.clear();
        self.completed_handlers.clear();
        self.shared().retire(&self.queue);
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        if self.status() <= CommandBufferStatus::Enqueued {
            self.destroy();
        }
    }
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("handle", &self.handle())
            .field("label", &self.label())
            .field("status", &self.status())
            .field("slot", &self.slot)
            .field("encoded", &self.commands.len())
            .field("retained_references", &self.retained_references())
            .finish()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    use crate::device::DeviceConfig;
    use crate::handle::HandleKind;
    use crate::queue::CommandQueueConfig;

    use pretty_assertions::assert_eq;

    fn queue() -> CommandQueue {
        Device::new(DeviceConfig::default())
            .new_command_queue()
            .unwrap()
    }

    #[test]
    fn lifecycle_edges() {
        use CommandBufferStatus::*;
        assert!(NotEnqueued.can_transition_to(Enqueued));
        assert!(NotEnqueued.can_transition_to(Committed));
        assert!(Enqueued.can_transition_to(Committed));
        assert!(Committed.can_transition_to(Scheduled));
        assert!(Scheduled.can_transition_to(Completed));
        assert!(Scheduled.can_transition_to(Error));

        assert!(!Committed.can_transition_to(Completed));
        assert!(!Enqueued.can_transition_to(Enqueued));
        assert!(!Completed.can_transition_to(Error));
        assert!(!Error.can_transition_to(Completed));
        assert!(!NotEnqueued.can_transition_to(Scheduled));
    }

    #[test]
    fn new_buffer_starts_clean() {
        let queue = queue();
        let buffer = queue.command_buffer().unwrap();
        assert_eq!(buffer.status(), CommandBufferStatus::NotEnqueued);
        assert_eq!(buffer.error(), None);
        assert_eq!(buffer.timestamps(), CommandBufferTimestamps::default());
        assert!(buffer.retained_references());
        assert_eq!(buffer.label(), None);
        assert_eq!(buffer.device(), queue.device());
        assert_eq!(buffer.command_queue().unwrap().handle(), queue.handle());
    }

    #[test]
    fn unretained_flag_is_fixed_at_creation() {
        let queue = queue();
        let buffer = queue.command_buffer_with_unretained_references().unwrap();
        assert!(!buffer.retained_references());
    }

    #[test]
    fn second_enqueue_is_rejected() {
        let queue = queue();
        let mut buffer = queue.command_buffer().unwrap();
        buffer.enqueue().unwrap();
        assert_eq!(
            buffer.enqueue().unwrap_err(),
            SyncError::InvalidState {
                operation: "enqueue",
                status: CommandBufferStatus::Enqueued,
            }
        );
        assert_eq!(buffer.status(), CommandBufferStatus::Enqueued);
    }

    #[test]
    fn waiting_on_uncommitted_buffer_fails_fast() {
        let queue = queue();
        let mut buffer = queue.command_buffer().unwrap();
        assert_eq!(
            buffer.wait_until_completed().unwrap_err(),
            SyncError::InvalidState {
                operation: "wait_until_completed",
                status: CommandBufferStatus::NotEnqueued,
            }
        );

        buffer.enqueue().unwrap();
        assert_eq!(
            buffer.wait_until_scheduled().unwrap_err(),
            SyncError::InvalidState {
                operation: "wait_until_scheduled",
                status: CommandBufferStatus::Enqueued,
            }
        );

        buffer.commit().unwrap();
        buffer.wait_until_scheduled().unwrap();
        buffer.wait_until_completed().unwrap();
    }

    #[test]
    fn operations_after_commit_are_rejected() {
        let queue = queue();
        let event = queue.device().new_event().unwrap();
        let mut buffer = queue.command_buffer().unwrap();
        buffer.commit().unwrap();
        buffer.wait_until_completed().unwrap();

        let status = buffer.status();
        assert_eq!(status, CommandBufferStatus::Completed);
        for err in [
            buffer.commit().unwrap_err(),
            buffer.enqueue().unwrap_err(),
            buffer.encode_signal_event(&event, 1).unwrap_err(),
            buffer.encode_wait_for_event(&event, 1).unwrap_err(),
            buffer.add_completed_handler(|_| {}).unwrap_err(),
        ] {
            assert!(
                matches!(err, SyncError::InvalidState { status: s, .. } if s == status),
                "unexpected error {err:?}"
            );
        }
        assert!(buffer.work_encoder().is_err());
    }

    #[test]
    fn commit_without_queue_fails() {
        let device = Device::new(DeviceConfig::default());
        let queue = device.new_command_queue().unwrap();
        let mut buffer = queue.command_buffer().unwrap();
        drop(queue);

        assert!(buffer.command_queue().is_none());
        assert_eq!(buffer.commit().unwrap_err(), SyncError::QueueReleased);
        assert_eq!(buffer.status(), CommandBufferStatus::NotEnqueued);
    }

    #[test]
    fn destroyed_buffer_cannot_be_committed() {
        let queue = queue();
        let mut buffer = queue.command_buffer().unwrap();
        buffer.destroy();
        buffer.destroy();
        assert!(buffer.is_destroyed());
        assert_eq!(
            buffer.commit().unwrap_err(),
            SyncError::Destroyed {
                object: "command buffer"
            }
        );
    }

    #[test]
    fn dropping_uncommitted_buffer_releases_handle_and_limit() {
        let device = Device::new(DeviceConfig::default());
        let queue = device
            .new_command_queue_with_config(CommandQueueConfig {
                max_command_buffer_count: 1,
                ..Default::default()
            })
            .unwrap();

        let buffer = queue.command_buffer().unwrap();
        assert_eq!(queue.outstanding_command_buffers(), 1);
        assert!(matches!(
            queue.command_buffer().unwrap_err(),
            SyncError::ResourceExhausted {
                resource: "command buffer",
                limit: 1
            }
        ));

        drop(buffer);
        assert_eq!(queue.outstanding_command_buffers(), 0);
        assert_eq!(
            device.handles().live_count_of(HandleKind::CommandBuffer),
            0
        );
        queue.command_buffer().unwrap();
    }

    #[test]
    fn encoding_records_operations_in_order() {
        let queue = queue();
        let event = queue.device().new_event().unwrap();
        let mut buffer = queue.command_buffer().unwrap();

        buffer.encode_wait_for_event(&event, 1).unwrap();
        {
            let mut encoder = buffer.work_encoder().unwrap();
            encoder.dispatch(Work::new("a")).dispatch(Work::new("b"));
            encoder.end_encoding();
        }
        buffer.encode_signal_event(&event, 2).unwrap();

        let kinds: Vec<&str> = buffer
            .commands
            .iter()
            .map(|command| match command {
                Command::Work(work) => work.label(),
                Command::SignalEvent { .. } => "signal",
                Command::WaitForEvent { .. } => "wait",
            })
            .collect();
        assert_eq!(kinds, vec!["wait", "a", "b", "signal"]);
        assert_eq!(buffer.encoded_len(), 4);
    }

    #[test]
    fn label_comes_from_descriptor_and_can_change() {
        let queue = queue();
        let buffer = queue
            .command_buffer_with_descriptor(&CommandBufferDescriptor {
                label: Some("shadow pass".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(buffer.label().as_deref(), Some("shadow pass"));
        buffer.set_label(None);
        assert_eq!(buffer.label(), None);
    }

    #[test]
    fn unretained_buffer_does_not_keep_events_alive() {
        let queue = queue();
        let event = queue.device().new_event().unwrap();
        let mut buffer = queue.command_buffer_with_unretained_references().unwrap();
        buffer.encode_signal_event(&event, 1).unwrap();

        drop(event);
        assert_eq!(
            queue.device().handles().live_count_of(HandleKind::Event),
            0
        );
    }

    #[test]
    fn retained_buffer_keeps_events_alive_until_dropped() {
        let queue = queue();
        let event = queue.device().new_event().unwrap();
        let mut buffer = queue.command_buffer().unwrap();
        buffer.encode_signal_event(&event, 1).unwrap();

        drop(event);
        assert_eq!(
            queue.device().handles().live_count_of(HandleKind::Event),
            1
        );
        drop(buffer);
        assert_eq!(
            queue.device().handles().live_count_of(HandleKind::Event),
            0
        );
    }
}
