//! Command queues: order buffers and hand them to the device.
//!
//! Every buffer gets a slot number from its queue when it is enqueued (or, if it never was, when
//! it is committed). The queue's dispatcher thread schedules buffers strictly in slot order, so a
//! buffer committed early still waits for every buffer enqueued before it.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread;

use tracing::{debug, trace, warn};

use crate::command_buffer::{
    BufferShared, Command, CommandBuffer, CommandBufferDescriptor, MilestoneHandler,
};
use crate::device::Device;
use crate::error::{Result, SyncError};
use crate::executor;
use crate::handle::{HandleKind, NativeResource, RawHandle};

#[derive(Clone, Debug)]
pub struct CommandQueueConfig {
    pub label: Option<String>,
    /// Buffers created from this queue that have not reached a terminal state (or been dropped
    /// uncommitted) count against this limit.
    pub max_command_buffer_count: usize,
}

impl Default for CommandQueueConfig {
    fn default() -> Self {
        Self {
            label: None,
            max_command_buffer_count: 64,
        }
    }
}

/// A committed buffer on its way to the dispatcher.
pub(crate) struct Submission {
    pub(crate) slot: u64,
    pub(crate) buffer: Arc<BufferShared>,
    pub(crate) commands: Vec<Command>,
    pub(crate) scheduled_handlers: Vec<MilestoneHandler>,
    pub(crate) completed_handlers: Vec<MilestoneHandler>,
    pub(crate) queue: Weak<QueueShared>,
}

pub(crate) enum QueueMessage {
    Submit(Submission),
    /// The buffer holding this slot was dropped or destroyed before commit.
    Abandon { slot: u64 },
}

impl QueueMessage {
    fn into_submission(self) -> Option<Submission> {
        match self {
            QueueMessage::Submit(submission) => Some(submission),
            QueueMessage::Abandon { .. } => None,
        }
    }
}

pub(crate) struct QueueShared {
    resource: NativeResource,
    device: Device,
    label: Mutex<Option<String>>,
    next_slot: AtomicU64,
    outstanding: AtomicUsize,
    max_command_buffer_count: usize,
    submissions: Mutex<Sender<QueueMessage>>,
}

impl QueueShared {
    pub(crate) fn device(&self) -> &Device {
        &self.device
    }

    /// Reserve a native handle for a new buffer, counting it against the queue limit.
    pub(crate) fn allocate_buffer(&self, retain_references: bool) -> Result<NativeResource> {
        let limit = self.max_command_buffer_count;
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < limit).then_some(count + 1)
            })
            .map_err(|_| {
                warn!(queue = %self.resource.raw(), limit, "command buffer limit reached");
                SyncError::ResourceExhausted {
                    resource: "command buffer",
                    limit,
                }
            })?;

        match NativeResource::allocate(self.device.handles(), HandleKind::CommandBuffer) {
            Ok(resource) => {
                trace!(
                    queue = %self.resource.raw(),
                    buffer = %resource.raw(),
                    retain_references,
                    "allocated command buffer handle"
                );
                Ok(resource)
            }
            Err(err) => {
                self.release_outstanding();
                Err(err)
            }
        }
    }

    pub(crate) fn release_outstanding(&self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn reserve_slot(&self) -> u64 {
        self.next_slot.fetch_add(1, Ordering::AcqRel)
    }

    /// Hand a committed buffer to the dispatcher. On failure the submission is returned so the
    /// caller can restore its encoded state.
    pub(crate) fn submit(
        &self,
        submission: Submission,
    ) -> std::result::Result<(), Option<Submission>> {
        self.submissions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .send(QueueMessage::Submit(submission))
            .map_err(|mpsc::SendError(message)| message.into_submission())
    }

    /// Free `slot` so buffers behind it are not held back.
    pub(crate) fn abandon(&self, slot: u64) {
        self.device.stats().inc_slots_abandoned();
        let sent = self
            .submissions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .send(QueueMessage::Abandon { slot });
        if sent.is_err() {
            debug!(queue = %self.resource.raw(), slot, "dispatcher gone; abandon dropped");
        }
    }
}

/// Ordered submission channel for command buffers.
///
/// Clones refer to the same queue. The queue's dispatcher thread exits once the last clone is
/// dropped and every submitted buffer has been scheduled.
#[derive(Clone)]
pub struct CommandQueue {
    shared: Arc<QueueShared>,
}

impl CommandQueue {
    pub(crate) fn new(device: &Device, config: CommandQueueConfig) -> Result<Self> {
        let resource = NativeResource::allocate(device.handles(), HandleKind::CommandQueue)?;
        let (sender, receiver) = mpsc::channel();

        let dispatcher_device = device.clone();
        thread::Builder::new()
            .name(format!("cmdsync-queue-{}", resource.raw()))
            .spawn(move || executor::run_dispatcher(receiver, dispatcher_device))
            .map_err(|err| SyncError::Spawn {
                thread: "queue dispatcher",
                message: err.to_string(),
            })?;

        debug!(
            queue = %resource.raw(),
            label = ?config.label,
            max_command_buffer_count = config.max_command_buffer_count,
            "created command queue"
        );

        Ok(Self {
            shared: Arc::new(QueueShared {
                resource,
                device: device.clone(),
                label: Mutex::new(config.label),
                next_slot: AtomicU64::new(0),
                outstanding: AtomicUsize::new(0),
                max_command_buffer_count: config.max_command_buffer_count,
                submissions: Mutex::new(sender),
            }),
        })
    }

    pub(crate) fn from_shared(shared: Arc<QueueShared>) -> Self {
        Self { shared }
    }

    /// New buffer that retains the events it references.
    pub fn command_buffer(&self) -> Result<CommandBuffer> {
        self.command_buffer_with_descriptor(&CommandBufferDescriptor::default())
    }

    /// New buffer that does not keep referenced events alive; the caller must.
    pub fn command_buffer_with_unretained_references(&self) -> Result<CommandBuffer> {
        self.command_buffer_with_descriptor(&CommandBufferDescriptor {
            retain_references: false,
            ..Default::default()
        })
    }

    pub fn command_buffer_with_descriptor(
        &self,
        descriptor: &CommandBufferDescriptor,
    ) -> Result<CommandBuffer> {
        CommandBuffer::new(&self.shared, descriptor)
    }

    /// Low-level allocation of a command buffer handle.
    ///
    /// The returned resource counts against the queue limit for as long as the queue lives; prefer
    /// [`command_buffer`](Self::command_buffer).
    pub fn allocate_buffer(&self, retain_references: bool) -> Result<NativeResource> {
        self.shared.allocate_buffer(retain_references)
    }

    pub fn device(&self) -> &Device {
        &self.shared.device
    }

    pub fn handle(&self) -> RawHandle {
        self.shared.resource.raw()
    }

    pub fn label(&self) -> Option<String> {
        self.shared
            .label
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_label(&self, label: Option<String>) {
        *self
            .shared
            .label
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = label;
    }

    pub fn max_command_buffer_count(&self) -> usize {
        self.shared.max_command_buffer_count
    }

    pub fn outstanding_command_buffers(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }
}

impl PartialEq for CommandQueue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for CommandQueue {}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("handle", &self.handle())
            .field("label", &self.label())
            .field("outstanding", &self.outstanding_command_buffers())
            .field("max_command_buffer_count", &self.max_command_buffer_count())
            .finish()
    }
}
