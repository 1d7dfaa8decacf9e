use crate::command_buffer::CommandBufferStatus;

/// Errors reported synchronously by the submission API.
///
/// These are programmer errors (invalid state transitions) or allocation failures. Failures that
/// happen while the device executes a buffer are never returned here; they surface as
/// [`CommandBufferStatus::Error`] plus a [`CommandBufferError`] detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("{operation} is not valid for a command buffer in state {status:?}")]
    InvalidState {
        operation: &'static str,
        status: CommandBufferStatus,
    },
    #[error("the owning command queue has been released")]
    QueueReleased,
    #[error("{resource} limit reached (limit={limit})")]
    ResourceExhausted {
        resource: &'static str,
        limit: usize,
    },
    #[error("the device stopped accepting submissions")]
    DeviceLost,
    #[error("the {object} has been destroyed")]
    Destroyed { object: &'static str },
    #[error("failed to spawn {thread} thread: {message}")]
    Spawn {
        thread: &'static str,
        message: String,
    },
}

/// Device-side execution failure attached to a buffer in the `Error` state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandBufferError {
    #[error("work item {label:?} failed: {message}")]
    WorkFailed { label: String, message: String },
    #[error("event referenced by an unretained {operation} was released before execution")]
    EventReleased { operation: &'static str },
    #[error("no execution thread available: {message}")]
    ExecutionUnavailable { message: String },
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
