//! Error types for the requeue pass.
//!
//! Only whole-request failures are errors. A batch that partially fails is
//! reported through [`crate::BatchOutcome::failed`] and never escalates.

use std::fmt;
use std::time::Duration;

/// Boxed error carried as the cause of a [`TransportError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The queue service operation that was being attempted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ReceiveMessage,
    SendMessageBatch,
    DeleteMessageBatch,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::ReceiveMessage => write!(f, "ReceiveMessage"),
            Operation::SendMessageBatch => write!(f, "SendMessageBatch"),
            Operation::DeleteMessageBatch => write!(f, "DeleteMessageBatch"),
        }
    }
}

/// The queue service could not be reached, rejected the request, or the
/// client gave up after its own retry budget.
///
/// Always fatal to the current invocation.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed for queue '{queue_url}': {source}")]
pub struct TransportError {
    pub operation: Operation,
    pub queue_url: String,
    #[source]
    pub source: BoxError,
}

impl TransportError {
    pub fn new(operation: Operation, queue_url: &str, source: impl Into<BoxError>) -> Self {
        Self {
            operation,
            queue_url: queue_url.to_string(),
            source: source.into(),
        }
    }
}

/// A delivery returned by `ReceiveMessage` that cannot be requeued safely.
#[derive(Debug, thiserror::Error)]
#[error("received message is missing its {0}")]
pub struct MalformedMessage(pub &'static str);

/// Failure of a whole requeue invocation.
#[derive(Debug, thiserror::Error)]
pub enum RequeueError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("requeue did not finish before the invocation deadline ({elapsed:?} elapsed)")]
    DeadlineExceeded { elapsed: Duration },
    #[error("requeue panicked: {0}")]
    Panicked(String),
}

impl RequeueError {
    /// The operation that failed, when the failure came from the queue service.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            RequeueError::Transport(e) => Some(e.operation),
            _ => None,
        }
    }
}
