//! The queue service seam and its SQS implementation.

use std::future::Future;

use aws_config::SdkConfig;
use aws_sdk_sqs as sqs;
use sqs::types::{DeleteMessageBatchRequestEntry, SendMessageBatchRequestEntry};

use crate::error::{Operation, TransportError};
use crate::message::{Batch, BatchFailure, BatchOutcome, MessageModel};

/// The three batched operations a requeue pass needs from the queue service.
///
/// Implementations never see an empty batch for `send_batch` or
/// `delete_batch`; callers skip the request instead.
pub trait QueueService {
    /// Receives up to `max_messages`, long-polling for `wait_time_seconds`.
    ///
    /// An empty vector means nothing became visible before the wait expired.
    fn receive(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_time_seconds: i32,
        visibility_timeout: Option<i32>,
    ) -> impl Future<Output = Result<Vec<MessageModel>, TransportError>> + Send;

    /// Sends every entry as one batched request, copying body and attributes.
    fn send_batch(
        &self,
        queue_url: &str,
        batch: &Batch,
    ) -> impl Future<Output = Result<BatchOutcome, TransportError>> + Send;

    /// Deletes every entry by its receipt handle as one batched request.
    fn delete_batch(
        &self,
        queue_url: &str,
        batch: &Batch,
    ) -> impl Future<Output = Result<BatchOutcome, TransportError>> + Send;
}

/// Receives messages from an SQS queue.
///
/// Requests every custom message attribute so they can be forwarded.
///
/// # Errors
///
/// Returns the SDK error if the SQS API call fails.
pub async fn receive(
    client: &sqs::Client,
    queue_url: &str,
    max_messages: i32,
    wait_time_seconds: i32,
    visibility_timeout: Option<i32>,
) -> Result<
    sqs::operation::receive_message::ReceiveMessageOutput,
    sqs::error::SdkError<sqs::operation::receive_message::ReceiveMessageError>,
> {
    client
        .receive_message()
        .queue_url(queue_url)
        .max_number_of_messages(max_messages)
        .wait_time_seconds(wait_time_seconds)
        .set_visibility_timeout(visibility_timeout)
        .message_attribute_names("All")
        .send()
        .await
}

/// Queue service backed by AWS SQS.
///
/// # Example
///
/// ```no_run
/// use requeue::{RequeueConfig, SqsQueue};
///
/// # async fn example() {
/// let config = RequeueConfig::new(
///     "https://sqs.us-east-1.amazonaws.com/123456789/my-dlq",
///     "https://sqs.us-east-1.amazonaws.com/123456789/my-queue",
///     "us-east-1",
/// );
/// let queue = SqsQueue::from_config(config.load_sdk_config().await);
/// let report = requeue::requeue_messages(&queue, &config).await;
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SqsQueue {
    /// The AWS SDK configuration used for SQS operations
    pub config: SdkConfig,
    /// The SQS client instance, reused for every request of a pass
    pub client: sqs::Client,
}

impl SqsQueue {
    pub fn from_config(config: SdkConfig) -> Self {
        let client = sqs::Client::new(&config);
        Self { config, client }
    }
}

impl QueueService for SqsQueue {
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_time_seconds: i32,
        visibility_timeout: Option<i32>,
    ) -> Result<Vec<MessageModel>, TransportError> {
        let transport_error =
            |e: sqs::Error| TransportError::new(Operation::ReceiveMessage, queue_url, e);

        let output = receive(
            &self.client,
            queue_url,
            max_messages,
            wait_time_seconds,
            visibility_timeout,
        )
        .await
        .map_err(|e| transport_error(e.into()))?;

        received_messages(queue_url, output.messages.unwrap_or_default())
    }

    async fn send_batch(
        &self,
        queue_url: &str,
        batch: &Batch,
    ) -> Result<BatchOutcome, TransportError> {
        let entries = batch
            .entries()
            .iter()
            .map(|entry| {
                let attributes = &entry.message.message_attributes;
                SendMessageBatchRequestEntry::builder()
                    .id(entry.id.as_ref())
                    .message_body(&entry.message.body)
                    .set_message_attributes((!attributes.is_empty()).then(|| attributes.clone()))
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TransportError::new(Operation::SendMessageBatch, queue_url, e))?;

        let output = self
            .client
            .send_message_batch()
            .queue_url(queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| {
                TransportError::new(Operation::SendMessageBatch, queue_url, sqs::Error::from(e))
            })?;

        Ok(BatchOutcome {
            successful: output.successful().iter().map(|s| s.id().to_string()).collect(),
            failed: output.failed().iter().map(batch_failure).collect(),
        })
    }

    async fn delete_batch(
        &self,
        queue_url: &str,
        batch: &Batch,
    ) -> Result<BatchOutcome, TransportError> {
        let entries = batch
            .entries()
            .iter()
            .map(|entry| {
                DeleteMessageBatchRequestEntry::builder()
                    .id(entry.id.as_ref())
                    .receipt_handle(&entry.message.receipt_handle)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TransportError::new(Operation::DeleteMessageBatch, queue_url, e))?;

        let output = self
            .client
            .delete_message_batch()
            .queue_url(queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| {
                TransportError::new(Operation::DeleteMessageBatch, queue_url, sqs::Error::from(e))
            })?;

        Ok(BatchOutcome {
            successful: output.successful().iter().map(|s| s.id().to_string()).collect(),
            failed: output.failed().iter().map(batch_failure).collect(),
        })
    }
}

/// Converts the deliveries of one receive.
///
/// A single malformed delivery fails the whole receive: nothing from it is
/// forwarded, and every message stays in the source.
pub(crate) fn received_messages(
    queue_url: &str,
    messages: Vec<sqs::types::Message>,
) -> Result<Vec<MessageModel>, TransportError> {
    messages
        .into_iter()
        .map(|m| {
            MessageModel::from_aws_message(m)
                .map_err(|e| TransportError::new(Operation::ReceiveMessage, queue_url, e))
        })
        .collect()
}

fn batch_failure(entry: &sqs::types::BatchResultErrorEntry) -> BatchFailure {
    BatchFailure {
        id: entry.id().to_string(),
        code: entry.code().to_string(),
        message: entry.message().map(str::to_string),
        sender_fault: entry.sender_fault(),
    }
}
