//! The requeue pass: receive a batch from the dead letter queue, send it to the
//! destination, delete what was sent, and repeat until a receive comes back
//! empty.
//!
//! The pass is strictly sequential. A message is only ever deleted from the
//! source after the destination confirmed it, so every message ends the pass
//! in the destination, still in the source, or both (a duplicate).

use crate::config::RequeueConfig;
use crate::error::{RequeueError, TransportError};
use crate::message::{Batch, BatchOutcome};
use crate::sqs::QueueService;

/// Counters describing how far a requeue pass got.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequeueReport {
    /// Receive requests made, including the final empty one
    pub fetches: usize,
    /// Non-empty batches processed
    pub batches: usize,
    pub received: usize,
    pub forwarded: usize,
    pub deleted: usize,
    /// Messages the destination refused; they stay in the source
    pub forward_failures: usize,
    /// Forwarded messages that could not be deleted; they will be delivered again
    pub delete_failures: usize,
}

/// Receives up to the configured batch size from the source queue.
///
/// Long-polls for the configured wait time. An empty batch is not an error,
/// it means the source is drained.
pub async fn fetch<Q: QueueService>(
    queue: &Q,
    config: &RequeueConfig,
) -> Result<Batch, TransportError> {
    let messages = queue
        .receive(
            &config.source_queue,
            config.batch_size(),
            config.wait_time_seconds(),
            config.visibility_timeout,
        )
        .await?;

    Ok(Batch::new(messages))
}

/// Sends the batch to the destination queue as one request.
///
/// The outcome lists, per correlation id, which entries were accepted.
pub async fn forward<Q: QueueService>(
    queue: &Q,
    config: &RequeueConfig,
    batch: &Batch,
) -> Result<BatchOutcome, TransportError> {
    if batch.is_empty() {
        return Ok(BatchOutcome::default());
    }

    log::info!(
        "Moving {} message(s) from {} to {}",
        batch.len(),
        config.source_queue,
        config.destination_queue
    );
    log::debug!("Sending batch {:?} to {}", batch, config.destination_queue);

    let outcome = queue.send_batch(&config.destination_queue, batch).await?;

    for failure in &outcome.failed {
        log::warn!(
            "Message {} was not sent to {}: {} - {} (sender fault: {}); it stays in {}",
            failure.id,
            config.destination_queue,
            failure.code,
            failure.message.as_deref().unwrap_or("unknown"),
            failure.sender_fault,
            config.source_queue
        );
    }

    Ok(outcome)
}

/// Deletes the given, already forwarded, messages from the source queue.
///
/// A message that fails to delete reappears after its visibility timeout and
/// is sent again by a later pass.
pub async fn acknowledge<Q: QueueService>(
    queue: &Q,
    config: &RequeueConfig,
    forwarded: &Batch,
) -> Result<BatchOutcome, TransportError> {
    if forwarded.is_empty() {
        return Ok(BatchOutcome::default());
    }

    log::debug!("Deleting batch {:?} from {}", forwarded, config.source_queue);

    let outcome = queue.delete_batch(&config.source_queue, forwarded).await?;

    for failure in &outcome.failed {
        log::warn!(
            "Message {} was sent but not deleted from {}: {} - {}; it will be delivered again",
            failure.id,
            config.source_queue,
            failure.code,
            failure.message.as_deref().unwrap_or("unknown")
        );
    }

    Ok(outcome)
}

/// Drains the source queue into the destination queue.
///
/// Runs until a fetch returns no messages. Any transport error ends the pass
/// immediately; retries only happen inside the SDK client. A producer that
/// keeps refilling the source keeps the pass running, bounded only by the
/// caller's deadline.
pub async fn requeue_messages<Q: QueueService>(
    queue: &Q,
    config: &RequeueConfig,
) -> Result<RequeueReport, RequeueError> {
    let mut report = RequeueReport::default();

    match drain(queue, config, &mut report).await {
        Ok(()) => Ok(report),
        Err(e) => {
            log::error!(
                "Requeue from {} to {} stopped after {} batch(es), {} message(s) moved: {}",
                config.source_queue,
                config.destination_queue,
                report.batches,
                report.deleted,
                e
            );
            Err(e.into())
        }
    }
}

async fn drain<Q: QueueService>(
    queue: &Q,
    config: &RequeueConfig,
    report: &mut RequeueReport,
) -> Result<(), TransportError> {
    loop {
        let batch = fetch(queue, config).await?;
        report.fetches += 1;
        log::info!("Number of messages to requeue {}", batch.len());

        if batch.is_empty() {
            return Ok(());
        }
        report.batches += 1;
        report.received += batch.len();

        let sent = forward(queue, config, &batch).await?;
        let forwarded = batch.retain_successful(&sent);
        report.forwarded += forwarded.len();
        report.forward_failures += sent.failed.len();

        let deleted = acknowledge(queue, config, &forwarded).await?;
        report.deleted += deleted.successful.len();
        report.delete_failures += deleted.failed.len();
    }
}
