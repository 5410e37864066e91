//! Message and batch types moved between the source and destination queues.

use std::collections::{HashMap, HashSet};

use aws_sdk_sqs::types::{Message, MessageAttributeValue};

use crate::error::MalformedMessage;

/// A single delivery received from the source queue.
///
/// Attributes are kept as the SDK's own [`MessageAttributeValue`] so that data
/// types, string values and binary values pass through to the destination
/// exactly as received.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageModel {
    /// Unique identifier for the message assigned by SQS
    pub message_id: String,
    /// Handle used to delete this specific delivery
    pub receipt_handle: String,
    /// The actual message content
    pub body: String,
    /// MD5 digest of the message body, when the service returned one
    pub md5_of_body: Option<String>,
    /// Custom message attributes
    pub message_attributes: HashMap<String, MessageAttributeValue>,
}

impl MessageModel {
    /// Converts an AWS SDK Message into a MessageModel.
    ///
    /// A delivery without a message id or receipt handle is rejected: it could
    /// not be correlated or deleted, so forwarding it would only duplicate it.
    ///
    /// # See Also
    ///
    /// - [AWS SQS Message API Reference](https://docs.aws.amazon.com/AWSSimpleQueueService/latest/APIReference/API_Message.html)
    pub fn from_aws_message(message: Message) -> Result<Self, MalformedMessage> {
        Ok(Self {
            message_id: message.message_id.ok_or(MalformedMessage("message_id"))?,
            receipt_handle: message
                .receipt_handle
                .ok_or(MalformedMessage("receipt_handle"))?,
            body: message.body.unwrap_or_default(),
            md5_of_body: message.md5_of_body,
            message_attributes: message.message_attributes.unwrap_or_default(),
        })
    }
}

/// Identifier of one entry inside a batched request.
///
/// SQS only accepts alphanumerics, `-` and `_`, up to 80 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchId(String);

impl BatchId {
    pub fn new<S: Into<String>>(id: S) -> Result<Self, String> {
        let id_str = id.into();
        if id_str.is_empty() {
            return Err("Batch ID cannot be empty".to_string());
        }
        if id_str.len() > 80 {
            return Err(format!(
                "Batch ID exceeds maximum length: {} > 80 characters",
                id_str.len()
            ));
        }
        for c in id_str.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' && c != '_' {
                return Err(format!(
                    "Invalid character in Batch ID: '{}'. Allowed: alphanumeric, '-', '_'",
                    c
                ));
            }
        }
        Ok(Self(id_str))
    }

    fn positional(index: usize) -> Self {
        Self(format!("entry-{index}"))
    }
}

impl AsRef<str> for BatchId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A message paired with the correlation id used for it in batched requests.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchEntry {
    pub id: BatchId,
    pub message: MessageModel,
}

/// The messages returned by one fetch, in receive order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    entries: Vec<BatchEntry>,
}

impl Batch {
    /// Assigns every message a correlation id.
    ///
    /// The message id is reused when it is a valid, unique batch id; otherwise
    /// the entry falls back to its position in the batch.
    pub fn new(messages: Vec<MessageModel>) -> Self {
        let mut seen = HashSet::new();
        let entries = messages
            .into_iter()
            .enumerate()
            .map(|(index, message)| {
                let id = match BatchId::new(message.message_id.as_str()) {
                    Ok(id) if !seen.contains(&id) => id,
                    _ => (index..)
                        .map(BatchId::positional)
                        .find(|id| !seen.contains(id))
                        .unwrap_or_else(|| BatchId::positional(index)),
                };
                seen.insert(id.clone());
                BatchEntry { id, message }
            })
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keeps only the entries the service reported as successful.
    pub fn retain_successful(mut self, outcome: &BatchOutcome) -> Self {
        let successful: HashSet<&str> = outcome.successful.iter().map(String::as_str).collect();
        self.entries.retain(|entry| successful.contains(entry.id.as_ref()));
        self
    }
}

/// One entry of a batched request that the service refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchFailure {
    pub id: String,
    pub code: String,
    pub message: Option<String>,
    pub sender_fault: bool,
}

/// Per-entry result of a batched send or delete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub successful: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn is_partial_failure(&self) -> bool {
        !self.failed.is_empty()
    }
}
