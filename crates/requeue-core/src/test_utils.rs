//! In-memory queue service used by the unit tests.
//!
//! Models just enough of SQS: a received message stays invisible for the rest
//! of the test (as if its visibility timeout outlived the pass), deletion
//! needs the receipt handle of the current delivery, and batched requests can
//! fail per entry or as a whole.
//!
//! Also holds a logger that keeps each thread's records, so a test can assert
//! on what it logged.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, Once};
use std::time::Duration;

use aws_sdk_sqs::types::{Message, MessageAttributeValue};

use crate::error::{Operation, TransportError};
use crate::message::{Batch, BatchFailure, BatchOutcome, MessageModel};
use crate::sqs::{received_messages, QueueService};

pub const SOURCE: &str = "memory://dead-letter";
pub const DESTINATION: &str = "memory://orders";

/// A message as stored by [`MemoryQueue`].
#[derive(Clone, Debug, PartialEq)]
pub struct StoredMessage {
    pub message_id: String,
    pub body: String,
    pub attributes: HashMap<String, MessageAttributeValue>,
    receipt_handle: Option<String>,
}

/// One request seen by the fake, with the number of entries involved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Receive(usize),
    Send(usize),
    Delete(usize),
}

#[derive(Default)]
struct State {
    queues: HashMap<String, Vec<StoredMessage>>,
    next_id: usize,
    calls: Vec<Call>,
    reject_send: HashSet<String>,
    reject_delete: HashSet<String>,
    fail_operation: Option<(Operation, usize)>,
    hang_on_receive: bool,
    panic_on_receive: bool,
    drop_receipt_handles: bool,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    /// Counts the request and reports whether it must fail as a whole.
    fn record(&mut self, operation: Operation, call: Call) -> bool {
        self.calls.push(call);
        match &mut self.fail_operation {
            Some((op, remaining)) if *op == operation => {
                if *remaining == 0 {
                    true
                } else {
                    *remaining -= 1;
                    false
                }
            }
            _ => false,
        }
    }
}

#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue whose source holds `count` messages with bodies `message-<n>`.
    pub fn with_messages(count: usize) -> Self {
        let queue = Self::new();
        for n in 0..count {
            queue.push(SOURCE, &format!("message-{n}"), HashMap::new());
        }
        queue
    }

    pub fn push(
        &self,
        queue_url: &str,
        body: &str,
        attributes: HashMap<String, MessageAttributeValue>,
    ) {
        let mut state = self.state.lock().unwrap();
        let message_id = state.next_id("msg");
        state
            .queues
            .entry(queue_url.to_string())
            .or_default()
            .push(StoredMessage {
                message_id,
                body: body.to_string(),
                attributes,
                receipt_handle: None,
            });
    }

    pub fn messages(&self, queue_url: &str) -> Vec<StoredMessage> {
        let state = self.state.lock().unwrap();
        state.queues.get(queue_url).cloned().unwrap_or_default()
    }

    pub fn bodies(&self, queue_url: &str) -> Vec<String> {
        self.messages(queue_url).into_iter().map(|m| m.body).collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Entries with this body are refused by `SendMessageBatch`.
    pub fn reject_send_of(&self, body: &str) {
        self.state.lock().unwrap().reject_send.insert(body.to_string());
    }

    /// Entries with this body are refused by `DeleteMessageBatch`.
    pub fn reject_delete_of(&self, body: &str) {
        self.state
            .lock()
            .unwrap()
            .reject_delete
            .insert(body.to_string());
    }

    /// The whole request fails once `operation` has succeeded `after` times.
    pub fn fail_operation(&self, operation: Operation, after: usize) {
        self.state.lock().unwrap().fail_operation = Some((operation, after));
    }

    pub fn hang_on_receive(&self) {
        self.state.lock().unwrap().hang_on_receive = true;
    }

    pub fn panic_on_receive(&self) {
        self.state.lock().unwrap().panic_on_receive = true;
    }

    /// Deliveries come back without a receipt handle.
    pub fn drop_receipt_handles(&self) {
        self.state.lock().unwrap().drop_receipt_handles = true;
    }
}

fn rejected(id: &str) -> BatchFailure {
    BatchFailure {
        id: id.to_string(),
        code: "InternalError".to_string(),
        message: Some("simulated entry failure".to_string()),
        sender_fault: false,
    }
}

impl QueueService for MemoryQueue {
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: i32,
        _wait_time_seconds: i32,
        _visibility_timeout: Option<i32>,
    ) -> Result<Vec<MessageModel>, TransportError> {
        let hang = {
            let state = self.state.lock().unwrap();
            if state.panic_on_receive {
                panic!("simulated fault while receiving");
            }
            state.hang_on_receive
        };
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let mut state = self.state.lock().unwrap();
        let mut handles = Vec::new();
        let limit = max_messages.max(0) as usize;
        let visible = state
            .queues
            .get(queue_url)
            .map(|q| q.iter().filter(|m| m.receipt_handle.is_none()).count())
            .unwrap_or(0);
        for _ in 0..visible.min(limit) {
            handles.push(state.next_id("rh"));
        }

        if state.record(Operation::ReceiveMessage, Call::Receive(handles.len())) {
            return Err(TransportError::new(
                Operation::ReceiveMessage,
                queue_url,
                "simulated outage",
            ));
        }

        let drop_receipt_handles = state.drop_receipt_handles;
        let mut received = Vec::new();
        if let Some(queue) = state.queues.get_mut(queue_url) {
            let visible_messages = queue.iter_mut().filter(|m| m.receipt_handle.is_none());
            for (stored, handle) in visible_messages.zip(handles) {
                stored.receipt_handle = Some(handle.clone());
                received.push(
                    Message::builder()
                        .message_id(&stored.message_id)
                        .set_receipt_handle((!drop_receipt_handles).then_some(handle))
                        .body(&stored.body)
                        .set_message_attributes(Some(stored.attributes.clone()))
                        .build(),
                );
            }
        }

        received_messages(queue_url, received)
    }

    async fn send_batch(
        &self,
        queue_url: &str,
        batch: &Batch,
    ) -> Result<BatchOutcome, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.record(Operation::SendMessageBatch, Call::Send(batch.len())) {
            return Err(TransportError::new(
                Operation::SendMessageBatch,
                queue_url,
                "simulated outage",
            ));
        }

        let mut outcome = BatchOutcome::default();
        for entry in batch.entries() {
            if state.reject_send.contains(&entry.message.body) {
                outcome.failed.push(rejected(entry.id.as_ref()));
                continue;
            }
            let message_id = state.next_id("msg");
            state
                .queues
                .entry(queue_url.to_string())
                .or_default()
                .push(StoredMessage {
                    message_id,
                    body: entry.message.body.clone(),
                    attributes: entry.message.message_attributes.clone(),
                    receipt_handle: None,
                });
            outcome.successful.push(entry.id.as_ref().to_string());
        }

        Ok(outcome)
    }

    async fn delete_batch(
        &self,
        queue_url: &str,
        batch: &Batch,
    ) -> Result<BatchOutcome, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.record(Operation::DeleteMessageBatch, Call::Delete(batch.len())) {
            return Err(TransportError::new(
                Operation::DeleteMessageBatch,
                queue_url,
                "simulated outage",
            ));
        }

        let mut outcome = BatchOutcome::default();
        for entry in batch.entries() {
            let reject = state.reject_delete.contains(&entry.message.body);
            let queue = state.queues.entry(queue_url.to_string()).or_default();
            let position = queue.iter().position(|m| {
                m.receipt_handle.as_deref() == Some(entry.message.receipt_handle.as_str())
            });
            match position {
                Some(index) if !reject => {
                    queue.remove(index);
                    outcome.successful.push(entry.id.as_ref().to_string());
                }
                _ => outcome.failed.push(rejected(entry.id.as_ref())),
            }
        }

        Ok(outcome)
    }
}

thread_local! {
    static RECORDS: RefCell<Vec<(log::Level, String)>> = const { RefCell::new(Vec::new()) };
}

struct ThreadLogger;

impl log::Log for ThreadLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let line = record.args().to_string();
        RECORDS.with(|r| r.borrow_mut().push((record.level(), line)));
    }

    fn flush(&self) {}
}

static LOGGER: ThreadLogger = ThreadLogger;
static INIT_LOGGER: Once = Once::new();

/// Starts capturing this thread's log records, dropping any earlier ones.
pub fn capture_logs() {
    INIT_LOGGER.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Trace);
        }
    });
    RECORDS.with(|r| r.borrow_mut().clear());
}

/// The messages this thread logged at `level` since [`capture_logs`].
pub fn logged(level: log::Level) -> Vec<String> {
    RECORDS.with(|r| {
        r.borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, line)| line.clone())
            .collect()
    })
}
