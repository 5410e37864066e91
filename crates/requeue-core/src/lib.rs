//! # requeue-core
//!
//! Moves messages out of an AWS SQS dead letter queue and back into a
//! destination queue.
//!
//! A pass receives a batch from the dead letter queue, sends it to the
//! destination as one batched request, deletes exactly the messages the
//! destination accepted, and repeats until a receive comes back empty.
//! Delivery is at-least-once: a message can be duplicated or reordered but is
//! never deleted before the destination has it.
//!
//! ## Example
//!
//! ```no_run
//! use requeue::{handle_request, RequeueConfig, RequeueEvent, SqsQueue};
//!
//! # async fn example() {
//! let config = RequeueConfig::new(
//!     "https://sqs.us-east-1.amazonaws.com/123456789/orders-dlq",
//!     "https://sqs.us-east-1.amazonaws.com/123456789/orders",
//!     "us-east-1",
//! );
//! let queue = SqsQueue::from_config(config.load_sdk_config().await);
//!
//! match handle_request(&queue, &config, RequeueEvent::default(), None).await {
//!     Ok(summary) => println!("{summary}"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! # }
//! ```

mod config;
mod error;
mod handler;
mod message;
mod requeue;
mod sqs;

#[cfg(test)]
mod test_utils;

pub use config::*;
pub use error::*;
pub use handler::*;
pub use message::*;
pub use requeue::*;
pub use sqs::*;
