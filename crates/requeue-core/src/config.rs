//! Process-wide configuration, resolved once before the first invocation.

use std::time::Duration;

use aws_config::{retry::RetryConfig, BehaviorVersion, Region, SdkConfig};
use aws_sdk_sqs::config::Credentials;

/// Largest batch `ReceiveMessage`, `SendMessageBatch` and `DeleteMessageBatch` accept.
pub const MAX_BATCH_SIZE: i32 = 10;
/// Longest long-poll `ReceiveMessage` allows.
pub const MAX_WAIT_TIME_SECONDS: i32 = 20;
/// One attempt plus five retries.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;
/// Time kept back from an invocation deadline so the failure can still be reported.
pub const DEFAULT_DEADLINE_MARGIN: Duration = Duration::from_secs(1);

/// Queue references and client settings for a requeue pass.
///
/// Values are not validated here. An empty queue reference or region is
/// reported by the queue service on the first request, as a transport error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequeueConfig {
    /// URL of the dead letter queue to drain
    pub source_queue: String,
    /// URL of the queue messages are moved to
    pub destination_queue: String,
    /// AWS region both queues live in
    pub region: String,
    /// Overrides the service endpoint, e.g. for LocalStack
    pub endpoint_url: Option<String>,
    /// Use static test credentials instead of the default provider chain
    pub local: bool,
    pub batch_size: i32,
    pub wait_time_seconds: i32,
    /// Visibility timeout requested on receive; `None` keeps the queue's default
    pub visibility_timeout: Option<i32>,
    /// Total attempts per request made by the SDK's standard retry strategy
    pub max_attempts: u32,
    /// How long before the invocation deadline an unfinished pass is abandoned
    pub deadline_margin: Duration,
}

impl RequeueConfig {
    pub fn new(
        source_queue: impl Into<String>,
        destination_queue: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            source_queue: source_queue.into(),
            destination_queue: destination_queue.into(),
            region: region.into(),
            endpoint_url: None,
            local: false,
            batch_size: MAX_BATCH_SIZE,
            wait_time_seconds: MAX_WAIT_TIME_SECONDS,
            visibility_timeout: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            deadline_margin: DEFAULT_DEADLINE_MARGIN,
        }
    }

    /// Batch size clamped to what the service accepts.
    pub fn batch_size(&self) -> i32 {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    /// Long-poll wait clamped to what the service accepts.
    pub fn wait_time_seconds(&self) -> i32 {
        self.wait_time_seconds.clamp(0, MAX_WAIT_TIME_SECONDS)
    }

    /// Builds the loader for the AWS SDK configuration.
    ///
    /// Retries with backoff are configured here, once, and applied by the
    /// client transparently to every request of the pass.
    pub fn loader(&self) -> aws_config::ConfigLoader {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .retry_config(RetryConfig::standard().with_max_attempts(self.max_attempts.max(1)));

        if let Some(endpoint_url) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }

        if self.local {
            loader = loader.credentials_provider(Credentials::new(
                "test", "test", None, None, "static",
            ));
        }

        loader
    }

    pub async fn load_sdk_config(&self) -> SdkConfig {
        self.loader().load().await
    }
}
