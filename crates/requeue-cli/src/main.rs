#![recursion_limit = "256"]

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use requeue::{
    RequeueConfig, RequeueEvent, SqsQueue, DEFAULT_DEADLINE_MARGIN, DEFAULT_MAX_ATTEMPTS,
};

mod lambda;

#[tokio::main]
pub async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = Cli::parse().run().await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

#[derive(Debug, Parser)]
#[command(name = "requeue")]
#[command(about = "move messages from an aws dead letter queue back to their queue", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    queues: QueueArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Queue settings, resolved once at startup.
///
/// Every flag falls back to an environment variable so the same binary can
/// run inside a function runtime without arguments.
#[derive(Debug, Args)]
struct QueueArgs {
    /// URL of the dead letter queue to drain
    #[arg(long, env = "source_queue", default_value = "", hide_default_value = true)]
    source_queue: String,

    /// URL of the queue to move messages to
    #[arg(long, env = "destination_queue", default_value = "", hide_default_value = true)]
    destination_queue: String,

    /// AWS region of both queues
    #[arg(long, env = "region", default_value = "", hide_default_value = true)]
    region: String,

    /// Override the SQS endpoint
    #[arg(long, env = "endpoint_url")]
    endpoint: Option<String>,

    /// Use LocalStack test credentials
    #[arg(long)]
    local: bool,

    /// Messages per batch (1-10)
    #[arg(long, default_value_t = requeue::MAX_BATCH_SIZE)]
    batch_size: i32,

    /// Long-poll wait per receive, in seconds (0-20)
    #[arg(long, default_value_t = requeue::MAX_WAIT_TIME_SECONDS)]
    wait_time_seconds: i32,

    /// Visibility timeout requested on receive, in seconds
    #[arg(long)]
    visibility_timeout: Option<i32>,

    /// Attempts per request, including retries
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Milliseconds kept back from the invocation deadline
    #[arg(long, env = "deadline_margin_ms", default_value_t = DEFAULT_DEADLINE_MARGIN.as_millis() as u64)]
    deadline_margin_ms: u64,
}

impl From<QueueArgs> for RequeueConfig {
    fn from(args: QueueArgs) -> Self {
        let mut config = RequeueConfig::new(args.source_queue, args.destination_queue, args.region);
        config.endpoint_url = args.endpoint;
        config.local = args.local;
        config.batch_size = args.batch_size;
        config.wait_time_seconds = args.wait_time_seconds;
        config.visibility_timeout = args.visibility_timeout;
        config.max_attempts = args.max_attempts;
        config.deadline_margin = Duration::from_millis(args.deadline_margin_ms);
        config
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a single requeue pass now
    Run {
        /// Name recorded for this invocation
        #[arg(long, default_value = "manual")]
        name: String,
    },
    /// Serve requeue events from the function runtime
    Lambda,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = RequeueConfig::from(self.queues);
        let sdk_config = config.load_sdk_config().await;

        match self.command {
            Commands::Run { name } => {
                let queue = SqsQueue::from_config(sdk_config);
                let summary =
                    requeue::handle_request(&queue, &config, RequeueEvent { name }, None).await?;
                println!("{}", summary);
            }
            Commands::Lambda => lambda::serve(config, sdk_config).await?,
        };

        Ok(())
    }
}
