//! Adapter between the function runtime and [`requeue::handle_request`].

use std::time::{Duration, UNIX_EPOCH};

use aws_config::SdkConfig;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use requeue::{RequeueConfig, RequeueEvent, SqsQueue};

/// Serves requeue events until the runtime shuts the process down.
///
/// The SDK configuration is loaded once per process; each invocation gets its
/// own client, reused for every request of that pass.
pub async fn serve(config: RequeueConfig, sdk_config: SdkConfig) -> anyhow::Result<()> {
    let config = &config;
    let sdk_config = &sdk_config;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<RequeueEvent>| async move {
        handle(config, sdk_config, event).await
    }))
    .await
    .map_err(|e| anyhow::anyhow!(e))
}

async fn handle(
    config: &RequeueConfig,
    sdk_config: &SdkConfig,
    event: LambdaEvent<RequeueEvent>,
) -> Result<String, Error> {
    let LambdaEvent { payload, context } = event;
    // handle_request stops `config.deadline_margin` short of this.
    let deadline = UNIX_EPOCH + Duration::from_millis(context.deadline);
    log::debug!("Invocation {} must finish by {:?}", context.request_id, deadline);

    let queue = SqsQueue::from_config(sdk_config.clone());
    let summary = requeue::handle_request(&queue, config, payload, Some(deadline)).await?;

    Ok(summary)
}

