//! The invocation boundary: one triggering event in, one summary or error out.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::Once;
use std::time::{Duration, Instant, SystemTime};

use futures::FutureExt;

use crate::config::RequeueConfig;
use crate::error::RequeueError;
use crate::requeue::{requeue_messages, RequeueReport};
use crate::sqs::QueueService;

/// The payload a scheduler or operator sends to start a requeue pass.
///
/// Only the name is read, and only for the summary.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct RequeueEvent {
    #[serde(default)]
    pub name: String,
}

/// Runs one requeue pass and reports how it went.
///
/// Everything below this call sits behind a single error boundary: a
/// transport failure comes back as its error, an unfinished pass is cut short
/// `config.deadline_margin` before the `deadline` (if any), and a panic is
/// logged with the backtrace of the panicking frame and returned as
/// [`RequeueError::Panicked`] instead of unwinding into the host runtime.
pub async fn handle_request<Q: QueueService>(
    queue: &Q,
    config: &RequeueConfig,
    event: RequeueEvent,
    deadline: Option<SystemTime>,
) -> Result<String, RequeueError> {
    let start = Instant::now();
    log::info!("Received requeue event '{}'", event.name);
    install_panic_hook();
    PANIC_TRACE.with(|t| t.borrow_mut().take());

    let pass = async {
        match remaining(deadline, config.deadline_margin) {
            Some(budget) => {
                match tokio::time::timeout(budget, requeue_messages(queue, config)).await {
                    Ok(result) => result,
                    Err(_) => {
                        let elapsed = start.elapsed();
                        log::error!(
                            "Requeue event '{}' abandoned after {:?}: the invocation deadline is near",
                            event.name,
                            elapsed
                        );
                        Err(RequeueError::DeadlineExceeded { elapsed })
                    }
                }
            }
            None => requeue_messages(queue, config).await,
        }
    };

    match AssertUnwindSafe(pass).catch_unwind().await {
        Ok(result) => result.map(|report| summary(&event, start.elapsed(), &report)),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let trace = PANIC_TRACE
                .with(|t| t.borrow_mut().take())
                .unwrap_or_else(Backtrace::force_capture);
            log::error!(
                "Error in requeue event '{}': {}\nStack trace: {}",
                event.name,
                message,
                trace
            );
            Err(RequeueError::Panicked(message))
        }
    }
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Records the backtrace at the point of a panic, before the stack unwinds.
///
/// The previous hook still runs afterwards.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            PANIC_TRACE.with(|t| *t.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

fn remaining(deadline: Option<SystemTime>, margin: Duration) -> Option<Duration> {
    deadline.map(|d| {
        d.duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
            .saturating_sub(margin)
    })
}

fn summary(event: &RequeueEvent, elapsed: Duration, report: &RequeueReport) -> String {
    format!(
        "Executed requeue event '{}' in {:?}: moved {} message(s) in {} batch(es)",
        event.name, elapsed, report.forwarded, report.batches
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
