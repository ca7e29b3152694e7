//! Bounded retry with exponential backoff.
//!
//! The loop itself is `backon`'s; [`RetryPolicy`] supplies the numbers.
//! Backoff sleeps go through `tokio::time`, so dropping the future (on
//! cancellation) abandons both the in-flight call and any pending sleep.

use backon::{ExponentialBuilder, Retryable};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use quarry_core::{AcquisitionRequest, Outcome, RetryPolicy};

use super::BudgetTracker;
use crate::providers::Provider;

/// A value together with how many invocations produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub tries: u32,
}

fn backoff(policy: &RetryPolicy) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(policy.initial_delay)
        .with_max_delay(policy.max_delay)
        .with_factor(policy.backoff_multiplier.max(1.0) as f32)
        .with_max_times(policy.retries() as usize)
}

/// Run `op` until it succeeds, `retryable` rejects the error, or the
/// policy's attempts are spent. `retryable` is only consulted while another
/// attempt remains, so it may charge for that attempt.
pub async fn with_retry<T, E, Fut, Op, R>(policy: &RetryPolicy, mut retryable: R, mut op: Op) -> Retried<Result<T, E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(&E) -> bool,
    E: fmt::Display,
{
    let tries = AtomicU32::new(0);
    let value = (|| {
        tries.fetch_add(1, Ordering::SeqCst);
        op()
    })
    .retry(backoff(policy))
    .sleep(tokio::time::sleep)
    .when(|e| tries.load(Ordering::SeqCst) <= policy.retries() && retryable(e))
    .notify(|e, delay| {
        tracing::warn!(
            attempt = tries.load(Ordering::SeqCst),
            delay = ?delay,
            error = %e,
            "retrying after transient failure"
        );
    })
    .await;

    Retried {
        value,
        tries: tries.load(Ordering::SeqCst),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("provider panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("provider panicked: {}", message)
    } else {
        "provider panicked".to_string()
    }
}

/// One provider, retried under `policy`, each invocation bounded by
/// `attempt_timeout`.
///
/// The first invocation must already be charged to the provider's budget
/// (the orchestrator does this when it admits the provider). Each retry is
/// charged here, and only [`Outcome::is_retryable`] failures are retried
/// while the budget still grants one. A panicking provider becomes an
/// [`Outcome::UnknownError`] like any other unexpected failure.
pub async fn attempt_with_retry<P>(
    provider: &P,
    request: &AcquisitionRequest,
    policy: &RetryPolicy,
    attempt_timeout: Duration,
    budgets: &BudgetTracker,
) -> Retried<Outcome<P::Item>>
where
    P: Provider + ?Sized,
{
    let id = &provider.descriptor().id;
    let retried = with_retry(
        policy,
        |outcome: &Outcome<P::Item>| outcome.is_retryable() && budgets.try_acquire(id),
        || async move {
            let call = AssertUnwindSafe(provider.attempt(request)).catch_unwind();
            match tokio::time::timeout(attempt_timeout, call).await {
                Ok(Ok(outcome)) => outcome.into_result(),
                Ok(Err(payload)) => Err(Outcome::UnknownError(panic_message(payload))),
                Err(_) => {
                    tracing::debug!(provider = %id, timeout = ?attempt_timeout, "attempt timed out");
                    Err(Outcome::Timeout)
                }
            }
        },
    )
    .await;

    Retried {
        value: match retried.value {
            Ok(outcome) | Err(outcome) => outcome,
        },
        tries: retried.tries,
    }
}
