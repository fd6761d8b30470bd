//! Retry policy and the retry combinator.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Flow;
use crate::domain::{Callback, CompletionResult, FlowError, call_guarded};
use crate::ports::{Scheduler, Work};

/// Retry policy for failing tasks.
///
/// - `tries`: total number of attempts, including the first one (>= 1).
/// - `delay`: optional pause before each re-attempt (a positive whole number
///   of milliseconds when present).
///
/// Validated at construction; an existing policy is always usable.
/// Serialized as `{"tries": 3, "delay_ms": 250}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRetryPolicy", into = "RawRetryPolicy")]
pub struct RetryPolicy {
    tries: u32,
    delay: Option<Duration>,
}

impl RetryPolicy {
    /// Policy with `tries` immediate attempts.
    pub fn new(tries: u32) -> Result<Self, FlowError> {
        if tries < 1 {
            return Err(FlowError::invalid(format!("tries must be at least 1, got {tries}")));
        }
        Ok(Self { tries, delay: None })
    }

    /// Same policy, re-attempts scheduled `delay` after each failure.
    ///
    /// The delay is serialized in milliseconds, so sub-millisecond precision
    /// is rejected rather than silently truncated.
    pub fn with_delay(self, delay: Duration) -> Result<Self, FlowError> {
        if delay.is_zero() {
            return Err(FlowError::invalid("retry delay must be greater than zero"));
        }
        if delay.subsec_nanos() % 1_000_000 != 0 || u64::try_from(delay.as_millis()).is_err() {
            return Err(FlowError::invalid(format!(
                "retry delay must be a whole number of milliseconds, got {delay:?}"
            )));
        }
        Ok(Self {
            delay: Some(delay),
            ..self
        })
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawRetryPolicy {
    tries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delay_ms: Option<u64>,
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = FlowError;

    fn try_from(raw: RawRetryPolicy) -> Result<Self, Self::Error> {
        let policy = RetryPolicy::new(raw.tries)?;
        match raw.delay_ms {
            Some(ms) => policy.with_delay(Duration::from_millis(ms)),
            None => Ok(policy),
        }
    }
}

impl From<RetryPolicy> for RawRetryPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            tries: policy.tries,
            delay_ms: policy
                .delay
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

struct RetryRun<F> {
    scheduler: Arc<dyn Scheduler>,
    policy: RetryPolicy,
    task: F,
}

impl<F> RetryRun<F> {
    fn attempt<T>(self: Arc<Self>, attempt: u32, done: Callback<T>)
    where
        T: Send + 'static,
        F: Fn(Callback<T>) + Send + Sync + 'static,
    {
        let this = Arc::clone(&self);
        call_guarded(
            |cb| (self.task)(cb),
            Box::new(move |result: CompletionResult<T>| match result {
                CompletionResult::Success(value) => done(CompletionResult::Success(value)),
                CompletionResult::Failure(cause) if attempt >= this.policy.tries() => {
                    debug!(attempt, error = %cause, "retry exhausted");
                    done(CompletionResult::Failure(cause));
                }
                CompletionResult::Failure(cause) => {
                    debug!(attempt, tries = this.policy.tries(), error = %cause, "attempt failed; retrying");
                    let next = Arc::clone(&this);
                    let work: Work = Box::new(move || next.attempt(attempt + 1, done));
                    match this.policy.delay() {
                        Some(delay) => {
                            this.scheduler.run_after_delay(delay, work);
                        }
                        None => this.scheduler.run_soon(work),
                    }
                }
            }),
        );
    }
}

impl Flow {
    /// Run `task` up to `policy.tries()` times.
    ///
    /// The first success wins. When every attempt fails, the last attempt's
    /// failure is forwarded.
    pub fn retry<T, F>(&self, policy: RetryPolicy, task: F, done: Callback<T>)
    where
        T: Send + 'static,
        F: Fn(Callback<T>) + Send + Sync + 'static,
    {
        let run = Arc::new(RetryRun {
            scheduler: Arc::clone(&self.scheduler),
            policy,
            task,
        });
        run.attempt(1, done);
    }
}
