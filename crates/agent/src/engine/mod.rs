use crate::pipeline::{EmailPipeline, EmailProcessingPayload, ProcessingResult};
use helpdesk_core::error::{HelpdeskError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{error, info, warn};

/// Exponential backoff: `base * factor^(attempt-1)`, capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub factor: u32,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(1000),
            factor: 2,
            cap: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = self.factor.max(1).saturating_pow(exponent);
        self.base.saturating_mul(multiplier).min(self.cap)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy is exhausted. Each attempt is bounded by `max_duration`; hitting it
/// ends the run without further attempts.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, max_duration: Duration, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = match timeout(max_duration, op(attempt)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(HelpdeskError::Internal(format!(
                    "task exceeded its maximum duration of {}s",
                    max_duration.as_secs()
                )))
            }
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                error!(attempts = attempt, "Giving up: {}", e);
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "Attempt failed, retrying: {}", e);
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Dispatches processing runs onto the tokio runtime with retries.
#[derive(Clone)]
pub struct TaskRunner {
    pipeline: Arc<EmailPipeline>,
    policy: RetryPolicy,
    max_duration: Duration,
}

impl TaskRunner {
    pub fn new(pipeline: Arc<EmailPipeline>, policy: RetryPolicy, max_duration: Duration) -> Self {
        Self {
            pipeline,
            policy,
            max_duration,
        }
    }

    pub async fn run(&self, payload: EmailProcessingPayload) -> Result<ProcessingResult> {
        let pipeline = &self.pipeline;
        let payload = &payload;
        run_with_retry(&self.policy, self.max_duration, |attempt| async move {
            if attempt > 1 {
                info!(attempt, "Retrying inbound email");
            }
            pipeline.process(payload).await
        })
        .await
    }

    /// Fire-and-forget; the handle resolves to the final outcome.
    pub fn dispatch(&self, payload: EmailProcessingPayload) -> JoinHandle<Result<ProcessingResult>> {
        let runner = self.clone();
        tokio::spawn(async move {
            let subject = payload.subject.clone();
            let outcome = runner.run(payload).await;
            if let Err(e) = &outcome {
                error!(subject = %subject, "Inbound email task failed permanently: {}", e);
            }
            outcome
        })
    }
}
