//! Invocation executor: worker budget and token retries
//!
//! Every user computation the scheduler dispatches goes through
//! [`TaskExecutor::execute`]. The executor holds the engine-wide
//! [`Semaphore`] that caps concurrent invocations, and applies the engine's
//! [`RetryPolicy`] to failed ones. A permit is held only while the
//! computation runs, never across a backoff sleep.

use crate::context::RunContext;
use crate::error::{GraphError, Result};
use crate::retry::RetryPolicy;
use crate::state::ErasedState;
use crate::token::{ErasedValue, ProcessToken};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Executor for state invocations with a global worker budget
#[derive(Debug)]
pub(crate) struct TaskExecutor {
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
}

impl TaskExecutor {
    pub(crate) fn new(max_concurrency: usize, retry: RetryPolicy) -> Self {
        Self {
            retry,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    /// Free worker slots right now
    pub(crate) fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run one invocation of `state` over `tokens`
    ///
    /// Retries in place while the policy is enabled and every token still
    /// has budget left. Errors are reported as [`GraphError::NodeExecution`]
    /// naming the state.
    pub(crate) async fn execute(
        &self,
        state: &dyn ErasedState,
        tokens: &mut [ProcessToken],
        ctx: &RunContext,
    ) -> Result<ErasedValue> {
        let mut attempt = 0usize;

        loop {
            tracing::debug!(
                state = state.name(),
                tokens = tokens.len(),
                attempt = attempt + 1,
                "Invoking state"
            );

            let outcome = {
                let _permit = self
                    .semaphore
                    .acquire()
                    .await
                    .map_err(|_| GraphError::Execution("worker pool closed".to_string()))?;
                state.invoke(tokens, ctx).await
            };

            let error = match outcome {
                Ok(output) => {
                    if attempt > 0 {
                        tracing::info!(
                            state = state.name(),
                            attempts = attempt + 1,
                            "State succeeded after retry"
                        );
                    }
                    return Ok(output);
                }
                Err(error) => error,
            };

            if matches!(error, GraphError::EmptyDispatch(_)) {
                return Err(error);
            }

            if self.retry.enabled && tokens.iter().all(ProcessToken::can_retry) {
                let delay = self.retry.calculate_delay(attempt);
                tracing::warn!(
                    state = state.name(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "State failed, retrying after delay"
                );
                tokens.iter_mut().for_each(ProcessToken::record_retry);
                attempt += 1;
                tokio::time::sleep(delay).await;
                continue;
            }

            tracing::error!(
                state = state.name(),
                attempts = attempt + 1,
                error = %error,
                "State failed"
            );
            return Err(match error {
                GraphError::NodeExecution { .. } => error,
                other => GraphError::node_execution(state.name(), other.to_string()),
            });
        }
    }
}
