//! Bounded retry wrapper for destinations.
//!
//! Applied at chain construction for any destination registered with a
//! retry policy: the wrapper decorates the destination handler once, not per
//! call, and the wrapped handler lives in the prepared destination list.

use crate::context::MessageContext;
use crate::error::{HandlerError, HandlerResult};
use crate::handler::{run_trapped, DestinationHandler};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;

/// Retry policy for a single destination
///
/// Total attempts = `1 + max_retries`, sleeping `retry_interval` between
/// attempts but not after the last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Additional attempts after the initial one
    pub max_retries: u32,

    /// Fixed delay between attempts
    pub retry_interval: Duration,
}

impl RetryConfig {
    /// Create a new retry policy
    pub fn new(max_retries: u32, retry_interval: Duration) -> Self {
        Self {
            max_retries,
            retry_interval,
        }
    }

    /// Total delivery attempts including the initial one
    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_interval: Duration::from_secs(1),
        }
    }
}

/// Destination decorator that absorbs transient failures up to its budget
pub(crate) struct RetryingDestination {
    destination_id: String,
    inner: Arc<dyn DestinationHandler>,
    config: RetryConfig,
}

impl RetryingDestination {
    pub(crate) fn new(
        destination_id: String,
        inner: Arc<dyn DestinationHandler>,
        config: RetryConfig,
    ) -> Self {
        Self {
            destination_id,
            inner,
            config,
        }
    }
}

#[async_trait]
impl DestinationHandler for RetryingDestination {
    async fn deliver(&self, ctx: &mut MessageContext) -> HandlerResult<Value> {
        let total = self.config.total_attempts();
        let mut last_error = None;

        for attempt in 1..=total {
            // Trap per attempt so a panicking handler still consumes its
            // retry budget instead of aborting the task.
            match run_trapped(self.inner.deliver(ctx)).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    warn!(
                        destination = %self.destination_id,
                        attempt,
                        total_attempts = total,
                        error = %error,
                        "Destination attempt failed"
                    );
                    last_error = Some(error);
                    if attempt < total {
                        tokio::time::sleep(self.config.retry_interval).await;
                    }
                }
            }
        }

        let last = last_error.unwrap_or_else(|| HandlerError::new("no attempts were made"));
        Err(HandlerError::new("Failed to execute destination after retries").with_cause(last))
    }
}
