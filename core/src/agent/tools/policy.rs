//! Timeout and bounded retry for collaborator calls

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::warn;

use super::ToolError;
use crate::clinic::ClinicError;

/// Per-call policy applied to every clinic data request
#[derive(Debug, Clone, PartialEq)]
pub struct CallPolicy {
    pub timeout: Duration,
    /// Extra attempts after the first one, transient failures only
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl CallPolicy {
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Exponential backoff, capped at `max_delay`
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `call` under the timeout, retrying transient failures.
    ///
    /// Backend errors are returned at once. Exhausted retries report the
    /// last failure: [`ToolError::Timeout`] or [`ToolError::Upstream`].
    pub async fn call<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ToolError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClinicError>>,
    {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let error = match timeout(self.timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if !e.is_transient() => {
                    warn!("{} failed: {}", operation, e);
                    return Err(ToolError::Upstream {
                        operation: operation.to_string(),
                        message: e.to_string(),
                    });
                }
                Ok(Err(e)) => ToolError::Upstream {
                    operation: operation.to_string(),
                    message: e.to_string(),
                },
                Err(_) => ToolError::Timeout {
                    operation: operation.to_string(),
                    after_ms: self.timeout.as_millis() as u64,
                },
            };

            warn!(
                "{} attempt {}/{} failed: {}",
                operation,
                attempt + 1,
                self.max_retries + 1,
                error
            );
            last_error = Some(error);
            if attempt < self.max_retries {
                sleep(self.delay_for_attempt(attempt + 1)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| ToolError::Upstream {
            operation: operation.to_string(),
            message: "no attempt was made".to_string(),
        }))
    }
}
