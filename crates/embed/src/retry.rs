//! Retry logic with exponential backoff for transient backend failures.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (on top of the initial try).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between retries (exponentially increased).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Whether to add random jitter to delays.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: true,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter() -> bool {
    true
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Result of a retry operation.
#[derive(Debug, Clone)]
pub struct RetryResult<T> {
    /// The final result (Ok if succeeded, Err if all retries failed).
    pub result: Result<T, String>,
    /// Number of attempts made (1 = no retries needed).
    pub attempts: u32,
    /// Whether the operation ultimately succeeded.
    pub succeeded: bool,
    /// True when the loop was aborted by a non-retryable failure.
    pub fatal: bool,
}

impl<T> RetryResult<T> {
    pub fn into_result(self) -> Result<T, String> {
        self.result
    }
}

/// Execute an async operation with bounded retries and exponential backoff.
///
/// The operation receives the zero-based attempt number. Returning an `Err`
/// whose `retryable` flag is false aborts the loop immediately.
pub async fn execute_with_retry<T, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RetryStep>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        match operation(attempt).await {
            Ok(value) => {
                return RetryResult {
                    result: Ok(value),
                    attempts: attempt + 1,
                    succeeded: true,
                    fatal: false,
                };
            }
            Err(step) => {
                let fatal = !step.retryable;
                last_error = Some(step.message);
                if fatal {
                    return RetryResult {
                        result: Err(last_error.unwrap_or_default()),
                        attempts: attempt + 1,
                        succeeded: false,
                        fatal: true,
                    };
                }
                if attempt < config.max_retries {
                    tokio::time::sleep(calculate_delay(config, attempt)).await;
                }
            }
        }
    }

    RetryResult {
        result: Err(last_error.unwrap_or_else(|| "all retries failed".to_string())),
        attempts: config.max_retries + 1,
        succeeded: false,
        fatal: false,
    }
}

/// One failed attempt: the message plus whether trying again could help.
#[derive(Debug, Clone)]
pub struct RetryStep {
    pub message: String,
    pub retryable: bool,
}

impl RetryStep {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Calculate delay for a retry attempt with exponential backoff.
fn calculate_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponential = config.base_delay_ms.saturating_mul(1u64 << attempt.min(16));
    let delay = exponential.min(config.max_delay_ms);

    if config.jitter {
        // Add 0-50% random jitter.
        let jitter = fastrand::u64(0..=delay / 2);
        Duration::from_millis(delay + jitter)
    } else {
        Duration::from_millis(delay)
    }
}

/// Classify an HTTP status as retryable (transient) or not.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}
