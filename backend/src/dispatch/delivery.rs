// =============================================================================
// Throttle-aware delivery with a bounded retry loop
// =============================================================================
//
// A `Throttled { retry_after }` reply sleeps exactly `retry_after` and tries
// again, up to `max_attempts` total. A wait longer than `max_wait` is not
// honoured: the delivery is abandoned instead. Permanent failures return at
// once.
// =============================================================================

use std::time::Duration;

use tracing::{debug, warn};

use crate::interfaces::{DeliveryError, Notifier};
use crate::runtime_config::RelayConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub max_wait: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            max_attempts: config.delivery_max_attempts,
            max_wait: Duration::from_secs(config.max_retry_wait_secs),
        }
    }
}

/// Deliver one message. Returns the number of attempts used on success.
pub async fn deliver_with_retry(
    notifier: &dyn Notifier,
    subscriber_id: i64,
    message: &str,
    policy: RetryPolicy,
) -> Result<u32, DeliveryError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match notifier.deliver(subscriber_id, message).await {
            Ok(()) => {
                debug!(subscriber_id, attempt, "message delivered");
                return Ok(attempt);
            }
            Err(DeliveryError::Throttled { retry_after }) if attempt < max_attempts && retry_after <= policy.max_wait => {
                warn!(
                    subscriber_id,
                    attempt,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "delivery throttled, waiting before retry"
                );
                tokio::time::sleep(retry_after).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
