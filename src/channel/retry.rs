//! Bounded-retry delivery driver
//!
//! Linear backoff: sleep attempt × base before each try (1s, 2s, 3s at the
//! default base). Exhaustion is a recoverable outcome, not an error: the
//! underlying code may still be valid once the peer context recovers.

use super::{Ack, ChannelError, ContextRef, DeliveryChannel, OutboundMessage, Target};
use crate::adapter::CancellationToken;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry parameters for one delivery.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Terminal result of a retried delivery.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// A peer acknowledged the message.
    Delivered(Ack),
    /// Every attempt failed. Exactly one of these per delivery.
    Exhausted {
        attempts: u32,
        last_error: ChannelError,
    },
    /// The episode was cancelled before an attempt could run.
    Cancelled,
}

/// Drive one message to a target with bounded retry.
///
/// When `ctx` is `None` the channel is asked to resolve (or open) a context
/// for `target` on each attempt; a resolution failure counts as a failed
/// attempt. The cancellation token is checked before every attempt.
pub async fn deliver_with_retry(
    channel: &dyn DeliveryChannel,
    target: Target,
    ctx: Option<&ContextRef>,
    message: OutboundMessage,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> DeliveryOutcome {
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return DeliveryOutcome::Cancelled;
        }
        tokio::time::sleep(policy.base_delay * attempt).await;
        if cancel.is_cancelled() {
            return DeliveryOutcome::Cancelled;
        }

        let resolved = match ctx {
            Some(c) => Ok(c.clone()),
            None => channel.ensure_context(target).await,
        };

        let result = match resolved {
            Ok(c) => channel.send(&c, message.clone().with_attempt(attempt)).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(ack) => {
                debug!(attempt, "message delivered");
                return DeliveryOutcome::Delivered(ack);
            }
            Err(e) => {
                warn!(attempt, max = policy.max_attempts, error = %e, "delivery attempt failed");
                last_error = Some(e);
            }
        }
    }

    DeliveryOutcome::Exhausted {
        attempts: policy.max_attempts,
        last_error: last_error
            .unwrap_or_else(|| ChannelError::Transport("no attempts executed".to_string())),
    }
}
