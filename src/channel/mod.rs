//! Delivery channel abstraction
//!
//! An unreliable request/response transport between the coordinator and its
//! two peer contexts (source and consumer). Implementations may open a fresh
//! context when the target does not exist and settle before the first send;
//! that is a channel-level concern, and the coordinator only ever sees a
//! delivered acknowledgment or a channel error.

mod messages;
mod retry;

pub use messages::{Ack, OutboundMessage};
pub use retry::{deliver_with_retry, DeliveryOutcome, RetryPolicy};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by channel implementations.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("context unreachable: {0}")]
    Unreachable(ContextRef),

    #[error("context closed: {0}")]
    Closed(ContextRef),

    #[error("no context available for {0:?}")]
    NoContext(Target),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Opaque reference to a peer context (a tab, a window, a session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextRef(String);

impl ContextRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two kinds of peer the coordinator talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// Where codes come from (an inbox, a message feed).
    Source,
    /// Where codes go (the login surface).
    Consumer,
}

/// Asynchronous message transport to peer contexts.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Send one message to a context. Transient failures surface as `Err`;
    /// the retry driver decides whether to try again.
    async fn send(&self, ctx: &ContextRef, message: OutboundMessage) -> ChannelResult<Ack>;

    /// Resolve a live context for the given target, opening one if needed.
    async fn ensure_context(&self, target: Target) -> ChannelResult<ContextRef>;
}
