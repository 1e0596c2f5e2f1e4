//! Coordinator events
//!
//! Inbound events are the serialized queue the coordinator consumes; one
//! event is handled at a time, so every transition is atomic. Notices are
//! the non-blocking status surface for observers.

use super::state::{AutomationState, StatePatch};
use crate::channel::{ContextRef, DeliveryOutcome, Target};
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Inbound events, drained in arrival order by the coordinator task.
pub(crate) enum Event {
    /// A source adapter extracted a candidate.
    CodeFound {
        code: String,
        source_timestamp: Option<DateTime<Utc>>,
        reply: oneshot::Sender<bool>,
    },
    /// The consumer needs a code filled.
    NeedCode {
        manual: bool,
        consumer: Option<ContextRef>,
    },
    /// The consumer reports a delivered code was rejected.
    CodeRejected { failed_code: String },
    /// The consumer reports the login completed.
    LoginSucceeded {
        code: String,
        timestamp: DateTime<Utc>,
    },
    GetState {
        reply: oneshot::Sender<AutomationState>,
    },
    SetState {
        patch: StatePatch,
        reply: oneshot::Sender<AutomationState>,
    },
    ForceCleanup {
        reason: String,
        reply: oneshot::Sender<bool>,
    },
    /// Explicit reset: wipe the record and the used-code set.
    ClearState { reply: oneshot::Sender<bool> },
    /// A spawned delivery task finished.
    DeliveryFinished {
        episode: Uuid,
        outcome: DeliveryOutcome,
    },
    /// A spawned task resolved a peer context.
    ContextResolved { target: Target, ctx: ContextRef },
    /// The post-success grace period ended.
    GraceElapsed { generation: u64 },
    Shutdown,
}

/// Reason a candidate never became the current record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The code was delivered before and rejected.
    AlreadyUsed,
    /// Identical (code, timestamp) observation already seen this episode.
    Duplicate,
    /// The candidate matches the code that just failed.
    SameAsFailed,
    /// An equal-or-newer record is already current.
    Stale,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DropReason::AlreadyUsed => "already used",
            DropReason::Duplicate => "duplicate observation",
            DropReason::SameAsFailed => "same as failed code",
            DropReason::Stale => "stale",
        };
        write!(f, "{}", s)
    }
}

/// Status notices broadcast to observers. Non-blocking: lagging receivers
/// miss old notices rather than stalling the coordinator.
#[derive(Debug, Clone)]
pub enum Notice {
    CodeAccepted {
        code: String,
        source_timestamp: Option<DateTime<Utc>>,
    },
    CandidateDropped {
        code: String,
        reason: DropReason,
    },
    FillDispatched {
        code: String,
        is_retry: bool,
    },
    DeliveryExhausted {
        attempts: u32,
    },
    CodeRejected {
        code: String,
    },
    LoginSucceeded,
    StateExpired,
    StateReset,
}
