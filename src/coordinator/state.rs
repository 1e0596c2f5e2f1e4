//! Authoritative OTP and automation state

use crate::adapter::CancellationToken;
use crate::channel::ContextRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// The coordinator's position in the handoff lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing in flight.
    Idle,
    /// Consumer asked for a code; none on hand yet.
    AwaitingCode,
    /// A code is being pushed to the consumer.
    Delivering,
    /// The consumer has the code; waiting to hear how the login went.
    AwaitingResult,
    /// A delivered code was rejected; only a different code will do.
    WaitingForFreshCode,
}

/// The authoritative current passcode.
///
/// At most one record is current at any time. A candidate with a strictly
/// greater source timestamp (or any timestamp, when this record has none)
/// supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRecord {
    /// Normalized digit string.
    pub code: String,
    /// Local wall-clock time of extraction. Drives expiry.
    pub captured_at: DateTime<Utc>,
    /// Best-effort production time of the underlying message. Drives
    /// freshness ordering; `None` ranks below every known timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
    pub valid: bool,
}

impl OtpRecord {
    pub fn new(code: impl Into<String>, source_timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            code: code.into(),
            captured_at: Utc::now(),
            source_timestamp,
            valid: true,
        }
    }

    /// True when `now` is at least `window` past capture.
    pub fn older_than(&self, now: DateTime<Utc>, window: std::time::Duration) -> bool {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.captured_at) >= window
    }

    /// Does a candidate timestamp supersede this record?
    ///
    /// Unknown candidate timestamps rank lowest: they never displace a
    /// record, while a record with no timestamp yields to any known one.
    pub fn superseded_by(&self, candidate_ts: Option<DateTime<Utc>>) -> bool {
        match (candidate_ts, self.source_timestamp) {
            (Some(new), Some(old)) => new > old,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// The persisted automation toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationConfig {
    pub enabled: bool,
    pub auto_submit_enabled: bool,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_submit_enabled: true,
        }
    }
}

/// Full automation state: persisted toggles plus episode-scoped flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationState {
    pub enabled: bool,
    pub auto_submit_enabled: bool,
    pub waiting_for_code: bool,
    pub waiting_for_fresh_code: bool,
    pub last_failed_code: Option<String>,
    pub consumer_ctx: Option<ContextRef>,
    pub source_ctx: Option<ContextRef>,
}

impl Default for AutomationState {
    fn default() -> Self {
        Self::from_config(AutomationConfig::default())
    }
}

impl AutomationState {
    pub fn from_config(config: AutomationConfig) -> Self {
        Self {
            enabled: config.enabled,
            auto_submit_enabled: config.auto_submit_enabled,
            waiting_for_code: false,
            waiting_for_fresh_code: false,
            last_failed_code: None,
            consumer_ctx: None,
            source_ctx: None,
        }
    }

    /// The persisted subset.
    pub fn config(&self) -> AutomationConfig {
        AutomationConfig {
            enabled: self.enabled,
            auto_submit_enabled: self.auto_submit_enabled,
        }
    }

    pub fn apply(&mut self, patch: &StatePatch) {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(auto_submit) = patch.auto_submit_enabled {
            self.auto_submit_enabled = auto_submit;
        }
    }
}

/// Partial update to the automation toggles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    pub enabled: Option<bool>,
    pub auto_submit_enabled: Option<bool>,
}

/// One lifecycle episode: from the first code request to success, explicit
/// clear, or expiry.
#[derive(Debug)]
pub struct Episode {
    pub id: Uuid,
    /// Cancels retries and polls tied to this episode when it ends.
    pub cancel: CancellationToken,
    /// Observation keys already seen this episode.
    seen: HashSet<(String, Option<DateTime<Utc>>)>,
}

impl Episode {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            seen: HashSet::new(),
        }
    }

    /// Record an observation key. Returns false when the identical
    /// (code, timestamp) pair was already seen this episode.
    pub fn note_seen(&mut self, code: &str, ts: Option<DateTime<Utc>>) -> bool {
        self.seen.insert((code.to_string(), ts))
    }
}

impl Default for Episode {
    fn default() -> Self {
        Self::new()
    }
}
