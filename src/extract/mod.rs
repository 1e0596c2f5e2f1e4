//! Code extraction engine
//!
//! Turns raw text blocks into at most one candidate per scan. A relevance
//! gate runs first so unrelated content is never scanned; then a
//! priority-ordered cascade of strategies looks for a code, most specific
//! reading first. Absence of a candidate is an expected outcome, not an
//! error; the caller simply scans again on its next cycle.

mod filters;
mod strategies;
mod timestamp;

pub use filters::is_likely_not_otp;
pub use strategies::{CodeStrategy, GlobalFallback, LabeledPattern, LineContext, StrategyRegistry};
pub use timestamp::resolve_timestamp;

use crate::adapter::TextBlock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// An extracted (code, timestamp) pair not yet accepted as authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpCandidate {
    /// Normalized digit string (trimmed, no embedded whitespace).
    pub code: String,
    /// Best-effort time the underlying message was produced. `None` ranks
    /// lowest in freshness comparisons.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Local wall-clock time of extraction.
    pub captured_at: DateTime<Utc>,
}

/// Topic keywords every deployment cares about. Service-specific names are
/// added via [`ExtractionEngine::with_topic_keywords`].
const GENERIC_TOPIC_KEYWORDS: &[&str] = &[
    "authentication",
    "verification",
    "login",
    "access",
    "account",
    "security",
    "code",
    "otp",
    "one-time",
    "password",
    "passcode",
];

/// The extraction engine: relevance gate plus strategy cascade.
pub struct ExtractionEngine {
    registry: StrategyRegistry,
    topic_keywords: Vec<String>,
}

impl Default for ExtractionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionEngine {
    /// Create an engine with the standard cascade: labeled patterns, then
    /// keyword-line digit runs, then the global fallback.
    pub fn new() -> Self {
        let mut registry = StrategyRegistry::new();
        registry.register(LabeledPattern);
        registry.register(LineContext);
        registry.register(GlobalFallback);
        Self {
            registry,
            topic_keywords: Vec::new(),
        }
    }

    /// Add service-specific topic keywords (portal names, sender domains).
    pub fn with_topic_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topic_keywords
            .extend(keywords.into_iter().map(|k| k.into().to_lowercase()));
        self
    }

    /// True when the text mentions the protected system or a code-related
    /// topic at all. Scanning stops here for unrelated content.
    pub fn is_topic_relevant(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        GENERIC_TOPIC_KEYWORDS
            .iter()
            .any(|kw| lower.contains(kw))
            || self.topic_keywords.iter().any(|kw| lower.contains(kw))
    }

    /// Run one finite scan over a block. Returns at most one candidate.
    pub fn extract(&self, block: &TextBlock) -> Option<OtpCandidate> {
        if !self.is_topic_relevant(&block.text) {
            return None;
        }

        let now = Utc::now();
        for strategy in self.registry.strategies() {
            if let Some(code) = strategy.extract(&block.text) {
                debug!(strategy = strategy.id(), code = %code, "candidate extracted");
                let source_timestamp = block
                    .timestamp_hint
                    .or_else(|| resolve_timestamp(&block.text, now));
                return Some(OtpCandidate {
                    code,
                    source_timestamp,
                    captured_at: now,
                });
            }
        }
        None
    }

    /// Convenience wrapper for plain text with no structured timestamp.
    pub fn extract_text(&self, text: &str) -> Option<OtpCandidate> {
        self.extract(&TextBlock::new(text))
    }
}
