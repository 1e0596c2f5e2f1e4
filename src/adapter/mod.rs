//! Source-side adapter layer
//!
//! External collaborators observe raw text (inbox rows, reading panes,
//! notification feeds) and hand it over as [`TextBlock`]s. The polling
//! scanner is the in-process driver: a cancellable periodic task that
//! re-runs a finite extraction scan on a cadence and reports the freshest
//! candidate to the coordinator.

mod cancel;
mod polling;

pub use cancel::CancellationToken;
pub use polling::{PollingScanner, ScannerConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A raw block of text as observed by a source adapter.
///
/// The adapter knows its transport and may already hold a structured
/// timestamp for the block (a list-row attribute, a message header). That
/// hint outranks anything recovered from the text itself.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub text: String,
    pub timestamp_hint: Option<DateTime<Utc>>,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp_hint: None,
        }
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp_hint = Some(ts);
        self
    }
}

/// Supplies the currently visible text blocks on demand.
///
/// One call returns one finite snapshot; the scanner re-polls rather than
/// holding a stream open.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn fetch_blocks(&self) -> Vec<TextBlock>;

    /// Ask the underlying surface to refresh itself. Best effort.
    async fn refresh(&self) {}
}
