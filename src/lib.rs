//! Otpflow: One-Time-Passcode Handoff Engine
//!
//! A coordination core that arbitrates which passcode is current under
//! asynchronous, out-of-order, possibly duplicate input, and drives the
//! fetch/deliver/retry/recover cycle across an unreliable transport.
//!
//! # Core Concepts
//!
//! - **Candidates**: extracted (code, timestamp) pairs, ranked by source time
//! - **Episodes**: the span from the first code request to success or expiry
//! - **Notices**: non-blocking status events for observers
//!
//! # Example
//!
//! ```
//! use otpflow::ExtractionEngine;
//!
//! let engine = ExtractionEngine::new();
//! let found = engine.extract_text("Your verification code: 483920");
//! assert_eq!(found.map(|c| c.code), Some("483920".to_string()));
//! ```

pub mod adapter;
pub mod channel;
pub mod coordinator;
pub mod extract;
pub mod storage;

pub use adapter::{BlockSource, CancellationToken, PollingScanner, ScannerConfig, TextBlock};
pub use channel::{
    Ack, ChannelError, ChannelResult, ContextRef, DeliveryChannel, DeliveryOutcome,
    OutboundMessage, RetryPolicy, Target,
};
pub use coordinator::{
    AutomationConfig, AutomationState, Coordinator, CoordinatorConfig, CoordinatorError,
    CoordinatorHandle, DropReason, Notice, OtpRecord, Phase, StatePatch,
};
pub use extract::{ExtractionEngine, OtpCandidate};
pub use storage::{OpenStore, SqliteStore, StateStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
