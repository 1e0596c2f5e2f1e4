//! Storage trait definitions

use crate::coordinator::{AutomationConfig, OtpRecord};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Persisted cross-restart state, kept as independently loadable records.
///
/// Implementations must be thread-safe (Send + Sync). Writes that touch
/// more than one record happen as one unit so a crash between them cannot
/// leave the snapshot and the used-code set disagreeing.
pub trait StateStore: Send + Sync {
    // === Automation configuration ===

    fn load_automation(&self) -> StorageResult<Option<AutomationConfig>>;

    fn save_automation(&self, config: &AutomationConfig) -> StorageResult<()>;

    // === Current OTP snapshot ===

    fn load_snapshot(&self) -> StorageResult<Option<OtpRecord>>;

    fn save_snapshot(&self, record: &OtpRecord) -> StorageResult<()>;

    fn clear_snapshot(&self) -> StorageResult<()>;

    // === Used (delivered-and-rejected) codes ===

    fn load_used_codes(&self) -> StorageResult<HashSet<String>>;

    fn save_used_codes(&self, codes: &HashSet<String>) -> StorageResult<()>;

    // === Combined writes ===

    /// Write the snapshot (or its absence) and the used-code set in one
    /// transaction.
    fn save_snapshot_and_codes(
        &self,
        record: Option<&OtpRecord>,
        codes: &HashSet<String>,
    ) -> StorageResult<()>;

    /// Drop every record.
    fn clear_all(&self) -> StorageResult<()>;
}

/// Extension trait for opening stores from paths.
pub trait OpenStore: StateStore + Sized {
    /// Open or create a store at the given path.
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing).
    fn open_in_memory() -> StorageResult<Self>;
}
