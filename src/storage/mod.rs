//! Persistence for cross-restart state
//!
//! The automation configuration, the current OTP snapshot, and the
//! used-code set are the only durable resources. Each is a named record,
//! independently loadable and clearable.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{OpenStore, StateStore, StorageError, StorageResult};
