//! Storage abstractions
//!
//! - `Database` / `Transaction` - the narrow interface the engine consumes
//! - `MemoryDatabase` - in-memory engine with serialized transactions, used
//!   by tests and as a reference implementation

mod memory;
mod traits;

pub use memory::{MemoryDatabase, MemoryTransaction};
pub use traits::{Database, Transaction};

use crate::error::Result;

/// Commit on success, roll back on failure
///
/// The pipeline error is returned even if the rollback itself fails.
pub async fn settle<X: Transaction, T>(tx: X, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            tracing::debug!(error = %err, "rolling back transaction");
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
