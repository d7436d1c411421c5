//! Settlement error types.

use sable_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettlementError {
    /// No blocks buffered; nothing to roll into a batch.
    #[error("no pending blocks to batch")]
    EmptyBatch,

    /// Unknown batch id.
    #[error("batch {0} not found")]
    BatchNotFound(u64),

    /// Transition not allowed from the record's current status.
    #[error("batch {batch_id} is {status}, cannot {action}")]
    InvalidTransition {
        batch_id: u64,
        status: String,
        action: &'static str,
    },

    /// The external submitter rejected or failed the submission.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
