//! Local submitter used on dev networks and in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use sable_settlement::{SettlementError, Submitter};
use sable_types::SettlementRecord;
use tracing::info;

/// Records every submission in memory and returns the commitment hex as
/// the confirmation handle. Stands in for the real L1 client, which is an
/// external collaborator.
#[derive(Default)]
pub struct RecordingSubmitter {
    submissions: Mutex<Vec<SettlementRecord>>,
    /// Fail the next N submissions (failure-path testing).
    fail_next: Mutex<u32>,
}

impl RecordingSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> Vec<SettlementRecord> {
        self.submissions.lock().clone()
    }

    pub fn fail_next(&self, count: u32) {
        *self.fail_next.lock() = count;
    }
}

#[async_trait]
impl Submitter for RecordingSubmitter {
    async fn submit(&self, record: &SettlementRecord) -> Result<String, SettlementError> {
        {
            let mut fail = self.fail_next.lock();
            if *fail > 0 {
                *fail -= 1;
                return Err(SettlementError::SubmissionFailed(
                    "submitter unavailable".into(),
                ));
            }
        }
        let handle = hex::encode(record.commitment().0);
        info!(batch_id = record.batch_id, handle, "batch recorded locally");
        self.submissions.lock().push(record.clone());
        Ok(handle)
    }
}
