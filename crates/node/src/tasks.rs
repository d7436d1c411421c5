//! Background loops.
//!
//! Two tasks, each with its own cancellation path:
//! - block production: wakes every `block_time_ms`, produces when this
//!   node holds the slot (or the fallback after a missed slot);
//! - settlement: periodic batch rolling, submission retries and
//!   challenge-window polling.
//!
//! Shutdown is cooperative: cancellation lets the current iteration
//! finish, so durable state only ever reflects completed blocks.

use crate::node::Node;
use sable_settlement::Submitter;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Handles to the node's background tasks.
pub struct NodeHandle {
    cancel: CancellationToken,
    producer: JoinHandle<()>,
    settler: JoinHandle<()>,
}

impl NodeHandle {
    /// Spawn the production and settlement loops.
    pub fn spawn(node: Arc<Node>, submitter: Arc<dyn Submitter>) -> Self {
        let cancel = CancellationToken::new();

        let producer = {
            let node = Arc::clone(&node);
            let cancel = cancel.clone();
            let block_time = Duration::from_millis(node.config().consensus.block_time_ms);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(block_time);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            match node.try_produce(unix_now()) {
                                Ok(Some(block)) => {
                                    info!(number = block.number(), "produced block");
                                }
                                Ok(None) => {}
                                Err(err) => error!(error = %err, "block production failed"),
                            }
                        }
                    }
                }
                info!("block production loop stopped");
            })
        };

        let settler = {
            let node = Arc::clone(&node);
            let cancel = cancel.clone();
            let poll_every = Duration::from_millis(
                node.config().consensus.block_time_ms.max(1_000),
            );
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(poll_every);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(err) = node.settle_tick(unix_now(), submitter.as_ref()).await {
                                error!(error = %err, "settlement tick failed");
                            }
                        }
                    }
                }
                info!("settlement loop stopped");
            })
        };

        Self {
            cancel,
            producer,
            settler,
        }
    }

    /// Cancel both loops and wait for them to drain.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.producer.await;
        let _ = self.settler.await;
    }
}
