//! Node wiring for the Sable L2.
//!
//! A [`Node`] owns every subsystem once: database, state store, block
//! store, mempool, consensus engine, batch builder and settlement
//! tracker. Background loops (block production, settlement) are tokio
//! tasks with cooperative cancellation; cross-task notifications use
//! channels rather than callback lists.

pub mod config;
pub mod error;
pub mod genesis;
pub mod node;
pub mod submitter;
pub mod tasks;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::Node;
pub use submitter::RecordingSubmitter;
pub use tasks::NodeHandle;

/// Install the default tracing subscriber, honoring `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
