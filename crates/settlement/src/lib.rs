//! Batch building and settlement tracking.
//!
//! The [`BatchBuilder`] accumulates sealed blocks until a batch is ready
//! (size or age), then rolls them into a [`sable_types::SettlementRecord`]
//! with a persisted, monotonic batch id. The [`SettlementTracker`] walks
//! each record through the challenge-window lifecycle and drives queued
//! withdrawals to `Claimable` on finalization.

pub mod batch;
pub mod config;
pub mod error;
pub mod tracker;
pub mod withdrawal;

pub use batch::BatchBuilder;
pub use config::SettlementConfig;
pub use error::SettlementError;
pub use tracker::{ChallengeOutcome, SettlementTracker, Submitter};
pub use withdrawal::{Withdrawal, WithdrawalStatus};
