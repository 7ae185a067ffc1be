//! Egret transaction processing engine.
//!
//! The core of the custodial wallet service: a per-address balance cache,
//! the coin-selection algorithm, the transaction assembler with iterative
//! fee estimation, the submission/retry state machine, and the per-wallet
//! worker pool that serializes all builds touching one wallet's balance.

pub mod build;
pub mod cache;
pub mod error;
pub mod job;
pub mod provider;
pub mod select;
pub mod worker;

pub use cache::BalanceCache;
pub use error::EngineError;
pub use job::{EngineContext, JobOutcome};
pub use provider::Provider;
pub use worker::WorkerPool;
