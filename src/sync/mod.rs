//! Sync Engine
//!
//! This module ingests the ledger block by block into the persistence store. It is composed of
//! several submodules, each responsible for one step of the pipeline:
//!
//! - `engine`: the lease-guarded state machine that polls the chain head and ingests heights in order.
//! - `block_processor`: turns a ledger block and its transactions into one atomic commit.
//! - `projections`: derives side-table writes (deposits, withdrawals, signers, governance) from committed transactions.
//! - `events`: the outbound event bus the engine publishes to after each commit.
//! - `progress_tracker`: counts committed blocks and logs periodic summaries.

/// Block-to-commit assembly
pub mod block_processor;
/// Main ingestion state machine
pub mod engine;
/// Outbound event bus
pub mod events;
/// Tracks ingestion progress and statistics
pub mod progress_tracker;
/// Second-stage side-table projections
pub mod projections;
/// Error and state types
mod types;

pub use engine::{IngestReport, SyncEngine};
pub use events::{BusEvent, EventPublisher};
pub use types::*;
