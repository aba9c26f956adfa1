//! Ledger read integration
//!
//! This module provides the client and types for reading blocks and transactions from the ledger's
//! REST gateway. The gateway is treated as a reliable external dependency: the client performs
//! no verification of what it returns.

/// REST client and the `LedgerApi` seam used by the sync engine
mod client;
/// Wire and normalized types for gateway responses
mod types;

pub use client::{LedgerApi, LedgerClient};
pub use types::*;
