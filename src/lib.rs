//! Ledger indexer
//!
//! Mirrors a Cosmos-style ledger into a relational store block by block, decodes every message
//! through a type-dispatch registry, and completes shielded transfers asynchronously through an
//! external decode service.

pub mod config;
pub mod decoder;
pub mod enrichment;
pub mod lease;
pub mod ledger;
pub mod logging;
pub mod store;
pub mod sync;
pub mod task;
pub mod utils;

#[cfg(test)]
mod tests;
