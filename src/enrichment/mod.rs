//! Enrichment Worker
//!
//! Shielded payloads stored by the sync engine are completed asynchronously by an external decode
//! service. This module provides the service client, the result parsing, and the bounded-retry
//! worker loop.

/// Decode service client and the `DecodeApi` seam
mod client;
/// Error and result types
mod types;
/// Worker loop
mod worker;

pub use client::{DecodeApi, DecodeClient};
pub use types::*;
pub use worker::{CycleReport, EnrichmentWorker};
