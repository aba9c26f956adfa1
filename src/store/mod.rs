//! Persistence Store
//!
//! The `Store` trait is the only write path for indexed data. The sync engine commits one block at
//! a time through [`Store::commit_block`], which is all-or-nothing and advances the checkpoint in the
//! same unit. Side tables are written afterwards through [`Store::apply_projection`], and the
//! enrichment worker owns the `decode_status` lifecycle of enrichment records.
//!
//! Two backends implement the trait: an in-process store for development and tests, and PostgreSQL.

/// In-process store
mod memory;
/// PostgreSQL store
mod postgres;
/// Row models and the store error type
mod types;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use types::*;

use crate::config::DatabaseConfig;

use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Store: Send + Sync {
	/// Last fully ingested height, `None` for an empty store.
	async fn checkpoint(&self) -> Result<Option<u64>, StoreError>;

	async fn block(&self, height: u64) -> Result<Option<BlockRow>, StoreError>;

	/// Atomically persist one block and advance the checkpoint to its height.
	///
	/// Transactions are inserted by hash and left untouched if already present; events and
	/// enrichment records are keyed the same way, and account counters only move for transactions
	/// that are new in this commit. The checkpoint never moves backwards.
	async fn commit_block(&self, commit: &BlockCommit) -> Result<CommitOutcome, StoreError>;

	/// Operator resync: drop every block, transaction, event, enrichment record and insert-only
	/// side log above `height`, then set the checkpoint to `height`. Fails with
	/// [`StoreError::RewindAhead`] and changes nothing when `height` is above the checkpoint or no
	/// block was ever committed, so the checkpoint never skips heights that were not ingested.
	async fn rewind(&self, height: u64) -> Result<(), StoreError>;

	/// Apply one side-table write. Returns the domain event to publish, if the write changed a
	/// deposit or withdrawal.
	async fn apply_projection(
		&self,
		projection: &Projection,
	) -> Result<Option<DomainEvent>, StoreError>;

	/// Up to `limit` pending records with fewer than `max_attempts` attempts, oldest first.
	async fn pending_enrichments(
		&self,
		limit: usize,
		max_attempts: u32,
	) -> Result<Vec<EnrichmentRecord>, StoreError>;

	/// Mark a record `ok`, storing the decoded payload. Counts as an attempt.
	async fn record_enrichment_success(
		&self,
		id: i64,
		decoded: &DecodedPayload,
	) -> Result<(), StoreError>;

	/// Count a failed attempt. The record becomes `failed` once its attempts reach `max_attempts`.
	///
	/// Returns the record's status after the update.
	async fn record_enrichment_failure(
		&self,
		id: i64,
		error: &str,
		max_attempts: u32,
	) -> Result<DecodeStatus, StoreError>;

	/// Move every `failed` record back to `pending` with its attempts reset. Returns the count.
	async fn requeue_failed_enrichments(&self) -> Result<u64, StoreError>;

	async fn enrichment_counts(&self) -> Result<EnrichmentCounts, StoreError>;
}

/// Open the store selected by `config.url`.
pub async fn open(config: &DatabaseConfig) -> Result<Arc<dyn Store>, StoreError> {
	if config.is_memory() {
		Ok(Arc::new(MemoryStore::new()))
	} else if config.url.starts_with("postgres://") || config.url.starts_with("postgresql://") {
		Ok(Arc::new(PgStore::connect(config).await?))
	} else {
		Err(StoreError::UnsupportedUrl(config.url.clone()))
	}
}
