//! Enrichment worker loop.
//!
//! Each cycle selects a batch of pending records (oldest first), sends each payload to the decode
//! service under a timeout, and records the outcome per record. A record becomes `ok` on the first
//! valid result and `failed` once its attempts reach the configured maximum; a failure in one record
//! never affects the others in the batch.

use super::client::DecodeApi;
use super::types::EnrichmentError;
use crate::config::EnrichmentConfig;
use crate::store::{DecodeStatus, EnrichmentRecord, Store};
use crate::task::TaskControl;

use futures::StreamExt;
use futures::stream;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
	Succeeded,
	Retried,
	Exhausted,
	StoreFailed,
}

/// Counts for one worker cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
	pub selected: usize,
	pub succeeded: usize,
	pub retried: usize,
	pub exhausted: usize,
	pub store_failures: usize,
}

impl CycleReport {
	fn made_progress(&self) -> bool {
		self.succeeded + self.retried + self.exhausted > 0
	}
}

pub struct EnrichmentWorker {
	store: Arc<dyn Store>,
	decoder: Arc<dyn DecodeApi>,
	config: EnrichmentConfig,
}

impl EnrichmentWorker {
	pub fn new(store: Arc<dyn Store>, decoder: Arc<dyn DecodeApi>, config: EnrichmentConfig) -> Self {
		Self {
			store,
			decoder,
			config,
		}
	}

	/// Process one batch.
	///
	/// # Errors
	/// Only selecting the batch can fail; per-record errors are counted in the report.
	pub async fn run_cycle(&self) -> Result<CycleReport, EnrichmentError> {
		let records = self
			.store
			.pending_enrichments(self.config.batch_size, self.config.max_attempts)
			.await?;

		let mut report = CycleReport {
			selected: records.len(),
			..CycleReport::default()
		};

		let outcomes: Vec<RecordOutcome> = stream::iter(records)
			.map(|record| self.process(record))
			.buffer_unordered(self.config.concurrency.max(1))
			.collect()
			.await;

		for outcome in outcomes {
			match outcome {
				RecordOutcome::Succeeded => report.succeeded += 1,
				RecordOutcome::Retried => report.retried += 1,
				RecordOutcome::Exhausted => report.exhausted += 1,
				RecordOutcome::StoreFailed => report.store_failures += 1,
			}
		}

		Ok(report)
	}

	async fn process(&self, record: EnrichmentRecord) -> RecordOutcome {
		let timeout = self.config.request_timeout();
		let result = match tokio::time::timeout(timeout, self.decoder.decode(&record.payload)).await {
			Ok(Ok(Some(result))) => Ok(result),
			Ok(Ok(None)) => Err(EnrichmentError::EmptyResult),
			Ok(Err(e)) => Err(e),
			Err(_) => Err(EnrichmentError::Timeout(timeout)),
		};

		match result {
			Ok(result) => {
				let payload = result.into_payload();
				match self.store.record_enrichment_success(record.id, &payload).await {
					Ok(()) => {
						debug!(
							"Decoded enrichment record {} (tx {}) as {}",
							record.id, record.tx_hash, payload.program_type
						);
						RecordOutcome::Succeeded
					}
					Err(e) => {
						warn!("Failed to store decode of record {}: {}", record.id, e);
						RecordOutcome::StoreFailed
					}
				}
			}
			Err(decode_error) => {
				let message = decode_error.to_string();
				match self
					.store
					.record_enrichment_failure(record.id, &message, self.config.max_attempts)
					.await
				{
					Ok(DecodeStatus::Failed) => {
						warn!(
							"Enrichment record {} (tx {}) failed after {} attempts: {}",
							record.id,
							record.tx_hash,
							record.attempts + 1,
							message
						);
						RecordOutcome::Exhausted
					}
					Ok(_) => {
						debug!(
							"Decode attempt {} for record {} failed: {}",
							record.attempts + 1,
							record.id,
							message
						);
						RecordOutcome::Retried
					}
					Err(e) => {
						warn!("Failed to record decode failure of record {}: {}", record.id, e);
						RecordOutcome::StoreFailed
					}
				}
			}
		}
	}

	/// Run cycles until stopped, sleeping the poll interval whenever a cycle finds nothing to do.
	pub async fn run(&self, control: &TaskControl) {
		info!(
			"Enrichment worker started (batch {}, max attempts {})",
			self.config.batch_size, self.config.max_attempts
		);

		while !control.is_stopped() {
			match self.run_cycle().await {
				Ok(report) if report.made_progress() => {
					debug!("Enrichment cycle: {:?}", report);
				}
				Ok(report) => {
					if report.store_failures > 0 {
						warn!("Enrichment cycle made no progress: {:?}", report);
					}
					control.sleep(self.config.poll_interval()).await;
				}
				Err(e) => {
					warn!("Enrichment cycle failed: {}", e);
					control.sleep(self.config.poll_interval()).await;
				}
			}
		}

		info!("Enrichment worker stopped");
	}
}
