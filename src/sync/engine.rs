//! Sync engine: sequential block ingestion under a single-writer lease.
//!
//! The engine acquires its lease, then alternates between polling the chain head and ingesting
//! the next heights one block at a time. Each block goes through the same steps: fetch the header,
//! check its parent hash against the stored previous block, fetch the transactions, commit
//! everything atomically, apply side-table projections, and only then publish events.
//!
//! A parent hash mismatch, or a missing parent below an existing checkpoint, halts the engine. Any other failure aborts the current batch, waits the
//! recovery interval and retries the same height, which is safe because the checkpoint only moves
//! inside a successful commit.

use super::block_processor::BlockProcessor;
use super::events::{BusEvent, EventPublisher};
use super::progress_tracker::SyncProgressTracker;
use super::projections;
use super::types::{EngineExit, EngineState, SyncError};
use crate::config::SyncConfig;
use crate::decoder::DecoderRegistry;
use crate::lease::Lease;
use crate::ledger::{LedgerApi, LedgerBlock, LedgerError};
use crate::store::{BlockCommit, CommitOutcome, DomainEvent, Store};
use crate::task::TaskControl;
use crate::utils::{generate_instance_id, normalize_hash};

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Summary of one ingested block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
	pub height: u64,
	pub transactions: usize,
	pub new_transactions: usize,
	pub domain_events: usize,
}

pub struct SyncEngine {
	ledger: Arc<dyn LedgerApi>,
	store: Arc<dyn Store>,
	lease: Arc<dyn Lease>,
	publisher: EventPublisher,
	processor: BlockProcessor,
	config: SyncConfig,
	instance_id: String,
	state: watch::Sender<EngineState>,
}

impl SyncEngine {
	pub fn new(
		ledger: Arc<dyn LedgerApi>,
		store: Arc<dyn Store>,
		lease: Arc<dyn Lease>,
		publisher: EventPublisher,
		registry: DecoderRegistry,
		config: SyncConfig,
	) -> Self {
		let processor = BlockProcessor::new(registry, &config.address_prefix);
		let (state, _) = watch::channel(EngineState::Idle);
		Self {
			ledger,
			store,
			lease,
			publisher,
			processor,
			config,
			instance_id: generate_instance_id(),
			state,
		}
	}

	pub fn instance_id(&self) -> &str {
		&self.instance_id
	}

	pub fn state(&self) -> EngineState {
		self.state.borrow().clone()
	}

	/// Receiver that observes every state transition.
	pub fn watch_state(&self) -> watch::Receiver<EngineState> {
		self.state.subscribe()
	}

	fn set_state(&self, state: EngineState) {
		self.state.send_replace(state);
	}

	/// Run until stopped, halted, or denied the lease.
	///
	/// # Errors
	/// Returns `SyncError::Lease` if the lease backend itself fails. Everything after acquisition
	/// is handled inside the loop and reported through the returned `EngineExit`.
	pub async fn run(&self, control: &TaskControl) -> Result<EngineExit, SyncError> {
		self.set_state(EngineState::AcquiringLease);

		let guard = match self.lease.try_acquire(&self.instance_id).await {
			Ok(Some(guard)) => guard,
			Ok(None) => {
				info!(
					"Lease {} is held by another instance; exiting without syncing",
					self.lease.name()
				);
				self.set_state(EngineState::LeaseDenied);
				return Ok(EngineExit::LeaseDenied);
			}
			Err(e) => {
				self.set_state(EngineState::Idle);
				return Err(e.into());
			}
		};
		info!("Acquired lease {} as {}", self.lease.name(), guard.holder());

		let exit = self.poll_loop(control).await;

		match guard.release().await {
			Ok(()) => info!("Released lease {}", self.lease.name()),
			Err(e) => warn!("Failed to release lease {}: {}", self.lease.name(), e),
		}

		Ok(exit)
	}

	async fn poll_loop(&self, control: &TaskControl) -> EngineExit {
		let mut progress = SyncProgressTracker::new(self.store.checkpoint().await.ok().flatten());

		let exit = loop {
			if control.is_stopped() {
				break EngineExit::Stopped;
			}
			self.set_state(EngineState::Polling);

			let next = match self.store.checkpoint().await {
				Ok(checkpoint) => checkpoint.map_or(self.config.start_height, |h| h + 1),
				Err(e) => {
					warn!("Failed to read checkpoint: {}", e);
					control.sleep(self.config.recovery_interval()).await;
					continue;
				}
			};

			let head = match self.ledger.latest_height().await {
				Ok(head) => head,
				Err(e) => {
					warn!("Failed to fetch chain head: {}", e);
					control.sleep(self.config.recovery_interval()).await;
					continue;
				}
			};

			if head < next {
				control.sleep(self.config.poll_interval()).await;
				continue;
			}

			let last = head.min(next.saturating_add(self.config.batch_size - 1));
			debug!("Ingesting heights {}..={} (head {})", next, last, head);

			let mut halted = None;
			for height in next..=last {
				if control.is_stopped() {
					break;
				}
				self.set_state(EngineState::Ingesting { height });

				match self.ingest_block(height).await {
					Ok(report) => {
						progress.record_block(height, report.transactions, report.domain_events);
						progress.log_progress(false);
					}
					Err(e) if e.is_transient() => {
						warn!(
							"Failed to ingest block {}: {}; retrying in {:?}",
							height,
							e,
							self.config.recovery_interval()
						);
						control.sleep(self.config.recovery_interval()).await;
						break;
					}
					Err(e) => {
						error!("Halting sync: {}", e);
						halted = Some(e.to_string());
						break;
					}
				}
			}

			if let Some(reason) = halted {
				break EngineExit::Halted(reason);
			}
		};

		progress.log_progress(true);
		self.set_state(match &exit {
			EngineExit::Halted(reason) => EngineState::Halted {
				reason: reason.clone(),
			},
			EngineExit::LeaseDenied => EngineState::LeaseDenied,
			EngineExit::Stopped => EngineState::Stopped,
		});
		exit
	}

	/// Ingest exactly one height.
	///
	/// Nothing is written when this returns an error, except that projections which already ran
	/// for a committed block stay applied.
	pub async fn ingest_block(&self, height: u64) -> Result<IngestReport, SyncError> {
		let block = self.ledger.block(height).await?;

		if height > 1 {
			self.check_parent(&block).await?;
		}

		let txs = self.ledger.transactions(height).await?;
		let commit = self.processor.assemble(&block, &txs);
		let outcome = self.store.commit_block(&commit).await?;
		debug!(
			"Committed block {} with {} transactions ({} new), checkpoint {}",
			height,
			commit.transactions.len(),
			outcome.new_transactions.len(),
			outcome.checkpoint
		);

		let domain_events = self.apply_projections(&commit, &outcome).await;
		let report = IngestReport {
			height,
			transactions: commit.transactions.len(),
			new_transactions: outcome.new_transactions.len(),
			domain_events: domain_events.len(),
		};

		let BlockCommit {
			block, transactions, ..
		} = commit;
		self.publisher.publish(BusEvent::BlockNew(block));
		for tx in transactions {
			self.publisher.publish(BusEvent::TxNew(tx));
		}
		for event in domain_events {
			self.publisher.publish(event.into());
		}

		Ok(report)
	}

	/// Compare the header's parent hash with the stored block below it.
	///
	/// The check is only skipped while nothing has been committed yet or when the parent lies
	/// below the configured start height. Any other missing parent halts the engine.
	async fn check_parent(&self, block: &LedgerBlock) -> Result<(), SyncError> {
		let previous = block.height.saturating_sub(1);
		let Some(stored) = self.store.block(previous).await? else {
			let checkpoint = self.store.checkpoint().await?;
			if checkpoint.is_none() || previous < self.config.start_height {
				debug!(
					"No stored block at {}; skipping parent check for {}",
					previous, block.height
				);
				return Ok(());
			}
			return Err(SyncError::MissingParent {
				height: block.height,
				checkpoint,
			});
		};

		let parent_hash = block.last_block_hash.as_deref().ok_or_else(|| {
			LedgerError::Malformed(format!("block {} has no parent hash", block.height))
		})?;

		if normalize_hash(parent_hash) != stored.hash {
			return Err(SyncError::Reorg {
				height: block.height,
				stored_hash: stored.hash,
				parent_hash: parent_hash.to_string(),
			});
		}
		Ok(())
	}

	/// Second stage: side-table writes for transactions that are new in this commit.
	///
	/// Failures are logged and the offending message is skipped; the block is never retried for them.
	async fn apply_projections(
		&self,
		commit: &BlockCommit,
		outcome: &CommitOutcome,
	) -> Vec<DomainEvent> {
		let mut published = Vec::new();

		for tx in commit
			.transactions
			.iter()
			.filter(|tx| outcome.is_new(&tx.hash))
		{
			let tx_events: Vec<_> = commit
				.events
				.iter()
				.filter(|e| e.tx_hash.as_deref() == Some(tx.hash.as_str()))
				.cloned()
				.collect();

			for projection in projections::derive(tx, &tx_events) {
				match self.store.apply_projection(&projection).await {
					Ok(Some(event)) => published.push(event),
					Ok(None) => {}
					Err(e) => warn!(
						"Skipping {} projection for tx {}: {}",
						projection.kind(),
						tx.hash,
						e
					),
				}
			}
		}

		published
	}
}
