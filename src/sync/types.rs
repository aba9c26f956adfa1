use crate::lease::LeaseError;
use crate::ledger::LedgerError;
use crate::store::StoreError;

/// Error types for block ingestion
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),

	#[error("Store error: {0}")]
	Store(#[from] StoreError),

	#[error("Lease error: {0}")]
	Lease(#[from] LeaseError),

	/// The parent hash in header `height` does not match the stored block `height - 1`.
	#[error(
		"Reorg detected at height {height}: stored parent hash {stored_hash}, header says {parent_hash}"
	)]
	Reorg {
		height: u64,
		stored_hash: String,
		parent_hash: String,
	},

	/// Block `height - 1` is not stored although the store already has a checkpoint.
	#[error("Missing parent for height {height}: no stored block below it, checkpoint is {checkpoint:?}")]
	MissingParent {
		height: u64,
		checkpoint: Option<u64>,
	},
}

impl SyncError {
	/// Everything except a consistency violation is retried by the outer loop.
	pub fn is_transient(&self) -> bool {
		!matches!(
			self,
			SyncError::Reorg { .. } | SyncError::MissingParent { .. }
		)
	}
}

/// Observable state of a sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
	Idle,
	AcquiringLease,
	LeaseDenied,
	Polling,
	Ingesting { height: u64 },
	Halted { reason: String },
	Stopped,
}

impl EngineState {
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			EngineState::LeaseDenied | EngineState::Halted { .. } | EngineState::Stopped
		)
	}
}

/// How a sync run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineExit {
	/// Another instance holds the lease; nothing was touched.
	LeaseDenied,
	/// A stop was requested and honored between units of work.
	Stopped,
	/// A consistency violation; needs an operator.
	Halted(String),
}
