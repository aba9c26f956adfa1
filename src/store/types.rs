//! Row models for the persistence store
//!
//! All wide integers (heights, gas, amounts) serialize as decimal strings, since these rows are also
//! the payloads published on the event bus.

use crate::decoder::DecodedMessage;
use crate::ledger::Coin;
use crate::utils::decimal;

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRow {
	#[serde(with = "decimal::u64_string")]
	pub height: u64,
	pub hash: String,
	pub time: DateTime<Utc>,
	pub proposer: String,
	pub tx_count: u32,
	#[serde(with = "decimal::u64_string")]
	pub gas_used: u64,
	#[serde(with = "decimal::u64_string")]
	pub gas_wanted: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
	Success,
	Failed,
}

impl TxStatus {
	/// Status from the ledger's result code; `0` is success.
	pub fn from_code(code: u32) -> Self {
		if code == 0 {
			TxStatus::Success
		} else {
			TxStatus::Failed
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			TxStatus::Success => "success",
			TxStatus::Failed => "failed",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
	pub hash: String,
	#[serde(with = "decimal::u64_string")]
	pub height: u64,
	/// Position within the block.
	pub tx_index: u32,
	/// Type identifier of the first message, empty for a transaction without messages.
	pub primary_type: String,
	pub messages: Vec<DecodedMessage>,
	pub fee: Vec<Coin>,
	#[serde(with = "decimal::u64_string")]
	pub gas_used: u64,
	#[serde(with = "decimal::u64_string")]
	pub gas_wanted: u64,
	pub memo: String,
	pub status: TxStatus,
	/// Raw log of a failed transaction.
	pub error: Option<String>,
	pub signers: Vec<String>,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
	pub tx_hash: Option<String>,
	#[serde(with = "decimal::u64_string")]
	pub height: u64,
	/// Position of the event within its transaction.
	pub event_index: u32,
	pub event_type: String,
	/// Attribute values by key. A key emitted more than once maps to an array of its values.
	pub attributes: Map<String, Value>,
}

/// An address observed in a transaction's decoded messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountTouch {
	pub address: String,
	pub tx_hash: String,
	pub seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRow {
	pub address: String,
	pub tx_count: u64,
	pub first_seen: DateTime<Utc>,
	pub last_seen: DateTime<Utc>,
}

/// A shielded payload waiting for the external decode service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEnrichment {
	pub tx_hash: String,
	pub msg_index: u32,
	pub height: u64,
	pub message_type: String,
	pub payload: String,
}

/// Everything written by the atomic commit of one block.
#[derive(Debug, Clone)]
pub struct BlockCommit {
	pub block: BlockRow,
	pub transactions: Vec<TransactionRow>,
	pub events: Vec<EventRow>,
	pub accounts: Vec<AccountTouch>,
	pub enrichments: Vec<NewEnrichment>,
}

/// Result of a block commit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommitOutcome {
	/// Hashes of transactions that did not exist before this commit.
	pub new_transactions: Vec<String>,
	pub checkpoint: u64,
}

impl CommitOutcome {
	pub fn is_new(&self, tx_hash: &str) -> bool {
		self.new_transactions.iter().any(|h| h == tx_hash)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeStatus {
	Pending,
	Ok,
	Failed,
}

impl DecodeStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			DecodeStatus::Pending => "pending",
			DecodeStatus::Ok => "ok",
			DecodeStatus::Failed => "failed",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"pending" => Some(DecodeStatus::Pending),
			"ok" => Some(DecodeStatus::Ok),
			"failed" => Some(DecodeStatus::Failed),
			_ => None,
		}
	}
}

/// Fields filled in by a successful decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedPayload {
	pub raw: Value,
	pub inputs: Vec<Value>,
	pub outputs: Vec<Value>,
	pub program_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
	pub id: i64,
	pub tx_hash: String,
	pub msg_index: u32,
	#[serde(with = "decimal::u64_string")]
	pub height: u64,
	pub message_type: String,
	pub payload: String,
	pub decode_status: DecodeStatus,
	pub attempts: u32,
	pub last_decode_error: Option<String>,
	pub decoded: Option<DecodedPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EnrichmentCounts {
	pub pending: u64,
	pub ok: u64,
	pub failed: u64,
}

/// Side-table write derived from one successfully executed message.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
	DepositVote {
		source_tx_hash: String,
		source_block_hash: String,
		source_height: Option<u64>,
		validator: String,
		recipient: String,
		amount: BigUint,
		denom: Option<String>,
		tx_hash: String,
		height: u64,
	},
	WithdrawalRequested {
		id: String,
		requester: String,
		destination: String,
		amount: BigUint,
		denom: Option<String>,
		tx_hash: String,
		height: u64,
	},
	WithdrawalConfirmed {
		id: String,
		validator: String,
		destination_tx_hash: Option<String>,
		height: u64,
	},
	WithdrawalCancelled {
		id: String,
		height: u64,
	},
	Fragment {
		withdrawal_id: String,
		signer: String,
		fragment: String,
		fragment_index: Option<u64>,
		tx_hash: String,
		height: u64,
	},
	SignerRegistered {
		address: String,
		pubkey: String,
		moniker: Option<String>,
		height: u64,
	},
	SignerKeyRotated {
		address: String,
		pubkey: String,
		height: u64,
	},
	SignerDeregistered {
		address: String,
		height: u64,
	},
	SignerHeartbeat {
		address: String,
		reported_height: Option<u64>,
		height: u64,
	},
	SignatureBroadcast {
		signer: String,
		withdrawal_id: Option<String>,
		signature: String,
		round: Option<u64>,
		tx_hash: String,
		height: u64,
	},
	ProposalSubmitted {
		proposal_id: Option<u64>,
		proposer: String,
		title: Option<String>,
		summary: Option<String>,
		initial_deposit: Value,
		tx_hash: String,
		height: u64,
	},
	ProposalVote {
		proposal_id: u64,
		voter: String,
		option: String,
		tx_hash: String,
		height: u64,
	},
}

impl Projection {
	pub fn kind(&self) -> &'static str {
		match self {
			Projection::DepositVote { .. } => "deposit_vote",
			Projection::WithdrawalRequested { .. } => "withdrawal_requested",
			Projection::WithdrawalConfirmed { .. } => "withdrawal_confirmed",
			Projection::WithdrawalCancelled { .. } => "withdrawal_cancelled",
			Projection::Fragment { .. } => "fragment",
			Projection::SignerRegistered { .. } => "signer_registered",
			Projection::SignerKeyRotated { .. } => "signer_key_rotated",
			Projection::SignerDeregistered { .. } => "signer_deregistered",
			Projection::SignerHeartbeat { .. } => "signer_heartbeat",
			Projection::SignatureBroadcast { .. } => "signature_broadcast",
			Projection::ProposalSubmitted { .. } => "proposal_submitted",
			Projection::ProposalVote { .. } => "proposal_vote",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRow {
	pub source_tx_hash: String,
	pub source_block_hash: String,
	#[serde(with = "decimal::opt_u64_string", default)]
	pub source_height: Option<u64>,
	pub recipient: String,
	#[serde(with = "decimal::biguint")]
	pub amount: BigUint,
	pub denom: Option<String>,
	/// Distinct validators that confirmed this deposit.
	pub vote_count: u32,
	/// Transaction carrying the first confirmation.
	pub tx_hash: String,
	#[serde(with = "decimal::u64_string")]
	pub height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
	Requested,
	Confirmed,
	Cancelled,
}

impl WithdrawalStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			WithdrawalStatus::Requested => "requested",
			WithdrawalStatus::Confirmed => "confirmed",
			WithdrawalStatus::Cancelled => "cancelled",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"requested" => Some(WithdrawalStatus::Requested),
			"confirmed" => Some(WithdrawalStatus::Confirmed),
			"cancelled" => Some(WithdrawalStatus::Cancelled),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRow {
	/// `{tx_hash}:{msg_index}` of the request.
	pub id: String,
	pub requester: String,
	pub destination: String,
	#[serde(with = "decimal::biguint")]
	pub amount: BigUint,
	pub denom: Option<String>,
	pub status: WithdrawalStatus,
	pub destination_tx_hash: Option<String>,
	pub tx_hash: String,
	#[serde(with = "decimal::u64_string")]
	pub height: u64,
	#[serde(with = "decimal::u64_string")]
	pub updated_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRow {
	pub withdrawal_id: String,
	pub signer: String,
	pub fragment: String,
	pub fragment_index: Option<u64>,
	pub tx_hash: String,
	#[serde(with = "decimal::u64_string")]
	pub height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerStatus {
	Active,
	Deregistered,
}

impl SignerStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			SignerStatus::Active => "active",
			SignerStatus::Deregistered => "deregistered",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerRow {
	pub address: String,
	pub pubkey: Option<String>,
	pub moniker: Option<String>,
	pub status: SignerStatus,
	/// Height last reported by the signer's heartbeat.
	pub reported_height: Option<u64>,
	pub last_heartbeat_height: Option<u64>,
	pub updated_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRow {
	pub signer: String,
	pub withdrawal_id: Option<String>,
	pub signature: String,
	pub round: Option<u64>,
	pub tx_hash: String,
	pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRow {
	pub proposal_id: Option<u64>,
	pub proposer: String,
	pub title: Option<String>,
	pub summary: Option<String>,
	pub initial_deposit: Value,
	pub tx_hash: String,
	pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalVoteRow {
	pub proposal_id: u64,
	pub voter: String,
	pub option: String,
	pub tx_hash: String,
	pub height: u64,
}

/// Domain event produced by a projection, published on the event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
	Deposit(DepositRow),
	Withdrawal(WithdrawalRow),
}

/// Error types for the persistence store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("Database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Store lock poisoned")]
	Poisoned,

	#[error("Corrupt row: {0}")]
	Corrupt(String),

	#[error("Unsupported database url: {0}")]
	UnsupportedUrl(String),

	#[error("Cannot rewind to height {height}: checkpoint is {checkpoint:?}")]
	RewindAhead {
		height: u64,
		checkpoint: Option<u64>,
	},
}
