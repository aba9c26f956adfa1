//! In-memory collaborators for scenario tests.

use crate::config::{EnrichmentConfig, SyncConfig};
use crate::decoder::DecoderRegistry;
use crate::enrichment::{DecodeApi, DecodeResult, EnrichmentError};
use crate::lease::Lease;
use crate::ledger::{AbciEvent, EventAttribute, LedgerApi, LedgerBlock, LedgerError, LedgerTx};
use crate::store::Store;
use crate::sync::{EventPublisher, SyncEngine};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lowercase hex hash for `height` on fork `fork`.
pub fn block_hash(height: u64, fork: u8) -> String {
	format!("{fork:02x}{height:062x}")
}

fn block_time(height: u64) -> DateTime<Utc> {
	let genesis = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
	genesis + ChronoDuration::seconds(height as i64 * 6)
}

#[derive(Default)]
struct FakeLedgerState {
	head: u64,
	blocks: BTreeMap<u64, (LedgerBlock, Vec<LedgerTx>)>,
	transaction_failures: HashMap<u64, u32>,
	transaction_requests: HashMap<u64, u32>,
	requests: u32,
}

/// Scripted ledger: a chain built block by block, with injectable transient failures.
#[derive(Default)]
pub struct FakeLedger {
	state: Mutex<FakeLedgerState>,
}

impl FakeLedger {
	pub fn new() -> Self {
		Self::default()
	}

	/// Append a block on top of the current head and move the head to it.
	pub fn push_block(&self, txs: Vec<LedgerTx>) -> LedgerBlock {
		let mut state = self.state.lock().unwrap();
		let height = state.head + 1;
		let parent = state
			.blocks
			.get(&(height - 1))
			.map(|(block, _)| block.hash.clone())
			.unwrap_or_else(|| block_hash(height - 1, 0));
		let block = LedgerBlock {
			height,
			hash: block_hash(height, 0),
			time: block_time(height),
			proposer: "PROPOSER".into(),
			last_block_hash: (height > 1).then_some(parent),
		};
		state.blocks.insert(height, (block.clone(), txs));
		state.head = height;
		block
	}

	/// Append empty blocks up to `height`.
	pub fn extend_to(&self, height: u64) {
		while self.head() < height {
			self.push_block(Vec::new());
		}
	}

	/// Move the head without serving blocks below it, so the next pushed block starts there.
	pub fn skip_to(&self, height: u64) {
		self.state.lock().unwrap().head = height;
	}

	/// Replace block `height` with a block whose parent is on another fork.
	pub fn fork_block(&self, height: u64) {
		let mut state = self.state.lock().unwrap();
		if let Some((block, _)) = state.blocks.get_mut(&height) {
			block.hash = block_hash(height, 1);
			block.last_block_hash = Some(block_hash(height - 1, 1));
		}
	}

	/// Fail the next `times` transaction fetches for `height`.
	pub fn fail_transactions(&self, height: u64, times: u32) {
		self.state
			.lock()
			.unwrap()
			.transaction_failures
			.insert(height, times);
	}

	pub fn head(&self) -> u64 {
		self.state.lock().unwrap().head
	}

	pub fn transaction_requests(&self, height: u64) -> u32 {
		self.state
			.lock()
			.unwrap()
			.transaction_requests
			.get(&height)
			.copied()
			.unwrap_or(0)
	}

	/// Total calls made against this ledger.
	pub fn requests(&self) -> u32 {
		self.state.lock().unwrap().requests
	}
}

#[async_trait]
impl LedgerApi for FakeLedger {
	async fn latest_height(&self) -> Result<u64, LedgerError> {
		let mut state = self.state.lock().unwrap();
		state.requests += 1;
		Ok(state.head)
	}

	async fn block(&self, height: u64) -> Result<LedgerBlock, LedgerError> {
		let mut state = self.state.lock().unwrap();
		state.requests += 1;
		state
			.blocks
			.get(&height)
			.map(|(block, _)| block.clone())
			.ok_or(LedgerError::Status {
				status: 404,
				path: format!("/blocks/{height}"),
			})
	}

	async fn transactions(&self, height: u64) -> Result<Vec<LedgerTx>, LedgerError> {
		let mut state = self.state.lock().unwrap();
		state.requests += 1;
		*state.transaction_requests.entry(height).or_default() += 1;

		if let Some(remaining) = state.transaction_failures.get_mut(&height) {
			if *remaining > 0 {
				*remaining -= 1;
				return Err(LedgerError::Status {
					status: 503,
					path: format!("/txs/block/{height}"),
				});
			}
		}

		Ok(state
			.blocks
			.get(&height)
			.map(|(_, txs)| txs.clone())
			.unwrap_or_default())
	}
}

/// One scripted answer of the decode service.
#[derive(Debug, Clone)]
pub enum Scripted {
	Fail,
	Empty,
	Decoded(Value),
}

/// Decode service that answers from a per-payload script, falling back to `fallback`.
pub struct ScriptedDecoder {
	scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
	calls: Mutex<HashMap<String, u32>>,
	fallback: Scripted,
}

impl ScriptedDecoder {
	pub fn new(fallback: Scripted) -> Self {
		Self {
			scripts: Mutex::new(HashMap::new()),
			calls: Mutex::new(HashMap::new()),
			fallback,
		}
	}

	pub fn script(self, payload: &str, answers: Vec<Scripted>) -> Self {
		self.scripts
			.lock()
			.unwrap()
			.insert(payload.to_string(), answers.into());
		self
	}

	pub fn calls(&self, payload: &str) -> u32 {
		self.calls.lock().unwrap().get(payload).copied().unwrap_or(0)
	}
}

#[async_trait]
impl DecodeApi for ScriptedDecoder {
	async fn decode(&self, payload: &str) -> Result<Option<DecodeResult>, EnrichmentError> {
		*self.calls.lock().unwrap().entry(payload.to_string()).or_default() += 1;

		let answer = self
			.scripts
			.lock()
			.unwrap()
			.get_mut(payload)
			.and_then(VecDeque::pop_front)
			.unwrap_or_else(|| self.fallback.clone());

		match answer {
			Scripted::Fail => Err(EnrichmentError::Status(500)),
			Scripted::Empty => Ok(None),
			Scripted::Decoded(body) => DecodeResult::from_value(body),
		}
	}
}

pub fn decoded_transfer() -> Scripted {
	Scripted::Decoded(json!({
		"inputs": [{"nullifier": "0x01"}],
		"outputs": [{"commitment": "0x02"}],
		"summary": {"type": "Transfer"}
	}))
}

pub fn sync_config() -> SyncConfig {
	SyncConfig {
		start_height: 1,
		batch_size: 10,
		poll_interval_ms: 10,
		recovery_interval_ms: 10,
		..SyncConfig::default()
	}
}

pub fn enrichment_config() -> EnrichmentConfig {
	EnrichmentConfig {
		batch_size: 10,
		max_attempts: 5,
		poll_interval_secs: 1,
		request_timeout_secs: 5,
		concurrency: 2,
		..EnrichmentConfig::default()
	}
}

pub fn engine(
	ledger: Arc<FakeLedger>,
	store: Arc<dyn Store>,
	lease: Arc<dyn Lease>,
	publisher: EventPublisher,
) -> SyncEngine {
	SyncEngine::new(
		ledger,
		store,
		lease,
		publisher,
		DecoderRegistry::with_defaults(),
		sync_config(),
	)
}

pub fn tx(hash: &str, code: u32, messages: Vec<Value>) -> LedgerTx {
	LedgerTx {
		hash: hash.into(),
		code,
		raw_log: if code == 0 {
			String::new()
		} else {
			"execution failed".into()
		},
		gas_used: 60_000,
		gas_wanted: 100_000,
		fee: Vec::new(),
		memo: String::new(),
		signer_keys: vec!["A1B2".into()],
		messages,
		events: vec![AbciEvent {
			kind: "message".into(),
			attributes: vec![EventAttribute {
				key: "action".into(),
				value: Some("indexed".into()),
			}],
		}],
	}
}

pub fn confirm_deposit(validator: &str) -> Value {
	json!({
		"@type": "/hub.bridge.v1.MsgConfirmDeposit",
		"validator": validator,
		"l1_tx_hash": "0xdeadbeef",
		"l1_block_hash": "0xfeedface",
		"l1_block_height": "19000000",
		"recipient": "hub1recipient",
		"amount": "340282366920938463463374607431768211456",
		"denom": "uhub"
	})
}

pub fn shielded_transfer(payload: &str) -> Value {
	json!({
		"@type": "/hub.zk.v1.MsgShieldedTransfer",
		"sender": "hub1sender",
		"payload": payload
	})
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = bool>,
{
	let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
	while tokio::time::Instant::now() < deadline {
		if check().await {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	false
}

pub async fn wait_for_checkpoint(store: &dyn Store, height: u64) -> bool {
	eventually(move || async move { matches!(store.checkpoint().await, Ok(Some(h)) if h >= height) })
		.await
}
