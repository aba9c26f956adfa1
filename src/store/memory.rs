//! In-process store.
//!
//! Every operation runs under one mutex, which makes `commit_block` trivially atomic. Data lives
//! only as long as the process; inspection helpers expose the tables for tests and debugging.

use super::Store;
use super::types::*;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
	checkpoint: Option<u64>,
	blocks: BTreeMap<u64, BlockRow>,
	transactions: HashMap<String, TransactionRow>,
	/// Keyed by (height, tx hash or "", event index).
	events: BTreeMap<(u64, String, u32), EventRow>,
	accounts: BTreeMap<String, AccountRow>,
	enrichments: BTreeMap<i64, EnrichmentRecord>,
	enrichment_keys: HashMap<(String, u32), i64>,
	next_enrichment_id: i64,
	deposits: HashMap<(String, String), DepositRow>,
	deposit_votes: HashSet<(String, String, String)>,
	withdrawals: HashMap<String, WithdrawalRow>,
	fragments: HashMap<(String, String), FragmentRow>,
	signers: HashMap<String, SignerRow>,
	broadcasts: Vec<BroadcastRow>,
	proposals: Vec<ProposalRow>,
	votes: HashMap<(u64, String), ProposalVoteRow>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
	state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
		self.state.lock().map_err(|_| StoreError::Poisoned)
	}

	pub fn blocks(&self) -> Result<Vec<BlockRow>, StoreError> {
		Ok(self.lock()?.blocks.values().cloned().collect())
	}

	/// Drop a stored block row without touching the checkpoint.
	#[cfg(test)]
	pub fn forget_block(&self, height: u64) -> Result<(), StoreError> {
		self.lock()?.blocks.remove(&height);
		Ok(())
	}

	pub fn transaction(&self, hash: &str) -> Result<Option<TransactionRow>, StoreError> {
		Ok(self.lock()?.transactions.get(hash).cloned())
	}

	pub fn transaction_count(&self) -> Result<usize, StoreError> {
		Ok(self.lock()?.transactions.len())
	}

	pub fn events(&self) -> Result<Vec<EventRow>, StoreError> {
		Ok(self.lock()?.events.values().cloned().collect())
	}

	pub fn account(&self, address: &str) -> Result<Option<AccountRow>, StoreError> {
		Ok(self.lock()?.accounts.get(address).cloned())
	}

	pub fn enrichments(&self) -> Result<Vec<EnrichmentRecord>, StoreError> {
		Ok(self.lock()?.enrichments.values().cloned().collect())
	}

	pub fn enrichment(&self, id: i64) -> Result<Option<EnrichmentRecord>, StoreError> {
		Ok(self.lock()?.enrichments.get(&id).cloned())
	}

	pub fn deposits(&self) -> Result<Vec<DepositRow>, StoreError> {
		Ok(self.lock()?.deposits.values().cloned().collect())
	}

	pub fn withdrawal(&self, id: &str) -> Result<Option<WithdrawalRow>, StoreError> {
		Ok(self.lock()?.withdrawals.get(id).cloned())
	}

	pub fn signer(&self, address: &str) -> Result<Option<SignerRow>, StoreError> {
		Ok(self.lock()?.signers.get(address).cloned())
	}

	pub fn fragments(&self) -> Result<Vec<FragmentRow>, StoreError> {
		Ok(self.lock()?.fragments.values().cloned().collect())
	}

	pub fn broadcasts(&self) -> Result<Vec<BroadcastRow>, StoreError> {
		Ok(self.lock()?.broadcasts.clone())
	}

	pub fn proposals(&self) -> Result<Vec<ProposalRow>, StoreError> {
		Ok(self.lock()?.proposals.clone())
	}

	pub fn proposal_votes(&self) -> Result<Vec<ProposalVoteRow>, StoreError> {
		Ok(self.lock()?.votes.values().cloned().collect())
	}
}

impl MemoryState {
	fn project(&mut self, projection: &Projection) -> Option<DomainEvent> {
		match projection {
			Projection::DepositVote {
				source_tx_hash,
				source_block_hash,
				source_height,
				validator,
				recipient,
				amount,
				denom,
				tx_hash,
				height,
			} => {
				let vote = (
					source_tx_hash.clone(),
					source_block_hash.clone(),
					validator.clone(),
				);
				if !self.deposit_votes.insert(vote) {
					return None;
				}
				let row = self
					.deposits
					.entry((source_tx_hash.clone(), source_block_hash.clone()))
					.and_modify(|row| row.vote_count += 1)
					.or_insert_with(|| DepositRow {
						source_tx_hash: source_tx_hash.clone(),
						source_block_hash: source_block_hash.clone(),
						source_height: *source_height,
						recipient: recipient.clone(),
						amount: amount.clone(),
						denom: denom.clone(),
						vote_count: 1,
						tx_hash: tx_hash.clone(),
						height: *height,
					});
				Some(DomainEvent::Deposit(row.clone()))
			}
			Projection::WithdrawalRequested {
				id,
				requester,
				destination,
				amount,
				denom,
				tx_hash,
				height,
			} => {
				if self.withdrawals.contains_key(id) {
					return None;
				}
				let row = WithdrawalRow {
					id: id.clone(),
					requester: requester.clone(),
					destination: destination.clone(),
					amount: amount.clone(),
					denom: denom.clone(),
					status: WithdrawalStatus::Requested,
					destination_tx_hash: None,
					tx_hash: tx_hash.clone(),
					height: *height,
					updated_height: *height,
				};
				self.withdrawals.insert(id.clone(), row.clone());
				Some(DomainEvent::Withdrawal(row))
			}
			Projection::WithdrawalConfirmed {
				id,
				destination_tx_hash,
				height,
				..
			} => {
				let row = self.withdrawals.get_mut(id)?;
				if row.status == WithdrawalStatus::Confirmed
					&& row.destination_tx_hash == *destination_tx_hash
				{
					return None;
				}
				row.status = WithdrawalStatus::Confirmed;
				row.destination_tx_hash = destination_tx_hash.clone();
				row.updated_height = *height;
				Some(DomainEvent::Withdrawal(row.clone()))
			}
			Projection::WithdrawalCancelled { id, height } => {
				let row = self.withdrawals.get_mut(id)?;
				if row.status == WithdrawalStatus::Cancelled {
					return None;
				}
				row.status = WithdrawalStatus::Cancelled;
				row.updated_height = *height;
				Some(DomainEvent::Withdrawal(row.clone()))
			}
			Projection::Fragment {
				withdrawal_id,
				signer,
				fragment,
				fragment_index,
				tx_hash,
				height,
			} => {
				self.fragments.insert(
					(withdrawal_id.clone(), signer.clone()),
					FragmentRow {
						withdrawal_id: withdrawal_id.clone(),
						signer: signer.clone(),
						fragment: fragment.clone(),
						fragment_index: *fragment_index,
						tx_hash: tx_hash.clone(),
						height: *height,
					},
				);
				None
			}
			Projection::SignerRegistered {
				address,
				pubkey,
				moniker,
				height,
			} => {
				let row = self.signer_entry(address, *height);
				row.pubkey = Some(pubkey.clone());
				if moniker.is_some() {
					row.moniker = moniker.clone();
				}
				row.status = SignerStatus::Active;
				None
			}
			Projection::SignerKeyRotated {
				address,
				pubkey,
				height,
			} => {
				self.signer_entry(address, *height).pubkey = Some(pubkey.clone());
				None
			}
			Projection::SignerDeregistered { address, height } => {
				self.signer_entry(address, *height).status = SignerStatus::Deregistered;
				None
			}
			Projection::SignerHeartbeat {
				address,
				reported_height,
				height,
			} => {
				let row = self.signer_entry(address, *height);
				row.last_heartbeat_height = Some(*height);
				if reported_height.is_some() {
					row.reported_height = *reported_height;
				}
				None
			}
			Projection::SignatureBroadcast {
				signer,
				withdrawal_id,
				signature,
				round,
				tx_hash,
				height,
			} => {
				self.broadcasts.push(BroadcastRow {
					signer: signer.clone(),
					withdrawal_id: withdrawal_id.clone(),
					signature: signature.clone(),
					round: *round,
					tx_hash: tx_hash.clone(),
					height: *height,
				});
				None
			}
			Projection::ProposalSubmitted {
				proposal_id,
				proposer,
				title,
				summary,
				initial_deposit,
				tx_hash,
				height,
			} => {
				self.proposals.push(ProposalRow {
					proposal_id: *proposal_id,
					proposer: proposer.clone(),
					title: title.clone(),
					summary: summary.clone(),
					initial_deposit: initial_deposit.clone(),
					tx_hash: tx_hash.clone(),
					height: *height,
				});
				None
			}
			Projection::ProposalVote {
				proposal_id,
				voter,
				option,
				tx_hash,
				height,
			} => {
				self.votes.insert(
					(*proposal_id, voter.clone()),
					ProposalVoteRow {
						proposal_id: *proposal_id,
						voter: voter.clone(),
						option: option.clone(),
						tx_hash: tx_hash.clone(),
						height: *height,
					},
				);
				None
			}
		}
	}

	fn signer_entry(&mut self, address: &str, height: u64) -> &mut SignerRow {
		let row = self
			.signers
			.entry(address.to_string())
			.or_insert_with(|| SignerRow {
				address: address.to_string(),
				pubkey: None,
				moniker: None,
				status: SignerStatus::Active,
				reported_height: None,
				last_heartbeat_height: None,
				updated_height: height,
			});
		row.updated_height = height;
		row
	}
}

#[async_trait]
impl Store for MemoryStore {
	async fn checkpoint(&self) -> Result<Option<u64>, StoreError> {
		Ok(self.lock()?.checkpoint)
	}

	async fn block(&self, height: u64) -> Result<Option<BlockRow>, StoreError> {
		Ok(self.lock()?.blocks.get(&height).cloned())
	}

	async fn commit_block(&self, commit: &BlockCommit) -> Result<CommitOutcome, StoreError> {
		let mut state = self.lock()?;
		let height = commit.block.height;

		state.blocks.insert(height, commit.block.clone());

		let mut new_transactions = Vec::new();
		for tx in &commit.transactions {
			if !state.transactions.contains_key(&tx.hash) {
				state.transactions.insert(tx.hash.clone(), tx.clone());
				new_transactions.push(tx.hash.clone());
			}
		}

		for event in &commit.events {
			let key = (
				event.height,
				event.tx_hash.clone().unwrap_or_default(),
				event.event_index,
			);
			state.events.entry(key).or_insert_with(|| event.clone());
		}

		for touch in &commit.accounts {
			if !new_transactions.contains(&touch.tx_hash) {
				continue;
			}
			state
				.accounts
				.entry(touch.address.clone())
				.and_modify(|row| {
					row.tx_count += 1;
					row.first_seen = row.first_seen.min(touch.seen_at);
					row.last_seen = row.last_seen.max(touch.seen_at);
				})
				.or_insert_with(|| AccountRow {
					address: touch.address.clone(),
					tx_count: 1,
					first_seen: touch.seen_at,
					last_seen: touch.seen_at,
				});
		}

		for enrichment in &commit.enrichments {
			let key = (enrichment.tx_hash.clone(), enrichment.msg_index);
			if state.enrichment_keys.contains_key(&key) {
				continue;
			}
			state.next_enrichment_id += 1;
			let id = state.next_enrichment_id;
			state.enrichment_keys.insert(key, id);
			state.enrichments.insert(
				id,
				EnrichmentRecord {
					id,
					tx_hash: enrichment.tx_hash.clone(),
					msg_index: enrichment.msg_index,
					height: enrichment.height,
					message_type: enrichment.message_type.clone(),
					payload: enrichment.payload.clone(),
					decode_status: DecodeStatus::Pending,
					attempts: 0,
					last_decode_error: None,
					decoded: None,
				},
			);
		}

		let checkpoint = state.checkpoint.map_or(height, |c| c.max(height));
		state.checkpoint = Some(checkpoint);

		Ok(CommitOutcome {
			new_transactions,
			checkpoint,
		})
	}

	async fn rewind(&self, height: u64) -> Result<(), StoreError> {
		let mut state = self.lock()?;
		if !state.checkpoint.is_some_and(|checkpoint| height <= checkpoint) {
			return Err(StoreError::RewindAhead {
				height,
				checkpoint: state.checkpoint,
			});
		}
		state.blocks.retain(|h, _| *h <= height);
		state.transactions.retain(|_, tx| tx.height <= height);
		state.events.retain(|(h, _, _), _| *h <= height);

		let dropped: Vec<i64> = state
			.enrichments
			.values()
			.filter(|r| r.height > height)
			.map(|r| r.id)
			.collect();
		for id in dropped {
			if let Some(record) = state.enrichments.remove(&id) {
				state
					.enrichment_keys
					.remove(&(record.tx_hash, record.msg_index));
			}
		}

		state.broadcasts.retain(|b| b.height <= height);
		state.proposals.retain(|p| p.height <= height);
		state.checkpoint = Some(height);
		Ok(())
	}

	async fn apply_projection(
		&self,
		projection: &Projection,
	) -> Result<Option<DomainEvent>, StoreError> {
		Ok(self.lock()?.project(projection))
	}

	async fn pending_enrichments(
		&self,
		limit: usize,
		max_attempts: u32,
	) -> Result<Vec<EnrichmentRecord>, StoreError> {
		Ok(self
			.lock()?
			.enrichments
			.values()
			.filter(|r| r.decode_status == DecodeStatus::Pending && r.attempts < max_attempts)
			.take(limit)
			.cloned()
			.collect())
	}

	async fn record_enrichment_success(
		&self,
		id: i64,
		decoded: &DecodedPayload,
	) -> Result<(), StoreError> {
		let mut state = self.lock()?;
		let record = state
			.enrichments
			.get_mut(&id)
			.ok_or_else(|| StoreError::Corrupt(format!("enrichment record {id} not found")))?;
		record.attempts += 1;
		record.decode_status = DecodeStatus::Ok;
		record.last_decode_error = None;
		record.decoded = Some(decoded.clone());
		Ok(())
	}

	async fn record_enrichment_failure(
		&self,
		id: i64,
		error: &str,
		max_attempts: u32,
	) -> Result<DecodeStatus, StoreError> {
		let mut state = self.lock()?;
		let record = state
			.enrichments
			.get_mut(&id)
			.ok_or_else(|| StoreError::Corrupt(format!("enrichment record {id} not found")))?;
		record.attempts += 1;
		record.last_decode_error = Some(error.to_string());
		if record.attempts >= max_attempts {
			record.decode_status = DecodeStatus::Failed;
		}
		Ok(record.decode_status)
	}

	async fn requeue_failed_enrichments(&self) -> Result<u64, StoreError> {
		let mut state = self.lock()?;
		let mut count = 0;
		for record in state.enrichments.values_mut() {
			if record.decode_status == DecodeStatus::Failed {
				record.decode_status = DecodeStatus::Pending;
				record.attempts = 0;
				count += 1;
			}
		}
		Ok(count)
	}

	async fn enrichment_counts(&self) -> Result<EnrichmentCounts, StoreError> {
		let state = self.lock()?;
		let mut counts = EnrichmentCounts::default();
		for record in state.enrichments.values() {
			match record.decode_status {
				DecodeStatus::Pending => counts.pending += 1,
				DecodeStatus::Ok => counts.ok += 1,
				DecodeStatus::Failed => counts.failed += 1,
			}
		}
		Ok(counts)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};
	use num_bigint::BigUint;

	fn block(height: u64) -> BlockRow {
		BlockRow {
			height,
			hash: format!("hash-{height}"),
			time: Utc.timestamp_opt(1_700_000_000 + height as i64, 0).unwrap(),
			proposer: "proposer".into(),
			tx_count: 1,
			gas_used: 10,
			gas_wanted: 20,
		}
	}

	fn commit(height: u64, tx_hash: &str) -> BlockCommit {
		let block = block(height);
		BlockCommit {
			transactions: vec![TransactionRow {
				hash: tx_hash.into(),
				height,
				tx_index: 0,
				primary_type: "/hub.zk.v1.MsgShield".into(),
				messages: vec![],
				fee: vec![],
				gas_used: 10,
				gas_wanted: 20,
				memo: String::new(),
				status: TxStatus::Success,
				error: None,
				signers: vec![],
				timestamp: block.time,
			}],
			events: vec![EventRow {
				tx_hash: Some(tx_hash.into()),
				height,
				event_index: 0,
				event_type: "message".into(),
				attributes: Default::default(),
			}],
			accounts: vec![AccountTouch {
				address: "hub1alice".into(),
				tx_hash: tx_hash.into(),
				seen_at: block.time,
			}],
			enrichments: vec![NewEnrichment {
				tx_hash: tx_hash.into(),
				msg_index: 0,
				height,
				message_type: "/hub.zk.v1.MsgShield".into(),
				payload: "AAEC".into(),
			}],
			block,
		}
	}

	#[tokio::test]
	async fn recommit_is_idempotent() {
		let store = MemoryStore::new();
		let first = store.commit_block(&commit(5, "TX5")).await.unwrap();
		let second = store.commit_block(&commit(5, "TX5")).await.unwrap();

		assert_eq!(first.new_transactions, vec!["TX5".to_string()]);
		assert!(second.new_transactions.is_empty());
		assert_eq!(store.transaction_count().unwrap(), 1);
		assert_eq!(store.events().unwrap().len(), 1);
		assert_eq!(store.enrichments().unwrap().len(), 1);
		assert_eq!(store.account("hub1alice").unwrap().unwrap().tx_count, 1);
	}

	#[tokio::test]
	async fn checkpoint_never_regresses_on_commit() {
		let store = MemoryStore::new();
		store.commit_block(&commit(7, "TX7")).await.unwrap();
		let outcome = store.commit_block(&commit(6, "TX6")).await.unwrap();
		assert_eq!(outcome.checkpoint, 7);
		assert_eq!(store.checkpoint().await.unwrap(), Some(7));
	}

	#[tokio::test]
	async fn rewind_drops_rows_above_height() {
		let store = MemoryStore::new();
		for h in 1..=3 {
			store.commit_block(&commit(h, &format!("TX{h}"))).await.unwrap();
		}
		store.rewind(1).await.unwrap();

		assert_eq!(store.checkpoint().await.unwrap(), Some(1));
		assert_eq!(store.blocks().unwrap().len(), 1);
		assert!(store.transaction("TX2").unwrap().is_none());
		assert_eq!(store.enrichments().unwrap().len(), 1);

		// Replaying the dropped heights recreates their enrichment records.
		store.commit_block(&commit(2, "TX2")).await.unwrap();
		assert_eq!(store.enrichments().unwrap().len(), 2);
	}

	#[tokio::test]
	async fn rewind_never_moves_the_checkpoint_forward() {
		let store = MemoryStore::new();
		assert!(matches!(
			store.rewind(0).await,
			Err(StoreError::RewindAhead { height: 0, checkpoint: None })
		));

		for h in 1..=2 {
			store.commit_block(&commit(h, &format!("TX{h}"))).await.unwrap();
		}
		assert!(matches!(
			store.rewind(10).await,
			Err(StoreError::RewindAhead { height: 10, checkpoint: Some(2) })
		));
		assert_eq!(store.checkpoint().await.unwrap(), Some(2));
		assert_eq!(store.blocks().unwrap().len(), 2);

		store.rewind(2).await.unwrap();
		assert_eq!(store.checkpoint().await.unwrap(), Some(2));
	}

	#[tokio::test]
	async fn enrichment_failures_are_bounded() {
		let store = MemoryStore::new();
		store.commit_block(&commit(1, "TX1")).await.unwrap();
		let id = store.pending_enrichments(10, 3).await.unwrap()[0].id;

		assert_eq!(
			store.record_enrichment_failure(id, "boom", 3).await.unwrap(),
			DecodeStatus::Pending
		);
		store.record_enrichment_failure(id, "boom", 3).await.unwrap();
		assert_eq!(
			store.record_enrichment_failure(id, "boom", 3).await.unwrap(),
			DecodeStatus::Failed
		);
		assert!(store.pending_enrichments(10, 3).await.unwrap().is_empty());

		assert_eq!(store.requeue_failed_enrichments().await.unwrap(), 1);
		let record = store.enrichment(id).unwrap().unwrap();
		assert_eq!(record.decode_status, DecodeStatus::Pending);
		assert_eq!(record.attempts, 0);
	}

	#[tokio::test]
	async fn deposit_votes_count_distinct_validators() {
		let store = MemoryStore::new();
		let vote = |validator: &str| Projection::DepositVote {
			source_tx_hash: "0xaaa".into(),
			source_block_hash: "0xbbb".into(),
			source_height: Some(10),
			validator: validator.into(),
			recipient: "hub1r".into(),
			amount: BigUint::from(5u32),
			denom: None,
			tx_hash: "TX".into(),
			height: 3,
		};

		assert!(store.apply_projection(&vote("v1")).await.unwrap().is_some());
		assert!(store.apply_projection(&vote("v1")).await.unwrap().is_none());
		match store.apply_projection(&vote("v2")).await.unwrap() {
			Some(DomainEvent::Deposit(row)) => assert_eq!(row.vote_count, 2),
			other => panic!("unexpected {other:?}"),
		}
	}
}
