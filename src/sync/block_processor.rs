//! Assembly of one block's commit from ledger data.
//!
//! Pure: decodes every message through the registry, derives the per-transaction fields, and
//! collects the event rows, account touches and enrichment records that go into the atomic commit.

use crate::decoder::{DecodedMessage, DecoderRegistry, Module, extract_addresses};
use crate::ledger::{EventAttribute, LedgerBlock, LedgerTx};
use crate::store::{
	AccountTouch, BlockCommit, BlockRow, EventRow, NewEnrichment, TransactionRow, TxStatus,
};
use crate::utils::normalize_hash;

use itertools::Itertools;
use serde_json::{Map, Value};

/// Zero-knowledge messages whose `payload` is completed by the enrichment worker.
pub const ENRICHMENT_SOURCES: [&str; 3] = ["MsgShieldedTransfer", "MsgShield", "MsgUnshield"];

/// Non-blank `payload` of an enrichment source. Passthrough messages qualify too, so a decoder
/// error in an unrelated field never keeps a transfer from being enriched.
fn enrichment_payload(message: &DecodedMessage) -> Option<&str> {
	if message.module != Some(Module::Zk) || !ENRICHMENT_SOURCES.contains(&message.name()) {
		return None;
	}
	message.text("payload").filter(|payload| !payload.trim().is_empty())
}

pub struct BlockProcessor {
	registry: DecoderRegistry,
	address_prefix: String,
}

impl BlockProcessor {
	pub fn new(registry: DecoderRegistry, address_prefix: &str) -> Self {
		Self {
			registry,
			address_prefix: address_prefix.to_string(),
		}
	}

	pub fn registry(&self) -> &DecoderRegistry {
		&self.registry
	}

	/// Build the commit for `block` and its transactions, in block order.
	pub fn assemble(&self, block: &LedgerBlock, txs: &[LedgerTx]) -> BlockCommit {
		let mut transactions = Vec::with_capacity(txs.len());
		let mut events = Vec::new();
		let mut accounts = Vec::new();
		let mut enrichments = Vec::new();

		for (tx_index, tx) in txs.iter().enumerate() {
			let hash = normalize_hash(&tx.hash);
			let messages: Vec<DecodedMessage> =
				tx.messages.iter().map(|m| self.registry.decode(m)).collect();

			accounts.extend(
				messages
					.iter()
					.flat_map(|m| extract_addresses(&m.data, &self.address_prefix))
					.unique()
					.map(|address| AccountTouch {
						address,
						tx_hash: hash.clone(),
						seen_at: block.time,
					}),
			);

			enrichments.extend(messages.iter().enumerate().filter_map(|(msg_index, message)| {
				let payload = enrichment_payload(message)?;
				Some(NewEnrichment {
					tx_hash: hash.clone(),
					msg_index: msg_index as u32,
					height: block.height,
					message_type: message.type_url.clone(),
					payload: payload.to_string(),
				})
			}));

			events.extend(tx.events.iter().enumerate().map(|(event_index, event)| EventRow {
				tx_hash: Some(hash.clone()),
				height: block.height,
				event_index: event_index as u32,
				event_type: event.kind.clone(),
				attributes: attribute_map(&event.attributes),
			}));

			let status = TxStatus::from_code(tx.code);
			transactions.push(TransactionRow {
				hash,
				height: block.height,
				tx_index: tx_index as u32,
				primary_type: messages
					.first()
					.map(|m| m.type_url.clone())
					.unwrap_or_default(),
				messages,
				fee: tx.fee.clone(),
				gas_used: tx.gas_used,
				gas_wanted: tx.gas_wanted,
				memo: tx.memo.clone(),
				status,
				error: (status == TxStatus::Failed).then(|| tx.raw_log.clone()),
				signers: tx.signer_keys.clone(),
				timestamp: block.time,
			});
		}

		let block = BlockRow {
			height: block.height,
			hash: normalize_hash(&block.hash),
			time: block.time,
			proposer: block.proposer.clone(),
			tx_count: transactions.len() as u32,
			gas_used: txs.iter().fold(0u64, |sum, tx| sum.saturating_add(tx.gas_used)),
			gas_wanted: txs.iter().fold(0u64, |sum, tx| sum.saturating_add(tx.gas_wanted)),
		};

		BlockCommit {
			block,
			transactions,
			events,
			accounts,
			enrichments,
		}
	}
}

/// Attribute list to a map. Repeated keys collect their values into an array.
fn attribute_map(attributes: &[EventAttribute]) -> Map<String, Value> {
	let mut map = Map::new();
	for attribute in attributes {
		let value = attribute
			.value
			.clone()
			.map(Value::String)
			.unwrap_or(Value::Null);
		match map.get_mut(&attribute.key) {
			None => {
				map.insert(attribute.key.clone(), value);
			}
			Some(Value::Array(values)) => values.push(value),
			Some(existing) => {
				let first = existing.take();
				*existing = Value::Array(vec![first, value]);
			}
		}
	}
	map
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ledger::{AbciEvent, Coin};
	use chrono::Utc;
	use serde_json::json;

	fn ledger_block() -> LedgerBlock {
		LedgerBlock {
			height: 100,
			hash: "ABCDEF".into(),
			time: Utc::now(),
			proposer: "P".into(),
			last_block_hash: Some("012345".into()),
		}
	}

	fn ledger_tx(hash: &str, code: u32, messages: Vec<Value>) -> LedgerTx {
		LedgerTx {
			hash: hash.into(),
			code,
			raw_log: if code == 0 { String::new() } else { "out of gas".into() },
			gas_used: 50,
			gas_wanted: 80,
			fee: vec![Coin {
				denom: "uhub".into(),
				amount: "10".into(),
			}],
			memo: String::new(),
			signer_keys: vec!["KEY".into()],
			messages,
			events: vec![AbciEvent {
				kind: "transfer".into(),
				attributes: vec![
					EventAttribute {
						key: "recipient".into(),
						value: Some("hub1a".into()),
					},
					EventAttribute {
						key: "recipient".into(),
						value: Some("hub1b".into()),
					},
				],
			}],
		}
	}

	#[test]
	fn assembles_rows_for_each_transaction() {
		let processor = BlockProcessor::new(DecoderRegistry::with_defaults(), "hub");
		let txs = vec![
			ledger_tx(
				"AA01",
				0,
				vec![json!({
					"@type": "/hub.zk.v1.MsgShieldedTransfer",
					"sender": "hub-sender",
					"payload": "AAEC"
				})],
			),
			ledger_tx(
				"BB02",
				11,
				vec![json!({"@type": "/cosmos.bank.v1beta1.MsgSend", "from_address": "hub-x"})],
			),
		];

		let commit = processor.assemble(&ledger_block(), &txs);

		assert_eq!(commit.block.hash, "abcdef");
		assert_eq!(commit.block.tx_count, 2);
		assert_eq!(commit.block.gas_used, 100);
		assert_eq!(commit.block.gas_wanted, 160);

		let first = &commit.transactions[0];
		assert_eq!(first.hash, "aa01");
		assert_eq!(first.primary_type, "/hub.zk.v1.MsgShieldedTransfer");
		assert_eq!(first.status, TxStatus::Success);
		assert_eq!(first.error, None);

		let second = &commit.transactions[1];
		assert_eq!(second.status, TxStatus::Failed);
		assert_eq!(second.error.as_deref(), Some("out of gas"));
		assert!(!second.messages[0].decoded);

		assert_eq!(commit.enrichments.len(), 1);
		assert_eq!(commit.enrichments[0].payload, "AAEC");
		assert_eq!(commit.enrichments[0].msg_index, 0);

		let touched: Vec<_> = commit.accounts.iter().map(|a| a.address.as_str()).collect();
		assert_eq!(touched, vec!["hub-sender", "hub-x"]);

		assert_eq!(commit.events.len(), 2);
		assert_eq!(
			commit.events[0].attributes["recipient"],
			json!(["hub1a", "hub1b"])
		);
	}

	#[test]
	fn shielded_transfers_are_enriched_even_when_decoding_falls_back() {
		let processor = BlockProcessor::new(DecoderRegistry::with_defaults(), "hub");
		let txs = vec![ledger_tx(
			"CC03",
			0,
			vec![
				json!({
					"@type": "/hub.zk.v1.MsgShieldedTransfer",
					"sender": "hub-sender",
					"payload": "AAEC",
					"fee": "0.25"
				}),
				json!({"@type": "/hub.zk.v1.MsgShield", "payload": "DDEE"}),
				json!({"@type": "/hub.zk.v1.MsgUnshield", "payload": "  "}),
				json!({"@type": "/cosmos.bank.v1beta1.MsgShieldedTransfer", "payload": "FF00"}),
			],
		)];

		let commit = processor.assemble(&ledger_block(), &txs);

		let messages = &commit.transactions[0].messages;
		assert!(!messages[0].decoded);
		assert!(!messages[1].decoded);

		let enriched: Vec<_> = commit
			.enrichments
			.iter()
			.map(|e| (e.msg_index, e.payload.as_str()))
			.collect();
		assert_eq!(enriched, vec![(0, "AAEC"), (1, "DDEE")]);
	}

	#[test]
	fn empty_block_is_not_an_error() {
		let processor = BlockProcessor::new(DecoderRegistry::with_defaults(), "hub");
		let commit = processor.assemble(&ledger_block(), &[]);
		assert_eq!(commit.block.tx_count, 0);
		assert!(commit.transactions.is_empty());
	}
}
