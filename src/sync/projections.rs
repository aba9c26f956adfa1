//! Side-table projections derived from committed transactions.
//!
//! This is the second ingestion stage: it runs after the block commit, only for successful
//! transactions, and every projection carries its own idempotency key so replaying a block
//! cannot double-count.

use crate::decoder::{DecodedMessage, Module};
use crate::store::{EventRow, Projection, TransactionRow, TxStatus};
use crate::utils::decimal;

use serde_json::Value;
use tracing::debug;

/// Projections for every recognized message in `tx`, in message order.
///
/// `events` are the event rows of the same transaction; governance proposals take their id from
/// the `submit_proposal` event.
pub fn derive(tx: &TransactionRow, events: &[EventRow]) -> Vec<Projection> {
	if tx.status != TxStatus::Success {
		return Vec::new();
	}

	tx.messages
		.iter()
		.enumerate()
		.filter(|(_, message)| message.decoded)
		.filter_map(|(index, message)| {
			let projection = project(tx, index, message, events);
			if projection.is_none() && message.module != Some(Module::Zk) {
				debug!(
					"No projection for {} in tx {} message {}",
					message.type_url, tx.hash, index
				);
			}
			projection
		})
		.collect()
}

/// Withdrawal identifier: the request's transaction hash and message position.
pub fn withdrawal_id(tx_hash: &str, msg_index: usize) -> String {
	format!("{tx_hash}:{msg_index}")
}

fn text(message: &DecodedMessage, field: &str) -> Option<String> {
	message.text(field).map(str::to_string)
}

fn project(
	tx: &TransactionRow,
	index: usize,
	message: &DecodedMessage,
	events: &[EventRow],
) -> Option<Projection> {
	let tx_hash = tx.hash.clone();
	let height = tx.height;

	match (message.module?, message.name()) {
		(Module::Bridge, "MsgConfirmDeposit") => Some(Projection::DepositVote {
			source_tx_hash: text(message, "source_tx_hash")?,
			source_block_hash: text(message, "source_block_hash")?,
			source_height: message.int("source_height"),
			validator: text(message, "validator_address")?,
			recipient: text(message, "recipient_address")?,
			amount: decimal::parse_amount(message.text("amount")?)?,
			denom: text(message, "denom"),
			tx_hash,
			height,
		}),
		(Module::Bridge, "MsgRequestWithdrawal") => Some(Projection::WithdrawalRequested {
			id: withdrawal_id(&tx.hash, index),
			requester: text(message, "requester_address")?,
			destination: text(message, "destination")?,
			amount: decimal::parse_amount(message.text("amount")?)?,
			denom: text(message, "denom"),
			tx_hash,
			height,
		}),
		(Module::Bridge, "MsgConfirmWithdrawal") => Some(Projection::WithdrawalConfirmed {
			id: text(message, "withdrawal_id")?,
			validator: text(message, "validator_address")?,
			destination_tx_hash: text(message, "destination_tx_hash"),
			height,
		}),
		(Module::Bridge, "MsgCancelWithdrawal") => Some(Projection::WithdrawalCancelled {
			id: text(message, "withdrawal_id")?,
			height,
		}),
		(Module::Bridge, "MsgSubmitFragment") => Some(Projection::Fragment {
			withdrawal_id: text(message, "withdrawal_id")?,
			signer: text(message, "signer_address")?,
			fragment: text(message, "fragment")?,
			fragment_index: message.int("fragment_index"),
			tx_hash,
			height,
		}),
		(Module::Signer, "MsgRegisterSigner") => Some(Projection::SignerRegistered {
			address: text(message, "signer_address")?,
			pubkey: text(message, "pubkey")?,
			moniker: text(message, "moniker"),
			height,
		}),
		(Module::Signer, "MsgRotateSignerKey") => Some(Projection::SignerKeyRotated {
			address: text(message, "signer_address")?,
			pubkey: text(message, "pubkey")?,
			height,
		}),
		(Module::Signer, "MsgDeregisterSigner") => Some(Projection::SignerDeregistered {
			address: text(message, "signer_address")?,
			height,
		}),
		(Module::Signer, "MsgSignerHeartbeat") => Some(Projection::SignerHeartbeat {
			address: text(message, "signer_address")?,
			reported_height: message.int("reported_height"),
			height,
		}),
		(Module::Signer, "MsgBroadcastSignature") => Some(Projection::SignatureBroadcast {
			signer: text(message, "signer_address")?,
			withdrawal_id: text(message, "withdrawal_id"),
			signature: text(message, "signature")?,
			round: message.int("round"),
			tx_hash,
			height,
		}),
		(Module::Gov, "MsgSubmitProposal") => Some(Projection::ProposalSubmitted {
			proposal_id: proposal_id_from_events(events),
			proposer: text(message, "proposer_address")?,
			title: text(message, "title"),
			summary: text(message, "summary"),
			initial_deposit: message
				.data
				.get("initial_deposit")
				.cloned()
				.unwrap_or_else(|| Value::Array(Vec::new())),
			tx_hash,
			height,
		}),
		(Module::Gov, "MsgVote") => Some(Projection::ProposalVote {
			proposal_id: message.int("proposal_id")?,
			voter: text(message, "voter_address")?,
			option: text(message, "option")?,
			tx_hash,
			height,
		}),
		_ => None,
	}
}

fn proposal_id_from_events(events: &[EventRow]) -> Option<u64> {
	events
		.iter()
		.filter(|event| event.event_type == "submit_proposal")
		.find_map(|event| match event.attributes.get("proposal_id")? {
			Value::String(id) => decimal::parse_u64(id),
			Value::Array(ids) => ids.iter().find_map(|id| id.as_str().and_then(decimal::parse_u64)),
			_ => None,
		})
}
