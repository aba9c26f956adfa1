//! Decoders for the bridge module: deposits from and withdrawals to the settlement chain.

use super::fields::{Coerce, apply, optional, required};
use super::types::{DecodeError, DecodeFn, Fields};

pub(super) const DECODERS: &[(&str, DecodeFn)] = &[
	("MsgConfirmDeposit", confirm_deposit),
	("MsgRequestWithdrawal", request_withdrawal),
	("MsgConfirmWithdrawal", confirm_withdrawal),
	("MsgSubmitFragment", submit_fragment),
	("MsgCancelWithdrawal", cancel_withdrawal),
	("MsgUpdateParams", update_params),
];

/// A validator's attestation that a deposit landed on the settlement chain.
fn confirm_deposit(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("validator", "validator_address", Coerce::Text),
			required("l1_tx_hash", "source_tx_hash", Coerce::Text),
			required("l1_block_hash", "source_block_hash", Coerce::Text),
			optional("l1_block_height", "source_height", Coerce::Int),
			required("recipient", "recipient_address", Coerce::Text),
			required("amount", "amount", Coerce::Amount),
			optional("denom", "denom", Coerce::Text),
		],
	)
}

fn request_withdrawal(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("creator", "requester_address", Coerce::Text),
			required("destination", "destination", Coerce::Text),
			required("amount", "amount", Coerce::Amount),
			optional("denom", "denom", Coerce::Text),
		],
	)
}

fn confirm_withdrawal(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("validator", "validator_address", Coerce::Text),
			required("withdrawal_id", "withdrawal_id", Coerce::Text),
			optional("l1_tx_hash", "destination_tx_hash", Coerce::Text),
		],
	)
}

/// One signer's share of a threshold-signed withdrawal.
fn submit_fragment(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("signer", "signer_address", Coerce::Text),
			required("withdrawal_id", "withdrawal_id", Coerce::Text),
			required("fragment", "fragment", Coerce::Text),
			optional("index", "fragment_index", Coerce::Int),
		],
	)
}

fn cancel_withdrawal(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("creator", "requester_address", Coerce::Text),
			required("withdrawal_id", "withdrawal_id", Coerce::Text),
		],
	)
}

fn update_params(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("authority", "authority_address", Coerce::Text),
			optional("params", "params", Coerce::Raw),
		],
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn confirm_deposit_maps_settlement_fields() {
		let msg = json!({
			"validator": "hubvaloper1xyz",
			"l1_tx_hash": "0xaaa",
			"l1_block_hash": "0xbbb",
			"l1_block_height": "19000000",
			"recipient": "hub1recipient",
			"amount": "1000000000000000000000",
			"denom": "wbtc"
		});
		let out = confirm_deposit(msg.as_object().unwrap()).unwrap();

		assert_eq!(out["validator_address"], "hubvaloper1xyz");
		assert_eq!(out["source_tx_hash"], "0xaaa");
		assert_eq!(out["source_height"], "19000000");
		assert_eq!(out["amount"], "1000000000000000000000");
	}

	#[test]
	fn withdrawal_requires_amount() {
		let msg = json!({"creator": "hub1me", "destination": "bc1q"});
		assert_eq!(
			request_withdrawal(msg.as_object().unwrap()).unwrap_err(),
			DecodeError::MissingField("amount".into())
		);
	}
}
