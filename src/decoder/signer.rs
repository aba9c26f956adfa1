//! Decoders for the signer-set module.

use super::fields::{Coerce, apply, optional, required};
use super::types::{DecodeError, DecodeFn, Fields};

pub(super) const DECODERS: &[(&str, DecodeFn)] = &[
	("MsgRegisterSigner", register_signer),
	("MsgDeregisterSigner", deregister_signer),
	("MsgRotateSignerKey", rotate_signer_key),
	("MsgBroadcastSignature", broadcast_signature),
	("MsgSignerHeartbeat", signer_heartbeat),
];

fn register_signer(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("operator", "signer_address", Coerce::Text),
			required("pubkey", "pubkey", Coerce::Text),
			optional("moniker", "moniker", Coerce::Text),
		],
	)
}

fn deregister_signer(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(msg, &[required("operator", "signer_address", Coerce::Text)])
}

fn rotate_signer_key(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("operator", "signer_address", Coerce::Text),
			required("new_pubkey", "pubkey", Coerce::Text),
		],
	)
}

fn broadcast_signature(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("signer", "signer_address", Coerce::Text),
			optional("withdrawal_id", "withdrawal_id", Coerce::Text),
			required("signature", "signature", Coerce::Text),
			optional("round", "round", Coerce::Int),
		],
	)
}

fn signer_heartbeat(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("operator", "signer_address", Coerce::Text),
			optional("block_height", "reported_height", Coerce::Int),
		],
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn rotate_key_stores_new_key_as_pubkey() {
		let msg = json!({"operator": "hub1op", "new_pubkey": "AnewKey"});
		let out = rotate_signer_key(msg.as_object().unwrap()).unwrap();
		assert_eq!(out["signer_address"], "hub1op");
		assert_eq!(out["pubkey"], "AnewKey");
	}

	#[test]
	fn broadcast_round_is_numeric() {
		let msg = json!({"signer": "hub1s", "signature": "sig", "round": "3"});
		let out = broadcast_signature(msg.as_object().unwrap()).unwrap();
		assert_eq!(out["round"], "3");
		assert!(!out.contains_key("withdrawal_id"));
	}
}
