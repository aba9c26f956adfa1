//! Decoders for the zero-knowledge module.
//!
//! Shielded payloads are opaque here. `MsgShieldedTransfer`, `MsgShield` and `MsgUnshield` keep
//! their `payload` string so the enrichment worker can hand it to the decode service later.

use super::fields::{Coerce, apply, optional, required};
use super::types::{DecodeError, DecodeFn, Fields};

pub(super) const DECODERS: &[(&str, DecodeFn)] = &[
	("MsgShieldedTransfer", shielded_transfer),
	("MsgShield", shield),
	("MsgUnshield", unshield),
	("MsgDeployProgram", deploy_program),
	("MsgExecuteProgram", execute_program),
	("MsgUpdateVerifyingKey", update_verifying_key),
];

fn shielded_transfer(msg: &Fields) -> Result<Fields, DecodeError> {
	let out = apply(
		msg,
		&[
			required("sender", "sender_address", Coerce::Text),
			required("payload", "payload", Coerce::Text),
			optional("fee", "fee", Coerce::Amount),
		],
	)?;
	non_empty_payload(out)
}

fn shield(msg: &Fields) -> Result<Fields, DecodeError> {
	let out = apply(
		msg,
		&[
			required("sender", "sender_address", Coerce::Text),
			required("amount", "amount", Coerce::Amount),
			optional("denom", "denom", Coerce::Text),
			required("payload", "payload", Coerce::Text),
		],
	)?;
	non_empty_payload(out)
}

fn unshield(msg: &Fields) -> Result<Fields, DecodeError> {
	let out = apply(
		msg,
		&[
			required("recipient", "recipient_address", Coerce::Text),
			required("amount", "amount", Coerce::Amount),
			optional("denom", "denom", Coerce::Text),
			required("payload", "payload", Coerce::Text),
		],
	)?;
	non_empty_payload(out)
}

fn deploy_program(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("creator", "creator_address", Coerce::Text),
			required("program_id", "program_id", Coerce::Text),
			optional("program", "program", Coerce::Text),
		],
	)
}

fn execute_program(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("caller", "caller_address", Coerce::Text),
			required("program_id", "program_id", Coerce::Text),
			required("function", "function_name", Coerce::Text),
			optional("inputs", "inputs", Coerce::Raw),
			optional("fee", "fee", Coerce::Amount),
		],
	)
}

fn update_verifying_key(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("authority", "authority_address", Coerce::Text),
			required("circuit", "circuit_id", Coerce::Text),
			required("verifying_key", "verifying_key", Coerce::Text),
		],
	)
}

fn non_empty_payload(out: Fields) -> Result<Fields, DecodeError> {
	match out.get("payload").and_then(|p| p.as_str()) {
		Some(payload) if !payload.trim().is_empty() => Ok(out),
		_ => Err(DecodeError::invalid("payload", "empty payload")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn shielded_transfer_keeps_payload() {
		let msg = json!({"sender": "hub1s", "payload": "AAEC", "fee": 250});
		let out = shielded_transfer(msg.as_object().unwrap()).unwrap();
		assert_eq!(out["payload"], "AAEC");
		assert_eq!(out["fee"], "250");
	}

	#[test]
	fn empty_payload_is_rejected() {
		let msg = json!({"sender": "hub1s", "amount": "1", "payload": "  "});
		assert!(shield(msg.as_object().unwrap()).is_err());
	}
}
