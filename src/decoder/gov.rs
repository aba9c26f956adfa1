//! Decoders for governance messages.

use super::fields::{Coerce, apply, optional, required};
use super::types::{DecodeError, DecodeFn, Fields};

use serde_json::Value;

pub(super) const DECODERS: &[(&str, DecodeFn)] = &[
	("MsgSubmitProposal", submit_proposal),
	("MsgVote", vote),
	("MsgVoteWeighted", vote_weighted),
	("MsgDeposit", deposit),
	("MsgCancelProposal", cancel_proposal),
	("MsgExecLegacyContent", exec_legacy_content),
];

fn submit_proposal(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("proposer", "proposer_address", Coerce::Text),
			optional("title", "title", Coerce::Text),
			optional("summary", "summary", Coerce::Text),
			optional("initial_deposit", "initial_deposit", Coerce::Coins),
			optional("messages", "messages", Coerce::Raw),
			optional("metadata", "metadata", Coerce::Text),
		],
	)
}

fn vote(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("proposal_id", "proposal_id", Coerce::Int),
			required("voter", "voter_address", Coerce::Text),
			required("option", "option", Coerce::Text),
			optional("metadata", "metadata", Coerce::Text),
		],
	)
}

/// Weighted votes keep their option list, with every weight rendered as text.
fn vote_weighted(msg: &Fields) -> Result<Fields, DecodeError> {
	let mut out = apply(
		msg,
		&[
			required("proposal_id", "proposal_id", Coerce::Int),
			required("voter", "voter_address", Coerce::Text),
			optional("metadata", "metadata", Coerce::Text),
		],
	)?;

	let options = match msg.get("options") {
		Some(Value::Array(options)) => options
			.iter()
			.map(|entry| {
				let option = entry
					.get("option")
					.cloned()
					.ok_or_else(|| DecodeError::invalid("options", "entry without option"))?;
				let weight = match entry.get("weight") {
					Some(Value::String(w)) => w.clone(),
					Some(Value::Number(w)) => w.to_string(),
					_ => return Err(DecodeError::invalid("options", "entry without weight")),
				};
				Ok(serde_json::json!({ "option": option, "weight": weight }))
			})
			.collect::<Result<Vec<_>, _>>()?,
		Some(_) => return Err(DecodeError::invalid("options", "expected a list")),
		None => Vec::new(),
	};
	out.insert("options".to_string(), Value::Array(options));
	Ok(out)
}

fn deposit(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("proposal_id", "proposal_id", Coerce::Int),
			required("depositor", "depositor_address", Coerce::Text),
			required("amount", "amount", Coerce::Coins),
		],
	)
}

fn cancel_proposal(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			required("proposal_id", "proposal_id", Coerce::Int),
			required("proposer", "proposer_address", Coerce::Text),
		],
	)
}

fn exec_legacy_content(msg: &Fields) -> Result<Fields, DecodeError> {
	apply(
		msg,
		&[
			optional("content", "content", Coerce::Raw),
			required("authority", "authority_address", Coerce::Text),
		],
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn vote_coerces_proposal_id() {
		let msg = json!({"proposal_id": "17", "voter": "hub1v", "option": "VOTE_OPTION_YES"});
		let out = vote(msg.as_object().unwrap()).unwrap();
		assert_eq!(out["proposal_id"], "17");
		assert_eq!(out["voter_address"], "hub1v");
	}

	#[test]
	fn weighted_vote_normalizes_weights() {
		let msg = json!({
			"proposal_id": 4,
			"voter": "hub1v",
			"options": [
				{"option": "VOTE_OPTION_YES", "weight": "0.700000000000000000"},
				{"option": "VOTE_OPTION_NO", "weight": 0.3}
			]
		});
		let out = vote_weighted(msg.as_object().unwrap()).unwrap();
		assert_eq!(out["options"][0]["weight"], "0.700000000000000000");
		assert_eq!(out["options"][1]["weight"], "0.3");
	}

	#[test]
	fn deposit_accepts_coin_list() {
		let msg = json!({
			"proposal_id": "2",
			"depositor": "hub1d",
			"amount": [{"denom": "uhub", "amount": "10"}]
		});
		let out = deposit(msg.as_object().unwrap()).unwrap();
		assert_eq!(out["amount"], json!([{"denom": "uhub", "amount": "10"}]));
	}
}
