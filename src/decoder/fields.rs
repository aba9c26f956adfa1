//! Declarative field rules shared by the module decoders.
//!
//! A decoder is a list of [`FieldRule`]s: each names a source field, the key it is stored under,
//! and how its value is coerced. Numeric coercions accept both decimal strings and JSON numbers,
//! since the ledger's JSON encoding emits 64-bit and wider integers as strings.

use super::types::{DecodeError, Fields};
use crate::utils::decimal;

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coerce {
	/// String as-is; numbers and booleans are rendered as text
	Text,
	/// 64-bit unsigned integer, stored as a canonical decimal string
	Int,
	/// Arbitrary-precision unsigned amount, stored as a canonical decimal string
	Amount,
	/// `[{denom, amount}]` with canonical amounts; a single coin object is wrapped in a list
	Coins,
	/// Copied unchanged
	Raw,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
	pub from: &'static str,
	pub to: &'static str,
	pub coerce: Coerce,
	pub required: bool,
}

pub const fn required(from: &'static str, to: &'static str, coerce: Coerce) -> FieldRule {
	FieldRule {
		from,
		to,
		coerce,
		required: true,
	}
}

pub const fn optional(from: &'static str, to: &'static str, coerce: Coerce) -> FieldRule {
	FieldRule {
		from,
		to,
		coerce,
		required: false,
	}
}

/// Apply `rules` to a raw message. Absent or `null` optional fields are omitted from the output.
pub fn apply(raw: &Fields, rules: &[FieldRule]) -> Result<Fields, DecodeError> {
	let mut out = Map::with_capacity(rules.len());
	for rule in rules {
		match raw.get(rule.from) {
			None | Some(Value::Null) => {
				if rule.required {
					return Err(DecodeError::MissingField(rule.from.to_string()));
				}
			}
			Some(value) => {
				out.insert(rule.to.to_string(), coerce(rule.from, value, rule.coerce)?);
			}
		}
	}
	Ok(out)
}

fn coerce(field: &str, value: &Value, kind: Coerce) -> Result<Value, DecodeError> {
	match kind {
		Coerce::Text => match value {
			Value::String(s) => Ok(Value::String(s.clone())),
			Value::Number(n) => Ok(Value::String(n.to_string())),
			Value::Bool(b) => Ok(Value::String(b.to_string())),
			_ => Err(DecodeError::invalid(field, "expected a string")),
		},
		Coerce::Int => {
			let parsed = match value {
				Value::String(s) => decimal::parse_u64(s),
				Value::Number(n) => n.as_u64(),
				_ => None,
			};
			parsed
				.map(|n| Value::String(n.to_string()))
				.ok_or_else(|| DecodeError::invalid(field, "expected an unsigned 64-bit integer"))
		}
		Coerce::Amount => amount(field, value).map(Value::String),
		Coerce::Coins => match value {
			Value::Array(items) => items
				.iter()
				.map(|item| coin(field, item))
				.collect::<Result<Vec<_>, _>>()
				.map(Value::Array),
			Value::Object(_) => Ok(Value::Array(vec![coin(field, value)?])),
			_ => Err(DecodeError::invalid(field, "expected a coin list")),
		},
		Coerce::Raw => Ok(value.clone()),
	}
}

fn amount(field: &str, value: &Value) -> Result<String, DecodeError> {
	let text = match value {
		Value::String(s) => s.clone(),
		Value::Number(n) => n.to_string(),
		_ => return Err(DecodeError::invalid(field, "expected an amount")),
	};
	decimal::parse_amount(&text)
		.map(|n| n.to_str_radix(10))
		.ok_or_else(|| DecodeError::invalid(field, format!("invalid amount `{text}`")))
}

fn coin(field: &str, value: &Value) -> Result<Value, DecodeError> {
	let denom = value
		.get("denom")
		.and_then(Value::as_str)
		.ok_or_else(|| DecodeError::invalid(field, "coin without denom"))?;
	let amount = amount(field, value.get("amount").unwrap_or(&Value::Null))?;
	Ok(serde_json::json!({ "denom": denom, "amount": amount }))
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn fields(value: Value) -> Fields {
		value.as_object().cloned().unwrap()
	}

	#[test]
	fn renames_and_coerces() {
		let raw = fields(json!({
			"creator": "hub1abc",
			"amount": "000123456789012345678901234567890",
			"height": "42",
			"extra": "dropped"
		}));
		let out = apply(
			&raw,
			&[
				required("creator", "creator_address", Coerce::Text),
				required("amount", "amount", Coerce::Amount),
				optional("height", "height", Coerce::Int),
			],
		)
		.unwrap();

		assert_eq!(out["creator_address"], "hub1abc");
		assert_eq!(out["amount"], "123456789012345678901234567890");
		assert_eq!(out["height"], "42");
		assert!(!out.contains_key("extra"));
	}

	#[test]
	fn integers_above_double_precision_stay_exact() {
		let raw = fields(json!({"nonce": "18446744073709551615", "height": 9007199254740993u64}));
		let out = apply(
			&raw,
			&[
				required("nonce", "nonce", Coerce::Int),
				required("height", "height", Coerce::Int),
			],
		)
		.unwrap();

		assert_eq!(out["nonce"], "18446744073709551615");
		assert_eq!(out["height"], "9007199254740993");
	}

	#[test]
	fn missing_required_field_is_an_error() {
		let raw = fields(json!({"amount": "5"}));
		let err = apply(&raw, &[required("creator", "creator_address", Coerce::Text)]).unwrap_err();
		assert_eq!(err, DecodeError::MissingField("creator".into()));
	}

	#[test]
	fn null_optional_field_is_omitted() {
		let raw = fields(json!({"denom": null}));
		let out = apply(&raw, &[optional("denom", "denom", Coerce::Text)]).unwrap();
		assert!(out.is_empty());
	}

	#[test]
	fn coins_accept_list_or_single_object() {
		let list = coerce(
			"deposit",
			&json!([{"denom": "uhub", "amount": "007"}]),
			Coerce::Coins,
		)
		.unwrap();
		assert_eq!(list, json!([{"denom": "uhub", "amount": "7"}]));

		let single = coerce("deposit", &json!({"denom": "uhub", "amount": 9}), Coerce::Coins).unwrap();
		assert_eq!(single, json!([{"denom": "uhub", "amount": "9"}]));
	}

	#[test]
	fn rejects_negative_amounts_and_bad_ints() {
		assert!(coerce("amount", &json!("-1"), Coerce::Amount).is_err());
		assert!(coerce("round", &json!("x"), Coerce::Int).is_err());
		assert!(coerce("round", &json!(-3), Coerce::Int).is_err());
	}
}
