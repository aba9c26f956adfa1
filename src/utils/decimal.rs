//! Wide integers travel as decimal strings.
//!
//! The ledger gateway encodes heights, gas and amounts as strings, and everything published on the
//! event bus keeps that convention so consumers never lose precision. These modules are used with
//! `#[serde(with = "...")]`.

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
	String(String),
	Number(serde_json::Number),
}

impl StringOrNumber {
	fn into_text(self) -> String {
		match self {
			StringOrNumber::String(s) => s.trim().to_string(),
			StringOrNumber::Number(n) => n.to_string(),
		}
	}
}

/// Parse a non-negative decimal integer of any width. Leading zeros are accepted.
pub fn parse_amount(text: &str) -> Option<BigUint> {
	let text = text.trim();
	if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}
	BigUint::parse_bytes(text.as_bytes(), 10)
}

/// Parse a non-negative decimal integer that must fit in 64 bits.
pub fn parse_u64(text: &str) -> Option<u64> {
	let text = text.trim();
	if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}
	text.parse().ok()
}

/// `u64` as a decimal string; accepts either a string or a JSON number on input.
pub mod u64_string {
	use super::*;
	use serde::de::Error as _;

	pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&value.to_string())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
		let text = StringOrNumber::deserialize(deserializer)?.into_text();
		parse_u64(&text).ok_or_else(|| D::Error::custom(format!("invalid integer: {text}")))
	}
}

/// `Option<u64>` as an optional decimal string.
pub mod opt_u64_string {
	use super::*;
	use serde::de::Error as _;

	pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
		match value {
			Some(v) => serializer.serialize_str(&v.to_string()),
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(
		deserializer: D,
	) -> Result<Option<u64>, D::Error> {
		match Option::<StringOrNumber>::deserialize(deserializer)? {
			Some(raw) => {
				let text = raw.into_text();
				parse_u64(&text)
					.map(Some)
					.ok_or_else(|| D::Error::custom(format!("invalid integer: {text}")))
			}
			None => Ok(None),
		}
	}
}

/// Arbitrary-precision amount as a decimal string.
pub mod biguint {
	use super::*;
	use serde::de::Error as _;

	pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&value.to_str_radix(10))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
		let text = StringOrNumber::deserialize(deserializer)?.into_text();
		parse_amount(&text).ok_or_else(|| D::Error::custom(format!("invalid amount: {text}")))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde::Serialize;

	#[derive(Serialize, Deserialize, Debug, PartialEq)]
	struct Sample {
		#[serde(with = "u64_string")]
		height: u64,
		#[serde(with = "biguint")]
		amount: BigUint,
		#[serde(with = "opt_u64_string", default)]
		round: Option<u64>,
	}

	#[test]
	fn accepts_strings_and_numbers() {
		let a: Sample =
			serde_json::from_str(r#"{"height":"100","amount":12,"round":null}"#).unwrap();
		let b: Sample = serde_json::from_str(r#"{"height":100,"amount":"0012"}"#).unwrap();
		assert_eq!(a, b);
		assert_eq!(a.amount, BigUint::from(12u32));
	}

	#[test]
	fn wide_amounts_round_trip_as_decimal_strings() {
		let text = "340282366920938463463374607431768211457"; // u128::MAX + 2
		let json = format!(r#"{{"height":"1","amount":"{text}","round":"7"}}"#);
		let sample: Sample = serde_json::from_str(&json).unwrap();
		let out = serde_json::to_value(&sample).unwrap();
		assert_eq!(out["amount"], text);
		assert_eq!(out["height"], "1");
		assert_eq!(out["round"], "7");
	}

	#[test]
	fn rejects_signed_and_fractional_values() {
		assert!(parse_amount("-5").is_none());
		assert!(parse_amount("1.5").is_none());
		assert!(parse_amount("").is_none());
		assert!(parse_u64("18446744073709551616").is_none());
		assert_eq!(parse_u64(" 42 "), Some(42));
	}
}
