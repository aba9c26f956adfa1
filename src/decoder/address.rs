//! Participant address discovery in decoded message data.
//!
//! A string counts as an address when its key mentions "address" (case-insensitive), or when it
//! decodes as bech32 with the ledger's human-readable prefix. This is a heuristic over untyped
//! data and is allowed to miss or over-match.
//!
//! The prefix match needs a valid bech32 checksum: a value that merely starts with the prefix,
//! such as `hub-legacy-signer` or a truncated address, only counts when its key names an address.

use super::types::Fields;

use itertools::Itertools;
use serde_json::Value;

/// Collect candidate addresses from `data`, in first-seen order without duplicates.
pub fn extract_addresses(data: &Fields, prefix: &str) -> Vec<String> {
	let mut found = Vec::new();
	for (key, value) in data {
		visit(Some(key), value, prefix, &mut found);
	}
	found.into_iter().unique().collect()
}

fn visit(key: Option<&str>, value: &Value, prefix: &str, found: &mut Vec<String>) {
	match value {
		Value::String(text) => {
			let keyed = key.is_some_and(|k| k.to_ascii_lowercase().contains("address"));
			if !text.is_empty() && (keyed || has_prefix(text, prefix)) {
				found.push(text.clone());
			}
		}
		// List elements inherit the list's key, so `signer_addresses: [..]` is picked up.
		Value::Array(items) => {
			for item in items {
				visit(key, item, prefix, found);
			}
		}
		Value::Object(map) => {
			for (k, v) in map {
				visit(Some(k), v, prefix, found);
			}
		}
		_ => {}
	}
}

/// True when `text` is checksum-valid bech32 whose human-readable part equals `prefix`.
fn has_prefix(text: &str, prefix: &str) -> bool {
	match bech32::decode(text) {
		Ok((hrp, _)) => hrp.to_lowercase() == prefix.to_ascii_lowercase(),
		Err(_) => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bech32::{Bech32, Hrp};
	use serde_json::json;

	fn address(hrp: &str, byte: u8) -> String {
		bech32::encode::<Bech32>(Hrp::parse(hrp).unwrap(), &[byte; 20]).unwrap()
	}

	#[test]
	fn keyed_and_prefixed_strings_are_found() {
		let alice = address("hub", 1);
		let bob = address("hub", 2);
		let foreign = address("cosmos", 3);
		let data = json!({
			"validator_address": "hubvaloper-not-bech32",
			"memo_recipient": bob,
			"nested": {"from_address": alice, "other": foreign},
			"signer_addresses": [alice, "hub-legacy-signer"],
			"amount": "100"
		});

		let found = extract_addresses(data.as_object().unwrap(), "hub");
		// Keys are visited in map order.
		assert_eq!(
			found,
			vec![
				bob.clone(),
				alice.clone(),
				"hub-legacy-signer".to_string(),
				"hubvaloper-not-bech32".to_string(),
			]
		);
		assert!(!found.contains(&foreign));
	}

	#[test]
	fn prefix_match_requires_a_valid_checksum() {
		let valid = address("hub", 4);
		let mut corrupted = valid.clone();
		let last = if corrupted.ends_with('q') { 'p' } else { 'q' };
		corrupted.pop();
		corrupted.push(last);

		let data = json!({
			"signer": "hub-legacy-signer",
			"relayer": corrupted,
			"owner": valid,
			"signer_address": "hub-legacy-signer"
		});

		let found = extract_addresses(data.as_object().unwrap(), "hub");
		assert_eq!(found, vec![valid.clone(), "hub-legacy-signer".to_string()]);
		assert!(has_prefix(&valid, "HUB"));
		assert!(!has_prefix("hub1qqqq", "hub"));
	}

	#[test]
	fn non_string_and_empty_values_are_ignored() {
		let data = json!({"address": "", "owner_address": 42, "ADDRESS_list": null});
		assert!(extract_addresses(data.as_object().unwrap(), "hub").is_empty());
	}
}
