//!
//! Utility module for the ledger indexer.
//!
//! Serde helpers for the ledger's decimal-string integers and small identity helpers shared by
//! the sync engine and the enrichment worker.
/// Decimal-string (de)serialization for wide integers
pub mod decimal;

use rand::Rng;

/// Random hex identifier for this process, used as the lease holder name.
pub fn generate_instance_id() -> String {
	let mut seed = [0u8; 16];
	rand::rng().fill(&mut seed);
	hex::encode(seed)
}

/// Lowercase a hex-looking hash so values from different endpoints compare equal.
///
/// Anything that is not valid hex (e.g. base64 block ids) is returned unchanged.
pub fn normalize_hash(hash: &str) -> String {
	if !hash.is_empty() && hex::decode(hash).is_ok() {
		hash.to_ascii_lowercase()
	} else {
		hash.to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn instance_ids_are_distinct_hex() {
		let a = generate_instance_id();
		let b = generate_instance_id();
		assert_eq!(a.len(), 32);
		assert!(hex::decode(&a).is_ok());
		assert_ne!(a, b);
	}

	#[test]
	fn normalize_hash_only_touches_hex() {
		assert_eq!(normalize_hash("ABCDEF01"), "abcdef01");
		assert_eq!(normalize_hash("q83vAQ=="), "q83vAQ==");
		assert_eq!(normalize_hash(""), "");
	}
}
