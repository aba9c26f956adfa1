//! Type-dispatch registry for ledger messages.

use super::types::{DecodeError, DecodeFn, DecodedMessage, Fields, Module, TYPE_KEY, split_type_url};
use super::{bridge, gov, signer, zk};

use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Maps `(module, message name)` to a decoder. Anything without an entry takes the passthrough arm.
#[derive(Debug, Clone, Default)]
pub struct DecoderRegistry {
	modules: HashMap<Module, HashMap<&'static str, DecodeFn>>,
}

impl DecoderRegistry {
	/// An empty registry: every message passes through.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registry with the bridge, signer, zk and governance decoders installed.
	pub fn with_defaults() -> Self {
		let mut registry = Self::new();
		for (module, decoders) in [
			(Module::Bridge, bridge::DECODERS),
			(Module::Signer, signer::DECODERS),
			(Module::Zk, zk::DECODERS),
			(Module::Gov, gov::DECODERS),
		] {
			for &(name, decoder) in decoders {
				registry.register(module, name, decoder);
			}
		}
		registry
	}

	/// Install `decoder` for messages named `name` in `module`, replacing any previous entry.
	pub fn register(&mut self, module: Module, name: &'static str, decoder: DecodeFn) {
		self.modules.entry(module).or_default().insert(name, decoder);
	}

	/// Number of registered decoders across all modules.
	pub fn len(&self) -> usize {
		self.modules.values().map(HashMap::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Decode a message, surfacing decoder errors.
	pub fn try_decode(&self, raw: &Value) -> Result<DecodedMessage, DecodeError> {
		let fields = raw.as_object().ok_or(DecodeError::NotAnObject)?;
		let type_url = fields
			.get(TYPE_KEY)
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();

		let (namespace, name) = split_type_url(&type_url);
		let module = Module::from_namespace(namespace);
		let decoder = module
			.and_then(|m| self.modules.get(&m))
			.and_then(|decoders| decoders.get(name));

		match decoder {
			Some(decoder) => {
				let data = decoder(fields)?;
				Ok(DecodedMessage {
					type_url,
					module,
					decoded: true,
					data,
				})
			}
			None => Ok(passthrough(type_url, module, fields)),
		}
	}

	/// Decode a message. Never fails: decoder errors fall back to the passthrough representation.
	pub fn decode(&self, raw: &Value) -> DecodedMessage {
		match self.try_decode(raw) {
			Ok(message) => message,
			Err(e) => {
				let fields = raw.as_object().cloned().unwrap_or_default();
				let type_url = fields
					.get(TYPE_KEY)
					.and_then(Value::as_str)
					.unwrap_or_default()
					.to_string();
				debug!("Falling back to passthrough for {:?}: {}", type_url, e);
				let module = Module::from_namespace(split_type_url(&type_url).0);
				passthrough(type_url, module, &fields)
			}
		}
	}
}

/// Copy every field except the type discriminator.
fn passthrough(type_url: String, module: Option<Module>, fields: &Fields) -> DecodedMessage {
	let data = fields
		.iter()
		.filter(|(key, _)| key.as_str() != TYPE_KEY)
		.map(|(key, value)| (key.clone(), value.clone()))
		.collect();

	DecodedMessage {
		type_url,
		module,
		decoded: false,
		data,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn default_registry_has_all_decoders() {
		let registry = DecoderRegistry::with_defaults();
		assert_eq!(registry.len(), 23);
	}

	#[test]
	fn dispatches_on_module_and_name() {
		let registry = DecoderRegistry::with_defaults();
		let message = registry.decode(&json!({
			"@type": "/hub.bridge.v1.MsgCancelWithdrawal",
			"creator": "hub1me",
			"withdrawal_id": "w-1"
		}));

		assert!(message.decoded);
		assert_eq!(message.module, Some(Module::Bridge));
		assert_eq!(message.name(), "MsgCancelWithdrawal");
		assert_eq!(message.text("requester_address"), Some("hub1me"));
	}

	#[test]
	fn unknown_type_passes_through_without_discriminator() {
		let registry = DecoderRegistry::with_defaults();
		let raw = json!({
			"@type": "/cosmos.bank.v1beta1.MsgSend",
			"from_address": "hub1a",
			"to_address": "hub1b",
			"amount": [{"denom": "uhub", "amount": "5"}]
		});
		let message = registry.try_decode(&raw).unwrap();

		assert!(!message.decoded);
		assert_eq!(message.module, None);
		assert_eq!(message.type_url, "/cosmos.bank.v1beta1.MsgSend");
		assert_eq!(message.data.len(), 3);
		assert!(!message.data.contains_key("@type"));
		assert_eq!(message.data["to_address"], "hub1b");
	}

	#[test]
	fn unknown_name_in_known_module_passes_through() {
		let registry = DecoderRegistry::with_defaults();
		let message = registry.decode(&json!({"@type": "/hub.zk.v1.MsgFutureThing", "x": 1}));
		assert!(!message.decoded);
		assert_eq!(message.module, Some(Module::Zk));
		assert_eq!(message.data["x"], 1);
	}

	#[test]
	fn decoder_error_falls_back_to_passthrough() {
		let registry = DecoderRegistry::with_defaults();
		let raw = json!({"@type": "/hub.gov.v1.MsgVote", "proposal_id": "not-a-number", "voter": "hub1v"});

		assert!(registry.try_decode(&raw).is_err());

		let message = registry.decode(&raw);
		assert!(!message.decoded);
		assert_eq!(message.data["proposal_id"], "not-a-number");
	}

	#[test]
	fn non_object_message_is_tolerated() {
		let registry = DecoderRegistry::with_defaults();
		let message = registry.decode(&json!("garbage"));
		assert!(!message.decoded);
		assert!(message.type_url.is_empty());
		assert!(message.data.is_empty());
	}

	#[test]
	fn custom_decoders_can_be_registered() {
		fn marker(_: &Fields) -> Result<Fields, DecodeError> {
			let mut out = Fields::new();
			out.insert("seen".into(), Value::Bool(true));
			Ok(out)
		}

		let mut registry = DecoderRegistry::new();
		assert!(registry.is_empty());
		registry.register(Module::Signer, "MsgPing", marker);
		let message = registry.decode(&json!({"@type": "/hub.signer.v2.MsgPing"}));
		assert!(message.decoded);
		assert_eq!(message.data["seen"], true);
	}
}
