use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map of a ledger message or of its decoded form.
pub type Fields = Map<String, Value>;

/// A typed decoder: pure field renaming and coercion, no I/O.
pub type DecodeFn = fn(&Fields) -> Result<Fields, DecodeError>;

/// Key of the type discriminator carried by every ledger message.
pub const TYPE_KEY: &str = "@type";

/// Message families with dedicated decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Bridge,
    Signer,
    Zk,
    Gov,
}

impl Module {
    /// Namespace match order. `zk` is the shortest needle, so it is tried last.
    const MATCH_ORDER: [Module; 4] = [Module::Bridge, Module::Signer, Module::Gov, Module::Zk];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Bridge => "bridge",
            Module::Signer => "signer",
            Module::Zk => "zk",
            Module::Gov => "gov",
        }
    }

    /// Select the module whose name appears in a type identifier's namespace.
    pub fn from_namespace(namespace: &str) -> Option<Module> {
        let namespace = namespace.to_ascii_lowercase();
        Self::MATCH_ORDER
            .into_iter()
            .find(|module| namespace.contains(module.as_str()))
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split `/hub.bridge.v1.MsgConfirmDeposit` into `("hub.bridge.v1", "MsgConfirmDeposit")`.
pub fn split_type_url(type_url: &str) -> (&str, &str) {
    let trimmed = type_url.trim_start_matches('/');
    trimmed.rsplit_once('.').unwrap_or(("", trimmed))
}

/// A ledger message after registry dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedMessage {
    /// Full type identifier, e.g. `/hub.bridge.v1.MsgConfirmDeposit`.
    #[serde(rename = "type")]
    pub type_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<Module>,
    /// `false` when `data` is the structural passthrough.
    pub decoded: bool,
    pub data: Fields,
}

impl DecodedMessage {
    /// Final segment of the type identifier.
    pub fn name(&self) -> &str {
        split_type_url(&self.type_url).1
    }

    pub fn is(&self, module: Module, name: &str) -> bool {
        self.decoded && self.module == Some(module) && self.name() == name
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// Integer field, from its decimal-string form or a plain JSON number.
    pub fn int(&self, field: &str) -> Option<u64> {
        match self.data.get(field)? {
            Value::String(s) => crate::utils::decimal::parse_u64(s),
            value => value.as_u64(),
        }
    }
}

/// Error types for a single message decode
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Message is not a JSON object")]
    NotAnObject,

    #[error("Missing required field `{0}`")]
    MissingField(String),

    #[error("Invalid field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },
}

impl DecodeError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        DecodeError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
