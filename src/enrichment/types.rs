use crate::store::{DecodedPayload, StoreError};

use serde_json::Value;
use std::time::Duration;

/// Error types for enrichment
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Decode service returned status {0}")]
    Status(u16),

    #[error("Decode request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Decode service returned an empty result")]
    EmptyResult,

    #[error("Invalid decode result: {0}")]
    InvalidResult(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A structurally valid response from the decode service.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    pub inputs: Vec<Value>,
    pub outputs: Vec<Value>,
    pub summary: Option<Value>,
    /// The full response body.
    pub raw: Value,
}

impl DecodeResult {
    /// Validate a response body. `null` and `{}` are empty results.
    pub fn from_value(raw: Value) -> Result<Option<Self>, EnrichmentError> {
        let object = match &raw {
            Value::Null => return Ok(None),
            Value::Object(object) if object.is_empty() => return Ok(None),
            Value::Object(object) => object,
            _ => {
                return Err(EnrichmentError::InvalidResult(
                    "expected a JSON object".to_string(),
                ));
            }
        };

        let list = |field: &str| match object.get(field) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(EnrichmentError::InvalidResult(format!(
                "`{field}` is not a list"
            ))),
        };
        let inputs = list("inputs")?;
        let outputs = list("outputs")?;
        let summary = object.get("summary").filter(|s| !s.is_null()).cloned();

        if !["inputs", "outputs", "summary"]
            .iter()
            .any(|field| object.contains_key(*field))
        {
            return Err(EnrichmentError::InvalidResult(
                "no inputs, outputs or summary".to_string(),
            ));
        }

        Ok(Some(Self {
            inputs,
            outputs,
            summary,
            raw,
        }))
    }

    /// Coarse classification from `summary.type` (or `summary.programType`), lowercased.
    pub fn program_type(&self) -> String {
        self.summary
            .as_ref()
            .and_then(|summary| summary.get("type").or_else(|| summary.get("programType")))
            .and_then(Value::as_str)
            .map(|kind| kind.trim().to_lowercase())
            .filter(|kind| !kind.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn into_payload(self) -> DecodedPayload {
        let program_type = self.program_type();
        DecodedPayload {
            raw: self.raw,
            inputs: self.inputs,
            outputs: self.outputs,
            program_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_and_empty_bodies_are_empty_results() {
        assert!(DecodeResult::from_value(Value::Null).unwrap().is_none());
        assert!(DecodeResult::from_value(json!({})).unwrap().is_none());
    }

    #[test]
    fn program_type_is_lowercased_with_fallback() {
        let result = DecodeResult::from_value(json!({
            "inputs": [{"note": 1}],
            "outputs": [],
            "summary": {"programType": "Transfer"}
        }))
        .unwrap()
        .unwrap();
        assert_eq!(result.program_type(), "transfer");

        let bare = DecodeResult::from_value(json!({"inputs": []})).unwrap().unwrap();
        assert_eq!(bare.program_type(), "unknown");
    }

    #[test]
    fn malformed_lists_are_rejected() {
        assert!(DecodeResult::from_value(json!({"inputs": "nope"})).is_err());
        assert!(DecodeResult::from_value(json!({"unexpected": true})).is_err());
        assert!(DecodeResult::from_value(json!([1, 2])).is_err());
    }
}
