//!
//! HTTP client for the external decode service.
//!
//! The service takes a raw shielded payload and returns its decoded inputs, outputs and summary.

use super::types::*;
use crate::config::EnrichmentConfig;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::trace;

#[async_trait]
pub trait DecodeApi: Send + Sync {
	/// Decode one payload. `Ok(None)` means the service answered with an empty result.
	async fn decode(&self, payload: &str) -> Result<Option<DecodeResult>, EnrichmentError>;
}

/// Decode service client
#[derive(Clone)]
pub struct DecodeClient {
	http_client: Client,
	url: String,
}

impl DecodeClient {
	/// Create a new decode client.
	///
	/// # Arguments
	/// * `config` - Service URL and request timeout.
	///
	/// # Errors
	/// Returns `EnrichmentError` if the HTTP client cannot be built.
	pub fn new(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
		let http_client = Client::builder()
			.timeout(config.request_timeout())
			.build()?;

		Ok(Self {
			http_client,
			url: config.decode_url.clone(),
		})
	}
}

#[async_trait]
impl DecodeApi for DecodeClient {
	async fn decode(&self, payload: &str) -> Result<Option<DecodeResult>, EnrichmentError> {
		trace!("POST {} ({} payload bytes)", self.url, payload.len());

		let response = self
			.http_client
			.post(&self.url)
			.json(&json!({ "tx": payload }))
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(EnrichmentError::Status(response.status().as_u16()));
		}

		let body = response.bytes().await?;
		if body.iter().all(u8::is_ascii_whitespace) {
			return Ok(None);
		}

		let value: Value = serde_json::from_slice(&body)?;
		DecodeResult::from_value(value)
	}
}
