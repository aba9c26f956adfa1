//!
//! REST client for the ledger's read gateway.
//!
//! This module provides an async client for the three reads the sync engine needs: the latest
//! block, a block by height, and the transactions of a block. Every request is bounded by the
//! configured timeout so a stalled gateway cannot stall ingestion.

use super::types::*;
use crate::config::LedgerConfig;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

/// Read access to the ledger, one height at a time.
#[async_trait]
pub trait LedgerApi: Send + Sync {
	/// Height of the current chain head.
	async fn latest_height(&self) -> Result<u64, LedgerError>;

	/// Header of the block at `height`.
	async fn block(&self, height: u64) -> Result<LedgerBlock, LedgerError>;

	/// All transactions of the block at `height`, in block order. Empty blocks yield an empty list.
	async fn transactions(&self, height: u64) -> Result<Vec<LedgerTx>, LedgerError>;
}

/// Ledger REST gateway client
#[derive(Clone)]
pub struct LedgerClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL of the gateway, without a trailing slash.
	base_url: String,
	/// Transactions requested per page.
	page_limit: u32,
}

impl LedgerClient {
	/// Create a new ledger client.
	///
	/// # Arguments
	/// * `config` - Gateway URL, request timeout and page size.
	///
	/// # Errors
	/// Returns `LedgerError` if the HTTP client cannot be built.
	pub fn new(config: &LedgerConfig) -> Result<Self, LedgerError> {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(config.request_timeout_secs))
			.build()?;

		Ok(Self {
			http_client,
			base_url: config.url.trim_end_matches('/').to_string(),
			page_limit: config.page_limit.max(1),
		})
	}

	/// GET `path` and decode the JSON body.
	async fn get_json<T: DeserializeOwned>(
		&self,
		path: &str,
		query: &[(&str, String)],
	) -> Result<T, LedgerError> {
		let url = format!("{}{}", self.base_url, path);
		trace!("GET {} {:?}", url, query);

		let response = self.http_client.get(&url).query(query).send().await?;

		if !response.status().is_success() {
			return Err(LedgerError::Status {
				status: response.status().as_u16(),
				path: path.to_string(),
			});
		}

		let body = response.bytes().await?;
		Ok(serde_json::from_slice(&body)?)
	}
}

#[async_trait]
impl LedgerApi for LedgerClient {
	async fn latest_height(&self) -> Result<u64, LedgerError> {
		let response: BlockResponse = self
			.get_json("/cosmos/base/tendermint/v1beta1/blocks/latest", &[])
			.await?;
		Ok(response.block.header.height)
	}

	async fn block(&self, height: u64) -> Result<LedgerBlock, LedgerError> {
		let path = format!("/cosmos/base/tendermint/v1beta1/blocks/{height}");
		let response: BlockResponse = self.get_json(&path, &[]).await?;

		if response.block.header.height != height {
			return Err(LedgerError::Malformed(format!(
				"requested block {} but gateway returned {}",
				height, response.block.header.height
			)));
		}

		Ok(response.into())
	}

	async fn transactions(&self, height: u64) -> Result<Vec<LedgerTx>, LedgerError> {
		let path = format!("/cosmos/tx/v1beta1/txs/block/{height}");
		let mut transactions = Vec::new();
		let mut page_key: Option<String> = None;

		loop {
			let mut query = vec![("pagination.limit", self.page_limit.to_string())];
			if let Some(key) = &page_key {
				query.push(("pagination.key", key.clone()));
			}

			let page: TxsByBlockResponse = self.get_json(&path, &query).await?;

			if page.txs.len() != page.tx_responses.len() {
				return Err(LedgerError::Malformed(format!(
					"block {} returned {} txs but {} tx responses",
					height,
					page.txs.len(),
					page.tx_responses.len()
				)));
			}

			transactions.extend(
				page.txs
					.into_iter()
					.zip(page.tx_responses)
					.map(|(tx, response)| LedgerTx::from_parts(tx, response)),
			);

			page_key = page
				.pagination
				.and_then(|p| p.next_key)
				.filter(|key| !key.is_empty());

			if page_key.is_none() {
				break;
			}
		}

		debug!(
			"Fetched {} transactions for block {}",
			transactions.len(),
			height
		);
		Ok(transactions)
	}
}
