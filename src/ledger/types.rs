//! Types for the ledger REST gateway

use crate::utils::decimal;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Block identifier as returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BlockId {
    #[serde(default)]
    pub hash: String,
}

/// Block header fields the indexer relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    #[serde(with = "decimal::u64_string")]
    pub height: u64,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub proposer_address: String,
    /// Identifier of the parent block; absent on the genesis block.
    #[serde(default)]
    pub last_block_id: Option<BlockId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockBody {
    pub header: BlockHeader,
}

/// Response of `/cosmos/base/tendermint/v1beta1/blocks/{height}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResponse {
    pub block_id: BlockId,
    pub block: BlockBody,
}

/// A denominated amount. The amount stays a string on the wire and on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Fee {
    #[serde(default)]
    pub amount: Vec<Coin>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SignerInfo {
    /// `{"@type": "...PubKey", "key": "<base64>"}`
    #[serde(default)]
    pub public_key: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthInfo {
    #[serde(default)]
    pub signer_infos: Vec<SignerInfo>,
    #[serde(default)]
    pub fee: Fee,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TxBody {
    /// Ordered messages, each an object carrying its `@type` discriminator.
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub memo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RawTx {
    #[serde(default)]
    pub body: TxBody,
    #[serde(default)]
    pub auth_info: AuthInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventAttribute {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// An event emitted by the ledger while executing a transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbciEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxResponse {
    pub txhash: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub raw_log: String,
    #[serde(with = "decimal::u64_string", default)]
    pub gas_wanted: u64,
    #[serde(with = "decimal::u64_string", default)]
    pub gas_used: u64,
    #[serde(default)]
    pub events: Vec<AbciEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Pagination {
    #[serde(default)]
    pub next_key: Option<String>,
}

/// Response of `/cosmos/tx/v1beta1/txs/block/{height}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TxsByBlockResponse {
    #[serde(default)]
    pub txs: Vec<RawTx>,
    #[serde(default)]
    pub tx_responses: Vec<TxResponse>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// Normalized block header handed to the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerBlock {
    pub height: u64,
    pub hash: String,
    pub time: DateTime<Utc>,
    pub proposer: String,
    /// Hash of block `height - 1` as recorded in this header.
    pub last_block_hash: Option<String>,
}

impl From<BlockResponse> for LedgerBlock {
    fn from(response: BlockResponse) -> Self {
        let header = response.block.header;
        Self {
            height: header.height,
            hash: response.block_id.hash,
            time: header.time,
            proposer: header.proposer_address,
            last_block_hash: header
                .last_block_id
                .map(|id| id.hash)
                .filter(|hash| !hash.is_empty()),
        }
    }
}

/// A transaction with its execution result, zipped from the `txs` and `tx_responses` lists.
#[derive(Debug, Clone)]
pub struct LedgerTx {
    pub hash: String,
    pub code: u32,
    pub raw_log: String,
    pub gas_used: u64,
    pub gas_wanted: u64,
    pub fee: Vec<Coin>,
    pub memo: String,
    pub signer_keys: Vec<String>,
    pub messages: Vec<Value>,
    pub events: Vec<AbciEvent>,
}

impl LedgerTx {
    pub fn from_parts(tx: RawTx, response: TxResponse) -> Self {
        let signer_keys = tx
            .auth_info
            .signer_infos
            .iter()
            .filter_map(|info| info.public_key.as_ref())
            .filter_map(|key| key.get("key").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        Self {
            hash: response.txhash,
            code: response.code,
            raw_log: response.raw_log,
            gas_used: response.gas_used,
            gas_wanted: response.gas_wanted,
            fee: tx.auth_info.fee.amount,
            memo: tx.body.memo,
            signer_keys,
            messages: tx.body.messages,
            events: response.events,
        }
    }
}

/// Error types for ledger gateway calls
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Ledger returned status {status} for {path}")]
    Status { status: u16, path: String },

    #[error("Malformed ledger response: {0}")]
    Malformed(String),
}
