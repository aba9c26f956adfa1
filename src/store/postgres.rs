//! PostgreSQL store.
//!
//! Heights are stored as `BIGINT`; gas and token amounts as `NUMERIC`, bound and read back as
//! decimal text so no amount is ever squeezed through a fixed-width integer.

use super::Store;
use super::types::*;
use crate::config::DatabaseConfig;
use crate::utils::decimal;

use async_trait::async_trait;
use backoff::{ExponentialBackoff, future::retry};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, warn};

const SCHEMA: &str = include_str!("schema.sql");
const CHECKPOINT_KEY: &str = "last_indexed_height";

const DEPOSIT_COLUMNS: &str = "source_tx_hash, source_block_hash, source_height, recipient, \
	amount::TEXT AS amount, denom, vote_count, tx_hash, height";
const WITHDRAWAL_COLUMNS: &str = "id, requester, destination, amount::TEXT AS amount, denom, \
	status, destination_tx_hash, tx_hash, height, updated_height";
const ENRICHMENT_COLUMNS: &str = "id, tx_hash, msg_index, height, message_type, payload, \
	decode_status, attempts, last_decode_error, decoded, inputs, outputs, program_type";

#[derive(Debug, Clone)]
pub struct PgStore {
	pool: PgPool,
}

impl PgStore {
	/// Connect with exponential backoff, then apply the schema.
	///
	/// # Errors
	/// Returns `StoreError::Database` once the backoff gives up or the schema cannot be applied.
	pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
		let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
		let policy = ExponentialBackoff {
			max_elapsed_time: Some(connect_timeout * 6),
			..ExponentialBackoff::default()
		};

		let pool = retry(policy, || async {
			PgPoolOptions::new()
				.max_connections(config.max_connections)
				.min_connections(config.min_connections)
				.acquire_timeout(connect_timeout)
				.connect(&config.url)
				.await
				.map_err(|e| {
					warn!("Database connection failed, retrying: {}", e);
					backoff::Error::transient(e)
				})
		})
		.await?;

		debug!(
			"Database pool configured: max_connections={}, min_connections={}",
			config.max_connections, config.min_connections
		);

		let store = Self::from_pool(pool);
		store.init_schema().await?;
		Ok(store)
	}

	pub fn from_pool(pool: PgPool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	/// Create tables and indexes that do not exist yet.
	pub async fn init_schema(&self) -> Result<(), StoreError> {
		for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
			sqlx::query(statement).execute(&self.pool).await?;
		}
		info!("Database schema ready");
		Ok(())
	}
}

fn int8(value: u64) -> Result<i64, StoreError> {
	i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{value} does not fit BIGINT")))
}

fn opt_int8(value: Option<u64>) -> Result<Option<i64>, StoreError> {
	value.map(int8).transpose()
}

fn int4(value: u32) -> Result<i32, StoreError> {
	i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{value} does not fit INTEGER")))
}

fn unsigned<T: TryFrom<i64>>(row: &PgRow, column: &str) -> Result<T, StoreError> {
	let value: i64 = match row.try_get::<i64, _>(column) {
		Ok(v) => v,
		Err(_) => i64::from(row.try_get::<i32, _>(column)?),
	};
	T::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

fn opt_unsigned(row: &PgRow, column: &str) -> Result<Option<u64>, StoreError> {
	row.try_get::<Option<i64>, _>(column)?
		.map(|v| u64::try_from(v).map_err(|_| StoreError::Corrupt(format!("negative {column}"))))
		.transpose()
}

fn numeric_u64(row: &PgRow, column: &str) -> Result<u64, StoreError> {
	let text: String = row.try_get(column)?;
	decimal::parse_u64(&text).ok_or_else(|| StoreError::Corrupt(format!("{column}: {text}")))
}

fn block_from_row(row: &PgRow) -> Result<BlockRow, StoreError> {
	Ok(BlockRow {
		height: unsigned(row, "height")?,
		hash: row.try_get("hash")?,
		time: row.try_get("time")?,
		proposer: row.try_get("proposer")?,
		tx_count: unsigned(row, "tx_count")?,
		gas_used: numeric_u64(row, "gas_used")?,
		gas_wanted: numeric_u64(row, "gas_wanted")?,
	})
}

fn deposit_from_row(row: &PgRow) -> Result<DepositRow, StoreError> {
	let amount: String = row.try_get("amount")?;
	Ok(DepositRow {
		source_tx_hash: row.try_get("source_tx_hash")?,
		source_block_hash: row.try_get("source_block_hash")?,
		source_height: opt_unsigned(row, "source_height")?,
		recipient: row.try_get("recipient")?,
		amount: decimal::parse_amount(&amount)
			.ok_or_else(|| StoreError::Corrupt(format!("deposit amount {amount}")))?,
		denom: row.try_get("denom")?,
		vote_count: unsigned(row, "vote_count")?,
		tx_hash: row.try_get("tx_hash")?,
		height: unsigned(row, "height")?,
	})
}

fn withdrawal_from_row(row: &PgRow) -> Result<WithdrawalRow, StoreError> {
	let amount: String = row.try_get("amount")?;
	let status: String = row.try_get("status")?;
	Ok(WithdrawalRow {
		id: row.try_get("id")?,
		requester: row.try_get("requester")?,
		destination: row.try_get("destination")?,
		amount: decimal::parse_amount(&amount)
			.ok_or_else(|| StoreError::Corrupt(format!("withdrawal amount {amount}")))?,
		denom: row.try_get("denom")?,
		status: WithdrawalStatus::parse(&status)
			.ok_or_else(|| StoreError::Corrupt(format!("withdrawal status {status}")))?,
		destination_tx_hash: row.try_get("destination_tx_hash")?,
		tx_hash: row.try_get("tx_hash")?,
		height: unsigned(row, "height")?,
		updated_height: unsigned(row, "updated_height")?,
	})
}

fn enrichment_from_row(row: &PgRow) -> Result<EnrichmentRecord, StoreError> {
	let status: String = row.try_get("decode_status")?;
	let decode_status = DecodeStatus::parse(&status)
		.ok_or_else(|| StoreError::Corrupt(format!("decode status {status}")))?;

	let decoded = match row.try_get::<Option<Value>, _>("decoded")? {
		Some(raw) => Some(DecodedPayload {
			raw,
			inputs: list(row.try_get("inputs")?),
			outputs: list(row.try_get("outputs")?),
			program_type: row
				.try_get::<Option<String>, _>("program_type")?
				.unwrap_or_else(|| "unknown".to_string()),
		}),
		None => None,
	};

	Ok(EnrichmentRecord {
		id: row.try_get("id")?,
		tx_hash: row.try_get("tx_hash")?,
		msg_index: unsigned(row, "msg_index")?,
		height: unsigned(row, "height")?,
		message_type: row.try_get("message_type")?,
		payload: row.try_get("payload")?,
		decode_status,
		attempts: unsigned(row, "attempts")?,
		last_decode_error: row.try_get("last_decode_error")?,
		decoded,
	})
}

fn list(value: Option<Value>) -> Vec<Value> {
	match value {
		Some(Value::Array(items)) => items,
		_ => Vec::new(),
	}
}

#[async_trait]
impl Store for PgStore {
	async fn checkpoint(&self) -> Result<Option<u64>, StoreError> {
		let row: Option<(String,)> =
			sqlx::query_as("SELECT value FROM indexer_state WHERE key = $1")
				.bind(CHECKPOINT_KEY)
				.fetch_optional(&self.pool)
				.await?;

		row.map(|(value,)| {
			decimal::parse_u64(&value)
				.ok_or_else(|| StoreError::Corrupt(format!("checkpoint value {value}")))
		})
		.transpose()
	}

	async fn block(&self, height: u64) -> Result<Option<BlockRow>, StoreError> {
		let row = sqlx::query(
			"SELECT height, hash, time, proposer, tx_count, gas_used::TEXT AS gas_used, \
			 gas_wanted::TEXT AS gas_wanted FROM blocks WHERE height = $1",
		)
		.bind(int8(height)?)
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(block_from_row).transpose()
	}

	async fn commit_block(&self, commit: &BlockCommit) -> Result<CommitOutcome, StoreError> {
		let block = &commit.block;
		let mut tx = self.pool.begin().await?;

		sqlx::query(
			"INSERT INTO blocks (height, hash, time, proposer, tx_count, gas_used, gas_wanted) \
			 VALUES ($1, $2, $3, $4, $5, $6::TEXT::NUMERIC, $7::TEXT::NUMERIC) \
			 ON CONFLICT (height) DO UPDATE SET hash = EXCLUDED.hash, time = EXCLUDED.time, \
			 proposer = EXCLUDED.proposer, tx_count = EXCLUDED.tx_count, \
			 gas_used = EXCLUDED.gas_used, gas_wanted = EXCLUDED.gas_wanted",
		)
		.bind(int8(block.height)?)
		.bind(&block.hash)
		.bind(block.time)
		.bind(&block.proposer)
		.bind(int4(block.tx_count)?)
		.bind(block.gas_used.to_string())
		.bind(block.gas_wanted.to_string())
		.execute(&mut *tx)
		.await?;

		let mut new_transactions = Vec::new();
		for row in &commit.transactions {
			let inserted = sqlx::query(
				"INSERT INTO transactions (hash, height, tx_index, primary_type, messages, fee, \
				 gas_used, gas_wanted, memo, status, error, signers, timestamp) \
				 VALUES ($1, $2, $3, $4, $5, $6, $7::TEXT::NUMERIC, $8::TEXT::NUMERIC, $9, $10, \
				 $11, $12, $13) ON CONFLICT (hash) DO NOTHING",
			)
			.bind(&row.hash)
			.bind(int8(row.height)?)
			.bind(int4(row.tx_index)?)
			.bind(&row.primary_type)
			.bind(Json(&row.messages))
			.bind(Json(&row.fee))
			.bind(row.gas_used.to_string())
			.bind(row.gas_wanted.to_string())
			.bind(&row.memo)
			.bind(row.status.as_str())
			.bind(&row.error)
			.bind(Json(&row.signers))
			.bind(row.timestamp)
			.execute(&mut *tx)
			.await?
			.rows_affected()
				> 0;

			if inserted {
				new_transactions.push(row.hash.clone());
			}
		}

		for event in &commit.events {
			sqlx::query(
				"INSERT INTO events (tx_hash, height, source, event_index, event_type, attributes) \
				 VALUES ($1, $2, $3, $4, $5, $6) \
				 ON CONFLICT (height, source, event_index) DO NOTHING",
			)
			.bind(&event.tx_hash)
			.bind(int8(event.height)?)
			.bind(event.tx_hash.as_deref().unwrap_or_default())
			.bind(int4(event.event_index)?)
			.bind(&event.event_type)
			.bind(Json(&event.attributes))
			.execute(&mut *tx)
			.await?;
		}

		for touch in commit
			.accounts
			.iter()
			.filter(|t| new_transactions.contains(&t.tx_hash))
		{
			sqlx::query(
				"INSERT INTO accounts (address, tx_count, first_seen, last_seen) \
				 VALUES ($1, 1, $2, $2) ON CONFLICT (address) DO UPDATE SET \
				 tx_count = accounts.tx_count + 1, \
				 first_seen = LEAST(accounts.first_seen, EXCLUDED.first_seen), \
				 last_seen = GREATEST(accounts.last_seen, EXCLUDED.last_seen)",
			)
			.bind(&touch.address)
			.bind(touch.seen_at)
			.execute(&mut *tx)
			.await?;
		}

		for enrichment in &commit.enrichments {
			sqlx::query(
				"INSERT INTO zk_transfers (tx_hash, msg_index, height, message_type, payload) \
				 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (tx_hash, msg_index) DO NOTHING",
			)
			.bind(&enrichment.tx_hash)
			.bind(int4(enrichment.msg_index)?)
			.bind(int8(enrichment.height)?)
			.bind(&enrichment.message_type)
			.bind(&enrichment.payload)
			.execute(&mut *tx)
			.await?;
		}

		let (checkpoint,): (String,) = sqlx::query_as(
			"INSERT INTO indexer_state (key, value) VALUES ($1, $2) \
			 ON CONFLICT (key) DO UPDATE SET \
			 value = GREATEST(indexer_state.value::BIGINT, EXCLUDED.value::BIGINT)::TEXT, \
			 updated_at = NOW() RETURNING value",
		)
		.bind(CHECKPOINT_KEY)
		.bind(block.height.to_string())
		.fetch_one(&mut *tx)
		.await?;

		tx.commit().await?;

		let checkpoint = decimal::parse_u64(&checkpoint)
			.ok_or_else(|| StoreError::Corrupt(format!("checkpoint value {checkpoint}")))?;
		Ok(CommitOutcome {
			new_transactions,
			checkpoint,
		})
	}

	async fn rewind(&self, height: u64) -> Result<(), StoreError> {
		let bound = int8(height)?;
		let mut tx = self.pool.begin().await?;

		let current: Option<(String,)> =
			sqlx::query_as("SELECT value FROM indexer_state WHERE key = $1 FOR UPDATE")
				.bind(CHECKPOINT_KEY)
				.fetch_optional(&mut *tx)
				.await?;
		let checkpoint = current
			.map(|(value,)| {
				decimal::parse_u64(&value)
					.ok_or_else(|| StoreError::Corrupt(format!("checkpoint value {value}")))
			})
			.transpose()?;
		if !checkpoint.is_some_and(|checkpoint| height <= checkpoint) {
			return Err(StoreError::RewindAhead { height, checkpoint });
		}

		for table in [
			"blocks",
			"transactions",
			"events",
			"zk_transfers",
			"signer_broadcasts",
			"proposals",
		] {
			let deleted = sqlx::query(&format!("DELETE FROM {table} WHERE height > $1"))
				.bind(bound)
				.execute(&mut *tx)
				.await?
				.rows_affected();
			debug!("Rewind removed {} rows from {}", deleted, table);
		}

		sqlx::query(
			"INSERT INTO indexer_state (key, value) VALUES ($1, $2) \
			 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
		)
		.bind(CHECKPOINT_KEY)
		.bind(height.to_string())
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;
		Ok(())
	}

	async fn apply_projection(
		&self,
		projection: &Projection,
	) -> Result<Option<DomainEvent>, StoreError> {
		match projection {
			Projection::DepositVote {
				source_tx_hash,
				source_block_hash,
				source_height,
				validator,
				recipient,
				amount,
				denom,
				tx_hash,
				height,
			} => {
				let mut tx = self.pool.begin().await?;
				let voted = sqlx::query(
					"INSERT INTO deposit_votes (source_tx_hash, source_block_hash, validator, \
					 tx_hash, height) VALUES ($1, $2, $3, $4, $5) ON CONFLICT DO NOTHING",
				)
				.bind(source_tx_hash)
				.bind(source_block_hash)
				.bind(validator)
				.bind(tx_hash)
				.bind(int8(*height)?)
				.execute(&mut *tx)
				.await?
				.rows_affected()
					> 0;

				if !voted {
					return Ok(None);
				}

				let row = sqlx::query(&format!(
					"INSERT INTO deposits (source_tx_hash, source_block_hash, source_height, \
					 recipient, amount, denom, vote_count, tx_hash, height) \
					 VALUES ($1, $2, $3, $4, $5::TEXT::NUMERIC, $6, 1, $7, $8) \
					 ON CONFLICT (source_tx_hash, source_block_hash) \
					 DO UPDATE SET vote_count = deposits.vote_count + 1 \
					 RETURNING {DEPOSIT_COLUMNS}"
				))
				.bind(source_tx_hash)
				.bind(source_block_hash)
				.bind(opt_int8(*source_height)?)
				.bind(recipient)
				.bind(amount.to_str_radix(10))
				.bind(denom)
				.bind(tx_hash)
				.bind(int8(*height)?)
				.fetch_one(&mut *tx)
				.await?;

				tx.commit().await?;
				Ok(Some(DomainEvent::Deposit(deposit_from_row(&row)?)))
			}
			Projection::WithdrawalRequested {
				id,
				requester,
				destination,
				amount,
				denom,
				tx_hash,
				height,
			} => {
				let row = sqlx::query(&format!(
					"INSERT INTO withdrawals (id, requester, destination, amount, denom, status, \
					 tx_hash, height, updated_height) \
					 VALUES ($1, $2, $3, $4::TEXT::NUMERIC, $5, 'requested', $6, $7, $7) \
					 ON CONFLICT (id) DO NOTHING RETURNING {WITHDRAWAL_COLUMNS}"
				))
				.bind(id)
				.bind(requester)
				.bind(destination)
				.bind(amount.to_str_radix(10))
				.bind(denom)
				.bind(tx_hash)
				.bind(int8(*height)?)
				.fetch_optional(&self.pool)
				.await?;

				row.as_ref()
					.map(withdrawal_from_row)
					.transpose()
					.map(|w| w.map(DomainEvent::Withdrawal))
			}
			Projection::WithdrawalConfirmed {
				id,
				destination_tx_hash,
				height,
				..
			} => {
				let row = sqlx::query(&format!(
					"UPDATE withdrawals SET status = 'confirmed', destination_tx_hash = $2, \
					 updated_height = $3 WHERE id = $1 AND (status <> 'confirmed' \
					 OR destination_tx_hash IS DISTINCT FROM $2) RETURNING {WITHDRAWAL_COLUMNS}"
				))
				.bind(id)
				.bind(destination_tx_hash)
				.bind(int8(*height)?)
				.fetch_optional(&self.pool)
				.await?;

				row.as_ref()
					.map(withdrawal_from_row)
					.transpose()
					.map(|w| w.map(DomainEvent::Withdrawal))
			}
			Projection::WithdrawalCancelled { id, height } => {
				let row = sqlx::query(&format!(
					"UPDATE withdrawals SET status = 'cancelled', updated_height = $2 \
					 WHERE id = $1 AND status <> 'cancelled' RETURNING {WITHDRAWAL_COLUMNS}"
				))
				.bind(id)
				.bind(int8(*height)?)
				.fetch_optional(&self.pool)
				.await?;

				row.as_ref()
					.map(withdrawal_from_row)
					.transpose()
					.map(|w| w.map(DomainEvent::Withdrawal))
			}
			Projection::Fragment {
				withdrawal_id,
				signer,
				fragment,
				fragment_index,
				tx_hash,
				height,
			} => {
				sqlx::query(
					"INSERT INTO withdrawal_fragments (withdrawal_id, signer, fragment, \
					 fragment_index, tx_hash, height) VALUES ($1, $2, $3, $4, $5, $6) \
					 ON CONFLICT (withdrawal_id, signer) DO UPDATE SET \
					 fragment = EXCLUDED.fragment, fragment_index = EXCLUDED.fragment_index, \
					 tx_hash = EXCLUDED.tx_hash, height = EXCLUDED.height",
				)
				.bind(withdrawal_id)
				.bind(signer)
				.bind(fragment)
				.bind(opt_int8(*fragment_index)?)
				.bind(tx_hash)
				.bind(int8(*height)?)
				.execute(&self.pool)
				.await?;
				Ok(None)
			}
			Projection::SignerRegistered {
				address,
				pubkey,
				moniker,
				height,
			} => {
				sqlx::query(
					"INSERT INTO signers (address, pubkey, moniker, status, updated_height) \
					 VALUES ($1, $2, $3, 'active', $4) ON CONFLICT (address) DO UPDATE SET \
					 pubkey = EXCLUDED.pubkey, moniker = COALESCE(EXCLUDED.moniker, signers.moniker), \
					 status = 'active', updated_height = EXCLUDED.updated_height",
				)
				.bind(address)
				.bind(pubkey)
				.bind(moniker)
				.bind(int8(*height)?)
				.execute(&self.pool)
				.await?;
				Ok(None)
			}
			Projection::SignerKeyRotated {
				address,
				pubkey,
				height,
			} => {
				sqlx::query(
					"INSERT INTO signers (address, pubkey, status, updated_height) \
					 VALUES ($1, $2, 'active', $3) ON CONFLICT (address) DO UPDATE SET \
					 pubkey = EXCLUDED.pubkey, updated_height = EXCLUDED.updated_height",
				)
				.bind(address)
				.bind(pubkey)
				.bind(int8(*height)?)
				.execute(&self.pool)
				.await?;
				Ok(None)
			}
			Projection::SignerDeregistered { address, height } => {
				sqlx::query(
					"INSERT INTO signers (address, status, updated_height) \
					 VALUES ($1, 'deregistered', $2) ON CONFLICT (address) DO UPDATE SET \
					 status = 'deregistered', updated_height = EXCLUDED.updated_height",
				)
				.bind(address)
				.bind(int8(*height)?)
				.execute(&self.pool)
				.await?;
				Ok(None)
			}
			Projection::SignerHeartbeat {
				address,
				reported_height,
				height,
			} => {
				sqlx::query(
					"INSERT INTO signers (address, status, reported_height, last_heartbeat_height, \
					 updated_height) VALUES ($1, 'active', $2, $3, $3) \
					 ON CONFLICT (address) DO UPDATE SET \
					 reported_height = COALESCE(EXCLUDED.reported_height, signers.reported_height), \
					 last_heartbeat_height = EXCLUDED.last_heartbeat_height, \
					 updated_height = EXCLUDED.updated_height",
				)
				.bind(address)
				.bind(opt_int8(*reported_height)?)
				.bind(int8(*height)?)
				.execute(&self.pool)
				.await?;
				Ok(None)
			}
			Projection::SignatureBroadcast {
				signer,
				withdrawal_id,
				signature,
				round,
				tx_hash,
				height,
			} => {
				sqlx::query(
					"INSERT INTO signer_broadcasts (signer, withdrawal_id, signature, round, \
					 tx_hash, height) VALUES ($1, $2, $3, $4, $5, $6)",
				)
				.bind(signer)
				.bind(withdrawal_id)
				.bind(signature)
				.bind(opt_int8(*round)?)
				.bind(tx_hash)
				.bind(int8(*height)?)
				.execute(&self.pool)
				.await?;
				Ok(None)
			}
			Projection::ProposalSubmitted {
				proposal_id,
				proposer,
				title,
				summary,
				initial_deposit,
				tx_hash,
				height,
			} => {
				sqlx::query(
					"INSERT INTO proposals (proposal_id, proposer, title, summary, \
					 initial_deposit, tx_hash, height) VALUES ($1, $2, $3, $4, $5, $6, $7)",
				)
				.bind(opt_int8(*proposal_id)?)
				.bind(proposer)
				.bind(title)
				.bind(summary)
				.bind(Json(initial_deposit))
				.bind(tx_hash)
				.bind(int8(*height)?)
				.execute(&self.pool)
				.await?;
				Ok(None)
			}
			Projection::ProposalVote {
				proposal_id,
				voter,
				option,
				tx_hash,
				height,
			} => {
				sqlx::query(
					"INSERT INTO proposal_votes (proposal_id, voter, option, tx_hash, height) \
					 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (proposal_id, voter) DO UPDATE SET \
					 option = EXCLUDED.option, tx_hash = EXCLUDED.tx_hash, height = EXCLUDED.height",
				)
				.bind(int8(*proposal_id)?)
				.bind(voter)
				.bind(option)
				.bind(tx_hash)
				.bind(int8(*height)?)
				.execute(&self.pool)
				.await?;
				Ok(None)
			}
		}
	}

	async fn pending_enrichments(
		&self,
		limit: usize,
		max_attempts: u32,
	) -> Result<Vec<EnrichmentRecord>, StoreError> {
		let rows = sqlx::query(&format!(
			"SELECT {ENRICHMENT_COLUMNS} FROM zk_transfers \
			 WHERE decode_status = 'pending' AND attempts < $1 ORDER BY id LIMIT $2"
		))
		.bind(int4(max_attempts)?)
		.bind(i64::try_from(limit).unwrap_or(i64::MAX))
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(enrichment_from_row).collect()
	}

	async fn record_enrichment_success(
		&self,
		id: i64,
		decoded: &DecodedPayload,
	) -> Result<(), StoreError> {
		sqlx::query(
			"UPDATE zk_transfers SET decode_status = 'ok', attempts = attempts + 1, \
			 last_decode_error = NULL, decoded = $2, inputs = $3, outputs = $4, program_type = $5 \
			 WHERE id = $1",
		)
		.bind(id)
		.bind(Json(&decoded.raw))
		.bind(Json(&decoded.inputs))
		.bind(Json(&decoded.outputs))
		.bind(&decoded.program_type)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	async fn record_enrichment_failure(
		&self,
		id: i64,
		error: &str,
		max_attempts: u32,
	) -> Result<DecodeStatus, StoreError> {
		let (status,): (String,) = sqlx::query_as(
			"UPDATE zk_transfers SET attempts = attempts + 1, last_decode_error = $2, \
			 decode_status = CASE WHEN attempts + 1 >= $3 THEN 'failed' ELSE decode_status END \
			 WHERE id = $1 RETURNING decode_status",
		)
		.bind(id)
		.bind(error)
		.bind(int4(max_attempts)?)
		.fetch_one(&self.pool)
		.await?;

		DecodeStatus::parse(&status)
			.ok_or_else(|| StoreError::Corrupt(format!("decode status {status}")))
	}

	async fn requeue_failed_enrichments(&self) -> Result<u64, StoreError> {
		let result = sqlx::query(
			"UPDATE zk_transfers SET decode_status = 'pending', attempts = 0 \
			 WHERE decode_status = 'failed'",
		)
		.execute(&self.pool)
		.await?;
		Ok(result.rows_affected())
	}

	async fn enrichment_counts(&self) -> Result<EnrichmentCounts, StoreError> {
		let rows: Vec<(String, i64)> = sqlx::query_as(
			"SELECT decode_status, COUNT(*) FROM zk_transfers GROUP BY decode_status",
		)
		.fetch_all(&self.pool)
		.await?;

		let mut counts = EnrichmentCounts::default();
		for (status, count) in rows {
			let count = u64::try_from(count).unwrap_or_default();
			match DecodeStatus::parse(&status) {
				Some(DecodeStatus::Pending) => counts.pending = count,
				Some(DecodeStatus::Ok) => counts.ok = count,
				Some(DecodeStatus::Failed) => counts.failed = count,
				None => warn!("Unknown decode status {:?} in zk_transfers", status),
			}
		}
		Ok(counts)
	}
}
