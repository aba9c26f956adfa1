//! Single-writer lease for the sync engine.
//!
//! A lease is a named lock held for the lifetime of a sync run. `try_acquire` never waits: if
//! another holder has the lease, the caller gets `None` and is expected to exit. The returned
//! guard is released explicitly on every exit path; dropping it also frees the lease, and for the
//! PostgreSQL backend a crashed process frees it when its session ends.

use crate::config::DatabaseConfig;

use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Error types for lease operations
#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
	#[error("Database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("Lease state poisoned")]
	Poisoned,
}

#[async_trait]
pub trait Lease: Send + Sync {
	/// Try to take the lease for `holder`. Returns `None` when someone else holds it.
	async fn try_acquire(&self, holder: &str) -> Result<Option<Box<dyn LeaseGuard>>, LeaseError>;

	fn name(&self) -> &str;
}

#[async_trait]
pub trait LeaseGuard: Send {
	fn holder(&self) -> &str;

	async fn release(self: Box<Self>) -> Result<(), LeaseError>;
}

/// Open the lease backend matching the store: in-process for `memory://`, advisory lock otherwise.
pub fn open(config: &DatabaseConfig, name: &str) -> Arc<dyn Lease> {
	if config.is_memory() {
		Arc::new(MemoryLease::new(name))
	} else {
		Arc::new(PgAdvisoryLease::new(&config.url, name))
	}
}

/// Lease shared by clones within one process.
#[derive(Debug, Clone)]
pub struct MemoryLease {
	name: String,
	slot: Arc<Mutex<Option<String>>>,
}

impl MemoryLease {
	pub fn new(name: &str) -> Self {
		Self {
			name: name.to_string(),
			slot: Arc::new(Mutex::new(None)),
		}
	}

	/// Current holder, if any.
	pub fn holder(&self) -> Option<String> {
		self.slot.lock().ok().and_then(|slot| slot.clone())
	}
}

#[async_trait]
impl Lease for MemoryLease {
	async fn try_acquire(&self, holder: &str) -> Result<Option<Box<dyn LeaseGuard>>, LeaseError> {
		let mut slot = self.slot.lock().map_err(|_| LeaseError::Poisoned)?;
		if let Some(current) = slot.as_ref() {
			debug!("Lease {} is held by {}", self.name, current);
			return Ok(None);
		}
		*slot = Some(holder.to_string());

		Ok(Some(Box::new(MemoryLeaseGuard {
			slot: self.slot.clone(),
			holder: holder.to_string(),
		})))
	}

	fn name(&self) -> &str {
		&self.name
	}
}

struct MemoryLeaseGuard {
	slot: Arc<Mutex<Option<String>>>,
	holder: String,
}

impl MemoryLeaseGuard {
	fn clear(&self) {
		if let Ok(mut slot) = self.slot.lock() {
			if slot.as_deref() == Some(self.holder.as_str()) {
				*slot = None;
			}
		}
	}
}

#[async_trait]
impl LeaseGuard for MemoryLeaseGuard {
	fn holder(&self) -> &str {
		&self.holder
	}

	async fn release(self: Box<Self>) -> Result<(), LeaseError> {
		self.clear();
		Ok(())
	}
}

impl Drop for MemoryLeaseGuard {
	fn drop(&mut self) {
		self.clear();
	}
}

/// Session-level `pg_try_advisory_lock` on a connection dedicated to the lease.
#[derive(Debug, Clone)]
pub struct PgAdvisoryLease {
	url: String,
	name: String,
	key: i64,
}

impl PgAdvisoryLease {
	pub fn new(url: &str, name: &str) -> Self {
		Self {
			url: url.to_string(),
			name: name.to_string(),
			key: lease_key(name),
		}
	}
}

/// Stable 64-bit FNV-1a hash of the lease name, used as the advisory lock key.
fn lease_key(name: &str) -> i64 {
	let hash = name.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
		(hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
	});
	i64::from_ne_bytes(hash.to_ne_bytes())
}

#[async_trait]
impl Lease for PgAdvisoryLease {
	async fn try_acquire(&self, holder: &str) -> Result<Option<Box<dyn LeaseGuard>>, LeaseError> {
		let mut conn = PgConnection::connect(&self.url).await?;
		let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
			.bind(self.key)
			.fetch_one(&mut conn)
			.await?;

		if !acquired {
			conn.close().await?;
			return Ok(None);
		}

		Ok(Some(Box::new(PgLeaseGuard {
			conn,
			key: self.key,
			holder: holder.to_string(),
		})))
	}

	fn name(&self) -> &str {
		&self.name
	}
}

struct PgLeaseGuard {
	conn: PgConnection,
	key: i64,
	holder: String,
}

#[async_trait]
impl LeaseGuard for PgLeaseGuard {
	fn holder(&self) -> &str {
		&self.holder
	}

	async fn release(self: Box<Self>) -> Result<(), LeaseError> {
		let mut guard = *self;
		let (released,): (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1)")
			.bind(guard.key)
			.fetch_one(&mut guard.conn)
			.await?;
		if !released {
			warn!("Advisory lock {} was not held at release", guard.key);
		}
		guard.conn.close().await?;
		Ok(())
	}
}
