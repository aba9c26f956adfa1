//! Event bus for newly ingested data.
//!
//! The sync engine publishes through an `EventPublisher` handed to it by the caller. Events are
//! only published after the block they belong to is committed. Each event carries the normalized
//! row as its payload, serialized with wide integers as decimal strings.

use crate::store::{BlockRow, DepositRow, DomainEvent, TransactionRow, WithdrawalRow};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

pub const BLOCK_NEW: &str = "block:new";
pub const TX_NEW: &str = "tx:new";
pub const DEPOSIT_NEW: &str = "deposit:new";
pub const WITHDRAWAL_NEW: &str = "withdrawal:new";

/// Events published by the sync engine
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
	BlockNew(BlockRow),
	TxNew(TransactionRow),
	DepositNew(DepositRow),
	WithdrawalNew(WithdrawalRow),
}

impl BusEvent {
	/// Logical channel name.
	pub fn channel(&self) -> &'static str {
		match self {
			BusEvent::BlockNew(_) => BLOCK_NEW,
			BusEvent::TxNew(_) => TX_NEW,
			BusEvent::DepositNew(_) => DEPOSIT_NEW,
			BusEvent::WithdrawalNew(_) => WITHDRAWAL_NEW,
		}
	}

	/// JSON payload as sent to subscribers.
	pub fn payload(&self) -> Result<Value, serde_json::Error> {
		match self {
			BusEvent::BlockNew(row) => serde_json::to_value(row),
			BusEvent::TxNew(row) => serde_json::to_value(row),
			BusEvent::DepositNew(row) => serde_json::to_value(row),
			BusEvent::WithdrawalNew(row) => serde_json::to_value(row),
		}
	}

	/// `{"channel": ..., "payload": ...}` envelope.
	pub fn to_envelope(&self) -> Result<Value, serde_json::Error> {
		#[derive(Serialize)]
		struct Envelope<'a> {
			channel: &'a str,
			payload: Value,
		}
		serde_json::to_value(Envelope {
			channel: self.channel(),
			payload: self.payload()?,
		})
	}
}

impl From<DomainEvent> for BusEvent {
	fn from(event: DomainEvent) -> Self {
		match event {
			DomainEvent::Deposit(row) => BusEvent::DepositNew(row),
			DomainEvent::Withdrawal(row) => BusEvent::WithdrawalNew(row),
		}
	}
}

/// Outbound side of the event bus.
///
/// Publishing never blocks and never fails the caller: with no subscribers the event is dropped,
/// and slow subscribers observe a lag on their side.
#[derive(Debug, Clone)]
pub struct EventPublisher {
	sender: broadcast::Sender<BusEvent>,
}

impl EventPublisher {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
		self.sender.subscribe()
	}

	pub fn publish(&self, event: BusEvent) {
		let channel = event.channel();
		if self.sender.send(event).is_err() {
			trace!("No subscribers for {}", channel);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;

	#[tokio::test]
	async fn subscribers_receive_published_events() {
		let publisher = EventPublisher::new(8);
		let mut rx = publisher.subscribe();
		let block = BlockRow {
			height: 100,
			hash: "AAAA".into(),
			time: Utc::now(),
			proposer: "P".into(),
			tx_count: 0,
			gas_used: 0,
			gas_wanted: 0,
		};

		publisher.publish(BusEvent::BlockNew(block.clone()));
		let event = rx.recv().await.unwrap();
		assert_eq!(event.channel(), BLOCK_NEW);

		let envelope = event.to_envelope().unwrap();
		assert_eq!(envelope["channel"], "block:new");
		assert_eq!(envelope["payload"]["height"], "100");
	}

	#[test]
	fn publishing_without_subscribers_is_harmless() {
		let publisher = EventPublisher::new(1);
		publisher.publish(BusEvent::BlockNew(BlockRow {
			height: 1,
			hash: String::new(),
			time: Utc::now(),
			proposer: String::new(),
			tx_count: 0,
			gas_used: 0,
			gas_wanted: 0,
		}));
	}
}
