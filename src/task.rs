//! Cooperative stop signal shared by the long-running loops.
//!
//! A `TaskControl` is owned by whoever starts a loop and cloned into it. Loops check
//! [`TaskControl::is_stopped`] before each unit of work and use [`TaskControl::sleep`] for every
//! idle wait, so a stop request interrupts a sleep but never a unit that is already running.

use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct TaskControl {
	stop_tx: watch::Sender<bool>,
	stop_rx: watch::Receiver<bool>,
}

impl TaskControl {
	pub fn new() -> Self {
		let (stop_tx, stop_rx) = watch::channel(false);
		Self { stop_tx, stop_rx }
	}

	/// Request every holder of this control to stop after its current unit of work.
	pub fn stop(&self) {
		self.stop_tx.send_replace(true);
	}

	pub fn is_stopped(&self) -> bool {
		*self.stop_rx.borrow()
	}

	/// Sleep for `duration`, returning early if a stop is requested.
	///
	/// Returns `true` when the full duration elapsed and `false` when the sleep was cut short.
	pub async fn sleep(&self, duration: Duration) -> bool {
		if self.is_stopped() {
			return false;
		}
		let mut stop_rx = self.stop_rx.clone();
		tokio::select! {
			_ = tokio::time::sleep(duration) => true,
			_ = stop_rx.wait_for(|stopped| *stopped) => false,
		}
	}

	/// Resolve once a stop has been requested.
	pub async fn stopped(&self) {
		let mut stop_rx = self.stop_rx.clone();
		// The sender lives in `self`, so the channel cannot close while we wait.
		let _ = stop_rx.wait_for(|stopped| *stopped).await;
	}
}

impl Default for TaskControl {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn stop_interrupts_sleep() {
		let control = TaskControl::new();
		let sleeper = control.clone();
		let handle = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(60)).await });

		control.stop();
		let completed = tokio::time::timeout(Duration::from_secs(5), handle)
			.await
			.unwrap()
			.unwrap();
		assert!(!completed);
		assert!(control.is_stopped());
	}

	#[tokio::test]
	async fn short_sleep_completes() {
		let control = TaskControl::new();
		assert!(control.sleep(Duration::from_millis(5)).await);
	}
}
