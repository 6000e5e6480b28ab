//! Outbound RPC correlation for `call_action`.
//!
//! Same shape as a `pending_permissions: HashMap<u64, oneshot::Sender<String>>`
//! table: stash a one-shot resolver under an id, wake it from the
//! message-handling path when the matching response arrives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

/// `Ok` carries the response's `result`; `Err` carries its `error`.
pub type CallOutcome = std::result::Result<Value, Value>;

/// Produces call ids that are monotonically increasing within a process: a
/// millisecond timestamp in the high bits, an in-process counter in the low
/// bits, so two calls issued within the same millisecond still get distinct
/// ids.
#[derive(Debug, Default)]
pub struct CallIdGenerator {
	counter: AtomicU64,
}

impl CallIdGenerator {
	pub fn next(&self) -> u64 {
		let millis = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_millis() as u64)
			.unwrap_or(0);
		let seq = self.counter.fetch_add(1, Ordering::Relaxed) & 0xF_FFFF;
		(millis << 20) | seq
	}
}

/// The table of outstanding `call_action` invocations, keyed by `callId`.
#[derive(Default)]
pub struct PendingCalls {
	table: Mutex<HashMap<u64, oneshot::Sender<CallOutcome>>>,
}

impl PendingCalls {
	pub fn register(&self, id: u64) -> oneshot::Receiver<CallOutcome> {
		let (tx, rx) = oneshot::channel();
		self.table.lock().insert(id, tx);
		rx
	}

	/// Removes and returns the pending sender for `id`, if any (used both
	/// to deliver a response and to give up on timeout).
	pub fn take(&self, id: u64) -> Option<oneshot::Sender<CallOutcome>> {
		self.table.lock().remove(&id)
	}

	/// Delivers a response frame to its matching pending call. Unmatched
	/// ids are logged and dropped.
	pub fn resolve(&self, id: u64, outcome: CallOutcome) {
		match self.take(id) {
			Some(tx) => {
				let _ = tx.send(outcome);
			}
			None => tracing::warn!(call_id = id, "unmatched RPC response, dropping"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generated_ids_are_unique_within_same_millisecond() {
		let gen = CallIdGenerator::default();
		let a = gen.next();
		let b = gen.next();
		assert_ne!(a, b);
	}

	#[tokio::test]
	async fn resolve_wakes_the_matching_receiver_only() {
		let pending = PendingCalls::default();
		let rx_a = pending.register(1);
		let rx_b = pending.register(2);

		pending.resolve(2, Ok(Value::from("ok-b")));
		pending.resolve(1, Err(Value::from("fail-a")));

		assert_eq!(rx_b.await.unwrap(), Ok(Value::from("ok-b")));
		assert_eq!(rx_a.await.unwrap(), Err(Value::from("fail-a")));
	}

	#[test]
	fn resolve_on_unknown_id_is_a_noop() {
		let pending = PendingCalls::default();
		pending.resolve(999, Ok(Value::Null));
	}
}
