//! Listener bookkeeping for the three fan-out surfaces: whole-state,
//! per-instance, and runtime-variable listeners.
//!
//! Each listener is stored behind an `Arc` with a small integer id, so a
//! notification pass can clone a snapshot `Vec` of `Arc`s out from under
//! the lock (cheap refcount bumps, no `Box` to move) and invoke them
//! without holding the registry locked across user callbacks. Combined
//! with removal-by-id, a listener unsubscribing itself or another
//! mid-notification never panics or deadlocks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use syncgraph_builder::{Instance, InstanceKey, State};

use crate::runtime_state::RuntimeState;

pub type StateListener = Arc<dyn Fn(&State) + Send + Sync>;
pub type InstanceListener = Arc<dyn Fn(&Arc<Instance>) + Send + Sync>;
pub type RuntimeListener = Arc<dyn Fn(&RuntimeState) + Send + Sync>;
pub type ConnectionListener = Arc<dyn Fn(Option<u64>) + Send + Sync>;

/// A handle returned from a `subscribe*` call; dropping it does nothing —
/// call `unsubscribe()` explicitly to remove the listener.
pub struct Unsubscribe(Box<dyn FnOnce() + Send>);

impl Unsubscribe {
	pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
		Self(Box::new(f))
	}

	pub fn unsubscribe(self) {
		(self.0)();
	}
}

#[derive(Default)]
pub struct ListenerRegistry {
	next_id: AtomicU64,
	whole_state: Mutex<Vec<(u64, StateListener)>>,
	instance: Mutex<HashMap<InstanceKey, Vec<(u64, InstanceListener)>>>,
	runtime: Mutex<Vec<(u64, RuntimeListener)>>,
	connection: Mutex<Vec<(u64, ConnectionListener)>>,
}

impl ListenerRegistry {
	fn next_id(&self) -> u64 {
		self.next_id.fetch_add(1, Ordering::Relaxed)
	}

	pub fn add_whole_state(self: &Arc<Self>, listener: StateListener) -> Unsubscribe {
		let id = self.next_id();
		self.whole_state.lock().push((id, listener));
		let this = Arc::clone(self);
		Unsubscribe::new(move || this.whole_state.lock().retain(|(i, _)| *i != id))
	}

	pub fn add_instance(self: &Arc<Self>, key: InstanceKey, listener: InstanceListener) -> Unsubscribe {
		let id = self.next_id();
		self.instance.lock().entry(key.clone()).or_default().push((id, listener));
		let this = Arc::clone(self);
		Unsubscribe::new(move || {
			let mut map = this.instance.lock();
			if let Some(list) = map.get_mut(&key) {
				list.retain(|(i, _)| *i != id);
				if list.is_empty() {
					map.remove(&key);
				}
			}
		})
	}

	pub fn add_runtime(self: &Arc<Self>, listener: RuntimeListener) -> Unsubscribe {
		let id = self.next_id();
		self.runtime.lock().push((id, listener));
		let this = Arc::clone(self);
		Unsubscribe::new(move || this.runtime.lock().retain(|(i, _)| *i != id))
	}

	pub fn add_connection(self: &Arc<Self>, listener: ConnectionListener) -> Unsubscribe {
		let id = self.next_id();
		self.connection.lock().push((id, listener));
		let this = Arc::clone(self);
		Unsubscribe::new(move || this.connection.lock().retain(|(i, _)| *i != id))
	}

	/// The instance lookup used by `subscribe_instance`'s synchronous
	/// already-loaded call, and by the per-batch fan-out to decide which
	/// instances have a listener worth invoking.
	pub fn has_instance_listener(&self, key: &InstanceKey) -> bool {
		self.instance.lock().contains_key(key)
	}

	pub fn notify_whole_state(&self, state: &State) {
		let snapshot: Vec<StateListener> = self.whole_state.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
		for listener in snapshot {
			listener(state);
		}
	}

	pub fn notify_instance(&self, key: &InstanceKey, instance: &Arc<Instance>) {
		let snapshot: Vec<InstanceListener> = self
			.instance
			.lock()
			.get(key)
			.map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
			.unwrap_or_default();
		for listener in snapshot {
			listener(instance);
		}
	}

	pub fn notify_runtime(&self, state: &RuntimeState) {
		let snapshot: Vec<RuntimeListener> = self.runtime.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
		for listener in snapshot {
			listener(state);
		}
	}

	pub fn notify_connection(&self, at: Option<u64>) {
		let snapshot: Vec<ConnectionListener> = self.connection.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
		for listener in snapshot {
			listener(at);
		}
	}

	pub fn is_empty(&self) -> bool {
		self.whole_state.lock().is_empty()
			&& self.instance.lock().is_empty()
			&& self.runtime.lock().is_empty()
			&& self.connection.lock().is_empty()
	}
}
