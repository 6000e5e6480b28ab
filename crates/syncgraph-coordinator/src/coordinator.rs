//! The Channel Coordinator: binds one Transport to one Builder, multiplexes
//! listener fan-out across whole-state, per-instance, runtime-variable, and
//! connection-status subscribers, and layers a request/response RPC surface
//! on top of the transport's send path.
//!
//! The Builder and the runtime-variable map live behind a `parking_lot::
//! Mutex` each. In practice there is a single writer: the `Transport` drives
//! one background task per connection and calls back into this module's
//! `TransportHandler` impl serially from that task, so the mutexes exist to
//! let `subscribe_instance`'s synchronous "already loaded" check and
//! `state()`/`runtime_state()` reads happen from whatever thread the caller
//! is on, not to arbitrate between competing writers.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde_json::Value;

use syncgraph_builder::{Builder, Instance, InstanceKey, ModelMap, State};
use syncgraph_transport::{CloseReason, ConnectionStatus, Transport, TransportConfig, TransportHandler};

use crate::error::{CoordinatorError, Result};
use crate::events::CoordinatorEvents;
use crate::listeners::{ConnectionListener, InstanceListener, ListenerRegistry, RuntimeListener, StateListener, Unsubscribe};
use crate::pending::{CallIdGenerator, PendingCalls};
use crate::runtime_state::RuntimeState;

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

struct Inner {
	builder: Mutex<Builder>,
	runtime: Mutex<RuntimeState>,
	listeners: Arc<ListenerRegistry>,
	pending: Arc<PendingCalls>,
	call_ids: CallIdGenerator,
	transport: Mutex<Option<Arc<Transport>>>,
	transport_config: TransportConfig,
	events: CoordinatorEvents,
	rpc_timeout: Duration,
}

impl Inner {
	/// Lazily constructs and connects the Transport. Idempotent: a second
	/// call while a transport is already live is a no-op.
	fn init(self: &Arc<Self>) {
		let mut slot = self.transport.lock();
		if slot.is_some() {
			return;
		}
		let handler: Arc<dyn TransportHandler> = Arc::new(CoordinatorHandler { inner: Arc::clone(self) });
		match Transport::new(self.transport_config.clone(), handler) {
			Ok(transport) => {
				let transport = Arc::new(transport);
				transport.connect();
				*slot = Some(transport);
			}
			Err(e) => {
				tracing::error!(error = %e, "failed to construct transport");
				self.events.fire_error(e.to_string());
			}
		}
	}

	/// Tears down the transport once the last listener unsubscribes. The
	/// Builder and runtime-variable state are retained so a later
	/// re-subscribe resumes from the in-memory graph.
	fn teardown_if_empty(self: &Arc<Self>) {
		if !self.listeners.is_empty() {
			return;
		}
		if let Some(transport) = self.transport.lock().take() {
			transport.disconnect(CloseReason::NoSubscribers);
		}
	}
}

/// Routes classified frames from one Transport connection into Builder
/// mutation and listener fan-out.
struct CoordinatorHandler {
	inner: Arc<Inner>,
}

impl TransportHandler for CoordinatorHandler {
	fn on_connected(&self) {
		self.inner.events.fire_connected();
		self.inner.events.fire_connection_change(None);
		self.inner.listeners.notify_connection(None);
	}

	fn on_status_change(&self, status: ConnectionStatus) {
		if matches!(status, ConnectionStatus::Closed { .. }) {
			let at = Some(now_millis());
			self.inner.events.fire_connection_change(at);
			self.inner.listeners.notify_connection(at);
		}
	}

	fn on_error(&self, message: String) {
		self.inner.events.fire_error(message);
	}

	fn on_instances(&self, batch: Vec<syncgraph_builder::InstancePayload>) {
		let keys: Vec<InstanceKey> = batch.iter().map(|p| InstanceKey::new(&p.instance_type, p.id)).collect();
		let (to_notify, state) = {
			let mut builder = self.inner.builder.lock();
			if let Err(e) = builder.update(batch) {
				tracing::error!(error = %e, "rejecting instance batch");
				self.inner.events.fire_error(e.to_string());
				// ANCHOR_TYPE_MISMATCH is fatal for the channel: surface the
				// error, then terminally close so the transport does not sit
				// `Ready` re-erroring on every later batch with the anchor
				// never set.
				if let Some(transport) = self.inner.transport.lock().as_ref() {
					transport.disconnect(CloseReason::ProtocolError);
				}
				return;
			}
			let mut seen = FxHashSet::default();
			let mut to_notify = Vec::new();
			for key in keys {
				if seen.insert(key.clone()) && self.inner.listeners.has_instance_listener(&key) {
					if let Some(instance) = builder.get_instance_opt(&key) {
						to_notify.push((key, instance));
					}
				}
			}
			(to_notify, builder.state())
		};
		// Per-instance listeners fire before whole-state listeners, both
		// outside the builder lock so a listener unsubscribing itself
		// mid-notification never deadlocks.
		for (key, instance) in to_notify {
			self.inner.listeners.notify_instance(&key, &instance);
		}
		self.inner.listeners.notify_whole_state(&state);
	}

	fn on_action_response(&self, frame: syncgraph_model::ActionResponse) {
		let outcome = match frame.error {
			Some(error) => Err(error),
			None => Ok(frame.result.unwrap_or(Value::Null)),
		};
		self.inner.pending.resolve(frame.call_id, outcome);
	}

	fn on_runtime_var(&self, frame: syncgraph_model::RuntimeVarFrame) {
		let snapshot = {
			let mut runtime = self.inner.runtime.lock();
			runtime.set(frame.name, frame.value);
			runtime.clone()
		};
		self.inner.listeners.notify_runtime(&snapshot);
	}

	fn on_empty(&self) {
		let state = {
			let mut builder = self.inner.builder.lock();
			builder.set_anchors(std::iter::empty());
			builder.state()
		};
		self.inner.events.fire_empty();
		self.inner.listeners.notify_whole_state(&state);
	}

	fn on_initial_anchors(&self, ids: Vec<i64>) {
		let state = {
			let mut builder = self.inner.builder.lock();
			builder.set_anchors(ids);
			builder.state()
		};
		self.inner.listeners.notify_whole_state(&state);
	}

	fn on_anchor_prepend(&self, id: i64) {
		let state = {
			let mut builder = self.inner.builder.lock();
			builder.prepend_anchor(id);
			builder.state()
		};
		self.inner.listeners.notify_whole_state(&state);
	}

	fn on_system(&self, value: Value) {
		tracing::debug!(frame = %value, "system frame received");
	}
}

fn now_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}

/// Owns one Transport and one Builder; the public facade of the state
/// engine. Cheap to clone — every field is an `Arc`.
#[derive(Clone)]
pub struct Coordinator {
	inner: Arc<Inner>,
}

impl Coordinator {
	pub fn new(model_map: ModelMap, anchor_type: impl Into<String>, many: bool, transport_config: TransportConfig, events: CoordinatorEvents) -> Self {
		Self::with_rpc_timeout(model_map, anchor_type, many, transport_config, events, DEFAULT_RPC_TIMEOUT)
	}

	pub fn with_rpc_timeout(
		model_map: ModelMap,
		anchor_type: impl Into<String>,
		many: bool,
		transport_config: TransportConfig,
		events: CoordinatorEvents,
		rpc_timeout: Duration,
	) -> Self {
		Self {
			inner: Arc::new(Inner {
				builder: Mutex::new(Builder::new(model_map, anchor_type, many)),
				runtime: Mutex::new(RuntimeState::default()),
				listeners: Arc::new(ListenerRegistry::default()),
				pending: Arc::new(PendingCalls::default()),
				call_ids: CallIdGenerator::default(),
				transport: Mutex::new(None),
				transport_config,
				events,
				rpc_timeout,
			}),
		}
	}

	/// Idempotent lazy construction of the Transport; no side effects past
	/// the first call.
	pub fn init(&self) {
		self.inner.init();
	}

	/// Appends a whole-state listener. On the first subscriber across all
	/// three `subscribe*` surfaces, lazily constructs the Transport and
	/// connects it. Returns an unsubscribe handle that tears the transport
	/// down once the listener set empties.
	pub fn subscribe(&self, listener: StateListener, no_connection_listener: Option<ConnectionListener>) -> Unsubscribe {
		self.inner.init();
		let whole = self.inner.listeners.add_whole_state(listener);
		let conn = no_connection_listener.map(|l| self.inner.listeners.add_connection(l));
		let inner = Arc::clone(&self.inner);
		Unsubscribe::new(move || {
			whole.unsubscribe();
			if let Some(conn) = conn {
				conn.unsubscribe();
			}
			inner.teardown_if_empty();
		})
	}

	/// Registers a per-instance listener keyed by `type_tag:id`. If the
	/// instance is already loaded, synchronously invokes the listener with
	/// the current reference before returning.
	pub fn subscribe_instance(&self, listener: InstanceListener, id: i64, type_tag: &str) -> Unsubscribe {
		self.inner.init();
		let key = InstanceKey::new(type_tag, id);
		{
			let builder = self.inner.builder.lock();
			if let Some(instance) = builder.get_instance_opt(&key) {
				if instance.loaded {
					listener(&instance);
				}
			}
		}
		let handle = self.inner.listeners.add_instance(key, listener);
		let inner = Arc::clone(&self.inner);
		Unsubscribe::new(move || {
			handle.unsubscribe();
			inner.teardown_if_empty();
		})
	}

	/// Registers a listener fired whenever a `runtime_var` frame changes the
	/// merged runtime-variable mapping.
	pub fn subscribe_runtime_state(&self, listener: RuntimeListener) -> Unsubscribe {
		self.inner.init();
		let handle = self.inner.listeners.add_runtime(listener);
		let inner = Arc::clone(&self.inner);
		Unsubscribe::new(move || {
			handle.unsubscribe();
			inner.teardown_if_empty();
		})
	}

	/// Issues an RPC: allocates a call id, sends `{callId, action, params}`,
	/// and awaits the matching response frame (or the configured timeout).
	pub async fn call_action(&self, name: impl Into<String>, params: Vec<Value>) -> Result<Value> {
		self.inner.init();
		let call_id = self.inner.call_ids.next();
		let rx = self.inner.pending.register(call_id);

		let transport = self.inner.transport.lock().clone();
		let Some(transport) = transport else {
			self.inner.pending.take(call_id);
			return Err(CoordinatorError::ChannelClosed);
		};
		let frame = serde_json::json!({
			"callId": call_id,
			"action": name.into(),
			"params": params,
		});
		transport.send(frame.to_string());

		match tokio::time::timeout(self.inner.rpc_timeout, rx).await {
			Ok(Ok(Ok(result))) => Ok(result),
			Ok(Ok(Err(error))) => Err(CoordinatorError::RpcError(error)),
			Ok(Err(_)) => Err(CoordinatorError::ChannelClosed),
			Err(_elapsed) => {
				self.inner.pending.take(call_id);
				Err(CoordinatorError::Timeout)
			}
		}
	}

	/// Closes the transport with `reason`. Non-terminal reasons schedule a
	/// reconnect per the transport's own backoff policy.
	pub fn disconnect(&self, reason: CloseReason) {
		if let Some(transport) = self.inner.transport.lock().as_ref() {
			transport.disconnect(reason);
		}
	}

	/// Terminal, no-reconnect form of `disconnect`, for `Drop`-adjacent
	/// cleanup paths.
	pub fn shutdown(&self) {
		self.disconnect(CloseReason::ManualDisconnect);
	}

	/// The current derived graph view.
	pub fn state(&self) -> State {
		self.inner.builder.lock().state()
	}

	/// The current merged runtime-variable mapping.
	pub fn runtime_state(&self) -> RuntimeState {
		self.inner.runtime.lock().clone()
	}

	pub fn get_instance(&self, key: &InstanceKey) -> Result<Arc<Instance>> {
		Ok(self.inner.builder.lock().get_instance(key)?)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use pretty_assertions::assert_eq;
	use syncgraph_transport::{BoxSocket, Connector, PairSocket, Socket};

	use super::*;

	fn test_config() -> TransportConfig {
		TransportConfig {
			endpoint_template: "ws://unused.test".to_string(),
			endpoint_args: Default::default(),
			token: "test-token".to_string(),
			sub_protocols: Vec::new(),
			init_backoff_ms: 5,
			max_backoff_ms: 20,
		}
	}

	fn paired_coordinator() -> (Coordinator, PairSocket) {
		paired_coordinator_with_config(test_config())
	}

	/// Same as [`paired_coordinator`] but with a caller-supplied transport
	/// config — e.g. a much longer backoff so a test asserting on a
	/// non-terminal close has a window to observe the status before the
	/// background task tries to reconnect against a connector that only
	/// hands out one socket.
	fn paired_coordinator_with_config(config: TransportConfig) -> (Coordinator, PairSocket) {
		let (server, client) = PairSocket::pair();
		let client = std::sync::Mutex::new(Some(client));
		let connector: Connector = Arc::new(move || {
			let socket = client.lock().unwrap().take().expect("single connection attempt in this test");
			Box::pin(async move { Ok(Box::new(socket) as BoxSocket) })
		});

		// `Coordinator::init` always builds a production `Transport::new`
		// (which resolves a real URL); tests instead reach through the
		// transport crate's connector seam directly.
		let coordinator = Coordinator::new(ModelMap::default(), "P", false, config.clone(), CoordinatorEvents::new());
		let handler: Arc<dyn TransportHandler> = Arc::new(CoordinatorHandler {
			inner: Arc::clone(&coordinator.inner),
		});
		let transport = Arc::new(Transport::with_connector(config, handler, connector));
		transport.connect();
		*coordinator.inner.transport.lock() = Some(transport);

		(coordinator, server)
	}

	#[tokio::test]
	async fn instance_batch_fans_out_to_whole_state_listeners() {
		let (coordinator, mut server) = paired_coordinator();
		server.recv_text().await.unwrap();
		server.send_text(r#"{"status_code":200}"#.to_string()).await.unwrap();

		let calls = Arc::new(AtomicUsize::new(0));
		let calls_clone = Arc::clone(&calls);
		let _sub = coordinator.subscribe(
			Arc::new(move |_state: &State| {
				calls_clone.fetch_add(1, Ordering::SeqCst);
			}),
			None,
		);

		server
			.send_text(r#"[{"id":1,"_instance_type":"P","_operation":"create","_tstamp":1,"name":"A"}]"#.to_string())
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(30)).await;

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		let State::Single(Some(instance)) = coordinator.state() else {
			panic!("expected anchor instance");
		};
		assert_eq!(instance.id(), 1);
	}

	#[tokio::test]
	async fn subscribe_instance_fires_synchronously_when_already_loaded() {
		let (coordinator, mut server) = paired_coordinator();
		server.recv_text().await.unwrap();
		server.send_text(r#"{"status_code":200}"#.to_string()).await.unwrap();
		server
			.send_text(r#"[{"id":1,"_instance_type":"P","_operation":"create","_tstamp":1,"name":"A"}]"#.to_string())
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(30)).await;

		let seen = Arc::new(AtomicUsize::new(0));
		let seen_clone = Arc::clone(&seen);
		let _sub = coordinator.subscribe_instance(
			Arc::new(move |_instance: &Arc<Instance>| {
				seen_clone.fetch_add(1, Ordering::SeqCst);
			}),
			1,
			"P",
		);
		assert_eq!(seen.load(Ordering::SeqCst), 1, "already-loaded instance should fire synchronously");
	}

	/// Interleaved `call_action` invocations each resolve with exactly
	/// their matching response; one rejecting does not affect the other.
	#[tokio::test]
	async fn rpc_responses_are_matched_by_correlation_id() {
		let (coordinator, mut server) = paired_coordinator();
		server.recv_text().await.unwrap();
		server.send_text(r#"{"status_code":200}"#.to_string()).await.unwrap();
		tokio::time::sleep(Duration::from_millis(20)).await;

		let call_a = coordinator.call_action("a", vec![Value::from(1)]);
		let call_b = coordinator.call_action("b", vec![]);

		let first = server.recv_text().await.unwrap().unwrap();
		let second = server.recv_text().await.unwrap().unwrap();
		let call_id_of = |text: &str| -> Value {
			let v: Value = serde_json::from_str(text).unwrap();
			v["callId"].clone()
		};
		let id_a = call_id_of(&first);
		let id_b = call_id_of(&second);

		server
			.send_text(serde_json::json!({"callId": id_b, "result": "ok-b"}).to_string())
			.await
			.unwrap();
		server
			.send_text(serde_json::json!({"callId": id_a, "error": "fail-a"}).to_string())
			.await
			.unwrap();

		let (result_a, result_b) = tokio::join!(call_a, call_b);
		assert_eq!(result_b.unwrap(), Value::from("ok-b"));
		assert!(matches!(result_a.unwrap_err(), CoordinatorError::RpcError(e) if e == Value::from("fail-a")));
	}

	#[tokio::test]
	async fn runtime_var_frames_merge_and_notify() {
		let (coordinator, mut server) = paired_coordinator();
		server.recv_text().await.unwrap();
		server.send_text(r#"{"status_code":200}"#.to_string()).await.unwrap();

		let notifications = Arc::new(AtomicUsize::new(0));
		let notifications_clone = Arc::clone(&notifications);
		let _sub = coordinator.subscribe_runtime_state(Arc::new(move |_state: &RuntimeState| {
			notifications_clone.fetch_add(1, Ordering::SeqCst);
		}));

		server
			.send_text(r#"{"runtimeVar":"featureFlag","value":true}"#.to_string())
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(30)).await;

		assert_eq!(notifications.load(Ordering::SeqCst), 1);
		assert_eq!(coordinator.runtime_state().get("featureFlag"), Some(&Value::from(true)));
	}

	#[tokio::test]
	async fn unsubscribing_last_listener_tears_down_transport() {
		let (coordinator, mut server) = paired_coordinator();
		server.recv_text().await.unwrap();
		server.send_text(r#"{"status_code":200}"#.to_string()).await.unwrap();
		tokio::time::sleep(Duration::from_millis(20)).await;

		let sub = coordinator.subscribe(Arc::new(|_: &State| {}), None);
		sub.unsubscribe();
		tokio::time::sleep(Duration::from_millis(20)).await;

		assert!(coordinator.inner.transport.lock().is_none());
	}

	/// An anchor-type mismatch on the first payload is fatal for the
	/// channel: it must surface via `on_error` and terminally close the
	/// transport, not just get logged while the socket stays `Ready`.
	#[tokio::test]
	async fn anchor_type_mismatch_terminally_closes_the_transport() {
		let (coordinator, mut server) = paired_coordinator();
		server.recv_text().await.unwrap();
		server.send_text(r#"{"status_code":200}"#.to_string()).await.unwrap();

		server
			.send_text(r#"[{"id":1,"_instance_type":"Q","_operation":"create","_tstamp":1,"name":"A"}]"#.to_string())
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(30)).await;

		let transport = coordinator.inner.transport.lock().as_ref().cloned();
		let transport = transport.expect("transport handle should still be stored (only unsubscribe tears it down)");
		assert_eq!(
			transport.status(),
			ConnectionStatus::Closed {
				reason: CloseReason::ProtocolError,
				terminal: true,
			}
		);
	}

	/// A non-terminal `disconnect` reason does not close the transport for
	/// good: it schedules a reconnect per the backoff policy instead.
	#[tokio::test]
	async fn disconnect_with_non_terminal_reason_reconnects() {
		// A long backoff so the background task's reconnect attempt (which
		// would panic against this test's single-socket connector) cannot
		// fire inside the assertion window below.
		let mut config = test_config();
		config.init_backoff_ms = 10_000;
		config.max_backoff_ms = 10_000;
		let (coordinator, mut server) = paired_coordinator_with_config(config);
		server.recv_text().await.unwrap();
		server.send_text(r#"{"status_code":200}"#.to_string()).await.unwrap();
		tokio::time::sleep(Duration::from_millis(20)).await;

		coordinator.disconnect(CloseReason::Other);
		tokio::time::sleep(Duration::from_millis(20)).await;

		let transport = coordinator.inner.transport.lock().as_ref().cloned();
		let transport = transport.expect("transport handle should still be stored");
		assert!(
			!transport.status().is_terminal(),
			"CloseReason::Other must not terminally close the transport"
		);
	}
}
