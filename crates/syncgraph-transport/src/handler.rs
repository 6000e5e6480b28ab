//! Typed callback surface the transport dispatches classified frames to.
//!
//! One trait, implemented once by the owning component (here, the
//! Channel Coordinator), with default no-op methods so a caller only
//! overrides the events it cares about.

use syncgraph_model::{ActionResponse, InstancePayload, RuntimeVarFrame};

use crate::status::ConnectionStatus;

/// Dispatch target for classified inbound frames and connection-status
/// transitions. All methods default to no-ops; a `Coordinator` overrides
/// the ones it routes onward to listeners.
pub trait TransportHandler: Send + Sync + 'static {
	fn on_connected(&self) {}
	fn on_status_change(&self, _status: ConnectionStatus) {}
	fn on_error(&self, _message: String) {}
	fn on_instances(&self, _batch: Vec<InstancePayload>) {}
	fn on_action_response(&self, _frame: ActionResponse) {}
	fn on_runtime_var(&self, _frame: RuntimeVarFrame) {}
	fn on_empty(&self) {}
	fn on_initial_anchors(&self, _ids: Vec<i64>) {}
	fn on_anchor_prepend(&self, _id: i64) {}
	fn on_system(&self, _value: serde_json::Value) {}
}
