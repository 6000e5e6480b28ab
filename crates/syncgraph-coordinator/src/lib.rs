//! Channel Coordinator: binds the Connection Transport to the State
//! Builder, multiplexes listener fan-out (whole state, per-instance,
//! runtime variables, connection status), and layers a request/response
//! RPC surface over the transport's send path with correlation-id
//! tracking.

mod coordinator;
mod error;
mod events;
mod listeners;
mod pending;
mod runtime_state;

pub use coordinator::Coordinator;
pub use error::{CoordinatorError, Result};
pub use events::CoordinatorEvents;
pub use listeners::{ConnectionListener, InstanceListener, RuntimeListener, StateListener, Unsubscribe};
pub use pending::{CallIdGenerator, CallOutcome, PendingCalls};
pub use runtime_state::RuntimeState;

pub use syncgraph_builder::{Builder, Field, Identity, Instance, InstanceKey, InstancePayload, ModelMap, Operation, State};
pub use syncgraph_transport::{CloseReason, ConnectionStatus, TransportConfig};
