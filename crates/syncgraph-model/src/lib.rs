//! Wire types and the object-graph data model shared by the syncgraph
//! state engine.
//!
//! This crate owns no behavior beyond frame classification — it is pure
//! vocabulary: the `Instance`/`Identity`/`ModelMap` types the State
//! Builder operates on, and the wire payload/frame types the Connection
//! Transport and Channel Coordinator exchange.

pub mod frame;
pub mod identity;
pub mod instance;
pub mod model_map;
pub mod payload;

pub use frame::{classify, ActionResponse, AuthStatus, ClassifiedFrame, RuntimeVarFrame};
pub use identity::{Identity, InstanceKey};
pub use instance::{Field, Instance, Operation};
pub use model_map::ModelMap;
pub use payload::InstancePayload;
