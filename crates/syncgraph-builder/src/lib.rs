//! State Builder: reconstructs a nested object graph from a stream of
//! flat instance payloads and performs upward reference invalidation so
//! every mutation propagates fresh references to the anchor.

mod builder;
mod error;

pub use builder::{Builder, State};
pub use error::{BuilderError, Result};

pub use syncgraph_model::{Field, Identity, Instance, InstanceKey, InstancePayload, ModelMap, Operation};
