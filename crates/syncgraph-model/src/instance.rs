//! The reconstructed graph's node type.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::identity::{Identity, InstanceKey};

/// Operation tag carried by every wire payload and retained on the
/// instance once merged into the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
	Create,
	Update,
	Delete,
	InitialState,
}

/// One property value on a materialized instance.
///
/// Relational fields are resolved in place: a single-target relation
/// holds a direct reference to the target instance, a multi-target
/// relation holds an ordered sequence of direct references. A property
/// absent from the model map is a scalar and is stored verbatim.
#[derive(Debug, Clone)]
pub enum Field {
	Scalar(serde_json::Value),
	Ref(Option<Arc<Instance>>),
	RefList(Vec<Arc<Instance>>),
}

impl Field {
	pub fn as_scalar(&self) -> Option<&serde_json::Value> {
		match self {
			Field::Scalar(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_ref_single(&self) -> Option<Option<&Arc<Instance>>> {
		match self {
			Field::Ref(v) => Some(v.as_ref()),
			_ => None,
		}
	}

	pub fn as_ref_list(&self) -> Option<&[Arc<Instance>]> {
		match self {
			Field::RefList(v) => Some(v.as_slice()),
			_ => None,
		}
	}
}

/// One node of the reconstructed graph, corresponding to one serializer's
/// output on the server.
///
/// `Instance`s are never mutated in place once installed in the index:
/// every update replaces the
/// index entry with a new `Instance` wrapped in a new `Arc`, so `Arc::
/// ptr_eq` on two index reads is exactly the reference-equality check a
/// UI-framework renderer relies on downstream of this engine.
#[derive(Debug, Clone)]
pub struct Instance {
	pub identity: Identity,
	pub tstamp: u64,
	pub operation: Operation,
	pub loaded: bool,
	pub fields: HashMap<String, Field>,
}

impl Instance {
	/// A placeholder for an identity that has been referenced but not yet
	/// received.
	pub fn placeholder(identity: Identity) -> Self {
		Self {
			identity,
			tstamp: 0,
			operation: Operation::Create,
			loaded: false,
			fields: HashMap::new(),
		}
	}

	pub fn key(&self) -> InstanceKey {
		self.identity.key()
	}

	pub fn type_tag(&self) -> &str {
		&self.identity.type_tag
	}

	pub fn id(&self) -> i64 {
		self.identity.id
	}

	pub fn get(&self, name: &str) -> Option<&Field> {
		self.fields.get(name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn placeholder_is_unloaded_and_empty() {
		let inst = Instance::placeholder(Identity::new("Task", 10));
		assert!(!inst.loaded);
		assert_eq!(inst.tstamp, 0);
		assert_eq!(inst.operation, Operation::Create);
		assert!(inst.fields.is_empty());
	}
}
