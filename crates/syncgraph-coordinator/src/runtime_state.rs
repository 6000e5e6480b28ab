//! Runtime variables: a flat mapping updated solely via server-pushed
//! `runtime_var` frames.

use std::collections::HashMap;

use serde_json::Value;

/// Merged key-by-key on each `runtime_var` frame: a flat mapping that is
/// updated solely via pushed frames only makes sense as a merge (not a
/// wholesale replace) once more than one variable has ever been pushed.
#[derive(Debug, Clone, Default)]
pub struct RuntimeState(HashMap<String, Value>);

impl RuntimeState {
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.0.get(name)
	}

	pub fn set(&mut self, name: String, value: Value) {
		self.0.insert(name, value);
	}

	pub fn as_map(&self) -> &HashMap<String, Value> {
		&self.0
	}
}
