//! The static, generated "model map" artifact.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Immutable configuration mapping each `type_tag` to its relational
/// properties and the `type_tag` each one targets.
///
/// Supplied at `Builder` construction and never mutated once loaded; any
/// property not present here is a scalar field, stored verbatim. This is
/// an out-of-band artifact produced by code generation this crate does
/// not implement, consumed here only as typed, already-deserialized
/// configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelMap(HashMap<String, HashMap<String, String>>);

impl ModelMap {
	pub fn new(map: HashMap<String, HashMap<String, String>>) -> Self {
		Self(map)
	}

	/// Returns the target type tag for `type_tag.property`, or `None` if
	/// the property is a scalar field (absent from the model map, or its
	/// owning type is absent entirely).
	pub fn relation_target(&self, type_tag: &str, property: &str) -> Option<&str> {
		self.0.get(type_tag)?.get(property).map(String::as_str)
	}

	pub fn is_relation(&self, type_tag: &str, property: &str) -> bool {
		self.relation_target(type_tag, property).is_some()
	}
}
