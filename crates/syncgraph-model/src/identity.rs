//! Identity pairs and the `"type:id"` index key.

use std::fmt;

/// A stable server-side type name plus an integer id — the unit of
/// identity for every node in the reconstructed graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
	pub type_tag: String,
	pub id: i64,
}

impl Identity {
	pub fn new(type_tag: impl Into<String>, id: i64) -> Self {
		Self {
			type_tag: type_tag.into(),
			id,
		}
	}

	pub fn key(&self) -> InstanceKey {
		InstanceKey::new(&self.type_tag, self.id)
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.type_tag, self.id)
	}
}

/// `"type_tag:id"` — the instance index's lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey(String);

impl InstanceKey {
	pub fn new(type_tag: &str, id: i64) -> Self {
		Self(format!("{type_tag}:{id}"))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for InstanceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&Identity> for InstanceKey {
	fn from(identity: &Identity) -> Self {
		identity.key()
	}
}

impl From<String> for InstanceKey {
	fn from(s: String) -> Self {
		Self(s)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn key_format_matches_wire_convention() {
		let id = Identity::new("Project", 7);
		assert_eq!(id.key().as_str(), "Project:7");
		assert_eq!(id.to_string(), "Project:7");
	}
}
