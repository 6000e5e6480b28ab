//! Errors raised by the State Builder.

use syncgraph_model::InstanceKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuilderError {
	/// The first payload in single-anchor mode named a type different
	/// from the configured anchor type. Fatal for the channel.
	#[error("anchor type mismatch: expected '{expected}', got '{actual}'")]
	AnchorTypeMismatch { expected: String, actual: String },

	/// `get_instance` was asked for a key the index has never seen.
	#[error("instance not found: {0}")]
	InstanceNotFound(InstanceKey),
}

pub type Result<T> = std::result::Result<T, BuilderError>;
