//! The wire shape of one instance payload.

use serde::{Deserialize, Serialize};

use crate::instance::Operation;

/// One flat, typed instance payload as it arrives over the wire.
///
/// `fields` captures every key besides `id`/`_instance_type`/`_operation`/
/// `_tstamp` — scalar and relational alike. The builder, not this type,
/// decides which are which by consulting the model map at ingest time;
/// the payload itself carries no such distinction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstancePayload {
	pub id: i64,
	#[serde(rename = "_instance_type")]
	pub instance_type: String,
	#[serde(rename = "_operation")]
	pub operation: Operation,
	#[serde(rename = "_tstamp")]
	pub tstamp: u64,
	#[serde(flatten)]
	pub fields: serde_json::Map<String, serde_json::Value>,
}
