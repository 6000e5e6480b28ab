//! Inbound-frame shapes and classification.

use serde::Deserialize;
use serde_json::Value;

use crate::payload::InstancePayload;

/// Authentication status frame — the first inbound frame after the socket
/// opens.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthStatus {
	pub status_code: u16,
	#[serde(default)]
	pub error: Option<String>,
}

/// RPC response frame, matched to a pending call by `call_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionResponse {
	#[serde(rename = "callId")]
	pub call_id: u64,
	#[serde(default)]
	pub result: Option<Value>,
	#[serde(default)]
	pub error: Option<Value>,
}

/// A server-pushed runtime-variable update.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeVarFrame {
	#[serde(rename = "runtimeVar")]
	pub name: String,
	pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct InitialAnchorsFrame {
	#[serde(rename = "initialAnchors")]
	ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnchorPrependFrame {
	#[serde(rename = "prependAnchor")]
	id: i64,
}

/// One classified inbound frame, dispatched in a fixed shape-priority
/// order.
#[derive(Debug, Clone)]
pub enum ClassifiedFrame {
	Instances(Vec<InstancePayload>),
	ActionResponse(ActionResponse),
	RuntimeVar(RuntimeVarFrame),
	/// An `initialAnchors` frame carrying an empty list.
	Empty,
	InitialAnchors(Vec<i64>),
	AnchorPrepend(i64),
	System(Value),
	/// Server-initiated graceful rollover; the transport should force a
	/// reconnect rather than surface this to listeners.
	Maintenance(Value),
	ConnectionStatus(AuthStatus),
	/// An object frame matching none of the known shapes: log and drop,
	/// do not tear down.
	Unrecognized(Value),
}

/// Classify one already-parsed JSON frame by shape.
///
/// `serde`'s untagged-enum matching is deliberately not used here: the
/// shape-priority order is load-bearing (a frame could in principle carry
/// both `callId` and `source`), so each shape is checked explicitly in a
/// fixed order rather than left to whichever variant an untagged enum
/// happens to try first.
pub fn classify(value: Value) -> ClassifiedFrame {
	if value.is_array() {
		return match serde_json::from_value::<Vec<InstancePayload>>(value.clone()) {
			Ok(batch) => ClassifiedFrame::Instances(batch),
			Err(_) => ClassifiedFrame::Unrecognized(value),
		};
	}

	let Some(map) = value.as_object() else {
		return ClassifiedFrame::Unrecognized(value);
	};

	if map.contains_key("callId") {
		if let Ok(resp) = serde_json::from_value::<ActionResponse>(value.clone()) {
			return ClassifiedFrame::ActionResponse(resp);
		}
	}
	if map.contains_key("runtimeVar") {
		if let Ok(frame) = serde_json::from_value::<RuntimeVarFrame>(value.clone()) {
			return ClassifiedFrame::RuntimeVar(frame);
		}
	}
	if map.contains_key("initialAnchors") {
		if let Ok(frame) = serde_json::from_value::<InitialAnchorsFrame>(value.clone()) {
			return if frame.ids.is_empty() {
				ClassifiedFrame::Empty
			} else {
				ClassifiedFrame::InitialAnchors(frame.ids)
			};
		}
	}
	if map.contains_key("prependAnchor") {
		if let Ok(frame) = serde_json::from_value::<AnchorPrependFrame>(value.clone()) {
			return ClassifiedFrame::AnchorPrepend(frame.id);
		}
	}
	match map.get("source").and_then(Value::as_str) {
		Some("system") => return ClassifiedFrame::System(value),
		Some("maintenance") => return ClassifiedFrame::Maintenance(value),
		_ => {}
	}
	if map.contains_key("status_code") {
		if let Ok(status) = serde_json::from_value::<AuthStatus>(value.clone()) {
			return ClassifiedFrame::ConnectionStatus(status);
		}
	}

	ClassifiedFrame::Unrecognized(value)
}
