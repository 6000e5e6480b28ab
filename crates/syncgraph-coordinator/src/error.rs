//! Errors raised by the Channel Coordinator.

use serde_json::Value;
use syncgraph_builder::BuilderError;
use syncgraph_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
	#[error(transparent)]
	Builder(#[from] BuilderError),

	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The matching `callId` response never arrived within the configured
	/// timeout; the pending entry has already been removed.
	#[error("call_action timed out waiting for a response")]
	Timeout,

	/// Response frame carried an `error`.
	#[error("action rejected by server: {0}")]
	RpcError(Value),

	/// The coordinator's transport task is gone (e.g. after `shutdown`).
	#[error("coordinator channel closed")]
	ChannelClosed,
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
