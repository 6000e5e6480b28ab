//! Errors raised by the Connection Transport.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
	#[error("invalid endpoint url: {0}")]
	InvalidUrl(#[from] url::ParseError),

	#[error("socket error: {0}")]
	Socket(String),

	#[error("server reported authentication error: {0}")]
	AuthenticationError(String),

	#[error("malformed or unclassifiable frame: {0}")]
	ProtocolError(String),

	#[error("transport is already closed terminally")]
	AlreadyTerminal,
}

pub type Result<T> = std::result::Result<T, TransportError>;
