//! Transport configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why a connection was closed.
///
/// The four terminal reasons mean "do not reconnect"; any other closure —
/// including closure before the auth handshake finished — is non-terminal
/// and schedules a backoff reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
	AuthenticationError,
	ProtocolError,
	NoSubscribers,
	ManualDisconnect,
	/// Socket dropped for a reason the transport does not classify as
	/// terminal (network blip, server restart, ...).
	Other,
}

impl CloseReason {
	/// The four reasons that mean no reconnect; `Other` is the catch-all
	/// for every closure that should reconnect.
	pub fn is_terminal(self) -> bool {
		!matches!(self, CloseReason::Other)
	}
}

/// Construction inputs for a [`crate::Transport`].
///
/// `endpoint_template` may contain `{placeholder}` markers substituted from
/// `endpoint_args` at connect time; this lets
/// one `TransportConfig` serve a channel keyed by per-instance arguments
/// (e.g. a project id baked into the socket path) without re-parsing a URL
/// by hand on every reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
	pub endpoint_template: String,
	#[serde(default)]
	pub endpoint_args: HashMap<String, String>,
	pub token: String,
	#[serde(default)]
	pub sub_protocols: Vec<String>,
	#[serde(default = "default_init_backoff_ms")]
	pub init_backoff_ms: u64,
	#[serde(default = "default_max_backoff_ms")]
	pub max_backoff_ms: u64,
}

fn default_init_backoff_ms() -> u64 {
	50
}

fn default_max_backoff_ms() -> u64 {
	5_000
}

impl TransportConfig {
	pub fn init_backoff(&self) -> Duration {
		Duration::from_millis(self.init_backoff_ms)
	}

	pub fn max_backoff(&self) -> Duration {
		Duration::from_millis(self.max_backoff_ms)
	}

	/// Substitutes `{name}` markers in `endpoint_template` from
	/// `endpoint_args`, returning the resolved URL string.
	pub fn resolved_endpoint(&self) -> String {
		let mut url = self.endpoint_template.clone();
		for (name, value) in &self.endpoint_args {
			url = url.replace(&format!("{{{name}}}"), value);
		}
		url
	}
}
