//! The self-healing duplex transport.
//!
//! Runs its reconnect loop on a single background `tokio::task`: one task
//! owns the live socket and drains a command channel, while a cheap
//! `Clone`-able handle (here just `Transport` itself, holding `Arc`s) is
//! shared with callers.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use syncgraph_model::{classify, AuthStatus, ClassifiedFrame};

use crate::backoff::Backoff;
use crate::config::{CloseReason, TransportConfig};
use crate::error::{Result, TransportError};
use crate::handler::TransportHandler;
use crate::socket::{Socket, WsSocket};
use crate::status::ConnectionStatus;

pub type BoxSocket = Box<dyn Socket>;
/// Produces one fresh socket per connection attempt. Boxed as a trait
/// object (not a generic parameter) so a test transport and the production
/// `tokio-tungstenite` transport are the same concrete type — only the
/// connector differs.
pub type Connector = Arc<dyn Fn() -> BoxFuture<'static, Result<BoxSocket>> + Send + Sync>;

enum Command {
	Send(String),
	Disconnect(Option<CloseReason>),
}

/// A persistent duplex channel with authentication handshake, typed frame
/// dispatch, and capped exponential backoff reconnect.
pub struct Transport {
	config: TransportConfig,
	connector: Connector,
	handler: Arc<dyn TransportHandler>,
	status: Arc<Mutex<ConnectionStatus>>,
	cmd_tx: mpsc::UnboundedSender<Command>,
	cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
	/// Production constructor: connects over `tokio-tungstenite` to the
	/// config's resolved endpoint.
	pub fn new(config: TransportConfig, handler: Arc<dyn TransportHandler>) -> Result<Self> {
		let url = url::Url::parse(&config.resolved_endpoint())?;
		let sub_protocols = config.sub_protocols.clone();
		let connector: Connector = Arc::new(move || {
			let url = url.clone();
			let sub_protocols = sub_protocols.clone();
			Box::pin(async move {
				let socket = WsSocket::connect(&url, &sub_protocols).await?;
				Ok(Box::new(socket) as BoxSocket)
			})
		});
		Ok(Self::with_connector(config, handler, connector))
	}

	/// Test constructor: supply an arbitrary connector (e.g. one handing
	/// back a [`crate::socket::PairSocket`] half).
	pub fn with_connector(config: TransportConfig, handler: Arc<dyn TransportHandler>, connector: Connector) -> Self {
		let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
		Self {
			config,
			connector,
			handler,
			status: Arc::new(Mutex::new(ConnectionStatus::Idle)),
			cmd_tx,
			cmd_rx: Mutex::new(Some(cmd_rx)),
			task: Mutex::new(None),
		}
	}

	pub fn status(&self) -> ConnectionStatus {
		*self.status.lock()
	}

	/// Spawns the reconnect loop if it is not already running. Idempotent.
	pub fn connect(self: &Arc<Self>) {
		let mut task = self.task.lock();
		if task.is_some() {
			return;
		}
		let Some(cmd_rx) = self.cmd_rx.lock().take() else {
			return;
		};
		let this = Arc::clone(self);
		*task = Some(tokio::spawn(async move {
			this.run(cmd_rx).await;
		}));
	}

	/// Only sends when the socket is open; otherwise logs and drops. No
	/// outbound queueing.
	pub fn send(&self, text: String) {
		if !self.status().is_ready() {
			tracing::warn!("dropping outbound frame: transport not ready");
			return;
		}
		if self.cmd_tx.send(Command::Send(text)).is_err() {
			tracing::warn!("dropping outbound frame: transport task not running");
		}
	}

	/// Cancels any pending reconnect and closes the socket terminally.
	pub fn disconnect(&self, reason: CloseReason) {
		let _ = self.cmd_tx.send(Command::Disconnect(Some(reason)));
	}

	async fn run(self: Arc<Self>, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
		let mut backoff = Backoff::new(self.config.init_backoff(), self.config.max_backoff());

		loop {
			self.set_status(ConnectionStatus::Connecting);
			let socket = match (self.connector)().await {
				Ok(socket) => socket,
				Err(e) => {
					self.handler.on_error(e.to_string());
					if !self.wait_and_retry(&mut backoff, &mut cmd_rx).await {
						return;
					}
					continue;
				}
			};

			match self.run_connection(socket, &mut cmd_rx).await {
				ConnectionOutcome::Terminal(reason) => {
					self.set_status(ConnectionStatus::Closed { reason, terminal: true });
					return;
				}
				ConnectionOutcome::Reconnect => {
					backoff.reset();
					if !self.wait_and_retry(&mut backoff, &mut cmd_rx).await {
						return;
					}
				}
			}
		}
	}

	/// Runs one connection's handshake and read/dispatch loop. Returns once
	/// the socket closes or a terminal disconnect is requested.
	async fn run_connection(&self, mut socket: BoxSocket, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) -> ConnectionOutcome {
		self.set_status(ConnectionStatus::Authenticating);
		let handshake = serde_json::json!({ "token": self.config.token }).to_string();
		if let Err(e) = socket.send_text(handshake).await {
			self.handler.on_error(e.to_string());
			return ConnectionOutcome::Reconnect;
		}

		let first = match socket.recv_text().await {
			Ok(Some(text)) => text,
			Ok(None) => return ConnectionOutcome::Reconnect,
			Err(e) => {
				self.handler.on_error(e.to_string());
				return ConnectionOutcome::Reconnect;
			}
		};
		let auth: AuthStatus = match serde_json::from_str(&first) {
			Ok(auth) => auth,
			Err(_) => {
				self.handler.on_error("malformed authentication frame".to_string());
				return ConnectionOutcome::Terminal(CloseReason::ProtocolError);
			}
		};
		if let Some(error) = auth.error {
			self.handler.on_error(error);
			return ConnectionOutcome::Terminal(CloseReason::AuthenticationError);
		}
		if auth.status_code != 200 {
			self.handler
				.on_error(format!("authentication failed: status {}", auth.status_code));
			return ConnectionOutcome::Terminal(CloseReason::AuthenticationError);
		}

		self.set_status(ConnectionStatus::Ready);
		self.handler.on_connected();

		loop {
			tokio::select! {
				frame = socket.recv_text() => {
					match frame {
						Ok(Some(text)) => self.dispatch(text),
						Ok(None) => return ConnectionOutcome::Reconnect,
						Err(e) => {
							self.handler.on_error(e.to_string());
							return ConnectionOutcome::Reconnect;
						}
					}
				}
				cmd = cmd_rx.recv() => {
					match cmd {
						Some(Command::Send(text)) => {
							if let Err(e) = socket.send_text(text).await {
								self.handler.on_error(e.to_string());
								return ConnectionOutcome::Reconnect;
							}
						}
						Some(Command::Disconnect(reason)) => {
							socket.close().await;
							return match reason {
								Some(reason) if reason.is_terminal() => ConnectionOutcome::Terminal(reason),
								Some(_) | None => ConnectionOutcome::Reconnect,
							};
						}
						None => return ConnectionOutcome::Reconnect,
					}
				}
			}
		}
	}

	fn dispatch(&self, text: String) {
		let value: Value = match serde_json::from_str(&text) {
			Ok(v) => v,
			Err(e) => {
				tracing::warn!(error = %e, "dropping malformed frame");
				self.handler.on_error(TransportError::ProtocolError(e.to_string()).to_string());
				return;
			}
		};
		match classify(value) {
			ClassifiedFrame::Instances(batch) => self.handler.on_instances(batch),
			ClassifiedFrame::ActionResponse(frame) => self.handler.on_action_response(frame),
			ClassifiedFrame::RuntimeVar(frame) => self.handler.on_runtime_var(frame),
			ClassifiedFrame::Empty => self.handler.on_empty(),
			ClassifiedFrame::InitialAnchors(ids) => self.handler.on_initial_anchors(ids),
			ClassifiedFrame::AnchorPrepend(id) => self.handler.on_anchor_prepend(id),
			ClassifiedFrame::System(value) => self.handler.on_system(value),
			ClassifiedFrame::Maintenance(_) => {
				tracing::info!("maintenance frame received, forcing reconnect");
				self.cmd_tx.send(Command::Disconnect(None)).ok();
			}
			ClassifiedFrame::ConnectionStatus(status) => {
				if status.status_code == 200 {
					self.handler.on_connected();
				}
			}
			ClassifiedFrame::Unrecognized(value) => {
				tracing::warn!(frame = %value, "dropping unrecognized frame shape");
			}
		}
	}

	/// Sleeps the current backoff interval, interruptible by a terminal
	/// disconnect command arriving meanwhile. Returns `false` if the loop
	/// should stop entirely.
	async fn wait_and_retry(&self, backoff: &mut Backoff, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) -> bool {
		let interval = backoff.next();
		self.set_status(ConnectionStatus::Closed {
			reason: CloseReason::Other,
			terminal: false,
		});
		tokio::select! {
			_ = tokio::time::sleep(interval) => true,
			cmd = cmd_rx.recv() => match cmd {
				Some(Command::Disconnect(Some(reason))) if reason.is_terminal() => {
					self.set_status(ConnectionStatus::Closed { reason, terminal: true });
					false
				}
				_ => true,
			},
		}
	}

	fn set_status(&self, status: ConnectionStatus) {
		*self.status.lock() = status;
		self.handler.on_status_change(status);
	}
}

enum ConnectionOutcome {
	Terminal(CloseReason),
	Reconnect,
}
