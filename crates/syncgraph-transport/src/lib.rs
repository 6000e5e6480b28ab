//! Connection Transport: a self-healing duplex channel with authentication
//! handshake, typed frame dispatch, and capped exponential backoff.

mod backoff;
mod config;
mod error;
mod handler;
mod socket;
mod status;
mod transport;

pub use backoff::Backoff;
pub use config::{CloseReason, TransportConfig};
pub use error::{Result, TransportError};
pub use handler::TransportHandler;
pub use socket::{PairSocket, Socket, WsSocket};
pub use status::ConnectionStatus;
pub use transport::{BoxSocket, Connector, Transport};

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
	use std::sync::Arc;
	use std::time::Duration;

	use pretty_assertions::assert_eq;
	use syncgraph_model::{ActionResponse, InstancePayload};

	use super::*;

	#[derive(Default)]
	struct RecordingHandler {
		connected: AtomicBool,
		batches: AtomicU32,
		responses: parking_lot::Mutex<Vec<ActionResponse>>,
	}

	impl TransportHandler for RecordingHandler {
		fn on_connected(&self) {
			self.connected.store(true, Ordering::SeqCst);
		}

		fn on_instances(&self, _batch: Vec<InstancePayload>) {
			self.batches.fetch_add(1, Ordering::SeqCst);
		}

		fn on_action_response(&self, frame: ActionResponse) {
			self.responses.lock().push(frame);
		}
	}

	fn test_config() -> TransportConfig {
		TransportConfig {
			endpoint_template: "ws://unused.test".to_string(),
			endpoint_args: Default::default(),
			token: "test-token".to_string(),
			sub_protocols: Vec::new(),
			init_backoff_ms: 5,
			max_backoff_ms: 20,
		}
	}

	#[tokio::test]
	async fn handshake_then_instance_batch() {
		let (mut server, client) = PairSocket::pair();
		let connector: Connector = {
			let client = std::sync::Mutex::new(Some(client));
			Arc::new(move || {
				let socket = client.lock().unwrap().take().expect("single connection attempt in this test");
				Box::pin(async move { Ok(Box::new(socket) as BoxSocket) })
			})
		};

		let handler = Arc::new(RecordingHandler::default());
		let transport = Arc::new(Transport::with_connector(test_config(), handler.clone(), connector));
		transport.connect();

		// drive the handshake from the "server" side
		let hello = server.recv_text().await.unwrap().unwrap();
		assert!(hello.contains("test-token"));
		server.send_text(r#"{"status_code":200}"#.to_string()).await.unwrap();

		tokio::time::sleep(Duration::from_millis(20)).await;
		assert!(handler.connected.load(Ordering::SeqCst));

		server
			.send_text(r#"[{"id":1,"_instance_type":"P","_operation":"create","_tstamp":1,"name":"A"}]"#.to_string())
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert_eq!(handler.batches.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn authentication_error_is_terminal() {
		let (mut server, client) = PairSocket::pair();
		let connector: Connector = {
			let client = std::sync::Mutex::new(Some(client));
			Arc::new(move || {
				let socket = client.lock().unwrap().take().expect("single connection attempt in this test");
				Box::pin(async move { Ok(Box::new(socket) as BoxSocket) })
			})
		};
		let handler = Arc::new(RecordingHandler::default());
		let transport = Arc::new(Transport::with_connector(test_config(), handler.clone(), connector));
		transport.connect();

		server.recv_text().await.unwrap();
		server
			.send_text(r#"{"status_code":401,"error":"bad token"}"#.to_string())
			.await
			.unwrap();

		tokio::time::sleep(Duration::from_millis(30)).await;
		assert_eq!(
			transport.status(),
			ConnectionStatus::Closed {
				reason: CloseReason::AuthenticationError,
				terminal: true,
			}
		);
		assert!(!handler.connected.load(Ordering::SeqCst));
	}
}
