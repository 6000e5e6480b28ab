//! The duplex text-frame socket abstraction.
//!
//! Handshake and frame classification run against this trait rather than
//! against `tokio_tungstenite` directly, so the production transport and an
//! in-memory test double share one code path — the same line a generic
//! protocol engine draws between itself and whatever byte stream it
//! happens to be driving.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;

use crate::error::{Result, TransportError};

/// One open duplex connection carrying newline-free JSON text frames.
#[async_trait]
pub trait Socket: Send {
	async fn send_text(&mut self, text: String) -> Result<()>;

	/// `Ok(None)` means the peer closed the connection cleanly.
	async fn recv_text(&mut self) -> Result<Option<String>>;

	async fn close(&mut self);
}

pub struct WsSocket {
	inner: tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WsSocket {
	pub async fn connect(url: &url::Url, sub_protocols: &[String]) -> Result<Self> {
		use tokio_tungstenite::tungstenite::client::IntoClientRequest;

		let mut request = url
			.as_str()
			.into_client_request()
			.map_err(|e| TransportError::Socket(e.to_string()))?;
		if !sub_protocols.is_empty() {
			let value = sub_protocols
				.join(", ")
				.parse()
				.map_err(|_| TransportError::Socket("invalid sub-protocol header value".to_string()))?;
			request.headers_mut().insert("Sec-WebSocket-Protocol", value);
		}
		let (inner, _response) = tokio_tungstenite::connect_async(request)
			.await
			.map_err(|e| TransportError::Socket(e.to_string()))?;
		Ok(Self { inner })
	}
}

#[async_trait]
impl Socket for WsSocket {
	async fn send_text(&mut self, text: String) -> Result<()> {
		self.inner
			.send(Message::Text(text.into()))
			.await
			.map_err(|e| TransportError::Socket(e.to_string()))
	}

	async fn recv_text(&mut self) -> Result<Option<String>> {
		loop {
			match self.inner.next().await {
				None => return Ok(None),
				Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
				Some(Ok(Message::Close(_))) => return Ok(None),
				Some(Ok(_)) => continue,
				Some(Err(e)) => return Err(TransportError::Socket(e.to_string())),
			}
		}
	}

	async fn close(&mut self) {
		let _ = self.inner.close(None).await;
	}
}

/// In-memory socket pair for tests: each half's outbound queue is the
/// other's inbound queue.
pub struct PairSocket {
	tx: tokio::sync::mpsc::UnboundedSender<String>,
	rx: tokio::sync::mpsc::UnboundedReceiver<String>,
}

impl PairSocket {
	pub fn pair() -> (Self, Self) {
		let (tx_a, rx_b) = tokio::sync::mpsc::unbounded_channel();
		let (tx_b, rx_a) = tokio::sync::mpsc::unbounded_channel();
		(Self { tx: tx_a, rx: rx_a }, Self { tx: tx_b, rx: rx_b })
	}
}

#[async_trait]
impl Socket for PairSocket {
	async fn send_text(&mut self, text: String) -> Result<()> {
		self.tx
			.send(text)
			.map_err(|_| TransportError::Socket("peer dropped".to_string()))
	}

	async fn recv_text(&mut self) -> Result<Option<String>> {
		Ok(self.rx.recv().await)
	}

	async fn close(&mut self) {
		self.rx.close();
	}
}
