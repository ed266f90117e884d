//! Transport abstraction over the exchange connection.
//!
//! The supervisor drives a [`FeedConnection`] without knowing whether it is a
//! live WebSocket or an in-memory test double.

use async_trait::async_trait;
use common::CommonError;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// A frame surfaced from the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportMessage {
    /// A text payload for the codec.
    Text(String),
    /// Protocol-level ping that must be answered with a pong.
    Ping(Vec<u8>),
    /// Protocol-level pong; counts as a liveness signal.
    Pong,
    /// The peer sent a close frame.
    Closed,
}

/// One live connection to an exchange feed.
#[async_trait]
pub trait FeedConnection: Send {
    async fn send_text(&mut self, text: String) -> Result<(), CommonError>;
    async fn send_ping(&mut self) -> Result<(), CommonError>;
    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<(), CommonError>;
    /// Next inbound frame; `None` when the stream has ended.
    async fn next_message(&mut self) -> Option<Result<TransportMessage, CommonError>>;
    async fn close(&mut self) -> Result<(), CommonError>;
}

/// Connects to an exchange feed endpoint.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedConnection>, CommonError>;
}

/// Live WebSocket transport.
pub struct WsTransport;

#[async_trait]
impl FeedTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedConnection>, CommonError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| CommonError::Transport(e.to_string()))?;
        debug!(url, status = %response.status(), "websocket connected");
        Ok(Box::new(WsConnection { inner: stream }))
    }
}

struct WsConnection {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedConnection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<(), CommonError> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| CommonError::Transport(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), CommonError> {
        self.inner
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| CommonError::Transport(e.to_string()))
    }

    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<(), CommonError> {
        self.inner
            .send(Message::Pong(payload))
            .await
            .map_err(|e| CommonError::Transport(e.to_string()))
    }

    async fn next_message(&mut self) -> Option<Result<TransportMessage, CommonError>> {
        loop {
            return match self.inner.next().await? {
                Ok(Message::Text(text)) => Some(Ok(TransportMessage::Text(text))),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(Ok(TransportMessage::Text(text))),
                    Err(_) => Some(Err(CommonError::Decode(
                        "non-utf8 binary frame".to_string(),
                    ))),
                },
                Ok(Message::Ping(payload)) => Some(Ok(TransportMessage::Ping(payload))),
                Ok(Message::Pong(_)) => Some(Ok(TransportMessage::Pong)),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "close frame received");
                    Some(Ok(TransportMessage::Closed))
                }
                // Raw frames never surface from a read.
                Ok(Message::Frame(_)) => continue,
                Err(e) => Some(Err(CommonError::Transport(e.to_string()))),
            };
        }
    }

    async fn close(&mut self) -> Result<(), CommonError> {
        self.inner
            .close(None)
            .await
            .map_err(|e| CommonError::Transport(e.to_string()))
    }
}
