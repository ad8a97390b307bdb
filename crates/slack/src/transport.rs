use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::events::{SlackEnvelope, SocketFrame};
use crate::socket::{SocketTransport, TransportError};
use crate::web::SlackWebClient;

type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket Mode over a real WebSocket. Every `connect` asks Slack for a fresh
/// URL, since connection URLs are single-use.
pub struct SlackSocketTransport {
    web: Arc<SlackWebClient>,
    writer: Mutex<Option<SplitSink<SocketStream, Message>>>,
    reader: Mutex<Option<SplitStream<SocketStream>>>,
}

impl SlackSocketTransport {
    pub fn new(web: Arc<SlackWebClient>) -> Self {
        Self { web, writer: Mutex::new(None), reader: Mutex::new(None) }
    }
}

#[async_trait]
impl SocketTransport for SlackSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .web
            .open_socket_url()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        let (writer, reader) = stream.split();
        *self.writer.lock().await = Some(writer);
        *self.reader.lock().await = Some(reader);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            return Err(TransportError::Receive("socket is not connected".to_owned()));
        };

        while let Some(message) = reader.next().await {
            let text = match message.map_err(|error| TransportError::Receive(error.to_string()))? {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    info!(close_frame = ?frame, "socket mode connection closed by server");
                    return Ok(None);
                }
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    continue;
                }
            };

            match SocketFrame::parse(&text) {
                Ok(SocketFrame::Envelope(envelope)) => return Ok(Some(envelope)),
                Ok(SocketFrame::Hello) => debug!("socket mode hello received"),
                Ok(SocketFrame::Disconnect { reason }) => {
                    info!(
                        event_name = "ingress.slack.disconnect_requested",
                        reason = reason.as_deref().unwrap_or("unspecified"),
                        "slack asked to reconnect"
                    );
                    return Ok(None);
                }
                Err(error) => warn!(
                    event_name = "ingress.slack.frame_rejected",
                    error = %error,
                    "skipping unreadable socket mode frame"
                ),
            }
        }

        Ok(None)
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(TransportError::Acknowledge("socket is not connected".to_owned()));
        };

        let ack = json!({ "envelope_id": envelope_id }).to_string();
        writer
            .send(Message::Text(ack))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.reader.lock().await.take();
        let Some(mut writer) = self.writer.lock().await.take() else {
            return Ok(());
        };
        match writer.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(error) => Err(TransportError::Disconnect(error.to_string())),
        }
    }
}
