use async_trait::async_trait;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{Transport, TransportEvent, TransportType};
use crate::infrastructure::TaskManager;
use crate::types::constants::WS_CLOSE_ABNORMAL;
use crate::types::{ChannelError, Envelope, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const EVENT_QUEUE_CAPACITY: usize = 100;

/// Persistent bidirectional transport over a WebSocket.
pub struct WebSocketTransport {
    url: String,
    write: Option<WsSink>,
    open: Arc<AtomicBool>,
    tasks: TaskManager,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            write: None,
            open: Arc::new(AtomicBool::new(false)),
            tasks: TaskManager::new(),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportType {
        TransportType::Socket
    }

    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        tracing::info!("Opening WebSocket connection to {}", self.url);
        let (ws_stream, _response) = connect_async(&self.url).await?;
        let (write_half, mut read_half) = ws_stream.split();

        self.write = Some(write_half);
        self.open.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let open = Arc::clone(&self.open);
        self.tasks.spawn(async move {
            let mut closed_reported = false;
            while let Some(msg_result) = read_half.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        forward_payload(&tx, text.as_str()).await;
                    }
                    Ok(Message::Binary(data)) => {
                        let text = String::from_utf8_lossy(&data).into_owned();
                        forward_payload(&tx, &text).await;
                    }
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = match frame {
                            Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
                            None => (WS_CLOSE_ABNORMAL, "closed without close frame".to_string()),
                        };
                        tracing::info!("Server closed WebSocket: code={code}, reason='{reason}'");
                        open.store(false, Ordering::SeqCst);
                        let _ = tx.send(TransportEvent::Closed { code, reason }).await;
                        closed_reported = true;
                        break;
                    }
                    // tungstenite answers protocol pings itself
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                    Err(e) => {
                        tracing::error!("WebSocket read error: {e}");
                        open.store(false, Ordering::SeqCst);
                        let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                        let _ = tx
                            .send(TransportEvent::Closed {
                                code: WS_CLOSE_ABNORMAL,
                                reason: e.to_string(),
                            })
                            .await;
                        closed_reported = true;
                        break;
                    }
                }
            }
            if !closed_reported {
                open.store(false, Ordering::SeqCst);
                let _ = tx
                    .send(TransportEvent::Closed {
                        code: WS_CLOSE_ABNORMAL,
                        reason: "connection lost".to_string(),
                    })
                    .await;
            }
            tracing::debug!("WebSocket read task finished");
        });

        Ok(rx)
    }

    async fn send(&mut self, envelope: &Envelope, binary: bool) -> Result<()> {
        let write = self
            .write
            .as_mut()
            .ok_or_else(|| ChannelError::Send("transport not open".to_string()))?;

        let message = if binary {
            Message::Binary(serde_json::to_vec(envelope)?.into())
        } else {
            Message::Text(serde_json::to_string(envelope)?.into())
        };

        write
            .send(message)
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))
    }

    async fn close(&mut self, code: u16) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        // Stop the reader first so a locally initiated close never surfaces
        // as a Closed event.
        self.tasks.abort_all();

        if let Some(mut write) = self.write.take() {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: "client closing".into(),
            };
            let _ = write.send(Message::Close(Some(frame))).await;
            let _ = write.close().await;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

async fn forward_payload(tx: &mpsc::Sender<TransportEvent>, text: &str) {
    match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => {
            tracing::debug!("Received envelope of type {}", envelope.kind);
            let _ = tx.send(TransportEvent::Message(envelope)).await;
        }
        Err(e) => {
            tracing::warn!("Failed to parse inbound payload: {e}");
            let _ = tx.send(TransportEvent::Raw(text.to_string())).await;
        }
    }
}
