use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

use super::{Transport, TransportEvent, TransportType};
use crate::infrastructure::TaskManager;
use crate::types::constants::CLOSE_AUTH_REJECTED;
use crate::types::message::unix_millis;
use crate::types::{ChannelError, Envelope, Result};

const EVENT_QUEUE_CAPACITY: usize = 100;

/// Response shape of the GET poll endpoint.
#[derive(Debug, Deserialize)]
struct PollResponse {
    success: bool,
    #[serde(default)]
    messages: Vec<Envelope>,
}

/// HTTP polling fallback transport: GET on a fixed interval for inbound
/// traffic, one POST per outbound send.
///
/// In-flight requests live inside the poll task, so aborting it (via
/// [`close`](Transport::close)) cancels them; a disconnect or transport
/// switch never races a closed channel.
pub struct PollingTransport {
    base_url: String,
    client_id: String,
    interval: Duration,
    http: reqwest::Client,
    open: Arc<AtomicBool>,
    tasks: TaskManager,
}

impl PollingTransport {
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            client_id: client_id.into(),
            interval,
            http: reqwest::Client::new(),
            open: Arc::new(AtomicBool::new(false)),
            tasks: TaskManager::new(),
        }
    }

    fn poll_url(&self) -> String {
        format!("{}/poll?clientId={}", self.base_url, self.client_id)
    }

    fn send_url(&self) -> String {
        format!("{}/send", self.base_url)
    }
}

#[async_trait]
impl Transport for PollingTransport {
    fn kind(&self) -> TransportType {
        TransportType::Polling
    }

    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        tracing::info!("Opening polling transport against {}", self.base_url);

        // Initial poll validates the endpoint and our credentials before the
        // channel commits to the fallback.
        let response = self.http.get(self.poll_url()).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ChannelError::FallbackAuth(format!(
                "poll endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(ChannelError::TransportOpen(format!(
                "poll endpoint returned {status}"
            )));
        }
        let initial: PollResponse = response.json().await?;
        if !initial.success {
            return Err(ChannelError::TransportOpen(
                "poll endpoint reported failure".to_string(),
            ));
        }

        self.open.store(true, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        for envelope in initial.messages {
            let _ = tx.send(TransportEvent::Message(envelope)).await;
        }

        let http = self.http.clone();
        let poll_url = self.poll_url();
        let interval = self.interval;
        let open = Arc::clone(&self.open);
        self.tasks.spawn(async move {
            loop {
                sleep(interval).await;

                let response = match http.get(&poll_url).send().await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!("Poll request failed: {e}");
                        let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                        continue;
                    }
                };

                let status = response.status();
                if status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::FORBIDDEN
                {
                    tracing::error!("Poll endpoint rejected credentials: {status}");
                    open.store(false, Ordering::SeqCst);
                    let _ = tx
                        .send(TransportEvent::Closed {
                            code: CLOSE_AUTH_REJECTED,
                            reason: format!("poll endpoint returned {status}"),
                        })
                        .await;
                    break;
                }
                if !status.is_success() {
                    let _ = tx
                        .send(TransportEvent::Error(format!(
                            "poll endpoint returned {status}"
                        )))
                        .await;
                    continue;
                }

                match response.json::<PollResponse>().await {
                    Ok(poll) if poll.success => {
                        for envelope in poll.messages {
                            let _ = tx.send(TransportEvent::Message(envelope)).await;
                        }
                    }
                    Ok(_) => {
                        let _ = tx
                            .send(TransportEvent::Error(
                                "poll endpoint reported failure".to_string(),
                            ))
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse poll response: {e}");
                        let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                    }
                }
            }
            tracing::debug!("Poll task finished");
        });

        Ok(rx)
    }

    async fn send(&mut self, envelope: &Envelope, _binary: bool) -> Result<()> {
        let body = serde_json::json!({
            "message": envelope,
            "clientId": self.client_id,
            "timestamp": unix_millis(),
        });

        let response = self
            .http
            .post(self.send_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChannelError::Send(format!(
                "send endpoint returned {}",
                response.status()
            )));
        }

        tracing::debug!("Sent envelope of type {} via polling", envelope.kind);
        Ok(())
    }

    async fn close(&mut self, _code: u16) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        self.tasks.abort_all();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Converts a WebSocket endpoint to the HTTP base used by the fallback.
pub fn ws_to_http_endpoint(ws_endpoint: &str) -> String {
    ws_endpoint
        .replace("ws://", "http://")
        .replace("wss://", "https://")
        .split('?')
        .next()
        .unwrap_or(ws_endpoint)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_to_http_endpoint() {
        assert_eq!(
            ws_to_http_endpoint("wss://example.com/channel?token=abc"),
            "https://example.com/channel"
        );
        assert_eq!(
            ws_to_http_endpoint("ws://localhost:8080/rt"),
            "http://localhost:8080/rt"
        );
    }

    #[test]
    fn test_poll_response_parsing() {
        let json = r#"{"success":true,"messages":[{"type":"notification","body":"hi"}]}"#;
        let poll: PollResponse = serde_json::from_str(json).unwrap();
        assert!(poll.success);
        assert_eq!(poll.messages.len(), 1);
        assert_eq!(poll.messages[0].kind, "notification");
    }

    #[test]
    fn test_poll_response_messages_default_empty() {
        let poll: PollResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(poll.messages.is_empty());
    }
}
