use crate::channel::transport::{SignalingTransport, TransportFrame, TransportLink};
use crate::error::ChannelError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parley_core::ParticipantId;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

/// WebSocket transport against the relay's `/ws/{participant_id}` endpoint.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
    keepalive: Duration,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            keepalive: Duration::from_secs(30),
        }
    }

    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    fn endpoint(&self, participant: &ParticipantId, auth_token: Option<&str>) -> String {
        let base = self.url.trim_end_matches('/');
        match auth_token {
            Some(token) => format!("{base}/ws/{participant}?token={token}"),
            None => format!("{base}/ws/{participant}"),
        }
    }
}

#[async_trait]
impl SignalingTransport for WsTransport {
    async fn open(
        &self,
        participant: &ParticipantId,
        auth_token: Option<&str>,
    ) -> Result<TransportLink, ChannelError> {
        let endpoint = self.endpoint(participant, auth_token);
        let (ws_stream, _) = connect_async(endpoint.as_str())
            .await
            .map_err(|err| ChannelError::Open(format!("websocket connect failed: {err}")))?;
        debug!(url = %self.url, participant = %participant, "Signaling websocket connected");

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<TransportFrame>();

        let keepalive = self.keepalive;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(keepalive);
            ticker.tick().await;

            loop {
                tokio::select! {
                    outgoing = out_rx.recv() => match outgoing {
                        Some(text) => {
                            if ws_write.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = ws_write.close().await;
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if ws_write.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(msg) = ws_read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        trace!(len = text.len(), "ws in");
                        if in_tx.send(TransportFrame::Text(text.to_string())).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                            None => (None, String::new()),
                        };
                        let _ = in_tx.send(TransportFrame::Closed { code, reason });
                        return;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("Signaling websocket error: {err}");
                        break;
                    }
                }
            }

            let _ = in_tx.send(TransportFrame::Closed {
                code: None,
                reason: "connection lost".to_owned(),
            });
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
