use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use parley_core::{MediaState, SignalMessage};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::signal_helpers::{QUIET_WINDOW_MS, SIGNAL_TIMEOUT_MS, join_message};

/// Raw WebSocket participant talking JSON envelopes to a running relay.
pub struct TestClient {
    pub participant: String,
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr, participant: &str, token: Option<&str>) -> Result<Self> {
        let mut url = format!("ws://{addr}/ws/{participant}");
        if let Some(token) = token {
            url.push_str(&format!("?token={token}"));
        }

        let (socket, _) = connect_async(url.as_str())
            .await
            .context("Failed to connect to relay")?;
        tracing::debug!("[TestClient] {} connected", participant);

        Ok(Self {
            participant: participant.to_string(),
            socket,
        })
    }

    pub async fn send(&mut self, msg: &SignalMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.socket
            .send(Message::Text(json.into()))
            .await
            .context("Failed to send signal")?;
        Ok(())
    }

    /// Joins `room` and returns the `participant_list` the relay answers with.
    pub async fn join(&mut self, room: &str) -> Result<SignalMessage> {
        self.send(&join_message(room, MediaState::default())).await?;
        self.recv_kind("participant_list").await
    }

    /// Next signaling message. Fails on close or timeout.
    pub async fn recv(&mut self) -> Result<SignalMessage> {
        loop {
            let next = tokio::time::timeout(
                Duration::from_millis(SIGNAL_TIMEOUT_MS),
                self.socket.next(),
            )
            .await
            .context("Timeout waiting for signal")?;

            match next {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).context("Invalid signal JSON");
                }
                Some(Ok(Message::Close(frame))) => bail!("Connection closed: {:?}", frame),
                Some(Ok(_)) => continue,
                Some(Err(e)) => bail!("Socket error: {e}"),
                None => bail!("Socket ended"),
            }
        }
    }

    /// Skips messages until one of `kind` arrives.
    pub async fn recv_kind(&mut self, kind: &str) -> Result<SignalMessage> {
        loop {
            let msg = self.recv().await?;
            if msg.kind() == kind {
                return Ok(msg);
            }
            tracing::debug!("[TestClient] {} skipping {}", self.participant, msg.kind());
        }
    }

    /// Asserts nothing but pings arrives for a short while.
    pub async fn expect_silence(&mut self) -> Result<()> {
        let window = Duration::from_millis(QUIET_WINDOW_MS);
        match tokio::time::timeout(window, self.recv()).await {
            Err(_) => Ok(()),
            Ok(Ok(msg)) => bail!("Unexpected {} message", msg.kind()),
            Ok(Err(e)) => Err(e),
        }
    }

    /// Waits for the relay to close the connection and returns the close code.
    pub async fn expect_close(&mut self) -> Result<u16> {
        loop {
            let next = tokio::time::timeout(
                Duration::from_millis(SIGNAL_TIMEOUT_MS),
                self.socket.next(),
            )
            .await
            .context("Timeout waiting for close")?;

            match next {
                Some(Ok(Message::Close(Some(frame)))) => return Ok(u16::from(frame.code)),
                Some(Ok(Message::Close(None))) => bail!("Close without a code"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => bail!("Socket error before close: {e}"),
                None => bail!("Socket ended without a close frame"),
            }
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await.context("Failed to close socket")?;
        Ok(())
    }
}
