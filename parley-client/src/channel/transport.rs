use crate::error::ChannelError;
use async_trait::async_trait;
use parley_core::ParticipantId;
use tokio::sync::mpsc;

/// Inbound side of a transport link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    Text(String),
    /// The link is gone. `code` is the close code if the peer sent one.
    Closed { code: Option<u16>, reason: String },
}

/// One live duplex connection to the relay. Dropping `outbound` closes it.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportFrame>,
}

/// Authenticated duplex channel to a room-scoped relay.
#[async_trait]
pub trait SignalingTransport: Send + Sync + 'static {
    async fn open(
        &self,
        participant: &ParticipantId,
        auth_token: Option<&str>,
    ) -> Result<TransportLink, ChannelError>;
}
