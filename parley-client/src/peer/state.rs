/// Lifecycle of one peer connection record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    New,
    OfferSent,
    AnswerSent,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerState {
    pub fn can_transition_to(self, next: PeerState) -> bool {
        use PeerState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,

            (New, OfferSent) | (New, AnswerSent) => true,
            (OfferSent, Connecting) | (AnswerSent, Connecting) => true,
            (Connecting, Connected) => true,
            (Connecting, Disconnected) | (Connected, Disconnected) => true,
            (Disconnected, Connected) => true,
            (Disconnected, Failed) => true,

            // Renegotiation on a live connection.
            (Connected, Connecting) => true,
            // Glare: our pending offer loses and we answer theirs instead.
            (OfferSent, AnswerSent) => true,
            // Negotiation timeout.
            (New, Failed) | (OfferSent, Failed) | (AnswerSent, Failed) | (Connecting, Failed) => {
                true
            }

            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PeerState::Failed | PeerState::Closed)
    }

    /// An offer/answer cycle is in flight.
    pub fn is_negotiating(self) -> bool {
        matches!(
            self,
            PeerState::OfferSent | PeerState::AnswerSent | PeerState::Connecting
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationRole {
    /// Sent the first offer. The joiner is always the initiator.
    Initiator,
    Responder,
}
