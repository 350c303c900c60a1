use crate::channel::BackoffPolicy;
use crate::media::MediaConstraints;
use std::time::Duration;

/// Client-side session settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay base URL, e.g. `ws://127.0.0.1:3000`.
    pub url: String,
    pub backoff: BackoffPolicy,
    /// How long a disconnected peer may stay down before it is failed.
    pub grace_period: Duration,
    /// Upper bound for an offer/answer cycle to reach `Connected`.
    pub negotiation_timeout: Duration,
    /// How long candidates from a participant without a record are kept.
    pub pending_candidate_ttl: Duration,
    /// WebSocket ping interval.
    pub keepalive: Duration,
    pub ice_servers: Vec<String>,
    pub constraints: MediaConstraints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3000".to_owned(),
            backoff: BackoffPolicy::default(),
            grace_period: Duration::from_secs(5),
            negotiation_timeout: Duration::from_secs(15),
            pending_candidate_ttl: Duration::from_secs(10),
            keepalive: Duration::from_secs(30),
            ice_servers: vec!["stun:stun.l.google.com:19302".to_owned()],
            constraints: MediaConstraints::default(),
        }
    }
}
