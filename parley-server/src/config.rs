use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Relay server settings. `from_env` reads `PARLEY_*` variables, falling back to defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Shared token clients must present; `None` disables the check.
    pub auth_token: Option<String>,
    pub room_queue_capacity: usize,
    /// JSON enrollment table for `StaticCatalog`.
    pub enrolled: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: env::var("PARLEY_BIND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            auth_token: env::var("PARLEY_AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
            room_queue_capacity: env::var("PARLEY_ROOM_QUEUE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.room_queue_capacity),
            enrolled: env::var("PARLEY_ENROLLED").ok().map(PathBuf::from),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            auth_token: None,
            room_queue_capacity: 100,
            enrolled: None,
        }
    }
}
