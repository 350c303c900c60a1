mod backoff;
mod signaling_channel;
mod transport;
mod ws_transport;

pub use backoff::*;
pub use signaling_channel::*;
pub use transport::*;
pub use ws_transport::*;
