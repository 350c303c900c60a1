mod channel;
mod config;
mod error;
mod media;
mod peer;
mod session;

pub use channel::*;
pub use config::*;
pub use error::*;
pub use media::*;
pub use peer::*;
pub use session::*;
