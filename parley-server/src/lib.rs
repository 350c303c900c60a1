mod catalog;
mod config;
mod error;
mod relay;
mod room;
mod signaling;

pub use catalog::*;
pub use config::*;
pub use error::*;
pub use relay::*;
pub use room::*;
pub use signaling::*;
