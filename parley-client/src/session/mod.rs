mod pending_candidates;
mod session;
mod session_actor;
mod session_command;
mod session_event;
mod timers;

pub use session::*;
pub use session_command::MediaAction;
pub use session_event::*;
