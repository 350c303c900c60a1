mod backend;
mod manager;
mod rtc_backend;
mod state;

pub use backend::*;
pub use manager::*;
pub use rtc_backend::*;
pub use state::*;
