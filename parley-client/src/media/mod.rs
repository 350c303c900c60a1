mod capability;
mod controller;

pub use capability::*;
pub use controller::*;
