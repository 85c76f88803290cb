//! Shared types for the sessionwatch transcript monitor.

mod hooks;
mod lifecycle;
mod log;
mod session;
mod status;

pub use hooks::*;
pub use lifecycle::*;
pub use log::*;
pub use session::*;
pub use status::*;
