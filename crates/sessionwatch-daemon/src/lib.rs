//! sessionwatch daemon library: configuration, logging and the event publisher.
//!
//! Kept apart from main.rs so the pieces can be tested without the binary.

pub mod config;
pub mod logging;
pub mod publisher;
