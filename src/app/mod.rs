//! Headless runner plumbing

pub mod bots;
pub mod state;

pub use bots::BotDriver;
pub use state::{AppState, SharedGame};
