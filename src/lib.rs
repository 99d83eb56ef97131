//! Wing racer simulation core
//!
//! Top-down ships thrust along their heading, steer away from walls and
//! bounce off each other inside a polygonal arena.

pub mod app;
pub mod config;
pub mod game;
pub mod util;

pub use game::{Game, GameError, Player, World, WorldConfig, WorldEvent};
