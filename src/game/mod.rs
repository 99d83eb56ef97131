//! Game simulation modules

pub mod error;
pub mod map;
pub mod physics;
pub mod player;
pub mod session;
pub mod snapshot;
pub mod steering;
pub mod world;

pub use error::GameError;
pub use map::{MapPlacement, Ring};
pub use physics::{ContactEvent, PhysicsWorld, Point2, Vec2};
pub use player::{Player, Role, RotationDirection, RotationIntent, ShipColor};
pub use session::Game;
pub use snapshot::{PlayerSnapshot, SnapshotBuilder, WorldSnapshot};
pub use world::{World, WorldConfig, WorldEvent};
