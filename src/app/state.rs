//! Application state shared across runner tasks

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::game::{Game, MapPlacement, WorldConfig};

use super::bots::BotDriver;

/// Game handle shared between the tick loop and diagnostics
pub type SharedGame = Arc<Mutex<Game>>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub game: SharedGame,
    pub bots: Arc<Mutex<BotDriver>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let world_config = WorldConfig {
            tick_rate: config.tick_rate,
            time_scale: config.time_scale,
            placement: MapPlacement::default(),
        };
        let game = Arc::new(Mutex::new(Game::new(world_config)));
        let bots = Arc::new(Mutex::new(BotDriver::new(config.sim_seed)));

        Self { config, game, bots }
    }
}
