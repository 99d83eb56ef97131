//! Game session: one world plus the locally controlled player

use tracing::info;

use super::error::GameError;
use super::player::{Player, Role};
use super::world::{World, WorldConfig};

/// A running game as seen from one participant
pub struct Game {
    world: World,
    /// Id of the self player, once bound
    me: Option<String>,
}

impl Game {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            world: World::new(config),
            me: None,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn load_map(&mut self, raw: &str) -> Result<(), GameError> {
        self.world.load_map(raw)
    }

    /// Mark `id` as the self player and every other player as an opponent
    pub fn set_me(&mut self, id: &str) -> Result<(), GameError> {
        if self.world.player(id).is_none() {
            return Err(GameError::PlayerNotFound(id.to_string()));
        }

        let others: Vec<String> = self
            .world
            .players()
            .map(|p| p.id().to_string())
            .filter(|other| other != id)
            .collect();
        for other in &others {
            if let Some(player) = self.world.player_mut(other) {
                player.set_role(Role::Opponent);
            }
        }
        if let Some(player) = self.world.player_mut(id) {
            player.set_role(Role::Me);
        }

        info!(player_id = %id, "Bound self player");
        self.me = Some(id.to_string());
        Ok(())
    }

    /// The self player, if bound and still in the world
    pub fn me(&self) -> Option<&Player> {
        self.world.player(self.me.as_deref()?)
    }

    pub fn update(&mut self) {
        self.world.update();
    }

    pub fn tick(&mut self) {
        self.world.tick();
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}
