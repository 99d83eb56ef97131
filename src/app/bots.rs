//! Seeded bot pilots that feed rotation intents to racers

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::game::{Player, RotationDirection, RotationIntent, World};

/// Shortest and longest time a bot holds one intent, in ticks
const MIN_HOLD_TICKS: u32 = 10;
const MAX_HOLD_TICKS: u32 = 90;

#[derive(Debug, Clone, Copy)]
struct Pilot {
    intent: RotationIntent,
    ticks_left: u32,
}

/// Drives every bot-owned racer with random but reproducible steering
pub struct BotDriver {
    rng: ChaCha8Rng,
    pilots: HashMap<String, Pilot>,
}

impl BotDriver {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            pilots: HashMap::new(),
        }
    }

    /// Create and register a new bot racer, returning its id
    pub fn spawn(&mut self, world: &mut World) -> String {
        let id = Uuid::new_v4().to_string();
        let player = world.create_player(id.clone());
        world.add_player(player);
        self.pilots.insert(
            id.clone(),
            Pilot {
                intent: RotationIntent::None,
                ticks_left: 0,
            },
        );
        id
    }

    pub fn bot_count(&self) -> usize {
        self.pilots.len()
    }

    /// Advance every pilot by one tick, forgetting racers that left the world
    pub fn drive(&mut self, world: &mut World) {
        self.pilots.retain(|id, _| world.player(id).is_some());

        // Id order, independent of hashing
        let mut ids: Vec<String> = self.pilots.keys().cloned().collect();
        ids.sort();

        for id in ids {
            let Some(pilot) = self.pilots.get_mut(&id) else {
                continue;
            };
            if pilot.ticks_left == 0 {
                pilot.intent = match self.rng.gen_range(0..3) {
                    0 => RotationIntent::Left,
                    1 => RotationIntent::Right,
                    _ => RotationIntent::None,
                };
                pilot.ticks_left = self.rng.gen_range(MIN_HOLD_TICKS..=MAX_HOLD_TICKS);
            }
            pilot.ticks_left -= 1;

            if let Some(player) = world.player_mut(&id) {
                apply_intent(player, pilot.intent);
            }
        }
    }
}

fn apply_intent(player: &mut Player, intent: RotationIntent) {
    player.stop_rotation(RotationDirection::Left);
    player.stop_rotation(RotationDirection::Right);
    match intent {
        RotationIntent::Left => player.rotate(RotationDirection::Left),
        RotationIntent::Right => player.rotate(RotationDirection::Right),
        RotationIntent::None => {}
    }
}
