//! World: physics bodies, map geometry and the player registry

use std::collections::BTreeMap;
use std::time::Duration;

use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::util::time::SIMULATION_TPS;
use crate::util::timer::DeferredTasks;

use super::error::GameError;
use super::map::{self, LoadedMap, MapPlacement, Ring};
use super::physics::{ContactEvent, PhysicsWorld, Vec2};
use super::player::{self, Player, ShipColor, BOOST_RESUME_DELAY};
use super::snapshot::WorldSnapshot;

pub const WORLD_WIDTH: Real = 1100.0;
pub const WORLD_HEIGHT: Real = 1100.0;

/// Distance of every spawn point from its corner
const SPAWN_INSET: Real = 100.0;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle notifications raised by the world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "player_id", rename_all = "snake_case")]
pub enum WorldEvent {
    PlayerSpawn(String),
    PlayerDespawn(String),
}

/// Tuning for a world
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldConfig {
    /// Physics steps per wall-clock second
    pub tick_rate: u32,
    /// Simulation speed multiplier
    pub time_scale: f32,
    /// Where parsed map geometry lands in the world
    pub placement: MapPlacement,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_rate: SIMULATION_TPS,
            time_scale: 1.0,
            placement: MapPlacement::default(),
        }
    }
}

/// Spawn corners, handed out round-robin by player count
fn spawn_positions() -> [Vec2; 4] {
    [
        vector![SPAWN_INSET, SPAWN_INSET],
        vector![WORLD_WIDTH - SPAWN_INSET, WORLD_HEIGHT - SPAWN_INSET],
        vector![WORLD_WIDTH - SPAWN_INSET, SPAWN_INSET],
        vector![SPAWN_INSET, WORLD_HEIGHT - SPAWN_INSET],
    ]
}

/// The simulated world
pub struct World {
    config: WorldConfig,
    physics: PhysicsWorld,
    map: Option<LoadedMap>,
    /// Ordered by id so every tick visits players in the same order
    players: BTreeMap<String, Player>,
    /// Pending boost resumes after collisions end
    boost_resumes: DeferredTasks<String>,
    events: broadcast::Sender<WorldEvent>,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self::with_physics(config, PhysicsWorld::new(config.tick_rate, config.time_scale))
    }

    /// Build a world around an existing physics instance
    pub fn with_physics(config: WorldConfig, physics: PhysicsWorld) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            physics,
            map: None,
            players: BTreeMap::new(),
            boost_resumes: DeferredTasks::new(),
            events,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    /// Receive spawn/despawn notifications raised from now on
    pub fn subscribe(&self) -> broadcast::Receiver<WorldEvent> {
        self.events.subscribe()
    }

    /// Parsed rings of the loaded map
    pub fn map_geometry(&self) -> Option<&[Ring]> {
        self.map.as_ref().map(|m| m.geometry.as_slice())
    }

    pub fn map_body(&self) -> Option<RigidBodyHandle> {
        self.map.as_ref().map(|m| m.body)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Replace the current map with one parsed from `raw`.
    ///
    /// On a parse error the previously loaded map stays in place.
    pub fn load_map(&mut self, raw: &str) -> Result<(), GameError> {
        let geometry = map::parse(raw)?;

        if let Some(previous) = self.map.take() {
            self.retract_body(previous.body);
        }

        let body = map::build_static_body(&mut self.physics, &geometry, &self.config.placement);
        info!(rings = geometry.len(), "Map loaded");
        self.map = Some(LoadedMap { geometry, body });
        Ok(())
    }

    /// Create a player at the next spawn corner. The player is not added to the world.
    pub fn create_player(&self, id: impl Into<String>) -> Player {
        let corners = spawn_positions();
        let corner = corners[self.players.len() % corners.len()];
        Player::new(id, corner, ShipColor::Blue)
    }

    /// Register a player and its body, then announce the spawn.
    ///
    /// A player already registered under the same id is removed first.
    pub fn add_player(&mut self, mut player: Player) -> &mut Player {
        let id = player.id().to_string();
        if self.players.contains_key(&id) {
            warn!(player_id = %id, "Replacing player with duplicate id");
            self.remove_player(&id);
        }

        let handle = self
            .physics
            .insert_dynamic_body(player.label(), &player.body_desc());
        player.attach_body(handle);

        let player = self.players.entry(id.clone()).or_insert(player);
        let _ = self.events.send(WorldEvent::PlayerSpawn(id.clone()));
        info!(player_id = %id, "Player spawned");
        player
    }

    /// Remove a player and its body. Returns false if the id is unknown.
    pub fn remove_player(&mut self, id: &str) -> bool {
        let Some(player) = self.players.get_mut(id) else {
            return false;
        };

        // The body goes before anyone hears about the despawn
        if let Some(handle) = player.detach_body() {
            self.retract_body(handle);
        }
        self.boost_resumes.cancel(id);
        let _ = self.events.send(WorldEvent::PlayerDespawn(id.to_string()));
        self.players.remove(id);

        info!(player_id = %id, "Player despawned");
        true
    }

    /// Translate every player's intent into forces for the coming step
    pub fn update(&mut self) {
        let map_loaded = self.map.is_some();
        for player in self.players.values_mut() {
            player.update(&mut self.physics, map_loaded);
        }
    }

    /// Pre-step, integrate, then react to the contacts the step raised
    pub fn step_physics(&mut self) {
        for player in self.players.values_mut() {
            if let Some(normal) = player.take_pending_collision() {
                player.apply_collision_impulse(&mut self.physics, normal);
            }
        }

        let contacts = self.physics.step();
        self.handle_contacts(&contacts);
        self.fire_due_resumes(self.physics.elapsed());

        for player in self.players.values() {
            player.enforce_limits(&mut self.physics);
        }
    }

    /// One full simulation tick
    pub fn tick(&mut self) {
        self.update();
        self.step_physics();
    }

    pub fn snapshot(&self, tick: u64) -> WorldSnapshot {
        WorldSnapshot {
            tick,
            players: self
                .players
                .values()
                .filter_map(|p| p.snapshot(&self.physics))
                .collect(),
        }
    }

    fn handle_contacts(&mut self, contacts: &[ContactEvent]) {
        for contact in contacts {
            match *contact {
                ContactEvent::Started {
                    body_a,
                    body_b,
                    normal,
                } => {
                    self.on_collision_start(body_a, normal);
                    self.on_collision_start(body_b, -normal);
                }
                ContactEvent::Stopped { body_a, body_b } => {
                    self.on_collision_end(body_a);
                    self.on_collision_end(body_b);
                }
            }
        }
    }

    /// Remove a body, ending every contact it still holds.
    ///
    /// Rapier reports those contacts as stopped only after the body is gone,
    /// when they can no longer be traced back to it.
    fn retract_body(&mut self, body: RigidBodyHandle) {
        for partner in self.physics.touching_bodies(body) {
            self.on_collision_end(partner);
        }
        self.physics.remove_body(body);
    }

    /// Registered player id owning `body`, if it is a player body
    fn player_id_for(&self, body: RigidBodyHandle) -> Option<String> {
        let id = player::id_from_label(self.physics.label(body)?)?;
        self.players.contains_key(id).then(|| id.to_string())
    }

    /// `normal` points from `body` towards whatever it touched
    fn on_collision_start(&mut self, body: RigidBodyHandle, normal: Vec2) {
        let Some(id) = self.player_id_for(body) else {
            return;
        };

        // A fresh contact outranks any resume still pending from an older one
        self.boost_resumes.cancel(&id);
        if let Some(player) = self.players.get_mut(&id) {
            player.stop_boosting();
            if player.buffer_collision(normal) {
                debug!(player_id = %id, nx = normal.x, ny = normal.y, "Collision buffered");
            }
        }
    }

    fn on_collision_end(&mut self, body: RigidBodyHandle) {
        let Some(id) = self.player_id_for(body) else {
            return;
        };

        if let Some(player) = self.players.get(&id) {
            player.cancel_spin(&mut self.physics);
        }

        let delay = BOOST_RESUME_DELAY.div_f32(self.physics.time_scale());
        let resume_at = self.physics.elapsed() + delay;
        debug!(player_id = %id, delay_ms = delay.as_millis() as u64, "Boost resume scheduled");
        self.boost_resumes.schedule(id, resume_at);
    }

    fn fire_due_resumes(&mut self, now: Duration) {
        for id in self.boost_resumes.drain_due(now) {
            if let Some(player) = self.players.get_mut(&id) {
                player.start_boosting();
                debug!(player_id = %id, "Boost resumed");
            }
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_at(tick_rate: u32, time_scale: f32) -> World {
        World::new(WorldConfig {
            tick_rate,
            time_scale,
            placement: MapPlacement::identity(),
        })
    }

    fn spawn(world: &mut World, id: &str) -> RigidBodyHandle {
        let player = world.create_player(id);
        world.add_player(player).body().unwrap()
    }

    #[test]
    fn spawn_corners_round_robin() {
        let mut world = World::default();
        let mut corners = Vec::new();
        for i in 0..5 {
            let player = world.create_player(format!("p{i}"));
            corners.push(player.spawn_position());
            world.add_player(player);
        }

        assert_eq!(corners[0], vector![100.0, 100.0]);
        assert_eq!(corners[1], vector![1000.0, 1000.0]);
        assert_eq!(corners[2], vector![1000.0, 100.0]);
        assert_eq!(corners[3], vector![100.0, 1000.0]);
        assert_eq!(corners[4], corners[0]);
    }

    #[test]
    fn created_player_is_not_registered() {
        let world = World::default();
        let player = world.create_player("p1");
        assert_eq!(world.player_count(), 0);
        assert!(player.body().is_none());
        assert_eq!(player.ship_color(), ShipColor::Blue);
    }

    #[test]
    fn add_and_remove_keep_bodies_in_step() {
        let mut world = World::default();
        let mut events = world.subscribe();
        let body = spawn(&mut world, "p1");
        spawn(&mut world, "p2");

        assert_eq!(world.player_count(), 2);
        assert!(world.physics().contains(body));
        assert_eq!(events.try_recv().unwrap(), WorldEvent::PlayerSpawn("p1".into()));
        assert_eq!(events.try_recv().unwrap(), WorldEvent::PlayerSpawn("p2".into()));

        assert!(!world.remove_player("ghost"));
        assert_eq!(world.player_count(), 2);

        assert!(world.remove_player("p1"));
        assert_eq!(world.player_count(), 1);
        assert!(!world.physics().contains(body));
        assert_eq!(world.physics().body_count(), 1);
        assert_eq!(events.try_recv().unwrap(), WorldEvent::PlayerDespawn("p1".into()));
    }

    #[test]
    fn duplicate_id_replaces_the_old_body() {
        let mut world = World::default();
        let first = spawn(&mut world, "p1");
        let second = spawn(&mut world, "p1");

        assert_eq!(world.player_count(), 1);
        assert!(!world.physics().contains(first));
        assert!(world.physics().contains(second));
        assert_eq!(world.physics().body_count(), 1);
    }

    #[test]
    fn malformed_map_keeps_the_previous_one() {
        let mut world = world_at(60, 1.0);
        world.load_map("0,0\n40,0\n40,40\n0,40").unwrap();
        let body = world.map_body().unwrap();

        let err = world.load_map("0,0\n1,\n2,2").unwrap_err();
        assert!(matches!(err, GameError::MalformedGeometry { line: 2, .. }));
        assert_eq!(world.map_body(), Some(body));
        assert_eq!(world.map_geometry().map(|g| g.len()), Some(1));
    }

    #[test]
    fn reloading_retracts_the_previous_map() {
        let mut world = world_at(60, 1.0);
        world.load_map("0,0\n40,0\n40,40\n0,40").unwrap();
        let first = world.map_body().unwrap();
        world.load_map("100,100\n140,100\n140,140\n100,140").unwrap();

        assert!(!world.physics().contains(first));
        assert_eq!(world.physics().body_count(), 1);
    }

    #[test]
    fn collision_start_stops_boosting_and_buffers_normal() {
        let mut world = world_at(50, 1.0);
        let a = spawn(&mut world, "a");
        let b = spawn(&mut world, "b");

        world.handle_contacts(&[
            ContactEvent::Started {
                body_a: a,
                body_b: b,
                normal: vector![1.0, 0.0],
            },
            ContactEvent::Started {
                body_a: a,
                body_b: b,
                normal: vector![0.0, 1.0],
            },
        ]);

        let (pa, pb) = (world.player("a").unwrap(), world.player("b").unwrap());
        assert!(!pa.is_boosting());
        assert!(!pb.is_boosting());
        assert_eq!(pa.pending_collision(), Some(vector![1.0, 0.0]));
        assert_eq!(pb.pending_collision(), Some(vector![-1.0, 0.0]));

        // Consumed exactly once by the next pre-step
        world.step_physics();
        assert_eq!(world.player("a").unwrap().pending_collision(), None);
        let vx = world.physics().body(a).unwrap().linvel().x;
        assert!(vx < 0.0);
    }

    #[test]
    fn boosting_resumes_after_half_a_second() {
        let mut world = world_at(50, 1.0);
        let a = spawn(&mut world, "a");
        let b = spawn(&mut world, "b");

        world.handle_contacts(&[ContactEvent::Started {
            body_a: a,
            body_b: b,
            normal: vector![1.0, 0.0],
        }]);
        world.handle_contacts(&[ContactEvent::Stopped { body_a: a, body_b: b }]);

        // 24 steps of 20 ms: still waiting
        for _ in 0..24 {
            world.step_physics();
            assert!(!world.player("a").unwrap().is_boosting());
        }
        world.step_physics();
        assert_eq!(world.physics().elapsed(), Duration::from_millis(500));
        assert!(world.player("a").unwrap().is_boosting());
        assert!(world.player("b").unwrap().is_boosting());
    }

    #[test]
    fn resume_delay_scales_with_time_scale() {
        let mut world = world_at(50, 2.0);
        let a = spawn(&mut world, "a");
        let b = spawn(&mut world, "b");
        world.player_mut("a").unwrap().stop_boosting();

        world.handle_contacts(&[ContactEvent::Stopped { body_a: a, body_b: b }]);
        world.fire_due_resumes(Duration::from_millis(249));
        assert!(!world.player("a").unwrap().is_boosting());
        world.fire_due_resumes(Duration::from_millis(250));
        assert!(world.player("a").unwrap().is_boosting());
    }

    #[test]
    fn fresh_collision_cancels_a_stale_resume() {
        let mut world = world_at(50, 1.0);
        let a = spawn(&mut world, "a");
        let b = spawn(&mut world, "b");
        let started = ContactEvent::Started {
            body_a: a,
            body_b: b,
            normal: vector![1.0, 0.0],
        };

        world.handle_contacts(&[started]);
        world.handle_contacts(&[ContactEvent::Stopped { body_a: a, body_b: b }]);
        world.handle_contacts(&[started]);

        world.fire_due_resumes(Duration::from_secs(5));
        assert!(!world.player("a").unwrap().is_boosting());
        assert!(!world.player("b").unwrap().is_boosting());
    }

    #[test]
    fn wall_contact_only_affects_the_player() {
        let mut world = world_at(60, 1.0);
        world.load_map("0,0\n40,0\n40,40\n0,40").unwrap();
        let wall = world.map_body().unwrap();
        let a = spawn(&mut world, "a");
        spawn(&mut world, "b");

        world.handle_contacts(&[ContactEvent::Started {
            body_a: wall,
            body_b: a,
            normal: vector![0.0, 1.0],
        }]);

        assert!(!world.player("a").unwrap().is_boosting());
        assert_eq!(world.player("a").unwrap().pending_collision(), Some(vector![0.0, -1.0]));
        assert!(world.player("b").unwrap().is_boosting());
    }

    fn place(world: &mut World, body: RigidBodyHandle, x: Real, y: Real, angle: Real) {
        let body = world.physics_mut().body_mut(body).unwrap();
        body.set_translation(vector![x, y], true);
        body.set_rotation(Rotation::new(angle), true);
    }

    fn is_boosting(world: &World, id: &str) -> bool {
        world.player(id).unwrap().is_boosting()
    }

    #[test]
    fn players_on_a_collision_course_stop_then_resume_boosting() {
        let mut world = world_at(50, 1.0);
        let a = spawn(&mut world, "a");
        let b = spawn(&mut world, "b");
        place(&mut world, a, 500.0, 500.0, 0.0);
        place(&mut world, b, 540.0, 500.0, std::f32::consts::PI);

        let mut ticks = 0;
        while is_boosting(&world, "a") {
            world.tick();
            ticks += 1;
            assert!(ticks < 120, "players never collided");
        }
        assert!(!is_boosting(&world, "b"));

        // The knockback separates them; the end of contact schedules the resume
        let resume_at = loop {
            if let Some(at) = world.boost_resumes.deadline("a") {
                break at;
            }
            world.tick();
            ticks += 1;
            assert!(ticks < 240, "players never separated");
        };
        assert_eq!(resume_at, world.physics().elapsed() + BOOST_RESUME_DELAY);

        while world.physics().elapsed() < resume_at {
            assert!(!is_boosting(&world, "a"));
            assert!(!is_boosting(&world, "b"));
            world.tick();
        }
        assert_eq!(world.physics().elapsed(), resume_at);
        assert!(is_boosting(&world, "a"));
        assert!(is_boosting(&world, "b"));
    }

    #[test]
    fn removing_a_touching_player_lets_the_other_boost_again() {
        let mut world = world_at(50, 1.0);
        let a = spawn(&mut world, "a");
        let b = spawn(&mut world, "b");
        place(&mut world, a, 500.0, 500.0, 0.0);
        place(&mut world, b, 512.0, 500.0, 0.0);

        world.step_physics();
        assert!(!is_boosting(&world, "a"));

        assert!(world.remove_player("b"));
        let resume_at = world.boost_resumes.deadline("a");
        assert_eq!(resume_at, Some(world.physics().elapsed() + BOOST_RESUME_DELAY));

        for _ in 0..24 {
            world.step_physics();
            assert!(!is_boosting(&world, "a"));
        }
        world.step_physics();
        assert!(is_boosting(&world, "a"));
    }

    #[test]
    fn reloading_the_map_releases_players_touching_the_old_walls() {
        let mut world = world_at(50, 1.0);
        world.load_map("0,0\n40,0\n40,40\n0,40").unwrap();
        let a = spawn(&mut world, "a");
        place(&mut world, a, 45.0, 20.0, 0.0);

        world.step_physics();
        assert!(!is_boosting(&world, "a"));

        world.load_map("500,500\n540,500\n540,540\n500,540").unwrap();
        assert!(world.boost_resumes.deadline("a").is_some());

        for _ in 0..25 {
            world.step_physics();
        }
        assert!(is_boosting(&world, "a"));
    }

    #[test]
    fn steering_rays_report_nearby_walls() {
        let mut world = world_at(60, 1.0);
        world
            .load_map("150,60\n190,60\n190,140\n150,140")
            .unwrap();
        let wall = world.map_body().unwrap();
        spawn(&mut world, "a");

        // The first step makes the new wall visible to point queries
        world.tick();
        world.tick();

        let rays = world.player("a").unwrap().last_steering_rays();
        assert_eq!(rays.len(), crate::game::steering::N_RAYS);
        assert!(rays.iter().filter_map(|r| r.hit).any(|hit| hit.body == wall));
    }

    #[test]
    fn snapshot_lists_every_player() {
        let mut world = World::default();
        spawn(&mut world, "a");
        spawn(&mut world, "b");

        let snapshot = world.snapshot(7);
        assert_eq!(snapshot.tick, 7);
        let ids: Vec<&str> = snapshot.players.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn world_event_wire_format() {
        let json = serde_json::to_string(&WorldEvent::PlayerSpawn("p1".into())).unwrap();
        assert_eq!(json, r#"{"type":"player_spawn","player_id":"p1"}"#);
    }
}
