//! Player entity: intent state and the per-tick movement algorithm

use std::time::Duration;

use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

use super::physics::{DynamicBodyDesc, PhysicsWorld, Point2, Vec2};
use super::snapshot::PlayerSnapshot;
use super::steering::{self, SteeringRay};

/// Label prefix that marks a body as a player body
pub const LABEL_PREFIX: &str = "player_";

/// Ship hitbox radius
pub const HITBOX_RADIUS: Real = 8.0;
pub const BODY_RESTITUTION: Real = 0.0;
pub const BODY_MASS: Real = 1.0;
/// Linear and angular air drag, per second
pub const BODY_FRICTION_AIR: Real = 0.6;

/// Top speed, units per second
pub const VELOCITY: Real = 360.0;
/// Thrust while boosting; also the scale of steering repulsion
pub const VELOCITY_FORCE: Real = 250.0;
/// Torque applied while a rotation key is held
pub const ROTATION_TORQUE_FORCE: Real = 960.0;
/// Top angular speed while rotating, radians per second
pub const ROTATION_VELOCITY: Real = 2.7;
/// Force of the push-back after touching something
pub const KNOCKBACK_FORCE: Real = 8000.0;

/// Per-tick interpolation factor pulling angular speed to zero when not rotating
pub const ROTATION_DECAY: Real = 0.05;
/// Normal components below this are floating-point noise
pub const COLLISION_NORMAL_EPSILON: f64 = 1e-10;
/// Delay before boosting resumes after a collision ends, at time scale 1
pub const BOOST_RESUME_DELAY: Duration = Duration::from_millis(500);

/// Rotation key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationDirection {
    Left,
    Right,
}

/// Resolved rotation intent for a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationIntent {
    #[default]
    None,
    Left,
    Right,
}

/// Relation of a player to the local session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Opponent,
    /// The locally controlled player
    Me,
}

/// Cosmetic ship colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipColor {
    Red,
    Orange,
    Yellow,
    Green,
    Cyan,
    Blue,
    Purple,
}

/// Body label for a player id
pub fn label_for(id: &str) -> String {
    format!("{LABEL_PREFIX}{id}")
}

/// Player id encoded in a body label, if the label marks a player body
pub fn id_from_label(label: &str) -> Option<&str> {
    label.strip_prefix(LABEL_PREFIX)
}

pub fn is_player_label(label: &str) -> bool {
    label.starts_with(LABEL_PREFIX)
}

/// A racer in the world
#[derive(Debug, Clone)]
pub struct Player {
    id: String,
    /// Own dynamic body, present once the player is added to a world
    body: Option<RigidBodyHandle>,
    spawn_position: Vec2,
    rotating_left: bool,
    rotating_right: bool,
    boosting: bool,
    role: Role,
    server_controlled: bool,
    ship_color: ShipColor,
    latency: f32,
    pending_collision: Option<Vec2>,
    last_steering_rays: Vec<SteeringRay>,
}

impl Player {
    pub fn new(id: impl Into<String>, spawn_position: Vec2, ship_color: ShipColor) -> Self {
        Self {
            id: id.into(),
            body: None,
            spawn_position,
            rotating_left: false,
            rotating_right: false,
            boosting: true,
            role: Role::Opponent,
            server_controlled: false,
            ship_color,
            latency: 0.0,
            pending_collision: None,
            last_steering_rays: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> String {
        label_for(&self.id)
    }

    pub fn body(&self) -> Option<RigidBodyHandle> {
        self.body
    }

    pub fn spawn_position(&self) -> Vec2 {
        self.spawn_position
    }

    pub fn is_boosting(&self) -> bool {
        self.boosting
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_me(&self) -> bool {
        self.role == Role::Me
    }

    pub fn is_opponent(&self) -> bool {
        self.role == Role::Opponent
    }

    pub fn is_server_controlled(&self) -> bool {
        self.server_controlled
    }

    pub fn ship_color(&self) -> ShipColor {
        self.ship_color
    }

    pub fn latency(&self) -> f32 {
        self.latency
    }

    /// Collision normal waiting for the next pre-step
    pub fn pending_collision(&self) -> Option<Vec2> {
        self.pending_collision
    }

    /// Rays sampled by the latest steering pass
    pub fn last_steering_rays(&self) -> &[SteeringRay] {
        &self.last_steering_rays
    }

    /// Held rotation keys resolved to one intent; right wins when both are held
    pub fn rotation_intent(&self) -> RotationIntent {
        if self.rotating_right {
            RotationIntent::Right
        } else if self.rotating_left {
            RotationIntent::Left
        } else {
            RotationIntent::None
        }
    }

    pub fn rotate(&mut self, direction: RotationDirection) {
        match direction {
            RotationDirection::Left => self.rotating_left = true,
            RotationDirection::Right => self.rotating_right = true,
        }
    }

    pub fn stop_rotation(&mut self, direction: RotationDirection) {
        match direction {
            RotationDirection::Left => self.rotating_left = false,
            RotationDirection::Right => self.rotating_right = false,
        }
    }

    pub fn start_boosting(&mut self) {
        self.boosting = true;
    }

    pub fn stop_boosting(&mut self) {
        self.boosting = false;
    }

    pub fn set_server_controlled(&mut self, state: bool) {
        self.server_controlled = state;
    }

    pub fn set_latency(&mut self, latency: f32) {
        self.latency = latency;
    }

    pub(crate) fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    /// Body description used when the player joins a world
    pub(crate) fn body_desc(&self) -> DynamicBodyDesc {
        DynamicBodyDesc {
            position: self.spawn_position,
            radius: HITBOX_RADIUS,
            mass: BODY_MASS,
            air_friction: BODY_FRICTION_AIR,
            restitution: BODY_RESTITUTION,
        }
    }

    pub(crate) fn attach_body(&mut self, handle: RigidBodyHandle) {
        self.body = Some(handle);
    }

    pub(crate) fn detach_body(&mut self) -> Option<RigidBodyHandle> {
        self.body.take()
    }

    /// Buffer a collision normal (pointing from this player towards what it hit).
    /// Only the first normal since the last pre-step is kept.
    pub(crate) fn buffer_collision(&mut self, normal: Vec2) -> bool {
        if self.pending_collision.is_some() {
            return false;
        }
        self.pending_collision = Some(normal);
        true
    }

    pub(crate) fn take_pending_collision(&mut self) -> Option<Vec2> {
        self.pending_collision.take()
    }

    fn body_mut<'a>(&self, physics: &'a mut PhysicsWorld) -> Option<&'a mut RigidBody> {
        physics.body_mut(self.body?)
    }

    /// Translate this tick's intent into forces on the body
    pub fn update(&mut self, physics: &mut PhysicsWorld, map_loaded: bool) {
        if self.server_controlled {
            return;
        }

        self.process_rotate(physics);
        self.process_movement(physics, map_loaded);
    }

    pub fn process_rotate(&self, physics: &mut PhysicsWorld) {
        let intent = self.rotation_intent();
        let Some(body) = self.body_mut(physics) else {
            return;
        };

        let torque = match intent {
            RotationIntent::Right => ROTATION_TORQUE_FORCE,
            RotationIntent::Left => -ROTATION_TORQUE_FORCE,
            RotationIntent::None => {
                // Let drag act, and actively damp leftover spin
                let angvel = body.angvel();
                body.set_angvel(lerp(angvel, 0.0, ROTATION_DECAY), true);
                return;
            }
        };

        body.reset_torques(true);
        body.add_torque(torque, true);
        clamp_angular_speed(body);
    }

    pub fn process_movement(&mut self, physics: &mut PhysicsWorld, map_loaded: bool) {
        let Some(body) = self.body_mut(physics) else {
            return;
        };

        let facing = body.rotation().angle();
        let heading = vector![facing.cos(), facing.sin()];
        let centre = Point2::from(*body.translation());

        if self.boosting {
            // Thrust from the engine at the rear, along the heading
            let engine = centre - heading * HITBOX_RADIUS;
            body.add_force_at_point(heading * VELOCITY_FORCE, engine, true);
        }

        clamp_speed(body);

        if !(self.boosting && map_loaded) {
            return;
        }

        let rays = steering::cast_rays(physics, &centre, facing, self.body);
        if let Some(body) = self.body_mut(physics) {
            for hit in rays.iter().filter_map(|ray| ray.hit) {
                body.add_force(steering::repulsion(&centre, &hit.point, VELOCITY_FORCE), true);
            }
        }
        self.last_steering_rays = rays;
    }

    /// Push the body back from a buffered collision and cancel its spin
    pub fn apply_collision_impulse(&self, physics: &mut PhysicsWorld, normal: Vec2) {
        let Some(body) = self.body_mut(physics) else {
            return;
        };

        body.add_force(reverse_normal(normal) * KNOCKBACK_FORCE, true);
        body.set_angvel(0.0, true);
        body.reset_torques(true);
    }

    /// Stop spinning without touching the boost state
    pub(crate) fn cancel_spin(&self, physics: &mut PhysicsWorld) {
        if let Some(body) = self.body_mut(physics) {
            body.set_angvel(0.0, true);
        }
    }

    /// Re-apply speed limits after integration
    pub(crate) fn enforce_limits(&self, physics: &mut PhysicsWorld) {
        if self.server_controlled {
            return;
        }
        let rotating = self.rotation_intent() != RotationIntent::None;
        let Some(body) = self.body_mut(physics) else {
            return;
        };

        clamp_speed(body);
        if rotating {
            clamp_angular_speed(body);
        }
    }

    /// Current kinematic state, if the player has a body
    pub fn snapshot(&self, physics: &PhysicsWorld) -> Option<PlayerSnapshot> {
        let body = physics.body(self.body?)?;
        let position = body.translation();
        let velocity = body.linvel();

        Some(PlayerSnapshot {
            id: self.id.clone(),
            x: position.x,
            y: position.y,
            angle: body.rotation().angle(),
            vel_x: velocity.x,
            vel_y: velocity.y,
            angular_velocity: body.angvel(),
            boosting: self.boosting,
            latency: self.latency,
        })
    }

    /// Overwrite body state from an authoritative snapshot
    pub fn apply_snapshot(&mut self, physics: &mut PhysicsWorld, snapshot: &PlayerSnapshot) {
        self.boosting = snapshot.boosting;
        self.latency = snapshot.latency;

        let Some(body) = self.body_mut(physics) else {
            return;
        };
        body.set_translation(vector![snapshot.x, snapshot.y], true);
        body.set_rotation(Rotation::new(snapshot.angle), true);
        body.set_linvel(vector![snapshot.vel_x, snapshot.vel_y], true);
        body.set_angvel(snapshot.angular_velocity, true);
    }
}

fn lerp(from: Real, to: Real, t: Real) -> Real {
    from + (to - from) * t
}

fn clamp_speed(body: &mut RigidBody) {
    let velocity = *body.linvel();
    let speed = velocity.norm();
    if speed > VELOCITY {
        body.set_linvel(velocity * (VELOCITY / speed), true);
    }
}

fn clamp_angular_speed(body: &mut RigidBody) {
    let angvel = body.angvel();
    if angvel.abs() > ROTATION_VELOCITY {
        body.set_angvel(ROTATION_VELOCITY.copysign(angvel), true);
    }
}

/// Rotate a collision normal by 180 degrees, snapping noise-level components to zero
pub(crate) fn reverse_normal(normal: Vec2) -> Vec2 {
    let (sin, cos) = std::f64::consts::PI.sin_cos();
    let (x, y) = (f64::from(normal.x), f64::from(normal.y));
    let snap = |v: f64| if v.abs() < COLLISION_NORMAL_EPSILON { 0.0 } else { v };

    vector![
        snap(x * cos - y * sin) as Real,
        snap(x * sin + y * cos) as Real
    ]
}
