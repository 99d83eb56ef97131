//! Multi-ray wall-avoidance steering

use rapier2d::prelude::*;

use super::physics::{PhysicsWorld, Point2, Vec2};

/// Number of rays in the fan
pub const N_RAYS: usize = 16;

/// Half-width of the fan, in degrees either side of the direction of travel
pub const DEGREE: Real = 75.0;

/// Length of every ray, marched in unit steps
pub const RAY_DIST: Real = 75.0;

/// First body met by a ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Point2,
    pub body: RigidBodyHandle,
}

/// One sampled ray; kept for introspection, never read back by the physics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringRay {
    pub direction: Vec2,
    pub hit: Option<RayHit>,
}

/// Unit directions of the fan, symmetric about `facing` (radians)
pub fn ray_directions(facing: Real) -> impl Iterator<Item = Vec2> {
    let spread = (2.0 * DEGREE) / (N_RAYS - 1) as Real;
    (0..N_RAYS).map(move |i| {
        let angle = facing + (-DEGREE + spread * i as Real).to_radians();
        vector![angle.cos(), angle.sin()]
    })
}

/// Cast the full fan from `origin`, ignoring the caster's own body
pub fn cast_rays(
    physics: &PhysicsWorld,
    origin: &Point2,
    facing: Real,
    caster: Option<RigidBodyHandle>,
) -> Vec<SteeringRay> {
    ray_directions(facing)
        .map(|direction| SteeringRay {
            direction,
            hit: march(physics, origin, &direction, caster),
        })
        .collect()
}

fn march(
    physics: &PhysicsWorld,
    origin: &Point2,
    direction: &Vec2,
    caster: Option<RigidBodyHandle>,
) -> Option<RayHit> {
    (1..=RAY_DIST as u32).find_map(|step| {
        let point = origin + direction * step as Real;
        physics
            .body_at_point(&point, caster)
            .map(|body| RayHit { point, body })
    })
}

/// Force pushing the body at `origin` away from `hit`, scaled by `max_force`.
///
/// Full strength at the origin, fading linearly to zero at `RAY_DIST`.
pub fn repulsion(origin: &Point2, hit: &Point2, max_force: Real) -> Vec2 {
    let away = origin - hit;
    let distance = away.norm();
    if distance <= Real::EPSILON {
        return Vec2::zeros();
    }

    let weight = (1.0 - distance / RAY_DIST).max(0.0);
    away / distance * (weight * max_force)
}
