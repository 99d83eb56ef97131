//! Rigid-body physics adapter over rapier2d
//!
//! The simulation core treats the physics engine as a black box. This module
//! owns every rapier set and exposes only what the core needs: labelled
//! bodies, force application, point containment queries and contact
//! notifications collected from each step.

use std::collections::HashMap;
use std::time::Duration;

use rapier2d::prelude::*;

use crate::util::time::tick_duration;

/// 2-D vector in world units
pub type Vec2 = Vector<Real>;

/// 2-D point in world units
pub type Point2 = Point<Real>;

/// Collision category of static map geometry
pub const WALL_COLLISION_GROUP: Group = Group::GROUP_1;

/// Collision category of player bodies
pub const PLAYER_COLLISION_GROUP: Group = Group::GROUP_5;

/// Physical description of a dynamic circular body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicBodyDesc {
    pub position: Vec2,
    pub radius: Real,
    pub mass: Real,
    /// Linear and angular air drag, per second
    pub air_friction: Real,
    pub restitution: Real,
}

/// Contact notification raised by a physics step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactEvent {
    /// Two bodies started touching. `normal` points from `body_a` towards `body_b`.
    Started {
        body_a: RigidBodyHandle,
        body_b: RigidBodyHandle,
        normal: Vec2,
    },
    /// Two bodies stopped touching
    Stopped {
        body_a: RigidBodyHandle,
        body_b: RigidBodyHandle,
    },
}

/// Physics world: rapier state plus body labels and the simulation clock
pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    gravity: Vec2,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    /// Reserved label per body, used to tell players from map geometry
    labels: HashMap<RigidBodyHandle, String>,
    /// Wall-clock length of one step
    tick_delta: Duration,
    /// Multiplier applied to the integrated time of every step
    time_scale: f32,
    /// Wall-clock time accumulated over all steps
    elapsed: Duration,
}

impl PhysicsWorld {
    /// Create a top-down (zero gravity) world stepping at `tick_rate` Hz
    pub fn new(tick_rate: u32, time_scale: f32) -> Self {
        let mut physics = Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![0.0, 0.0],
            integration_params: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            labels: HashMap::new(),
            tick_delta: tick_duration(tick_rate),
            time_scale: 1.0,
            elapsed: Duration::ZERO,
        };
        physics.set_time_scale(time_scale);
        physics
    }

    /// Wall-clock length of one step
    pub fn tick_delta(&self) -> Duration {
        self.tick_delta
    }

    /// Wall-clock time accumulated over all steps so far
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Change the simulation rate. Non-positive or non-finite scales are ignored.
    pub fn set_time_scale(&mut self, time_scale: f32) {
        if time_scale.is_finite() && time_scale > 0.0 {
            self.time_scale = time_scale;
        } else {
            tracing::warn!(time_scale, "Ignoring invalid time scale");
        }
    }

    /// Register a dynamic circular body under `label`
    pub fn insert_dynamic_body(
        &mut self,
        label: impl Into<String>,
        desc: &DynamicBodyDesc,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(desc.position)
            .linear_damping(desc.air_friction)
            .angular_damping(desc.air_friction)
            .can_sleep(false)
            .build();
        let handle = self.bodies.insert(body);

        let collider = ColliderBuilder::ball(desc.radius)
            .mass(desc.mass)
            .restitution(desc.restitution)
            .friction(0.0)
            .collision_groups(InteractionGroups::new(PLAYER_COLLISION_GROUP, Group::ALL))
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        self.labels.insert(handle, label.into());
        handle
    }

    /// Register one immobile, frictionless body made of the given polygons.
    /// Concave polygons are convex-decomposed.
    pub fn insert_static_polygons(
        &mut self,
        label: impl Into<String>,
        polygons: &[Vec<Point2>],
    ) -> RigidBodyHandle {
        let handle = self.bodies.insert(RigidBodyBuilder::fixed().build());

        for vertices in polygons {
            let n = vertices.len() as u32;
            let indices: Vec<[u32; 2]> = (0..n).map(|i| [i, (i + 1) % n]).collect();
            let collider = ColliderBuilder::convex_decomposition(vertices, &indices)
                .friction(0.0)
                .restitution(0.0)
                .collision_groups(InteractionGroups::new(WALL_COLLISION_GROUP, Group::ALL))
                .build();
            self.colliders
                .insert_with_parent(collider, handle, &mut self.bodies);
        }

        self.labels.insert(handle, label.into());
        handle
    }

    /// Remove a body and its colliders. Returns false if it was not registered.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> bool {
        self.labels.remove(&handle);
        self.bodies
            .remove(
                handle,
                &mut self.island_manager,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    pub fn contains(&self, handle: RigidBodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn label(&self, handle: RigidBodyHandle) -> Option<&str> {
        self.labels.get(&handle).map(String::as_str)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// First body containing `point`, other than `exclude`.
    ///
    /// Answers from the state of the last step; geometry inserted since then
    /// is not visible yet.
    pub fn body_at_point(
        &self,
        point: &Point2,
        exclude: Option<RigidBodyHandle>,
    ) -> Option<RigidBodyHandle> {
        let filter = match exclude {
            Some(handle) => QueryFilter::new().exclude_rigid_body(handle),
            None => QueryFilter::new(),
        };

        let mut hit = None;
        self.query_pipeline.intersections_with_point(
            &self.bodies,
            &self.colliders,
            point,
            filter,
            |collider| match self.parent(collider) {
                Some(parent) => {
                    hit = Some(parent);
                    false
                }
                None => true,
            },
        );
        hit
    }

    /// Bodies in active contact with `handle` as of the last step
    pub fn touching_bodies(&self, handle: RigidBodyHandle) -> Vec<RigidBodyHandle> {
        let Some(body) = self.bodies.get(handle) else {
            return Vec::new();
        };
        let own = body.colliders();

        let mut touching = Vec::new();
        for &collider in own {
            for pair in self.narrow_phase.contact_pairs_with(collider) {
                if !pair.has_any_active_contact {
                    continue;
                }
                let other = if own.contains(&pair.collider1) {
                    pair.collider2
                } else {
                    pair.collider1
                };
                match self.parent(other) {
                    Some(parent) if parent != handle && !touching.contains(&parent) => {
                        touching.push(parent)
                    }
                    _ => {}
                }
            }
        }
        touching
    }

    /// Integrate one step and return the contact notifications it raised.
    ///
    /// Forces and torques applied before the call act for exactly this step.
    pub fn step(&mut self) -> Vec<ContactEvent> {
        self.integration_params.dt = self.tick_delta.as_secs_f32() * self.time_scale;

        let (collision_send, collision_recv) =
            rapier2d::crossbeam::channel::unbounded::<CollisionEvent>();
        let (force_send, _force_recv) =
            rapier2d::crossbeam::channel::unbounded::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &event_handler,
        );
        self.elapsed += self.tick_delta;

        for (_, body) in self.bodies.iter_mut() {
            if body.is_dynamic() {
                body.reset_forces(false);
                body.reset_torques(false);
            }
        }

        let mut contacts = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            let (c1, c2) = (event.collider1(), event.collider2());
            // Colliders removed during the step have no parent left to report
            let Some((body_a, body_b)) = self.parent(c1).zip(self.parent(c2)) else {
                continue;
            };

            if event.started() {
                contacts.push(ContactEvent::Started {
                    body_a,
                    body_b,
                    normal: self.contact_normal(c1, c2, body_a, body_b),
                });
            } else {
                contacts.push(ContactEvent::Stopped { body_a, body_b });
            }
        }

        contacts
    }

    fn parent(&self, collider: ColliderHandle) -> Option<RigidBodyHandle> {
        self.colliders.get(collider).and_then(|c| c.parent())
    }

    /// World-space normal pointing from the first collider towards the second
    fn contact_normal(
        &self,
        c1: ColliderHandle,
        c2: ColliderHandle,
        body_a: RigidBodyHandle,
        body_b: RigidBodyHandle,
    ) -> Vec2 {
        if let Some(pair) = self.narrow_phase.contact_pair(c1, c2) {
            if let Some(manifold) = pair.manifolds.iter().find(|m| !m.points.is_empty()) {
                let normal = manifold.data.normal;
                return if pair.collider1 == c1 { normal } else { -normal };
            }
        }

        // No manifold yet: fall back to the line between the two centres
        match (self.bodies.get(body_a), self.bodies.get(body_b)) {
            (Some(a), Some(b)) => (b.translation() - a.translation())
                .try_normalize(Real::EPSILON)
                .unwrap_or_else(Vec2::zeros),
            _ => Vec2::zeros(),
        }
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(crate::util::time::SIMULATION_TPS, 1.0)
    }
}
