//! Particle-based visco-elastic fluid simulation.
//!
//! Implements the double density relaxation scheme of Clavet, Beaudoin and
//! Poulin ("Particle-based Viscoelastic Fluid Simulation", SCA 2005):
//! particles carry position, previous position and velocity; each step
//! applies gravity and pairwise viscosity impulses, advances positions,
//! optionally corrects them through plastic springs, relaxes local density
//! toward a rest value by direct position displacement (no pressure linear
//! system), resolves collisions against bounds and quad-wall obstacles, and
//! reconstructs velocities from the position deltas.
//!
//! Neighbor search runs through a uniform-grid [`SpatialIndex`] so a step
//! costs O(N·k) for k average neighbors instead of O(N²).
//!
//! The crate is simulation only: no drawing, windowing, or I/O. A renderer
//! consumes read-only particle positions each frame.
//!
//! # Example
//!
//! ```
//! use glam::Vec3;
//! use visco::{SimConfig, Simulation};
//!
//! let mut sim = Simulation::new(SimConfig::default()).unwrap();
//!
//! // Spawn a small block of fluid above the ground plane.
//! for i in 0..4 {
//!     for j in 0..4 {
//!         sim.add_particle(Vec3::new(i as f32 * 0.25, 2.0 + j as f32 * 0.25, 0.0));
//!     }
//! }
//!
//! for _ in 0..60 {
//!     sim.step(1.0 / 60.0);
//! }
//! assert_eq!(sim.particle_count(), 16);
//! ```

pub mod config;
pub mod error;
pub mod field;
pub mod obstacle;
pub mod particle;
mod serde_util;
pub mod spatial;
pub mod spring;

pub use config::SimConfig;
pub use error::SimError;
pub use glam::Vec3;
pub use obstacle::{Collision, ObstacleId, QuadWall};
pub use particle::{Particle, ParticleId, Particles};
pub use spatial::SpatialIndex;
pub use spring::{Spring, SpringSet};

use rayon::prelude::*;

/// Pairs closer than this are skipped in every pairwise pass. Coincident
/// particles would otherwise divide by zero during normalization.
const MIN_SEPARATION: f32 = 1e-6;

/// Rest lengths at or beyond this fraction of the smoothing radius mark a
/// spring for removal.
const SPRING_BREAK_RATIO: f32 = 0.9;

/// What an entry in the simulation's spatial index refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpatialItem {
    Particle(ParticleId),
    Obstacle(ObstacleId),
}

/// The simulation: particle arena, spring set, obstacles, spatial index,
/// and the fixed per-step pass pipeline.
pub struct Simulation {
    /// Tunables. Mutating between steps is legal; `grid_cell` alone is
    /// only read at construction.
    pub config: SimConfig,
    particles: Particles,
    springs: SpringSet,
    obstacles: Vec<QuadWall>,
    index: SpatialIndex<SpatialItem>,
    steps: u64,
    /// Caller-visible run flag for host step loops. The core never reads it.
    pub running: bool,
}

impl Simulation {
    /// Create a simulation after validating the configuration.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let index = SpatialIndex::new(config.grid_cell)?;
        Ok(Self {
            config,
            particles: Particles::new(),
            springs: SpringSet::new(),
            obstacles: Vec::new(),
            index,
            steps: 0,
            running: true,
        })
    }

    /// Add a particle at rest.
    pub fn add_particle(&mut self, position: Vec3) -> ParticleId {
        self.add_particle_with_velocity(position, Vec3::ZERO)
    }

    /// Add a particle with an initial velocity.
    pub fn add_particle_with_velocity(&mut self, position: Vec3, velocity: Vec3) -> ParticleId {
        let mut position = position;
        let mut velocity = velocity;
        if self.config.two_d {
            position.z = 0.0;
            velocity.z = 0.0;
        }
        let id = self.particles.spawn(position, velocity);
        self.index.insert_point(SpatialItem::Particle(id), position);
        id
    }

    /// Remove a particle, detaching any springs still referencing it.
    ///
    /// Spring detachment walks the particle's own partner list, so the cost
    /// is O(degree) rather than O(total springs).
    pub fn remove_particle(&mut self, id: ParticleId) -> Result<(), SimError> {
        let removed = self.particles.remove(id)?;
        self.index.remove(SpatialItem::Particle(id))?;
        for partner in removed.spring_partners {
            self.springs.remove(id, partner);
            if let Some(p) = self.particles.get_mut(partner) {
                p.spring_partners.retain(|&other| other != id);
            }
        }
        Ok(())
    }

    /// Add a static wall, registering it in every spatial bucket it spans.
    pub fn add_obstacle(&mut self, wall: QuadWall) -> ObstacleId {
        let id = ObstacleId(self.obstacles.len() as u32);
        let (min, max) = wall.aabb();
        self.index.insert_volume(SpatialItem::Obstacle(id), min, max);
        self.obstacles.push(wall);
        id
    }

    /// Advance the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        debug_assert!(dt > 0.0 && dt.is_finite(), "invalid timestep: {dt}");
        if dt <= 0.0 || !dt.is_finite() {
            return;
        }

        // 1. Rebuild per-particle neighbor lists and collision records
        self.compute_neighbors();

        // 2. Gravity
        self.apply_gravity(dt);

        // 3. Pairwise viscosity impulses
        self.apply_viscosity(dt);

        // 4. Save previous positions and advance by velocity
        self.advance_positions(dt);

        // 5. Elastic springs with plastic rest-length drift
        if self.config.plasticity {
            self.adjust_springs(dt);
            self.apply_spring_displacements(dt);
        }

        // 6. Double density relaxation (the incompressibility pass)
        self.relax_density(dt);

        // 7. Collisions against bounds and obstacles
        self.resolve_collisions(dt);

        // 8. Velocity from position delta
        self.reconstruct_velocities(dt);

        // 9. Keep spatial bucket membership in sync with new positions
        self.sync_spatial_index();

        self.steps += 1;
    }

    /// Pass 1: one box query per particle, partitioned into same-type
    /// neighbors (distance < h, self excluded) and the nearest obstacle
    /// within h. Queries only read the index, so they fan out in parallel;
    /// results are written back serially.
    fn compute_neighbors(&mut self) {
        let h = self.config.h;
        let h_sq = h * h;
        let box_radius = 2.0 * h;
        let two_d = self.config.two_d;
        let index = &self.index;
        let particles = &self.particles;
        let obstacles = &self.obstacles;

        let results: Vec<(Vec<u32>, Option<Collision>)> = (0..particles.len())
            .into_par_iter()
            .map(|slot| {
                let p = particles.at(slot);
                let mut found = Vec::new();
                if two_d {
                    index.query_box_xy(p.position, box_radius, &mut found);
                } else {
                    index.query_box(p.position, box_radius, &mut found);
                }

                let mut neighbors = Vec::new();
                let mut collision: Option<Collision> = None;
                for item in found {
                    match item {
                        SpatialItem::Particle(id) => {
                            if id == p.id {
                                continue;
                            }
                            let Some(other) = particles.slot_of(id) else {
                                continue;
                            };
                            let d_sq = particles.at(other).position.distance_squared(p.position);
                            if d_sq < h_sq {
                                neighbors.push(other as u32);
                            }
                        }
                        SpatialItem::Obstacle(oid) => {
                            let (distance, point, normal) =
                                obstacles[oid.0 as usize].nearest(p.position);
                            if distance < h {
                                // Nearest wins; only a strictly smaller
                                // distance replaces an earlier find.
                                let replace = match &collision {
                                    Some(current) => distance < current.distance,
                                    None => true,
                                };
                                if replace {
                                    collision = Some(Collision {
                                        distance,
                                        point,
                                        normal,
                                        obstacle: oid,
                                    });
                                }
                            }
                        }
                    }
                }
                (neighbors, collision)
            })
            .collect();

        for (slot, (neighbors, collision)) in results.into_iter().enumerate() {
            let p = self.particles.at_mut(slot);
            p.neighbors = neighbors;
            p.collision = collision;
        }
    }

    /// Pass 2.
    fn apply_gravity(&mut self, dt: f32) {
        let g = self.config.gravity;
        for p in self.particles.iter_mut() {
            p.velocity.y -= dt * g;
        }
    }

    /// Pass 3: for each unordered neighbor pair, an impulse along the
    /// separation axis damps inward radial velocity. Applied symmetrically,
    /// so pair momentum is conserved exactly.
    fn apply_viscosity(&mut self, dt: f32) {
        let h = self.config.h;
        let sigma = self.config.sigma;
        let beta = self.config.beta;

        for i in 0..self.particles.len() {
            for k in 0..self.particles.at(i).neighbors.len() {
                let j = self.particles.at(i).neighbors[k] as usize;
                // Each unordered pair exactly once.
                if j <= i {
                    continue;
                }
                let (pi, pj) = self.particles.pair_mut(i, j);
                let r = pj.position - pi.position;
                let r_len = r.length();
                if r_len < MIN_SEPARATION || r_len >= h {
                    continue;
                }
                let q = r_len / h;
                let r_hat = r / r_len;
                let u = (pi.velocity - pj.velocity).dot(r_hat);
                if u > 0.0 {
                    let impulse = r_hat * (dt * (1.0 - q) * (sigma * u + beta * u * u) * 0.5);
                    pi.velocity -= impulse;
                    pj.velocity += impulse;
                }
            }
        }
    }

    /// Pass 4.
    fn advance_positions(&mut self, dt: f32) {
        for p in self.particles.iter_mut() {
            p.prev_position = p.position;
            p.position += p.velocity * dt;
        }
    }

    /// Pass 5a: create springs for neighbor pairs that lack one, and drift
    /// rest lengths plastically when the separation leaves the yield band.
    /// A step stamp keeps each spring to at most one adjustment per step
    /// even though both endpoints visit the pair. Springs whose rest length
    /// reaches the break ratio are removed in the same pass.
    fn adjust_springs(&mut self, dt: f32) {
        let h = self.config.h;
        let yield_ratio = self.config.yield_ratio;
        let rate = self.config.plasticity_rate;
        let step = self.steps;

        for i in 0..self.particles.len() {
            let id_i = self.particles.at(i).id;
            for k in 0..self.particles.at(i).neighbors.len() {
                let j = self.particles.at(i).neighbors[k] as usize;
                let id_j = self.particles.at(j).id;
                let r_len = self
                    .particles
                    .at(j)
                    .position
                    .distance(self.particles.at(i).position);

                if let Some(spring) = self.springs.get_mut(id_i, id_j) {
                    if spring.last_adjusted == step {
                        continue;
                    }
                    spring.last_adjusted = step;
                    let slack = yield_ratio * spring.rest_length;
                    if r_len > spring.rest_length + slack {
                        spring.rest_length += dt * rate * (r_len - spring.rest_length - slack);
                    } else if r_len < spring.rest_length - slack {
                        spring.rest_length -= dt * rate * (spring.rest_length - slack - r_len);
                    }
                    continue;
                }
                if r_len < h && r_len >= MIN_SEPARATION {
                    // Rest length starts at the current separation, not h.
                    self.springs.insert(id_i, id_j, r_len, step);
                    self.particles.at_mut(i).spring_partners.push(id_j);
                    self.particles.at_mut(j).spring_partners.push(id_i);
                }
            }
        }

        self.remove_overstretched_springs();
    }

    fn remove_overstretched_springs(&mut self) {
        let limit = SPRING_BREAK_RATIO * self.config.h;
        let doomed: Vec<(ParticleId, ParticleId)> = self
            .springs
            .iter()
            .filter(|(_, s)| s.rest_length >= limit)
            .map(|(&pair, _)| pair)
            .collect();
        for (a, b) in doomed {
            self.springs.remove(a, b);
            if let Some(p) = self.particles.get_mut(a) {
                p.spring_partners.retain(|&other| other != b);
            }
            if let Some(p) = self.particles.get_mut(b) {
                p.spring_partners.retain(|&other| other != a);
            }
        }
    }

    /// Pass 5b: each spring pushes its endpoints a half-correction apart or
    /// together, scaled down as the rest length approaches h.
    fn apply_spring_displacements(&mut self, dt: f32) {
        let h = self.config.h;
        let k_spring = self.config.spring_k;

        for (&(a, b), spring) in self.springs.iter() {
            let (Some(i), Some(j)) = (self.particles.slot_of(a), self.particles.slot_of(b)) else {
                continue;
            };
            let (pi, pj) = self.particles.pair_mut(i, j);
            let r = pj.position - pi.position;
            let r_len = r.length();
            if r_len < MIN_SEPARATION {
                continue;
            }
            let r_hat = r / r_len;
            let rest = spring.rest_length;
            let d = r_hat * (dt * dt * k_spring * (1.0 - rest / h) * (rest - r_len) * 0.5);
            pi.position -= d;
            pj.position += d;
        }
    }

    /// Pass 6: double density relaxation. Per particle, sum the kernel
    /// terms into density and near-density, turn them into pressures, then
    /// displace neighbors outward (or inward) and the particle itself by
    /// the accumulated opposite amount. Later particles see the updates of
    /// earlier ones within the same pass, as in the reference algorithm.
    fn relax_density(&mut self, dt: f32) {
        let h = self.config.h;
        let k = self.config.stiffness;
        let k_near = self.config.stiffness_near;
        let rho_zero = self.config.rest_density;
        let dt_sq = dt * dt;

        for i in 0..self.particles.len() {
            let pos_i = self.particles.at(i).position;
            let neighbor_count = self.particles.at(i).neighbors.len();

            let mut rho = 0.0;
            let mut rho_near = 0.0;
            for k_idx in 0..neighbor_count {
                let j = self.particles.at(i).neighbors[k_idx] as usize;
                let r_len = self.particles.at(j).position.distance(pos_i);
                if r_len >= h {
                    continue;
                }
                let one_q = 1.0 - r_len / h;
                rho += one_q * one_q;
                rho_near += one_q * one_q * one_q;
            }
            self.particles.at_mut(i).density = rho;

            let pressure = k * (rho - rho_zero);
            let pressure_near = k_near * rho_near;

            let mut dx = Vec3::ZERO;
            for k_idx in 0..neighbor_count {
                let j = self.particles.at(i).neighbors[k_idx] as usize;
                let (pi, pj) = self.particles.pair_mut(i, j);
                let r = pj.position - pi.position;
                let r_len = r.length();
                if r_len < MIN_SEPARATION || r_len >= h {
                    continue;
                }
                let one_q = 1.0 - r_len / h;
                let r_hat = r / r_len;
                let d = r_hat * (dt_sq * (pressure * one_q + pressure_near * one_q * one_q) * 0.5);
                pj.position += d;
                dx -= d;
            }
            self.particles.at_mut(i).position += dx;
        }
    }

    /// Pass 7: cancel penetrating motion against the bound planes and the
    /// nearest obstacle, with tangential damping by the friction
    /// coefficient (0 = free slip, 1 = no slip).
    fn resolve_collisions(&mut self, dt: f32) {
        let friction = self.config.friction;
        let contact_range = self.config.h * 0.5;
        let bounds_min = self.config.bounds_min;
        let bounds_max = self.config.bounds_max;
        let two_d = self.config.two_d;
        let stickiness = self.config.stickiness;
        let stick_k = self.config.stick_k;
        let stick_distance = self.config.stick_distance;

        for p in self.particles.iter_mut() {
            if p.position.y < bounds_min.y {
                cancel_motion(p, Vec3::Y, friction);
            }
            if p.position.y > bounds_max.y {
                cancel_motion(p, Vec3::NEG_Y, friction);
            }
            if p.position.x < bounds_min.x {
                cancel_motion(p, Vec3::X, friction);
            }
            if p.position.x > bounds_max.x {
                cancel_motion(p, Vec3::NEG_X, friction);
            }
            if !two_d {
                if p.position.z < bounds_min.z {
                    cancel_motion(p, Vec3::Z, friction);
                }
                if p.position.z > bounds_max.z {
                    cancel_motion(p, Vec3::NEG_Z, friction);
                }
            }

            if let Some(collision) = p.collision {
                if collision.distance < contact_range {
                    cancel_motion(p, collision.normal, friction);
                }
                // Experimental surface adhesion; see SimConfig::stickiness.
                if stickiness && collision.distance < stick_distance {
                    let impulse = -dt
                        * stick_k
                        * collision.distance
                        * (1.0 - collision.distance / stick_distance);
                    p.position += collision.normal * impulse;
                }
            }
        }
    }

    /// Pass 8: velocity is always derived from the position delta; the
    /// only direct velocity integration is the gravity pass.
    fn reconstruct_velocities(&mut self, dt: f32) {
        let inv_dt = 1.0 / dt;
        for p in self.particles.iter_mut() {
            p.velocity = (p.position - p.prev_position) * inv_dt;
        }
    }

    /// Pass 9: rebucket every particle. Obstacles are static, their volume
    /// registration never changes.
    fn sync_spatial_index(&mut self) {
        for p in self.particles.iter() {
            let result = self
                .index
                .update_point(SpatialItem::Particle(p.id), p.position);
            debug_assert!(result.is_ok(), "live particle missing from spatial index");
        }
    }

    /// Number of live particles.
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Number of live springs.
    pub fn spring_count(&self) -> usize {
        self.springs.len()
    }

    /// Completed step count.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Read-only access to the particle arena.
    pub fn particles(&self) -> &Particles {
        &self.particles
    }

    /// Obstacles in insertion (id) order.
    pub fn obstacles(&self) -> &[QuadWall] {
        &self.obstacles
    }

    /// The spring on a pair, or a clear not-found signal: spring
    /// bookkeeping correctness depends on callers observing accurate state.
    pub fn spring_between(&self, a: ParticleId, b: ParticleId) -> Result<&Spring, SimError> {
        self.springs.get(a, b).ok_or(SimError::SpringNotFound(a, b))
    }

    /// Collect current positions, e.g. for a renderer.
    pub fn positions(&self) -> Vec<Vec3> {
        self.particles.iter().map(|p| p.position).collect()
    }

    /// Collect current velocities.
    pub fn velocities(&self) -> Vec<Vec3> {
        self.particles.iter().map(|p| p.velocity).collect()
    }

    /// Collect current densities.
    pub fn densities(&self) -> Vec<f32> {
        self.particles.iter().map(|p| p.density).collect()
    }
}

/// Remove the normal component of this step's motion and damp the
/// tangential component by `friction`.
fn cancel_motion(p: &mut Particle, normal: Vec3, friction: f32) {
    let motion = p.position - p.prev_position;
    let normal_part = normal * motion.dot(normal);
    let tangent_part = motion - normal_part;
    p.position -= normal_part + tangent_part * friction;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> SimConfig {
        // No gravity and no pressure terms, so individual passes can be
        // observed in isolation.
        SimConfig {
            gravity: 0.0,
            stiffness: 0.0,
            stiffness_near: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn creation_and_spawning() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        assert_eq!(sim.particle_count(), 0);

        let a = sim.add_particle(Vec3::new(0.0, 1.0, 0.0));
        let b = sim.add_particle_with_velocity(Vec3::new(1.0, 1.0, 0.0), Vec3::X);
        assert_eq!(sim.particle_count(), 2);
        assert_ne!(a, b);
        assert_eq!(sim.particles().get(b).unwrap().velocity, Vec3::X);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let cfg = SimConfig {
            h: -1.0,
            ..Default::default()
        };
        assert!(Simulation::new(cfg).is_err());
    }

    #[test]
    fn removing_unknown_particle_errors() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let a = sim.add_particle(Vec3::ONE);
        sim.remove_particle(a).unwrap();
        assert_eq!(
            sim.remove_particle(a).unwrap_err(),
            SimError::ParticleNotFound(a)
        );
    }

    #[test]
    fn viscosity_conserves_pair_momentum() {
        let mut sim = Simulation::new(quiet_config()).unwrap();
        sim.add_particle_with_velocity(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0));
        sim.add_particle_with_velocity(Vec3::new(0.25, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));

        sim.compute_neighbors();
        let before: Vec3 = sim.particles.iter().map(|p| p.velocity).sum();
        sim.apply_viscosity(0.01);
        let after: Vec3 = sim.particles.iter().map(|p| p.velocity).sum();

        assert!((before - after).length() < 1e-6, "momentum changed: {before} -> {after}");

        // The pair was approaching, so viscosity must have damped the
        // approach speed without reversing it.
        let vi = sim.particles.at(0).velocity.x;
        let vj = sim.particles.at(1).velocity.x;
        assert!(vi < 1.0 && vi >= -1.0);
        assert!(vj > -1.0 && vj <= 1.0);
        assert!(vi - vj < 2.0, "relative approach speed did not shrink");
    }

    #[test]
    fn viscosity_leaves_separating_pairs_alone() {
        let mut sim = Simulation::new(quiet_config()).unwrap();
        sim.add_particle_with_velocity(Vec3::ZERO, Vec3::new(-1.0, 0.0, 0.0));
        sim.add_particle_with_velocity(Vec3::new(0.25, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));

        sim.compute_neighbors();
        sim.apply_viscosity(0.01);

        assert_eq!(sim.particles.at(0).velocity, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(sim.particles.at(1).velocity, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn spring_displacement_is_equal_and_opposite() {
        let mut cfg = quiet_config();
        cfg.plasticity = true;
        let mut sim = Simulation::new(cfg).unwrap();
        let a = sim.add_particle(Vec3::ZERO);
        let b = sim.add_particle(Vec3::new(0.3, 0.0, 0.0));

        sim.compute_neighbors();
        sim.adjust_springs(0.01);
        assert!(sim.spring_between(a, b).is_ok());

        // Stretch the pair past the rest length, then apply the correction.
        sim.particles.at_mut(1).position.x = 0.45;
        let before_0 = sim.particles.at(0).position;
        let before_1 = sim.particles.at(1).position;

        sim.apply_spring_displacements(0.1);

        let d0 = sim.particles.at(0).position - before_0;
        let d1 = sim.particles.at(1).position - before_1;
        assert!(d0.length() > 0.0, "spring applied no correction");
        assert!((d0 + d1).length() < 1e-7, "correction was not antisymmetric");
        // Stretched springs pull the endpoints toward each other.
        assert!(d0.x > 0.0 && d1.x < 0.0);
    }

    #[test]
    fn spring_rest_length_never_survives_past_break_ratio() {
        let mut cfg = quiet_config();
        cfg.plasticity = true;
        cfg.yield_ratio = 0.0;
        let mut sim = Simulation::new(cfg).unwrap();
        let a = sim.add_particle(Vec3::ZERO);
        let b = sim.add_particle(Vec3::new(0.2, 0.0, 0.0));

        sim.compute_neighbors();
        sim.adjust_springs(0.01);
        assert_eq!(sim.spring_count(), 1);

        // Hold the pair near the smoothing radius; plastic stretch must walk
        // the rest length up to the break ratio and then remove the spring.
        sim.particles.at_mut(1).position.x = 0.49;
        sim.compute_neighbors();
        for _ in 0..10_000 {
            sim.steps += 1;
            sim.adjust_springs(0.05);
            if let Ok(spring) = sim.spring_between(a, b) {
                assert!(
                    spring.rest_length < SPRING_BREAK_RATIO * sim.config.h,
                    "live spring past the break ratio"
                );
            } else {
                break;
            }
        }
        assert_eq!(sim.spring_count(), 0, "overstretched spring not removed");
        assert!(sim.particles.get(a).unwrap().spring_partners.is_empty());
        assert!(sim.particles.get(b).unwrap().spring_partners.is_empty());
    }

    #[test]
    fn springs_adjust_at_most_once_per_step() {
        let mut cfg = quiet_config();
        cfg.plasticity = true;
        let mut sim = Simulation::new(cfg).unwrap();
        let a = sim.add_particle(Vec3::ZERO);
        let b = sim.add_particle(Vec3::new(0.4, 0.0, 0.0));

        sim.compute_neighbors();
        // Plant a spring that believes it was last adjusted long ago.
        sim.springs.insert(a, b, 0.2, u64::MAX);
        sim.particles.at_mut(0).spring_partners.push(b);
        sim.particles.at_mut(1).spring_partners.push(a);

        sim.adjust_springs(0.1);
        let first = sim.spring_between(a, b).unwrap().rest_length;
        assert!(first > 0.2, "stretched spring did not adjust");

        // Same step: a second sweep must be a no-op.
        sim.adjust_springs(0.1);
        let second = sim.spring_between(a, b).unwrap().rest_length;
        assert_eq!(first, second);

        // Next step adjusts again.
        sim.steps += 1;
        sim.adjust_springs(0.1);
        assert!(sim.spring_between(a, b).unwrap().rest_length > first);
    }

    #[test]
    fn removing_a_particle_detaches_its_springs() {
        let mut cfg = quiet_config();
        cfg.plasticity = true;
        let mut sim = Simulation::new(cfg).unwrap();
        let a = sim.add_particle(Vec3::ZERO);
        let b = sim.add_particle(Vec3::new(0.3, 0.0, 0.0));
        let c = sim.add_particle(Vec3::new(0.0, 0.3, 0.0));

        sim.step(0.01);
        assert!(sim.spring_count() >= 2);

        sim.remove_particle(a).unwrap();
        assert!(sim.spring_between(a, b).is_err());
        assert!(sim.spring_between(a, c).is_err());
        for p in sim.particles.iter() {
            assert!(!p.spring_partners.contains(&a));
        }
    }

    #[test]
    fn collision_record_keeps_first_on_exact_tie() {
        let mut sim = Simulation::new(quiet_config()).unwrap();
        // Two faces at the same 0.2 distance from the particle, one below
        // and one above.
        let below = sim.add_obstacle(
            QuadWall::new(
                Vec3::new(-1.0, 0.8, -1.0),
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 2.0),
            )
            .unwrap(),
        );
        let _above = sim.add_obstacle(
            QuadWall::new(
                Vec3::new(-1.0, 1.2, -1.0),
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 2.0),
            )
            .unwrap(),
        );
        sim.add_particle(Vec3::new(0.0, 1.0, 0.0));

        sim.compute_neighbors();
        let collision = sim.particles.at(0).collision().unwrap();
        assert!((collision.distance - 0.2).abs() < 1e-6);
        assert_eq!(collision.obstacle, below);
    }

    #[test]
    fn collision_record_prefers_strictly_nearer_obstacle() {
        let mut sim = Simulation::new(quiet_config()).unwrap();
        let _far = sim.add_obstacle(
            QuadWall::new(
                Vec3::new(-1.0, 0.7, -1.0),
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 2.0),
            )
            .unwrap(),
        );
        let near = sim.add_obstacle(
            QuadWall::new(
                Vec3::new(-1.0, 0.9, -1.0),
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 2.0),
            )
            .unwrap(),
        );
        sim.add_particle(Vec3::new(0.0, 1.0, 0.0));

        sim.compute_neighbors();
        let collision = sim.particles.at(0).collision().unwrap();
        assert_eq!(collision.obstacle, near);
        assert!((collision.distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn two_d_mode_pins_particles_to_the_plane() {
        let cfg = SimConfig {
            two_d: true,
            ..Default::default()
        };
        let mut sim = Simulation::new(cfg).unwrap();
        let a = sim.add_particle_with_velocity(Vec3::new(0.5, 1.0, 0.7), Vec3::new(0.0, 0.0, 2.0));
        let p = sim.particles().get(a).unwrap();
        assert_eq!(p.position.z, 0.0);
        assert_eq!(p.velocity.z, 0.0);
    }

    #[test]
    fn density_is_stored_on_particles_after_a_step() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        sim.add_particle(Vec3::new(0.0, 1.0, 0.0));
        sim.add_particle(Vec3::new(0.2, 1.0, 0.0));
        sim.step(0.01);

        for p in sim.particles().iter() {
            assert!(p.density > 0.0, "neighboring particles must see density");
        }
    }

    #[test]
    fn spring_query_on_unconnected_pair_errors() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let a = sim.add_particle(Vec3::ZERO);
        let b = sim.add_particle(Vec3::new(3.0, 1.0, 0.0));
        assert_eq!(
            sim.spring_between(a, b).unwrap_err(),
            SimError::SpringNotFound(a, b)
        );
    }
}
