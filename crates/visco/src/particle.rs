//! Particles and the arena that owns them.
//!
//! Particles are addressed by stable [`ParticleId`] handles from a
//! monotonically increasing allocator; ids are never reused while the
//! simulation lives. Storage is a dense vector plus an id-to-slot map, so
//! iteration stays cache-friendly and removal is O(1) swap-remove.

use std::fmt;

use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::error::SimError;
use crate::obstacle::Collision;

/// Stable handle to a particle. Never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticleId(pub u32);

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point mass of the fluid.
///
/// `density`, `neighbors` and `collision` are rebuilt by the neighbor pass
/// at the start of every step and are stale outside of it.
#[derive(Debug)]
pub struct Particle {
    /// Stable identity.
    pub id: ParticleId,
    /// Current position.
    pub position: Vec3,
    /// Position at the start of the current step's move pass. Velocity is
    /// reconstructed from the delta, and collision response decomposes it.
    pub prev_position: Vec3,
    /// Current velocity.
    pub velocity: Vec3,
    /// Local density from the most recent relaxation pass.
    pub density: f32,
    /// Arena slots of this step's neighbors (distance < h, self excluded).
    pub(crate) neighbors: Vec<u32>,
    /// Nearest obstacle within h this step, if any.
    pub(crate) collision: Option<Collision>,
    /// Ids of particles this one shares a spring with.
    pub(crate) spring_partners: Vec<ParticleId>,
}

impl Particle {
    /// Nearest-obstacle record computed by the latest neighbor pass.
    pub fn collision(&self) -> Option<&Collision> {
        self.collision.as_ref()
    }

    /// Number of neighbors found by the latest neighbor pass.
    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }
}

/// Arena of live particles with stable-id lookup.
#[derive(Default)]
pub struct Particles {
    list: Vec<Particle>,
    slots: FxHashMap<ParticleId, usize>,
    next_id: u32,
}

impl Particles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Allocate the next id and insert a particle.
    pub fn spawn(&mut self, position: Vec3, velocity: Vec3) -> ParticleId {
        let id = ParticleId(self.next_id);
        self.next_id += 1;
        self.slots.insert(id, self.list.len());
        self.list.push(Particle {
            id,
            position,
            prev_position: position,
            velocity,
            density: 0.0,
            neighbors: Vec::new(),
            collision: None,
            spring_partners: Vec::new(),
        });
        id
    }

    /// Remove a particle by id, returning it.
    pub fn remove(&mut self, id: ParticleId) -> Result<Particle, SimError> {
        let slot = self
            .slots
            .remove(&id)
            .ok_or(SimError::ParticleNotFound(id))?;
        let particle = self.list.swap_remove(slot);
        if slot < self.list.len() {
            let moved = self.list[slot].id;
            self.slots.insert(moved, slot);
        }
        Ok(particle)
    }

    pub fn get(&self, id: ParticleId) -> Option<&Particle> {
        self.slots.get(&id).map(|&slot| &self.list[slot])
    }

    pub fn get_mut(&mut self, id: ParticleId) -> Option<&mut Particle> {
        let slot = *self.slots.get(&id)?;
        Some(&mut self.list[slot])
    }

    /// Current arena slot of a live particle. Slots are stable within a
    /// step but shift on removal.
    pub fn slot_of(&self, id: ParticleId) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    pub(crate) fn at(&self, slot: usize) -> &Particle {
        &self.list[slot]
    }

    pub(crate) fn at_mut(&mut self, slot: usize) -> &mut Particle {
        &mut self.list[slot]
    }

    /// Disjoint mutable access to two distinct slots.
    pub(crate) fn pair_mut(&mut self, i: usize, j: usize) -> (&mut Particle, &mut Particle) {
        debug_assert_ne!(i, j, "pair_mut needs two distinct slots");
        if i < j {
            let (head, tail) = self.list.split_at_mut(j);
            (&mut head[i], &mut tail[0])
        } else {
            let (head, tail) = self.list.split_at_mut(i);
            (&mut tail[0], &mut head[j])
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.list.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Particle> {
        self.list.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_across_removal() {
        let mut particles = Particles::new();
        let a = particles.spawn(Vec3::ZERO, Vec3::ZERO);
        let b = particles.spawn(Vec3::X, Vec3::ZERO);
        let c = particles.spawn(Vec3::Y, Vec3::ZERO);

        particles.remove(a).unwrap();

        // b and c survive at their old ids even though slots shifted.
        assert_eq!(particles.get(b).unwrap().position, Vec3::X);
        assert_eq!(particles.get(c).unwrap().position, Vec3::Y);
        assert!(particles.get(a).is_none());

        // The freed id is never handed out again.
        let d = particles.spawn(Vec3::Z, Vec3::ZERO);
        assert!(d > c);
    }

    #[test]
    fn removing_a_dead_handle_is_an_error() {
        let mut particles = Particles::new();
        let a = particles.spawn(Vec3::ZERO, Vec3::ZERO);
        particles.remove(a).unwrap();
        assert_eq!(
            particles.remove(a).unwrap_err(),
            SimError::ParticleNotFound(a)
        );
    }

    #[test]
    fn pair_mut_returns_both_orders() {
        let mut particles = Particles::new();
        particles.spawn(Vec3::ZERO, Vec3::ZERO);
        particles.spawn(Vec3::X, Vec3::ZERO);

        let (p0, p1) = particles.pair_mut(0, 1);
        assert_eq!(p0.position, Vec3::ZERO);
        assert_eq!(p1.position, Vec3::X);

        let (p1, p0) = particles.pair_mut(1, 0);
        assert_eq!(p1.position, Vec3::X);
        assert_eq!(p0.position, Vec3::ZERO);
    }
}
