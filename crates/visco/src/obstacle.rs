//! Static collidable geometry.
//!
//! The collidable shape is a quad wall: an origin plus two spanning
//! vectors. Walls are immutable for the life of the simulation and answer
//! nearest-point/distance/normal queries against a particle position.

use std::fmt;

use glam::Vec3;

use crate::error::SimError;

/// Handle to an obstacle added to a simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObstacleId(pub u32);

impl fmt::Display for ObstacleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Nearest-obstacle record computed once per particle per step.
#[derive(Clone, Copy, Debug)]
pub struct Collision {
    /// Distance from the particle to the closest surface point.
    pub distance: f32,
    /// Closest point on the obstacle surface.
    pub point: Vec3,
    /// Surface normal, oriented toward the particle's side of the wall.
    pub normal: Vec3,
    /// Which obstacle produced this record.
    pub obstacle: ObstacleId,
}

/// A parallelogram wall spanned by two vectors from an origin corner.
#[derive(Clone, Copy, Debug)]
pub struct QuadWall {
    origin: Vec3,
    u: Vec3,
    v: Vec3,
    /// Unit plane normal, fixed at construction.
    normal: Vec3,
}

impl QuadWall {
    /// Build a wall from a corner and two spanning vectors.
    ///
    /// The spanning vectors are expected to be orthogonal (a rectangle);
    /// degenerate walls with (near-)parallel or zero-length spans are
    /// rejected.
    pub fn new(origin: Vec3, u: Vec3, v: Vec3) -> Result<Self, SimError> {
        let cross = u.cross(v);
        if cross.length_squared() < 1e-12 {
            return Err(SimError::InvalidConfig {
                what: "quad wall spanning vectors are degenerate",
            });
        }
        Ok(Self {
            origin,
            u,
            v,
            normal: cross.normalize(),
        })
    }

    /// Nearest point on the wall to `p`, with distance and the normal
    /// oriented toward `p`'s side.
    pub fn nearest(&self, p: Vec3) -> (f32, Vec3, Vec3) {
        let d = p - self.origin;
        let s = (d.dot(self.u) / self.u.length_squared()).clamp(0.0, 1.0);
        let t = (d.dot(self.v) / self.v.length_squared()).clamp(0.0, 1.0);
        let point = self.origin + self.u * s + self.v * t;

        let away = p - point;
        let distance = away.length();
        let normal = if away.dot(self.normal) < 0.0 {
            -self.normal
        } else {
            self.normal
        };
        (distance, point, normal)
    }

    /// Axis-aligned bounds of the wall, for volume registration in the
    /// spatial index.
    pub fn aabb(&self) -> (Vec3, Vec3) {
        let corners = [
            self.origin,
            self.origin + self.u,
            self.origin + self.v,
            self.origin + self.u + self.v,
        ];
        let mut min = corners[0];
        let mut max = corners[0];
        for &c in &corners[1..] {
            min = min.min(c);
            max = max.max(c);
        }
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_wall() -> QuadWall {
        // Unit square in the XZ plane at y = 0.
        QuadWall::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0))
            .unwrap()
    }

    #[test]
    fn nearest_above_the_face() {
        let wall = floor_wall();
        let (distance, point, normal) = wall.nearest(Vec3::new(0.5, 2.0, 0.5));
        assert!((distance - 2.0).abs() < 1e-6);
        assert!((point - Vec3::new(0.5, 0.0, 0.5)).length() < 1e-6);
        assert!((normal - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn normal_flips_below_the_face() {
        let wall = floor_wall();
        let (_, _, normal) = wall.nearest(Vec3::new(0.5, -1.0, 0.5));
        assert!((normal + Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn nearest_clamps_to_the_edge() {
        let wall = floor_wall();
        let (distance, point, _) = wall.nearest(Vec3::new(2.0, 1.0, 0.5));
        assert!((point - Vec3::new(1.0, 0.0, 0.5)).length() < 1e-6);
        let expected = Vec3::new(2.0, 1.0, 0.5).distance(Vec3::new(1.0, 0.0, 0.5));
        assert!((distance - expected).abs() < 1e-6);
    }

    #[test]
    fn rejects_degenerate_spans() {
        assert!(QuadWall::new(Vec3::ZERO, Vec3::X, Vec3::X * 2.0).is_err());
        assert!(QuadWall::new(Vec3::ZERO, Vec3::ZERO, Vec3::Z).is_err());
    }

    #[test]
    fn aabb_covers_all_corners() {
        let wall = QuadWall::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(-2.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 4.0),
        )
        .unwrap();
        let (min, max) = wall.aabb();
        assert_eq!(min, Vec3::new(-1.0, 2.0, 3.0));
        assert_eq!(max, Vec3::new(1.0, 2.0, 7.0));
    }
}
