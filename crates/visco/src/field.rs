//! Scalar-field sampling over the particle set.
//!
//! Renderers drawing an implicit surface (metaballs, marching cubes) need
//! the density field and its direction of steepest falloff at arbitrary
//! points, not just at particle centers. Both helpers run one spatial-index
//! query, so sampling stays O(k) in the local particle count.

use glam::Vec3;

use crate::{SpatialItem, Simulation};

impl Simulation {
    /// Kernel density of the particle field at an arbitrary point:
    /// the sum of `(1 - r/h)^2` over particles within the smoothing radius.
    ///
    /// Zero in empty space; rises toward
    /// [`rest_density`](crate::SimConfig::rest_density) inside the fluid.
    pub fn density_at(&self, point: Vec3) -> f32 {
        let h = self.config.h;
        let mut found = Vec::new();
        if self.config.two_d {
            self.index.query_box_xy(point, h, &mut found);
        } else {
            self.index.query_box(point, h, &mut found);
        }

        let mut density = 0.0;
        for item in found {
            let SpatialItem::Particle(id) = item else {
                continue;
            };
            let Some(p) = self.particles.get(id) else {
                continue;
            };
            let r = p.position.distance(point);
            if r < h {
                let one_q = 1.0 - r / h;
                density += one_q * one_q;
            }
        }
        density
    }

    /// Unit direction of steepest density falloff at a point: the outward
    /// normal of an iso-surface through that point. Returns `Vec3::ZERO`
    /// where the field is flat (no particles in range, or a point of
    /// symmetry).
    pub fn field_normal_at(&self, point: Vec3) -> Vec3 {
        let h = self.config.h;
        let mut found = Vec::new();
        if self.config.two_d {
            self.index.query_box_xy(point, h, &mut found);
        } else {
            self.index.query_box(point, h, &mut found);
        }

        let mut gradient = Vec3::ZERO;
        for item in found {
            let SpatialItem::Particle(id) = item else {
                continue;
            };
            let Some(p) = self.particles.get(id) else {
                continue;
            };
            let r = point - p.position;
            let r_len = r.length();
            if r_len < 1e-6 || r_len >= h {
                continue;
            }
            // Derivative of (1 - r/h)^2 points away from the particle.
            gradient += r * ((1.0 - r_len / h) / r_len);
        }
        gradient.normalize_or_zero()
    }
}
