//! Simulation tunables.
//!
//! All constants live in one explicit [`SimConfig`] passed to
//! [`Simulation::new`](crate::Simulation::new), so independent simulations
//! with different constants can coexist in one process. Mutating the config
//! between steps is legal; each pass reads the current value. The one
//! exception is `grid_cell`, which sizes the spatial index at construction
//! and is not consulted afterwards.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::serde_util;

/// Tunable constants for one simulation instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    /// Downward gravitational acceleration, applied as `v.y -= dt * gravity`.
    pub gravity: f32,
    /// Smoothing radius: the maximum distance at which two particles
    /// influence each other.
    pub h: f32,
    /// Bucket edge length for the spatial index. Fixed at construction.
    /// A good choice is `2.0 * h`, matching the neighbor-query box.
    pub grid_cell: f32,
    /// Rest density the relaxation pass pushes local density toward.
    pub rest_density: f32,
    /// Pressure stiffness `k`.
    pub stiffness: f32,
    /// Near-pressure stiffness `k_near` (anti-clustering term).
    pub stiffness_near: f32,
    /// Linear viscosity coefficient.
    pub sigma: f32,
    /// Quadratic viscosity coefficient.
    pub beta: f32,

    /// Enables the elastic-spring passes (spring creation, plastic rest
    /// length drift, spring displacement corrections).
    pub plasticity: bool,
    /// Spring stiffness for the displacement correction.
    pub spring_k: f32,
    /// Yield ratio: the rest length may deviate by `yield_ratio * rest`
    /// before plastic flow starts.
    pub yield_ratio: f32,
    /// Rate of plastic rest-length drift once past the yield band.
    pub plasticity_rate: f32,

    /// Tangential friction against surfaces, in `[0, 1]`.
    /// 0 is frictionless slip, 1 is no slip.
    pub friction: f32,
    /// Lower corner of the wall/ground bounds. The ground plane is
    /// `y = bounds_min.y`.
    #[serde(with = "serde_util::vec3")]
    pub bounds_min: Vec3,
    /// Upper corner of the wall bounds.
    #[serde(with = "serde_util::vec3")]
    pub bounds_max: Vec3,

    /// Enables the experimental surface-adhesion impulse. The scheme is
    /// preserved from the reference algorithm but has not been validated;
    /// leave off unless experimenting.
    pub stickiness: bool,
    /// Adhesion strength.
    pub stick_k: f32,
    /// Distance below which adhesion acts.
    pub stick_distance: f32,

    /// Restricts the simulation to the XY plane: spawned particles get
    /// `z = 0` and neighbor queries scan a square rather than a cube.
    pub two_d: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            h: 0.5,
            grid_cell: 1.0,
            rest_density: 4.0,
            stiffness: 0.5,
            stiffness_near: 5.0,
            sigma: 1.0,
            beta: 2.0,
            plasticity: false,
            spring_k: 0.3,
            yield_ratio: 0.1,
            plasticity_rate: 0.3,
            friction: 0.2,
            bounds_min: Vec3::new(-5.0, 0.0, -5.0),
            bounds_max: Vec3::new(5.0, 10.0, 5.0),
            stickiness: false,
            stick_k: 1.0,
            stick_distance: 0.25,
            two_d: false,
        }
    }
}

impl SimConfig {
    /// Check the configuration for values the pipeline cannot run with.
    ///
    /// Called by [`Simulation::new`](crate::Simulation::new); invalid
    /// tunables are rejected here rather than silently tolerated mid-step.
    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.h > 0.0 && self.h.is_finite()) {
            return Err(SimError::InvalidConfig {
                what: "smoothing radius h must be positive and finite",
            });
        }
        if !(self.grid_cell > 0.0 && self.grid_cell.is_finite()) {
            return Err(SimError::InvalidConfig {
                what: "grid_cell must be positive and finite",
            });
        }
        if self.rest_density < 0.0 {
            return Err(SimError::InvalidConfig {
                what: "rest_density must not be negative",
            });
        }
        if !(0.0..=1.0).contains(&self.friction) {
            return Err(SimError::InvalidConfig {
                what: "friction must lie in [0, 1]",
            });
        }
        if self.yield_ratio < 0.0 || self.plasticity_rate < 0.0 {
            return Err(SimError::InvalidConfig {
                what: "plasticity constants must not be negative",
            });
        }
        if self.bounds_min.x >= self.bounds_max.x
            || self.bounds_min.y >= self.bounds_max.y
            || self.bounds_min.z >= self.bounds_max.z
        {
            return Err(SimError::InvalidConfig {
                what: "bounds_min must be strictly below bounds_max on every axis",
            });
        }
        Ok(())
    }
}
