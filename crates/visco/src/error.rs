//! Error types for the simulation core.
//!
//! Nothing here is retried internally; every pass of a step runs exactly
//! once, so callers can rely on these signals reflecting accurate state.

use thiserror::Error;

use crate::particle::ParticleId;

/// Errors surfaced by the simulation core.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// A tunable was rejected at configuration time.
    #[error("invalid configuration: {what}")]
    InvalidConfig { what: &'static str },

    /// Lookup or removal of a particle handle that is not live.
    #[error("no live particle with id {0}")]
    ParticleNotFound(ParticleId),

    /// Spring query on a pair that has no spring between it.
    #[error("no spring between particles {0} and {1}")]
    SpringNotFound(ParticleId, ParticleId),

    /// Spatial-index operation on an object that was never registered.
    #[error("object is not registered in the spatial index")]
    NotIndexed,
}
