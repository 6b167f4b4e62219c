//! Core types shared across the playground simulation workspace.
//!
//! A [`Playground`] is an embeddable, step-driven 2D world populated with
//! agents and interactive entities. Solid collision response runs against
//! every entity's visible shape, while a second set of inflated, non-solid
//! trigger shapes detects proximity and routes overlaps through the
//! [`CollisionRegistry`] into entity-specific effects: eating, activation,
//! grasping, dispensing, coin deposits, and zone rewards.

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use thiserror::Error;

pub mod body;
pub mod dispatch;
pub mod engine;
pub mod entity;

pub use body::{Body, Contact, PhysicalShape, overlap};
pub use dispatch::{CollisionRegistry, ContactHandler, OverlapTracker, TriggerPhase};
pub use engine::{
    Agent, AgentActions, AgentObservations, AgentSpec, Field, Playground, StepEvents, StepSummary,
};
pub use entity::{DoorRetrigger, EatOutcome, Entity, EntityKind, EntitySpec, build_entity};
pub use playground_geom::{
    AreaShape, CoordinateSampler, Pose, PositionSource, SamplingError, Trajectory, TrajectoryShape,
    Vec2,
};
pub use playground_sense::{
    AnchorPose, Observation, PolarView, RasterError, SceneRaster, SensorSpec,
};

new_key_type! {
    /// Stable handle for entities backed by a generational slot map.
    pub struct EntityId;

    /// Stable handle for agents backed by a generational slot map.
    pub struct AgentId;
}

/// Default number of physics sub-steps advanced per external step.
pub const SIMULATION_SUBSTEPS: u32 = 4;
/// Default per-substep velocity damping applied by the integrator.
pub const SPACE_DAMPING: f32 = 0.9;

/// Collision-type tags used purely for dispatch, never for material
/// properties. Producing and consuming code must use these consistently;
/// the set is closed so the dispatch table can be matched statically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollisionType {
    /// An agent's solid body and its action trigger.
    Agent,
    /// Plain solid contact without any interactive behaviour.
    Contact,
    /// Trigger of an activable entity (door, dispenser, distractor, vending machine).
    Interactive,
    /// Trigger of an edible entity.
    Edible,
    /// Grasp trigger of a carryable entity.
    Graspable,
    /// Non-solid reward or termination zone.
    Zone,
    /// Trigger of a gem-like collectible (coins).
    Gem,
}

/// High level simulation clock (steps processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Errors raised while constructing playgrounds or entities from bad
/// configuration. These fail fast and are never recovered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The entity factory was handed a tag outside the closed type set.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),
    /// A kind-specific parameter required by the tag was absent.
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),
    /// A configuration value outside its legal range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Handlers cannot be registered once the registry is frozen.
    #[error("collision registry is frozen")]
    RegistryFrozen,
}

/// Errors raised by unsupported or degenerate geometry. Construction-time
/// checks, not runtime-recoverable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    /// Shape parameters that cannot produce a valid collider.
    #[error("degenerate shape: {0}")]
    DegenerateShape(&'static str),
    /// Movable bodies need positive mass for the integrator.
    #[error("movable body must have positive mass")]
    ZeroMassMovable,
}

/// Umbrella error for playground operations.
#[derive(Debug, Error)]
pub enum PlaygroundError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Index(#[from] playground_index::IndexError),
}

/// Static configuration for a playground instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaygroundConfig {
    /// Width of the playground in world units.
    pub width: f32,
    /// Height of the playground in world units.
    pub height: f32,
    /// Physics sub-steps advanced per external step.
    pub substeps: u32,
    /// Per-substep velocity damping factor in `[0, 1]`.
    pub damping: f32,
    /// Cell size of the broad-phase uniform grid.
    pub cell_size: f32,
    /// Velocity gained per step by an agent holding a full longitudinal action.
    pub agent_impulse: f32,
    /// Angular velocity of an agent holding a full rotation action.
    pub agent_turn_rate: f32,
    /// Steps after which the run signals termination; `None` runs forever.
    pub time_limit: Option<u64>,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Policy applied when an open door is re-triggered.
    pub door_retrigger: DoorRetrigger,
    /// Maximum number of recent step summaries retained in memory.
    pub history_capacity: usize,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            width: 200.0,
            height: 200.0,
            substeps: SIMULATION_SUBSTEPS,
            damping: SPACE_DAMPING,
            cell_size: 20.0,
            agent_impulse: 10.0,
            agent_turn_rate: 1.0,
            time_limit: None,
            rng_seed: None,
            door_retrigger: DoorRetrigger::Restart,
            history_capacity: 256,
        }
    }
}

impl PlaygroundConfig {
    /// Validates the configuration.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(ConfigError::InvalidConfig(
                "playground dimensions must be positive",
            ));
        }
        if self.substeps == 0 {
            return Err(ConfigError::InvalidConfig("substeps must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(ConfigError::InvalidConfig("damping must be in [0, 1]"));
        }
        if self.cell_size <= 0.0 {
            return Err(ConfigError::InvalidConfig("cell_size must be positive"));
        }
        if self.agent_impulse < 0.0 || self.agent_turn_rate < 0.0 {
            return Err(ConfigError::InvalidConfig(
                "agent motion constants must be non-negative",
            ));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy if no seed is set.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PlaygroundConfig::default().validate().is_ok());
    }

    #[test]
    fn config_rejects_illegal_values() {
        let bad_dims = PlaygroundConfig {
            width: 0.0,
            ..PlaygroundConfig::default()
        };
        assert!(bad_dims.validate().is_err());

        let bad_substeps = PlaygroundConfig {
            substeps: 0,
            ..PlaygroundConfig::default()
        };
        assert!(bad_substeps.validate().is_err());

        let bad_damping = PlaygroundConfig {
            damping: 1.5,
            ..PlaygroundConfig::default()
        };
        assert!(bad_damping.validate().is_err());
    }

    #[test]
    fn tick_advances_sequentially() {
        let tick = Tick::zero();
        assert_eq!(tick.next(), Tick(1));
        assert_eq!(tick.next().next(), Tick(2));
    }
}
