//! The flattened entity model and its interactive state machines.
//!
//! Every simulated object is one [`Entity`]: a body, a solid visible shape,
//! optional inflated trigger shapes, and an [`EntityKind`] payload carrying
//! the variant-specific state. Variant behaviour is expressed as methods
//! matching on the kind tag rather than virtual dispatch.

use playground_geom::{CoordinateSampler, Pose, PositionSource, Vec2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::body::{Body, PhysicalShape};
use crate::{AgentId, CollisionType, ConfigError, PlaygroundError};

/// Policy applied when an open door is re-triggered.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum DoorRetrigger {
    /// Reload the close timer to `time_open`.
    #[default]
    Restart,
    /// Add another `time_open` steps to the running timer.
    Extend,
}

/// Result of one successful `eat` on an edible entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EatOutcome {
    /// Reward credited for this bite (the pre-shrink value).
    pub reward: f32,
    /// True once the reward decayed past the threshold; the entity is
    /// removed from the playground.
    pub depleted: bool,
}

/// Shrink-on-eat reward state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdibleState {
    pub initial_reward: f32,
    pub min_reward: f32,
    pub shrink_ratio: f32,
    pub reward: f32,
    initial_shape: PhysicalShape,
    initial_mass: f32,
}

/// Bounded production state of a dispenser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispenserState {
    template: Box<EntitySpec>,
    area: CoordinateSampler,
    limit: u32,
    remaining: u32,
}

impl DispenserState {
    /// Productions left before exhaustion.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }
}

/// Timed-gate state of a door. `countdown` is `None` while closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoorState {
    time_open: u32,
    countdown: Option<u32>,
}

impl DoorState {
    /// Steps remaining before the door closes again, when open.
    #[must_use]
    pub const fn countdown(&self) -> Option<u32> {
        self.countdown
    }
}

/// Collectible gem carrying a deposit reward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CoinState {
    pub reward: f32,
}

/// Receiver that consumes deposited coins.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VendingState {
    pub deposits: u32,
}

/// Non-solid reward or termination region.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ZoneState {
    pub reward_per_step: f32,
    pub terminates: bool,
}

/// Variant payload of an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EntityKind {
    /// Solid, inert obstacle (also the base for plain graspable objects).
    Obstacle,
    /// Interactive but purely cosmetic: activation recolors it.
    Distractor,
    Edible(EdibleState),
    Dispenser(DispenserState),
    Door(DoorState),
    Coin(CoinState),
    VendingMachine(VendingState),
    Zone(ZoneState),
}

/// Local attachment frame of a grasped entity relative to its holder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HoldOffset {
    pub local: Vec2,
    pub angle: f32,
}

/// Factory parameter record describing a to-be-instantiated entity.
///
/// Kind-specific fields are optional; the factory fails with
/// [`ConfigError::MissingParameter`] when a tag requires one that is absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitySpec {
    /// Type tag consumed by [`build_entity`].
    pub entity_type: String,
    /// Where the entity is placed (literal pose, area sampler, or trajectory).
    pub position: PositionSource,
    /// Solid visible shape.
    pub shape: PhysicalShape,
    /// Mass of the body; `None` creates an immovable entity.
    pub mass: Option<f32>,
    /// Margin added to the visible shape for the trigger shapes.
    pub interaction_range: f32,
    /// Whether a grasp trigger shape is created.
    pub graspable: bool,
    /// Rendering color handed through to external renderers.
    pub color: [f32; 3],
    pub initial_reward: Option<f32>,
    pub min_reward: Option<f32>,
    pub shrink_ratio: Option<f32>,
    pub time_open: Option<u32>,
    pub limit: Option<u32>,
    pub production_area: Option<CoordinateSampler>,
    pub produced: Option<Box<EntitySpec>>,
    pub reward_per_step: Option<f32>,
    pub terminates: Option<bool>,
}

impl EntitySpec {
    /// A bare spec with the given tag, position, and shape.
    #[must_use]
    pub fn new(
        entity_type: impl Into<String>,
        position: impl Into<PositionSource>,
        shape: PhysicalShape,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            position: position.into(),
            shape,
            mass: None,
            interaction_range: 5.0,
            graspable: false,
            color: [0.5, 0.5, 0.5],
            initial_reward: None,
            min_reward: None,
            shrink_ratio: None,
            time_open: None,
            limit: None,
            production_area: None,
            produced: None,
            reward_per_step: None,
            terminates: None,
        }
    }

    /// Builder: set the body mass (making the entity movable).
    #[must_use]
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    /// Builder: set the trigger inflation margin.
    #[must_use]
    pub fn with_interaction_range(mut self, range: f32) -> Self {
        self.interaction_range = range;
        self
    }

    /// Builder: add a grasp trigger shape.
    #[must_use]
    pub fn graspable(mut self) -> Self {
        self.graspable = true;
        self
    }

    /// Builder: set the rendering color.
    #[must_use]
    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    /// Positive-reward edible preset: green circle, reward 30 decaying by
    /// 0.9 per bite down to 5.
    #[must_use]
    pub fn apple(position: impl Into<PositionSource>) -> Self {
        let mut spec = Self::new("edible", position, PhysicalShape::Circle { radius: 10.0 });
        spec.mass = Some(1.0);
        spec.color = [0.1, 0.8, 0.2];
        spec.initial_reward = Some(30.0);
        spec.min_reward = Some(5.0);
        spec.shrink_ratio = Some(0.9);
        spec
    }

    /// Negative-reward edible preset: brown circle, reward -30 decaying by
    /// 0.9 per bite up to -5.
    #[must_use]
    pub fn rotten_apple(position: impl Into<PositionSource>) -> Self {
        let mut spec = Self::apple(position);
        spec.color = [0.45, 0.3, 0.1];
        spec.initial_reward = Some(-30.0);
        spec.min_reward = Some(-5.0);
        spec
    }

    /// Graspable coin worth `reward` when deposited in a vending machine.
    #[must_use]
    pub fn coin(position: impl Into<PositionSource>, reward: f32) -> Self {
        let mut spec = Self::new("coin", position, PhysicalShape::Circle { radius: 5.0 });
        spec.mass = Some(0.5);
        spec.graspable = true;
        spec.color = [0.9, 0.8, 0.1];
        spec.initial_reward = Some(reward);
        spec
    }

    /// Vending machine consuming deposited coins.
    #[must_use]
    pub fn vending_machine(position: impl Into<PositionSource>) -> Self {
        let mut spec = Self::new(
            "vending_machine",
            position,
            PhysicalShape::Rectangle {
                width: 20.0,
                length: 20.0,
            },
        );
        spec.color = [0.2, 0.3, 0.9];
        spec
    }

    /// Timed door preset.
    #[must_use]
    pub fn door(
        position: impl Into<PositionSource>,
        shape: PhysicalShape,
        time_open: u32,
    ) -> Self {
        let mut spec = Self::new("door", position, shape);
        spec.time_open = Some(time_open);
        spec.color = [0.6, 0.4, 0.2];
        spec
    }

    /// Dispenser preset producing `produced` within `area`, at most `limit` times.
    #[must_use]
    pub fn dispenser(
        position: impl Into<PositionSource>,
        produced: EntitySpec,
        area: CoordinateSampler,
        limit: u32,
    ) -> Self {
        let mut spec = Self::new(
            "dispenser",
            position,
            PhysicalShape::Circle { radius: 10.0 },
        );
        spec.produced = Some(Box::new(produced));
        spec.production_area = Some(area);
        spec.limit = Some(limit);
        spec.color = [0.7, 0.2, 0.7];
        spec
    }

    /// Non-solid zone preset crediting `reward_per_step` to overlapping agents.
    #[must_use]
    pub fn zone(
        position: impl Into<PositionSource>,
        shape: PhysicalShape,
        reward_per_step: f32,
        terminates: bool,
    ) -> Self {
        let mut spec = Self::new("zone", position, shape);
        spec.reward_per_step = Some(reward_per_step);
        spec.terminates = Some(terminates);
        spec
    }
}

/// A simulated object: body, dual shapes, and variant payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub name: String,
    pub body: Body,
    pub shape: PhysicalShape,
    pub interaction_range: f32,
    pub color: [f32; 3],
    pub graspable: bool,
    pub kind: EntityKind,
    held_by: Option<AgentId>,
    hold_offset: Option<HoldOffset>,
    interaction_shape: Option<PhysicalShape>,
    grasp_shape: Option<PhysicalShape>,
    position_source: PositionSource,
}

/// Instantiate an entity from its type tag and parameter record.
///
/// The tag set is closed; anything outside it fails with
/// [`ConfigError::UnknownEntityType`]. `pose` is the already-resolved
/// placement (the caller queries the spec's position source).
pub fn build_entity(spec: &EntitySpec, pose: Pose) -> Result<Entity, PlaygroundError> {
    spec.shape.validate()?;

    let require_f32 = |value: Option<f32>, name: &'static str| {
        value.ok_or(ConfigError::MissingParameter(name))
    };

    let kind = match spec.entity_type.as_str() {
        "obstacle" | "graspable" => EntityKind::Obstacle,
        "distractor" => EntityKind::Distractor,
        "edible" | "apple" | "rotten_apple" => {
            let initial_reward = require_f32(spec.initial_reward, "initial_reward")?;
            let min_reward = require_f32(spec.min_reward, "min_reward")?;
            let shrink_ratio = require_f32(spec.shrink_ratio, "shrink_ratio")?;
            if !(shrink_ratio > 0.0 && shrink_ratio < 1.0) {
                return Err(ConfigError::InvalidConfig("shrink_ratio must be in (0, 1)").into());
            }
            EntityKind::Edible(EdibleState {
                initial_reward,
                min_reward,
                shrink_ratio,
                reward: initial_reward,
                initial_shape: spec.shape.clone(),
                initial_mass: spec.mass.unwrap_or(0.0),
            })
        }
        "dispenser" => {
            let template = spec
                .produced
                .clone()
                .ok_or(ConfigError::MissingParameter("produced"))?;
            let area = spec
                .production_area
                .clone()
                .ok_or(ConfigError::MissingParameter("production_area"))?;
            let limit = spec.limit.ok_or(ConfigError::MissingParameter("limit"))?;
            EntityKind::Dispenser(DispenserState {
                template,
                area,
                limit,
                remaining: limit,
            })
        }
        "door" => {
            let time_open = spec
                .time_open
                .ok_or(ConfigError::MissingParameter("time_open"))?;
            if time_open == 0 {
                return Err(ConfigError::InvalidConfig("time_open must be non-zero").into());
            }
            EntityKind::Door(DoorState {
                time_open,
                countdown: None,
            })
        }
        "coin" => EntityKind::Coin(CoinState {
            reward: require_f32(spec.initial_reward, "initial_reward")?,
        }),
        "vending_machine" => EntityKind::VendingMachine(VendingState::default()),
        "zone" => EntityKind::Zone(ZoneState {
            reward_per_step: require_f32(spec.reward_per_step, "reward_per_step")?,
            terminates: spec.terminates.unwrap_or(false),
        }),
        other => return Err(ConfigError::UnknownEntityType(other.to_owned()).into()),
    };

    let body = match spec.mass {
        Some(mass) => Body::movable(pose, mass, &spec.shape)?,
        None => Body::fixed(pose),
    };

    let mut entity = Entity {
        name: spec.entity_type.clone(),
        body,
        shape: spec.shape.clone(),
        interaction_range: spec.interaction_range,
        color: spec.color,
        graspable: spec.graspable,
        kind,
        held_by: None,
        hold_offset: None,
        interaction_shape: None,
        grasp_shape: None,
        position_source: spec.position.clone(),
    };
    entity.rebuild_shapes_and_body();
    Ok(entity)
}

impl Entity {
    /// Collision tag of the interaction trigger shape, if the entity has one.
    #[must_use]
    pub const fn trigger_tag(&self) -> Option<CollisionType> {
        match self.kind {
            EntityKind::Obstacle => None,
            EntityKind::Distractor
            | EntityKind::Dispenser(_)
            | EntityKind::Door(_)
            | EntityKind::VendingMachine(_) => Some(CollisionType::Interactive),
            EntityKind::Edible(_) => Some(CollisionType::Edible),
            EntityKind::Coin(_) => Some(CollisionType::Gem),
            EntityKind::Zone(_) => Some(CollisionType::Zone),
        }
    }

    /// Whether any trigger shape exists.
    #[must_use]
    pub const fn is_interactive(&self) -> bool {
        self.trigger_tag().is_some() || self.graspable
    }

    /// The inflated interaction trigger shape, when the entity is interactive.
    #[must_use]
    pub fn interaction_shape(&self) -> Option<&PhysicalShape> {
        self.interaction_shape.as_ref()
    }

    /// The grasp trigger shape, when the entity is graspable.
    #[must_use]
    pub fn grasp_shape(&self) -> Option<&PhysicalShape> {
        self.grasp_shape.as_ref()
    }

    /// The position source the entity was placed with.
    #[must_use]
    pub fn position_source(&self) -> &PositionSource {
        &self.position_source
    }

    /// Mutable access to the position source (trajectory advancement).
    pub fn position_source_mut(&mut self) -> &mut PositionSource {
        &mut self.position_source
    }

    /// Recompute derived shapes and the body's moment from current scalar
    /// state. Called after any mutation of `shape`, `interaction_range`, or
    /// the body mass; never reconstructs the entity in place.
    pub fn rebuild_shapes_and_body(&mut self) {
        self.interaction_shape = if self.trigger_tag().is_some() {
            Some(self.shape.inflated(self.interaction_range))
        } else {
            None
        };
        self.grasp_shape = if self.graspable {
            Some(self.shape.inflated(self.interaction_range))
        } else {
            None
        };
        let shape = self.shape.clone();
        self.body.refresh_moment(&shape);
    }

    /// Whether the visible shape currently takes part in solid collision.
    ///
    /// Open doors, held entities, and zones are excluded.
    #[must_use]
    pub fn is_solid(&self) -> bool {
        if self.held_by.is_some() {
            return false;
        }
        match &self.kind {
            EntityKind::Door(door) => door.countdown.is_none(),
            EntityKind::Zone(_) => false,
            _ => true,
        }
    }

    /// Whether the door gate is currently open. False for non-doors.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(
            &self.kind,
            EntityKind::Door(DoorState {
                countdown: Some(_),
                ..
            })
        )
    }

    /// Consume one bite of an edible: multiply reward, mass, and extents by
    /// the shrink ratio, preserving pose exactly, then rebuild derived state.
    ///
    /// Returns `None` for non-edible entities.
    pub fn eat(&mut self) -> Option<EatOutcome> {
        let EntityKind::Edible(state) = &mut self.kind else {
            return None;
        };
        let reward = state.reward;
        state.reward *= state.shrink_ratio;
        let ratio = state.shrink_ratio;
        if self.body.is_dynamic() {
            self.body.mass *= ratio;
        }
        self.shape = self.shape.scaled(ratio);

        let depleted = if state.initial_reward > 0.0 && state.reward > state.min_reward {
            false
        } else {
            !(state.initial_reward < 0.0 && state.reward < state.min_reward)
        };
        self.rebuild_shapes_and_body();
        Some(EatOutcome { reward, depleted })
    }

    /// Open the door or reload/extend its timer per the configured policy.
    ///
    /// Returns false for non-doors.
    pub fn actionate_door(&mut self, policy: DoorRetrigger) -> bool {
        let EntityKind::Door(door) = &mut self.kind else {
            return false;
        };
        door.countdown = Some(match (door.countdown, policy) {
            (None, _) | (Some(_), DoorRetrigger::Restart) => door.time_open,
            (Some(remaining), DoorRetrigger::Extend) => remaining.saturating_add(door.time_open),
        });
        true
    }

    /// Advance the door timer by one step. Returns true when the door just
    /// closed.
    pub fn tick_door(&mut self) -> bool {
        let EntityKind::Door(door) = &mut self.kind else {
            return false;
        };
        match door.countdown {
            Some(1) => {
                door.countdown = None;
                true
            }
            Some(remaining) => {
                door.countdown = Some(remaining - 1);
                false
            }
            None => false,
        }
    }

    /// Produce one entity spec from a dispenser, sampling the production
    /// area. Returns `None` for non-dispensers and once the limit is
    /// exhausted.
    pub fn produce<R: Rng>(&mut self, rng: &mut R) -> Option<EntitySpec> {
        let EntityKind::Dispenser(state) = &mut self.kind else {
            return None;
        };
        if state.remaining == 0 {
            return None;
        }
        state.remaining -= 1;
        let pose = state
            .area
            .sample(rng)
            .unwrap_or_else(|_| state.area.center_pose(rng));
        let mut spec = (*state.template).clone();
        spec.position = PositionSource::Fixed(pose);
        Some(spec)
    }

    /// Randomize the color of a distractor. Returns false for other kinds.
    pub fn actionate_distractor<R: Rng>(&mut self, rng: &mut R) -> bool {
        if !matches!(self.kind, EntityKind::Distractor) {
            return false;
        }
        self.color = [rng.random(), rng.random(), rng.random()];
        true
    }

    /// Attach the entity to a holder's carrying frame.
    pub(crate) fn grasp(&mut self, holder: AgentId, offset: HoldOffset) {
        self.held_by = Some(holder);
        self.hold_offset = Some(offset);
        self.body.halt();
    }

    /// Detach from the holder, reverting to free physics.
    pub(crate) fn release(&mut self) -> Option<AgentId> {
        self.hold_offset = None;
        self.held_by.take()
    }

    /// Current holder, if grasped.
    #[must_use]
    pub const fn held_by(&self) -> Option<AgentId> {
        self.held_by
    }

    /// Slave the pose to the holder's body.
    pub(crate) fn follow_holder(&mut self, holder_pose: Pose) {
        if let Some(offset) = self.hold_offset {
            self.body.set_pose(Pose {
                position: holder_pose.position + offset.local.rotated(holder_pose.angle),
                angle: holder_pose.angle + offset.angle,
            });
        }
    }

    /// Restore the entity's variant state to its construction-time values.
    ///
    /// Edibles regain their initial reward, mass, and size regardless of how
    /// many times they were eaten; doors close; dispensers refill.
    pub fn reset(&mut self) {
        self.release();
        match &mut self.kind {
            EntityKind::Edible(state) => {
                state.reward = state.initial_reward;
                self.shape = state.initial_shape.clone();
                if self.body.is_dynamic() {
                    self.body.mass = state.initial_mass;
                }
            }
            EntityKind::Door(door) => door.countdown = None,
            EntityKind::Dispenser(state) => state.remaining = state.limit,
            EntityKind::VendingMachine(state) => state.deposits = 0,
            _ => {}
        }
        self.body.halt();
        self.rebuild_shapes_and_body();
    }
}
