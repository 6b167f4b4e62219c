//! The playground: entity and agent arenas plus the staged step engine.
//!
//! One external step runs the apply-actions → integrate (N sub-steps with
//! solid contact resolution) → trigger dispatch → timers → production →
//! cleanup cycle, then records a summary. Observations are collected
//! separately against an externally rendered scene raster.

use playground_geom::{CoordinateSampler, Pose, PositionSource, Vec2};
use playground_index::{NeighborhoodIndex, UniformGridIndex};
use playground_sense::{AnchorPose, Observation, PolarView, RasterError, SceneRaster, SensorSpec};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

use crate::body::{Body, PhysicalShape, overlap};
use crate::dispatch::{CollisionRegistry, ContactHandler, OverlapTracker, TriggerPhase};
use crate::entity::{Entity, EntityKind, EntitySpec, HoldOffset, build_entity};
use crate::{
    AgentId, CollisionType, ConfigError, EntityId, GeometryError, PlaygroundConfig,
    PlaygroundError, Tick,
};

/// Per-step control inputs of one agent. Analog controls are clamped to
/// `[-1, 1]`; the boolean intents gate the trigger handlers.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentActions {
    pub longitudinal: f32,
    pub lateral: f32,
    pub rotation: f32,
    pub eat: bool,
    pub activate: bool,
    pub grasp: bool,
}

impl AgentActions {
    fn clamped(self) -> Self {
        Self {
            longitudinal: self.longitudinal.clamp(-1.0, 1.0),
            lateral: self.lateral.clamp(-1.0, 1.0),
            rotation: self.rotation.clamp(-1.0, 1.0),
            ..self
        }
    }
}

/// Construction parameters of an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSpec {
    pub name: String,
    pub radius: f32,
    pub mass: f32,
    pub color: [f32; 3],
    /// Margin added to the body radius for the action trigger shape.
    pub interaction_range: f32,
    pub sensors: Vec<SensorSpec>,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            name: "agent".to_owned(),
            radius: 10.0,
            mass: 1.0,
            color: [0.9, 0.1, 0.1],
            interaction_range: 5.0,
            sensors: Vec::new(),
        }
    }
}

/// A simulated agent: a circular solid body, an inflated action trigger,
/// mounted sensors, and a per-step reward accumulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub body: Body,
    pub radius: f32,
    pub color: [f32; 3],
    pub interaction_range: f32,
    sensors: Vec<PolarView>,
    actions: AgentActions,
    reward: f32,
    holding: Option<EntityId>,
    initial_position: PositionSource,
}

impl Agent {
    fn from_spec(
        spec: &AgentSpec,
        pose: Pose,
        initial_position: PositionSource,
    ) -> Result<Self, GeometryError> {
        let shape = PhysicalShape::Circle { radius: spec.radius };
        shape.validate()?;
        let body = Body::movable(pose, spec.mass, &shape)?;
        Ok(Self {
            name: spec.name.clone(),
            body,
            radius: spec.radius,
            color: spec.color,
            interaction_range: spec.interaction_range,
            sensors: spec.sensors.iter().cloned().map(PolarView::new).collect(),
            actions: AgentActions::default(),
            reward: 0.0,
            holding: None,
            initial_position,
        })
    }

    /// Solid collision shape.
    #[must_use]
    pub const fn shape(&self) -> PhysicalShape {
        PhysicalShape::Circle {
            radius: self.radius,
        }
    }

    /// Non-solid action trigger shape.
    #[must_use]
    pub const fn trigger_shape(&self) -> PhysicalShape {
        PhysicalShape::Circle {
            radius: self.radius + self.interaction_range,
        }
    }

    /// Latest actions applied to this agent.
    #[must_use]
    pub const fn actions(&self) -> AgentActions {
        self.actions
    }

    /// Reward accumulated since the last step boundary.
    #[must_use]
    pub const fn pending_reward(&self) -> f32 {
        self.reward
    }

    /// Entity currently carried, if any.
    #[must_use]
    pub const fn holding(&self) -> Option<EntityId> {
        self.holding
    }

    /// Mounted sensor views.
    #[must_use]
    pub fn sensors(&self) -> &[PolarView] {
        &self.sensors
    }
}

/// Bounded spawner keeping an area populated from a template spec.
///
/// `limit` caps concurrently-alive entities, `total_limit` caps lifetime
/// production. The field only consumes the entity factory interface; the
/// produced entities are ordinary playground entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    template: EntitySpec,
    area: CoordinateSampler,
    limit: usize,
    total_limit: usize,
    produced_total: usize,
    alive: Vec<EntityId>,
}

impl Field {
    #[must_use]
    pub fn new(
        template: EntitySpec,
        area: CoordinateSampler,
        limit: usize,
        total_limit: usize,
    ) -> Self {
        Self {
            template,
            area,
            limit,
            total_limit,
            produced_total: 0,
            alive: Vec::new(),
        }
    }

    /// Entities from this field currently alive.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    /// Entities produced over the field's lifetime.
    #[must_use]
    pub const fn produced_total(&self) -> usize {
        self.produced_total
    }

    /// Move the production area.
    pub fn recenter(&mut self, center: Vec2) {
        self.area.recenter(center);
    }
}

/// Events emitted after processing one step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepEvents {
    pub tick: Tick,
    /// Reward accumulated by each agent during the step.
    pub rewards: Vec<(AgentId, f32)>,
    pub spawned: usize,
    pub removed: usize,
    pub doors_closed: usize,
    /// True once the elapsed-step counter reached the configured limit or a
    /// terminating zone fired.
    pub done: bool,
}

/// Summary retained in the in-memory history ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepSummary {
    pub tick: Tick,
    pub agent_count: usize,
    pub entity_count: usize,
    pub total_reward: f32,
}

/// Per-agent observation buffers for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentObservations {
    pub agent: AgentId,
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum OverlapKey {
    AgentEntity {
        agent: AgentId,
        entity: EntityId,
        handler: ContactHandler,
    },
    EntityEntity {
        gem: EntityId,
        receiver: EntityId,
    },
}

#[derive(Debug, Clone, Copy)]
enum SolidRef {
    Agent(AgentId),
    Entity(EntityId),
}

struct TriggerRef {
    entity: EntityId,
    shape: PhysicalShape,
    pose: Pose,
    tag: CollisionType,
}

/// An isolated simulation instance.
pub struct Playground {
    config: PlaygroundConfig,
    tick: Tick,
    done: bool,
    rng: rand::rngs::SmallRng,
    entities: SlotMap<EntityId, Entity>,
    agents: SlotMap<AgentId, Agent>,
    registry: CollisionRegistry,
    index: UniformGridIndex,
    fields: Vec<Field>,
    overlaps: OverlapTracker<OverlapKey>,
    pending_spawns: Vec<(EntitySpec, Option<usize>)>,
    pending_removals: Vec<EntityId>,
    history: VecDeque<StepSummary>,
}

impl std::fmt::Debug for Playground {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playground")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("done", &self.done)
            .field("agent_count", &self.agents.len())
            .field("entity_count", &self.entities.len())
            .finish()
    }
}

impl Playground {
    /// Instantiate a playground with the standard collision wiring.
    pub fn new(config: PlaygroundConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let index = UniformGridIndex::new(config.cell_size, config.width, config.height);
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            tick: Tick::zero(),
            done: false,
            rng,
            entities: SlotMap::with_key(),
            agents: SlotMap::with_key(),
            registry: CollisionRegistry::with_default_handlers(),
            index,
            fields: Vec::new(),
            overlaps: OverlapTracker::new(),
            pending_spawns: Vec::new(),
            pending_removals: Vec::new(),
            history: VecDeque::with_capacity(history_capacity),
        })
    }

    fn resolve_pose(rng: &mut rand::rngs::SmallRng, source: &mut PositionSource) -> Pose {
        match source.next_pose(rng) {
            Ok(pose) => pose,
            Err(err) => {
                warn!(%err, "position sampling fell back to the area center");
                source.fallback_pose(rng)
            }
        }
    }

    /// Create an entity from its spec and insert it into the simulation.
    pub fn add_entity(&mut self, spec: EntitySpec) -> Result<EntityId, PlaygroundError> {
        let mut source = spec.position.clone();
        let pose = Self::resolve_pose(&mut self.rng, &mut source);
        let mut entity = build_entity(&spec, pose)?;
        // Keep the advanced source so trajectories continue where they left off.
        *entity.position_source_mut() = source;
        Ok(self.entities.insert(entity))
    }

    /// Remove an entity, releasing any agent that carried it.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let mut entity = self.entities.remove(id)?;
        if let Some(holder) = entity.release()
            && let Some(agent) = self.agents.get_mut(holder)
        {
            agent.holding = None;
        }
        for field in &mut self.fields {
            field.alive.retain(|alive| *alive != id);
        }
        Some(entity)
    }

    /// Create an agent placed by the given position source.
    pub fn add_agent(
        &mut self,
        spec: &AgentSpec,
        position: impl Into<PositionSource>,
    ) -> Result<AgentId, PlaygroundError> {
        let mut source = position.into();
        let pose = Self::resolve_pose(&mut self.rng, &mut source);
        let agent = Agent::from_spec(spec, pose, source)?;
        Ok(self.agents.insert(agent))
    }

    /// Detach an agent from this playground, returning its full state.
    ///
    /// The carried entity, if any, is dropped back into free physics here;
    /// nothing in this playground keeps a reference to the agent afterwards.
    pub fn remove_agent(&mut self, id: AgentId) -> Option<Agent> {
        let mut agent = self.agents.remove(id)?;
        if let Some(held) = agent.holding.take()
            && let Some(entity) = self.entities.get_mut(held)
        {
            entity.release();
        }
        Some(agent)
    }

    /// Re-home an agent detached from another playground.
    ///
    /// The body is re-posed by the given source and all transient state
    /// (velocities, actions, carried entity, pending reward) is cleared.
    pub fn adopt_agent(
        &mut self,
        mut agent: Agent,
        position: impl Into<PositionSource>,
    ) -> AgentId {
        let mut source = position.into();
        let pose = Self::resolve_pose(&mut self.rng, &mut source);
        agent.body.set_pose(pose);
        agent.body.halt();
        agent.actions = AgentActions::default();
        agent.reward = 0.0;
        agent.holding = None;
        agent.initial_position = source;
        self.agents.insert(agent)
    }

    /// Attach a bounded spawner.
    pub fn add_field(&mut self, field: Field) -> usize {
        self.fields.push(field);
        self.fields.len() - 1
    }

    /// Execute one simulation step with the provided per-agent actions.
    pub fn step(&mut self, actions: &[(AgentId, AgentActions)]) -> StepEvents {
        if !self.registry.is_frozen() {
            self.registry.freeze();
        }
        let next_tick = self.tick.next();

        self.stage_apply_actions(actions);
        self.stage_path_entities();
        let dt = 1.0 / self.config.substeps as f32;
        for _ in 0..self.config.substeps {
            self.stage_integrate(dt);
            self.stage_solid_collisions();
        }
        self.stage_carried();
        self.stage_triggers();
        let doors_closed = self.stage_door_timers();
        self.stage_fields();
        let (spawned, removed) = self.stage_commit();
        let rewards = self.stage_collect_rewards();

        let summary = StepSummary {
            tick: next_tick,
            agent_count: self.agents.len(),
            entity_count: self.entities.len(),
            total_reward: rewards.iter().map(|(_, r)| r).sum(),
        };
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);

        self.tick = next_tick;
        if let Some(limit) = self.config.time_limit
            && self.tick.0 >= limit
        {
            self.done = true;
        }
        StepEvents {
            tick: self.tick,
            rewards,
            spawned,
            removed,
            doors_closed,
            done: self.done,
        }
    }

    fn stage_apply_actions(&mut self, actions: &[(AgentId, AgentActions)]) {
        for (id, act) in actions {
            if let Some(agent) = self.agents.get_mut(*id) {
                agent.actions = act.clamped();
            }
        }
        let impulse = self.config.agent_impulse;
        let turn_rate = self.config.agent_turn_rate;
        for agent in self.agents.values_mut() {
            let act = agent.actions;
            agent.body.angular_velocity = act.rotation * turn_rate;
            let (sin, cos) = agent.body.angle.sin_cos();
            let forward = Vec2::new(cos, sin);
            let strafe = Vec2::new(-sin, cos);
            agent.body.velocity =
                agent.body.velocity + (forward * act.longitudinal + strafe * act.lateral) * impulse;
        }
    }

    fn stage_path_entities(&mut self) {
        for entity in self.entities.values_mut() {
            if entity.held_by().is_some() {
                continue;
            }
            if let PositionSource::Path(trajectory) = entity.position_source_mut() {
                let pose = trajectory.advance();
                entity.body.set_pose(pose);
            }
        }
    }

    fn clamp_axis(value: f32, radius: f32, extent: f32) -> f32 {
        if 2.0 * radius >= extent {
            extent / 2.0
        } else {
            value.clamp(radius, extent - radius)
        }
    }

    fn stage_integrate(&mut self, dt: f32) {
        let damping = self.config.damping;
        let width = self.config.width;
        let height = self.config.height;

        for entity in self.entities.values_mut() {
            if entity.held_by().is_some() || entity.position_source().is_path() {
                continue;
            }
            entity.body.integrate(dt, damping);
            let radius = entity.shape.bounding_radius();
            let clamped_x = Self::clamp_axis(entity.body.position.x, radius, width);
            let clamped_y = Self::clamp_axis(entity.body.position.y, radius, height);
            if (clamped_x - entity.body.position.x).abs() > 0.0 {
                entity.body.velocity.x = 0.0;
            }
            if (clamped_y - entity.body.position.y).abs() > 0.0 {
                entity.body.velocity.y = 0.0;
            }
            entity.body.position = Vec2::new(clamped_x, clamped_y);
        }
        for agent in self.agents.values_mut() {
            agent.body.integrate(dt, damping);
            let radius = agent.radius;
            let clamped_x = Self::clamp_axis(agent.body.position.x, radius, width);
            let clamped_y = Self::clamp_axis(agent.body.position.y, radius, height);
            if (clamped_x - agent.body.position.x).abs() > 0.0 {
                agent.body.velocity.x = 0.0;
            }
            if (clamped_y - agent.body.position.y).abs() > 0.0 {
                agent.body.velocity.y = 0.0;
            }
            agent.body.position = Vec2::new(clamped_x, clamped_y);
        }
    }

    fn stage_solid_collisions(&mut self) {
        let mut solids: Vec<(SolidRef, PhysicalShape, Pose, bool, f32)> = Vec::new();
        for (id, agent) in self.agents.iter() {
            solids.push((
                SolidRef::Agent(id),
                agent.shape(),
                agent.body.pose(),
                true,
                agent.radius,
            ));
        }
        for (id, entity) in self.entities.iter() {
            if !entity.is_solid() {
                continue;
            }
            let bound = entity.shape.bounding_radius();
            solids.push((
                SolidRef::Entity(id),
                entity.shape.clone(),
                entity.body.pose(),
                entity.body.is_dynamic() && !entity.position_source().is_path(),
                bound,
            ));
        }
        if solids.len() < 2 {
            return;
        }

        let positions: Vec<(f32, f32)> = solids
            .iter()
            .map(|(_, _, pose, _, _)| (pose.position.x, pose.position.y))
            .collect();
        if self.index.rebuild(&positions).is_err() {
            return;
        }
        let max_bound = solids
            .iter()
            .map(|(_, _, _, _, bound)| *bound)
            .fold(0.0_f32, f32::max);

        let mut pairs: Vec<(usize, usize)> = Vec::new();
        for i in 0..solids.len() {
            let reach = solids[i].4 + max_bound;
            self.index
                .neighbors_within(i, reach * reach, &mut |j, _| {
                    if j > i {
                        pairs.push((i, j));
                    }
                });
        }

        let mut corrections = vec![Vec2::zero(); solids.len()];
        let mut kills: Vec<(usize, Vec2)> = Vec::new();
        for (i, j) in pairs {
            let Some(contact) = overlap(&solids[i].1, solids[i].2, &solids[j].1, solids[j].2)
            else {
                continue;
            };
            let normal = contact.normal;
            match (solids[i].3, solids[j].3) {
                (true, true) => {
                    corrections[i] = corrections[i] + normal * (contact.depth / 2.0);
                    corrections[j] = corrections[j] - normal * (contact.depth / 2.0);
                    kills.push((i, normal));
                    kills.push((j, normal * -1.0));
                }
                (true, false) => {
                    corrections[i] = corrections[i] + normal * contact.depth;
                    kills.push((i, normal));
                }
                (false, true) => {
                    corrections[j] = corrections[j] - normal * contact.depth;
                    kills.push((j, normal * -1.0));
                }
                (false, false) => {}
            }
        }

        let apply = |body: &mut Body, correction: Vec2| {
            body.position = body.position + correction;
        };
        for (idx, correction) in corrections.iter().enumerate() {
            if correction.length_sq() == 0.0 {
                continue;
            }
            match solids[idx].0 {
                SolidRef::Agent(id) => {
                    if let Some(agent) = self.agents.get_mut(id) {
                        apply(&mut agent.body, *correction);
                    }
                }
                SolidRef::Entity(id) => {
                    if let Some(entity) = self.entities.get_mut(id) {
                        apply(&mut entity.body, *correction);
                    }
                }
            }
        }
        for (idx, normal) in kills {
            let kill = |body: &mut Body| {
                let approach = body.velocity.dot(normal);
                if approach < 0.0 {
                    body.velocity = body.velocity - normal * approach;
                }
            };
            match solids[idx].0 {
                SolidRef::Agent(id) => {
                    if let Some(agent) = self.agents.get_mut(id) {
                        kill(&mut agent.body);
                    }
                }
                SolidRef::Entity(id) => {
                    if let Some(entity) = self.entities.get_mut(id) {
                        kill(&mut entity.body);
                    }
                }
            }
        }
    }

    fn stage_carried(&mut self) {
        let carried: Vec<(EntityId, Pose)> = self
            .agents
            .iter()
            .filter_map(|(_, agent)| agent.holding.map(|held| (held, agent.body.pose())))
            .collect();
        for (entity_id, pose) in carried {
            if let Some(entity) = self.entities.get_mut(entity_id) {
                entity.follow_holder(pose);
            }
        }
    }

    fn stage_triggers(&mut self) {
        let Self {
            config,
            rng,
            entities,
            agents,
            registry,
            index,
            overlaps,
            pending_spawns,
            pending_removals,
            done,
            ..
        } = self;

        // Release entities whose holder dropped the grasp action.
        let releases: Vec<(AgentId, EntityId)> = agents
            .iter()
            .filter_map(|(id, agent)| {
                agent
                    .holding
                    .filter(|_| !agent.actions.grasp)
                    .map(|held| (id, held))
            })
            .collect();
        for (agent_id, entity_id) in releases {
            if let Some(entity) = entities.get_mut(entity_id) {
                entity.release();
            }
            if let Some(agent) = agents.get_mut(agent_id) {
                agent.holding = None;
            }
        }

        // Snapshot every trigger shape in the scene.
        let mut triggers: Vec<TriggerRef> = Vec::new();
        for (id, entity) in entities.iter() {
            let pose = entity.body.pose();
            if let (Some(tag), Some(shape)) = (entity.trigger_tag(), entity.interaction_shape()) {
                triggers.push(TriggerRef {
                    entity: id,
                    shape: shape.clone(),
                    pose,
                    tag,
                });
            }
            if let Some(shape) = entity.grasp_shape() {
                triggers.push(TriggerRef {
                    entity: id,
                    shape: shape.clone(),
                    pose,
                    tag: CollisionType::Graspable,
                });
            }
        }

        let mut current: Vec<OverlapKey> = Vec::new();
        if !triggers.is_empty() {
            let positions: Vec<(f32, f32)> = triggers
                .iter()
                .map(|t| (t.pose.position.x, t.pose.position.y))
                .collect();
            if index.rebuild(&positions).is_err() {
                return;
            }
            let max_bound = triggers
                .iter()
                .map(|t| t.shape.bounding_radius())
                .fold(0.0_f32, f32::max);

            for (agent_id, agent) in agents.iter() {
                let agent_pose = agent.body.pose();
                let agent_trigger = agent.trigger_shape();
                let reach = agent_trigger.bounding_radius() + max_bound;
                let mut candidates: Vec<usize> = Vec::new();
                index.neighbors_of_point(
                    agent_pose.position.x,
                    agent_pose.position.y,
                    reach * reach,
                    &mut |idx, _| candidates.push(idx),
                );
                for idx in candidates {
                    let trigger = &triggers[idx];
                    if overlap(&agent_trigger, agent_pose, &trigger.shape, trigger.pose).is_some()
                        && let Some(handler) = registry.lookup(CollisionType::Agent, trigger.tag)
                    {
                        current.push(OverlapKey::AgentEntity {
                            agent: agent_id,
                            entity: trigger.entity,
                            handler,
                        });
                    }
                }
            }

            if registry
                .lookup(CollisionType::Gem, CollisionType::Interactive)
                .is_some()
            {
                for gem in triggers.iter().filter(|t| t.tag == CollisionType::Gem) {
                    for receiver in triggers
                        .iter()
                        .filter(|t| t.tag == CollisionType::Interactive)
                    {
                        if overlap(&gem.shape, gem.pose, &receiver.shape, receiver.pose).is_some() {
                            current.push(OverlapKey::EntityEntity {
                                gem: gem.entity,
                                receiver: receiver.entity,
                            });
                        }
                    }
                }
            }
        }

        for (key, phase) in overlaps.classify(current) {
            if matches!(phase, TriggerPhase::Exit) {
                continue;
            }
            match key {
                OverlapKey::AgentEntity {
                    agent: agent_id,
                    entity: entity_id,
                    handler,
                } => {
                    let Some(agent) = agents.get_mut(agent_id) else {
                        continue;
                    };
                    let Some(entity) = entities.get_mut(entity_id) else {
                        continue;
                    };
                    match handler {
                        ContactHandler::AgentEats => {
                            if agent.actions.eat
                                && let Some(outcome) = entity.eat()
                            {
                                agent.reward += outcome.reward;
                                if outcome.depleted {
                                    debug!(?entity_id, "edible depleted");
                                    pending_removals.push(entity_id);
                                }
                            }
                        }
                        ContactHandler::AgentActivates => {
                            if agent.actions.activate {
                                match &entity.kind {
                                    EntityKind::Door(_) => {
                                        entity.actionate_door(config.door_retrigger);
                                    }
                                    EntityKind::Dispenser(_) => {
                                        if let Some(spec) = entity.produce(rng) {
                                            pending_spawns.push((spec, None));
                                        }
                                    }
                                    EntityKind::Distractor => {
                                        entity.actionate_distractor(rng);
                                    }
                                    _ => {}
                                }
                            }
                        }
                        ContactHandler::AgentGrasps => {
                            if agent.actions.grasp
                                && agent.holding.is_none()
                                && entity.held_by().is_none()
                                && entity.graspable
                            {
                                let local = (entity.body.position - agent.body.position)
                                    .rotated(-agent.body.angle);
                                let offset = HoldOffset {
                                    local,
                                    angle: entity.body.angle - agent.body.angle,
                                };
                                entity.grasp(agent_id, offset);
                                agent.holding = Some(entity_id);
                            }
                        }
                        ContactHandler::AgentInZone => {
                            if let EntityKind::Zone(zone) = &entity.kind {
                                agent.reward += zone.reward_per_step;
                                if zone.terminates {
                                    *done = true;
                                }
                            }
                        }
                        // Only registered for entity-entity pairs.
                        ContactHandler::GemDeposit => {}
                    }
                }
                OverlapKey::EntityEntity { gem, receiver } => {
                    if gem == receiver {
                        continue;
                    }
                    let Some([gem_entity, receiver_entity]) =
                        entities.get_disjoint_mut([gem, receiver])
                    else {
                        continue;
                    };
                    let Some(holder) = gem_entity.held_by() else {
                        continue;
                    };
                    let reward = match &gem_entity.kind {
                        EntityKind::Coin(coin) => coin.reward,
                        _ => continue,
                    };
                    let EntityKind::VendingMachine(vending) = &mut receiver_entity.kind else {
                        continue;
                    };
                    vending.deposits += 1;
                    gem_entity.release();
                    if let Some(agent) = agents.get_mut(holder) {
                        agent.reward += reward;
                        agent.holding = None;
                    }
                    debug!(?gem, ?receiver, "coin deposited");
                    pending_removals.push(gem);
                }
            }
        }
    }

    fn stage_door_timers(&mut self) -> usize {
        self.entities
            .values_mut()
            .filter(|entity| matches!(entity.kind, EntityKind::Door(_)))
            .map(|entity| entity.tick_door())
            .filter(|&fired| fired)
            .count()
    }

    fn stage_fields(&mut self) {
        let Self {
            fields,
            entities,
            pending_spawns,
            rng,
            ..
        } = self;
        for (field_idx, field) in fields.iter_mut().enumerate() {
            field.alive.retain(|id| entities.contains_key(*id));
            let mut queued = 0;
            while field.alive.len() + queued < field.limit
                && field.produced_total < field.total_limit
            {
                let pose = match field.area.sample(rng) {
                    Ok(pose) => pose,
                    Err(err) => {
                        warn!(%err, "field sampling fell back to the area center");
                        field.area.center_pose(rng)
                    }
                };
                let mut spec = field.template.clone();
                spec.position = PositionSource::Fixed(pose);
                pending_spawns.push((spec, Some(field_idx)));
                field.produced_total += 1;
                queued += 1;
            }
        }
    }

    fn stage_commit(&mut self) -> (usize, usize) {
        let mut removed = 0;
        if !self.pending_removals.is_empty() {
            let mut seen = HashSet::new();
            let removals: Vec<EntityId> = self.pending_removals.drain(..).collect();
            for id in removals {
                if seen.insert(id) && self.remove_entity(id).is_some() {
                    removed += 1;
                }
            }
        }

        let mut spawned = 0;
        let spawns: Vec<(EntitySpec, Option<usize>)> = self.pending_spawns.drain(..).collect();
        for (spec, field_idx) in spawns {
            let mut source = spec.position.clone();
            let pose = Self::resolve_pose(&mut self.rng, &mut source);
            match build_entity(&spec, pose) {
                Ok(entity) => {
                    let id = self.entities.insert(entity);
                    if let Some(field_idx) = field_idx
                        && let Some(field) = self.fields.get_mut(field_idx)
                    {
                        field.alive.push(id);
                    }
                    spawned += 1;
                }
                Err(err) => warn!(%err, "discarding produced spec that failed to build"),
            }
        }
        (spawned, removed)
    }

    fn stage_collect_rewards(&mut self) -> Vec<(AgentId, f32)> {
        self.agents
            .iter_mut()
            .map(|(id, agent)| {
                let reward = agent.reward;
                agent.reward = 0.0;
                (id, reward)
            })
            .collect()
    }

    /// Capture every agent's sensor observations against an externally
    /// rendered scene raster.
    pub fn collect_observations(
        &self,
        raster: &SceneRaster,
    ) -> Result<Vec<AgentObservations>, RasterError> {
        let snapshots: Vec<(AgentId, AnchorPose, &[PolarView])> = self
            .agents
            .iter()
            .map(|(id, agent)| {
                (
                    id,
                    AnchorPose::new(
                        agent.body.position.x,
                        agent.body.position.y,
                        agent.body.angle,
                    ),
                    agent.sensors.as_slice(),
                )
            })
            .collect();
        snapshots
            .par_iter()
            .map(|(id, anchor, sensors)| {
                let observations = sensors
                    .iter()
                    .map(|view| view.capture(raster, *anchor))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AgentObservations {
                    agent: *id,
                    observations,
                })
            })
            .collect()
    }

    /// Whether a posed shape overlaps any solid collider in the scene.
    #[must_use]
    pub fn probe_solid(&self, shape: &PhysicalShape, pose: Pose) -> bool {
        self.entities.values().any(|entity| {
            entity.is_solid() && overlap(shape, pose, &entity.shape, entity.body.pose()).is_some()
        }) || self
            .agents
            .values()
            .any(|agent| overlap(shape, pose, &agent.shape(), agent.body.pose()).is_some())
    }

    /// Restore the playground to its pre-run state.
    ///
    /// Field-produced entities are removed, remaining entities reset and
    /// re-placed from their position sources, and agents re-placed at their
    /// initial coordinates with all transient state cleared.
    pub fn reset(&mut self) {
        let produced: Vec<EntityId> = self
            .fields
            .iter()
            .flat_map(|field| field.alive.iter().copied())
            .collect();
        for id in produced {
            self.entities.remove(id);
        }
        for field in &mut self.fields {
            field.alive.clear();
            field.produced_total = 0;
        }

        let entity_ids: Vec<EntityId> = self.entities.keys().collect();
        for id in entity_ids {
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            entity.reset();
            entity.position_source_mut().reset();
            let mut source = entity.position_source().clone();
            let pose = Self::resolve_pose(&mut self.rng, &mut source);
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            *entity.position_source_mut() = source;
            entity.body.set_pose(pose);
        }

        let agent_ids: Vec<AgentId> = self.agents.keys().collect();
        for id in agent_ids {
            let Some(agent) = self.agents.get_mut(id) else {
                continue;
            };
            let mut source = agent.initial_position.clone();
            let pose = Self::resolve_pose(&mut self.rng, &mut source);
            let Some(agent) = self.agents.get_mut(id) else {
                continue;
            };
            agent.initial_position = source;
            agent.body.set_pose(pose);
            agent.body.halt();
            agent.actions = AgentActions::default();
            agent.reward = 0.0;
            agent.holding = None;
        }

        self.overlaps.clear();
        self.pending_spawns.clear();
        self.pending_removals.clear();
        self.tick = Tick::zero();
        self.done = false;
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub const fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Whether the run has signalled termination.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Number of live agents.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Borrow an entity by handle.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Mutably borrow an entity by handle.
    #[must_use]
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    /// Borrow an agent by handle.
    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Mutably borrow an agent by handle.
    #[must_use]
    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// Iterate over live agent handles.
    pub fn agent_ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.agents.keys()
    }

    /// Iterate over live entity handles.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys()
    }

    /// Attached fields.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Immutable access to the collision registry.
    #[must_use]
    pub const fn registry(&self) -> &CollisionRegistry {
        &self.registry
    }

    /// Mutable access to the collision registry (rejects changes once the
    /// first step froze it).
    pub fn registry_mut(&mut self) -> &mut CollisionRegistry {
        &mut self.registry
    }

    /// Iterate over retained step summaries.
    pub fn history(&self) -> impl Iterator<Item = &StepSummary> {
        self.history.iter()
    }

    /// Borrow the playground RNG for deterministic external sampling.
    pub fn rng(&mut self) -> &mut rand::rngs::SmallRng {
        &mut self.rng
    }
}
