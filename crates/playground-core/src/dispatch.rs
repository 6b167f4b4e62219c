//! Collision-pair dispatch: routing trigger overlaps to semantic handlers.
//!
//! The registry maps an unordered pair of [`CollisionType`] tags to a
//! [`ContactHandler`]. It is populated during playground setup and frozen
//! before the first step; afterwards it is consulted every step during
//! narrow-phase trigger resolution and never mutated again, so concurrent
//! playground instances can share one wiring safely.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::{CollisionType, ConfigError};

/// Semantic effect fired when a registered pair of trigger shapes overlaps.
///
/// Handlers are a closed enum matched statically by the engine; they carry
/// no state of their own. Handlers must tolerate firing on every step while
/// an overlap persists — cooldown and consumption logic lives in the
/// entities themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactHandler {
    /// An agent consumes an edible while holding the eat action.
    AgentEats,
    /// An agent activates an interactive entity (door, dispenser, distractor).
    AgentActivates,
    /// An agent picks up a graspable entity while holding the grasp action.
    AgentGrasps,
    /// A carried gem is deposited into an interactive receiver.
    GemDeposit,
    /// An agent stands inside a reward or termination zone.
    AgentInZone,
}

fn pair_key(a: CollisionType, b: CollisionType) -> (CollisionType, CollisionType) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Registry mapping unordered collision-type pairs to handlers.
#[derive(Debug, Clone, Default)]
pub struct CollisionRegistry {
    handlers: HashMap<(CollisionType, CollisionType), ContactHandler>,
    frozen: bool,
}

impl CollisionRegistry {
    /// An empty, mutable registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard wiring used by every stock playground.
    #[must_use]
    pub fn with_default_handlers() -> Self {
        let mut registry = Self::new();
        let defaults = [
            (
                CollisionType::Agent,
                CollisionType::Edible,
                ContactHandler::AgentEats,
            ),
            (
                CollisionType::Agent,
                CollisionType::Interactive,
                ContactHandler::AgentActivates,
            ),
            (
                CollisionType::Agent,
                CollisionType::Graspable,
                ContactHandler::AgentGrasps,
            ),
            (
                CollisionType::Agent,
                CollisionType::Zone,
                ContactHandler::AgentInZone,
            ),
            (
                CollisionType::Gem,
                CollisionType::Interactive,
                ContactHandler::GemDeposit,
            ),
        ];
        for (a, b, handler) in defaults {
            // A fresh registry is never frozen.
            let _ = registry.register(a, b, handler);
        }
        registry
    }

    /// Register a handler for an unordered pair of tags.
    ///
    /// Fails once the registry has been frozen by the first simulation step.
    pub fn register(
        &mut self,
        a: CollisionType,
        b: CollisionType,
        handler: ContactHandler,
    ) -> Result<(), ConfigError> {
        if self.frozen {
            return Err(ConfigError::RegistryFrozen);
        }
        self.handlers.insert(pair_key(a, b), handler);
        Ok(())
    }

    /// Remove a registered pair. Fails once frozen.
    pub fn unregister(&mut self, a: CollisionType, b: CollisionType) -> Result<bool, ConfigError> {
        if self.frozen {
            return Err(ConfigError::RegistryFrozen);
        }
        Ok(self.handlers.remove(&pair_key(a, b)).is_some())
    }

    /// Make the registry immutable.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether the registry still accepts registrations.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Handler registered for the pair, in either order.
    #[must_use]
    pub fn lookup(&self, a: CollisionType, b: CollisionType) -> Option<ContactHandler> {
        self.handlers.get(&pair_key(a, b)).copied()
    }
}

/// Phase of a trigger overlap relative to the previous step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    /// The pair started overlapping this step.
    Enter,
    /// The pair was already overlapping last step.
    Persist,
    /// The pair stopped overlapping this step.
    Exit,
}

/// Classifies per-step overlap sets into enter/persist/exit events.
///
/// Events preserve discovery order within a step, keeping dispatch
/// deterministic relative to contact time.
#[derive(Debug, Clone)]
pub struct OverlapTracker<K> {
    previous: Vec<K>,
    previous_set: HashSet<K>,
}

impl<K: Copy + Eq + Hash> Default for OverlapTracker<K> {
    fn default() -> Self {
        Self {
            previous: Vec::new(),
            previous_set: HashSet::new(),
        }
    }
}

impl<K: Copy + Eq + Hash> OverlapTracker<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume this step's overlaps (in discovery order) and emit phased
    /// events: enters and persists first, then exits for pairs seen last
    /// step but not this one.
    pub fn classify(&mut self, current: Vec<K>) -> Vec<(K, TriggerPhase)> {
        let current_set: HashSet<K> = current.iter().copied().collect();
        let mut events = Vec::with_capacity(current.len());
        for key in &current {
            let phase = if self.previous_set.contains(key) {
                TriggerPhase::Persist
            } else {
                TriggerPhase::Enter
            };
            events.push((*key, phase));
        }
        for key in &self.previous {
            if !current_set.contains(key) {
                events.push((*key, TriggerPhase::Exit));
            }
        }
        self.previous = current;
        self.previous_set = current_set;
        events
    }

    /// Forget all tracked overlaps.
    pub fn clear(&mut self) {
        self.previous.clear();
        self.previous_set.clear();
    }
}
