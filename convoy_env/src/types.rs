//! Common types for the Convoy environment abstraction.

use serde::{Deserialize, Serialize};

/// Identifier of a truck in the fleet.
///
/// Small integers assigned by configuration; the UDP deployment derives
/// each truck's port from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl AgentId {
    /// Returns the raw integer id.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for AgentId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Kinematic state a truck broadcasts about itself.
///
/// Built fresh on every broadcast tick and never mutated afterwards;
/// receivers keep the last one per sender.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Sender identity
    pub agent_id: AgentId,

    /// Longitudinal position along the road in meters (signed)
    pub position: f64,

    /// Speed in m/s
    pub speed: f64,

    /// Operator-set emergency brake on the sender
    pub emergency_brake: bool,

    /// Sender requests an extra gap behind it
    pub decoupled: bool,

    /// Seconds since the Unix epoch on the sender's clock
    pub source_timestamp: i64,
}

impl AgentState {
    /// Creates a state with both flags cleared.
    pub fn new(agent_id: AgentId, position: f64, speed: f64, source_timestamp: i64) -> Self {
        Self {
            agent_id,
            position,
            speed,
            emergency_brake: false,
            decoupled: false,
            source_timestamp,
        }
    }

    /// Sets the emergency flag.
    pub fn with_emergency(mut self, emergency_brake: bool) -> Self {
        self.emergency_brake = emergency_brake;
        self
    }

    /// Sets the decoupled flag.
    pub fn with_decoupled(mut self, decoupled: bool) -> Self {
        self.decoupled = decoupled;
        self
    }
}
