//! Mutable state shared between the control and communication loops.

use crate::config::PlatoonConfig;
use crate::controller::{DecisionReason, SelfView};
use crate::failover::JammingFailover;
use crate::kinematics::KinematicModel;
use crate::neighbors::NeighborTable;
use convoy_env::{AgentId, AgentState};

/// Everything one truck knows about itself and its neighbors.
///
/// Owned by a single mutex in [`crate::agent_runtime::PlatoonAgent`]; every
/// method here is synchronous so the lock is never held across an await.
#[derive(Debug, Clone)]
pub struct SharedState {
    pub id: AgentId,
    pub emergency_brake: bool,
    pub decoupled: bool,
    pub jamming: bool,
    pub kinematics: KinematicModel,
    pub neighbors: NeighborTable,
    pub failover: JammingFailover,

    /// Reason of the last controller decision, `None` while failover drives
    pub last_reason: Option<DecisionReason>,

    /// Target speed applied on the last tick
    pub last_target: f64,
}

impl SharedState {
    /// Creates the state of a stationary truck at `position`.
    pub fn new(id: AgentId, position: f64, config: &PlatoonConfig) -> Self {
        Self {
            id,
            emergency_brake: false,
            decoupled: false,
            jamming: false,
            kinematics: KinematicModel::new(position, config.max_accel, config.max_decel),
            neighbors: NeighborTable::new(id),
            failover: JammingFailover::new(config.jamming_grace, config.blind_cruise_speed),
            last_reason: None,
            last_target: 0.0,
        }
    }

    /// Creates the state at the truck's default slot, `-(id * base_gap)`.
    pub fn at_starting_slot(id: AgentId, config: &PlatoonConfig) -> Self {
        let position = KinematicModel::starting_position(id.get(), config.base_gap);
        Self::new(id, position, config)
    }

    pub fn self_view(&self) -> SelfView {
        SelfView {
            id: self.id,
            position: self.kinematics.position(),
            speed: self.kinematics.speed(),
            emergency_brake: self.emergency_brake,
            decoupled: self.decoupled,
        }
    }

    /// State to broadcast, stamped with the sender's wall clock.
    pub fn outgoing(&self, source_timestamp: i64) -> AgentState {
        AgentState::new(
            self.id,
            self.kinematics.position(),
            self.kinematics.speed(),
            source_timestamp,
        )
        .with_emergency(self.emergency_brake)
        .with_decoupled(self.decoupled)
    }

    /// Nearest stored neighbor strictly ahead, with the gap to it.
    pub fn closest_ahead(&self) -> Option<(AgentId, f64)> {
        let me = self.kinematics.position();
        self.neighbors
            .iter()
            .map(|(id, record)| (*id, record.state.position - me))
            .filter(|(_, gap)| *gap > 0.0)
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}
