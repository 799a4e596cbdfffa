//! Per-tick status report.

use crate::controller::DecisionReason;
use crate::failover::FailoverState;
use crate::state::SharedState;
use convoy_env::AgentId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What is driving the truck this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    Platoon,
    BlindCruise,
    ForcedStop,
}

impl From<FailoverState> for DriveMode {
    fn from(state: FailoverState) -> Self {
        match state {
            FailoverState::Normal => DriveMode::Platoon,
            FailoverState::BlindCruise { .. } => DriveMode::BlindCruise,
            FailoverState::ForcedStop { .. } => DriveMode::ForcedStop,
        }
    }
}

/// Snapshot of one control tick, for logs and traces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub id: AgentId,

    /// Local clock (seconds)
    pub time: f64,
    pub position: f64,

    /// Speed after the kinematic update (m/s)
    pub speed: f64,
    pub target_speed: f64,
    pub mode: DriveMode,
    pub reason: Option<DecisionReason>,
    pub emergency_brake: bool,
    pub decoupled: bool,
    pub neighbors: usize,
    pub ghosts: usize,

    /// Nearest neighbor ahead and the gap to it (m)
    pub closest_ahead: Option<(AgentId, f64)>,
}

impl StatusReport {
    /// Captures the report from the state after a tick.
    pub fn capture(state: &SharedState, time: f64, ghosts: usize) -> Self {
        Self {
            id: state.id,
            time,
            position: state.kinematics.position(),
            speed: state.kinematics.speed(),
            target_speed: state.last_target,
            mode: state.failover.state().into(),
            reason: state.last_reason,
            emergency_brake: state.emergency_brake,
            decoupled: state.decoupled,
            neighbors: state.neighbors.len(),
            ghosts,
            closest_ahead: state.closest_ahead(),
        }
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed * 3.6
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] pos {:.1} m | {:.1} km/h",
            self.id,
            self.position,
            self.speed_kmh()
        )?;
        match self.mode {
            DriveMode::Platoon => {}
            DriveMode::BlindCruise => write!(f, " | NO SIGNAL (blind cruise)")?,
            DriveMode::ForcedStop => write!(f, " | NO SIGNAL (stopping)")?,
        }
        if self.emergency_brake {
            write!(f, " | BRAKE")?;
        }
        if self.decoupled {
            write!(f, " | decoupled")?;
        }
        if let Some(reason) = &self.reason {
            write!(f, " | {}", reason.label())?;
        }
        match self.closest_ahead {
            Some((id, gap)) => write!(f, " | ahead {} {:.1} m", id, gap),
            None => write!(f, " | nobody ahead"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatoonConfig;
    use convoy_env::AgentState;

    #[test]
    fn test_display_following() {
        let config = PlatoonConfig::default();
        let mut state = SharedState::new(AgentId(1), 0.0, &config);
        state.kinematics = state.kinematics.with_speed(10.0);
        state.last_reason = Some(DecisionReason::Following { rank: 1, error: 0.0 });
        state.neighbors.upsert(AgentState::new(AgentId(0), 30.0, 10.0, 0), 0.0);

        let line = StatusReport::capture(&state, 1.0, 0).to_string();
        assert_eq!(line, "[T1] pos 0.0 m | 36.0 km/h | following | ahead T0 30.0 m");
    }

    #[test]
    fn test_display_no_signal() {
        let config = PlatoonConfig::default();
        let mut state = SharedState::new(AgentId(0), 0.0, &config);
        state.jamming = true;
        state.failover.step(true, 0.05);

        let report = StatusReport::capture(&state, 0.05, 0);
        assert_eq!(report.mode, DriveMode::BlindCruise);
        assert!(report.to_string().contains("NO SIGNAL"));
        assert!(report.to_string().ends_with("nobody ahead"));
    }
}
