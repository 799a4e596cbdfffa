//! Communication-loss failover.
//!
//! While the radio is jammed the truck cannot trust any neighbor data, so
//! the controller is bypassed:
//!
//! ```text
//!   Normal --jam--> BlindCruise --grace elapsed--> ForcedStop
//!     ^                 |                              |
//!     +-----------------+---------- jam cleared -------+
//! ```
//!
//! Blind cruise holds a fixed speed for a short grace period. After that the
//! truck brakes to a standstill and stays there until jamming clears.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Failover state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FailoverState {
    Normal,
    BlindCruise { elapsed: f64 },
    ForcedStop { elapsed: f64 },
}

/// What the control tick should do this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailoverCommand {
    /// Run the platoon controller as usual.
    Resume,
    /// Hold this speed without looking at neighbors.
    Cruise(f64),
    /// Brake to zero.
    Stop,
}

/// Radio-loss fallback: blind cruise for `grace` seconds, then a forced stop.
#[derive(Debug, Clone)]
pub struct JammingFailover {
    state: FailoverState,
    grace: f64,
    cruise_speed: f64,
}

impl JammingFailover {
    /// Creates an idle failover with the given grace period (s) and cruise speed (m/s).
    pub fn new(grace: f64, cruise_speed: f64) -> Self {
        Self {
            state: FailoverState::Normal,
            grace,
            cruise_speed,
        }
    }

    /// Current phase.
    pub fn state(&self) -> FailoverState {
        self.state
    }

    /// True while blind cruise or forced stop is active.
    pub fn is_engaged(&self) -> bool {
        !matches!(self.state, FailoverState::Normal)
    }

    /// Advances the state machine by `dt` seconds.
    pub fn step(&mut self, jamming: bool, dt: f64) -> FailoverCommand {
        if !jamming {
            if self.is_engaged() {
                info!("communication restored, leaving {:?}", self.state);
                self.state = FailoverState::Normal;
            }
            return FailoverCommand::Resume;
        }

        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.state = match self.state {
            FailoverState::Normal => {
                warn!(
                    "communication lost, cruising blind at {:.1} km/h for {:.1}s",
                    self.cruise_speed * 3.6,
                    self.grace
                );
                FailoverState::BlindCruise { elapsed: dt }
            }
            FailoverState::BlindCruise { elapsed } => FailoverState::BlindCruise { elapsed: elapsed + dt },
            FailoverState::ForcedStop { elapsed } => FailoverState::ForcedStop { elapsed: elapsed + dt },
        };

        if let FailoverState::BlindCruise { elapsed } = self.state {
            if elapsed < self.grace {
                return FailoverCommand::Cruise(self.cruise_speed);
            }
            warn!("blind cruise expired after {:.1}s, forcing stop", elapsed);
            self.state = FailoverState::ForcedStop { elapsed };
        }
        FailoverCommand::Stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::KinematicModel;
    use approx::assert_relative_eq;

    const DT: f64 = 0.05;

    #[test]
    fn test_not_jamming_resumes() {
        let mut failover = JammingFailover::new(3.0, 13.0);
        assert_eq!(failover.step(false, DT), FailoverCommand::Resume);
        assert_eq!(failover.state(), FailoverState::Normal);
    }

    #[test]
    fn test_blind_cruise_then_stop() {
        let mut failover = JammingFailover::new(3.0, 13.0);

        assert_eq!(failover.step(true, 1.0), FailoverCommand::Cruise(13.0));
        assert_eq!(failover.step(true, 1.0), FailoverCommand::Cruise(13.0));
        // 3.0s reached: grace is over.
        assert_eq!(failover.step(true, 1.0), FailoverCommand::Stop);
        assert!(matches!(failover.state(), FailoverState::ForcedStop { .. }));
        assert_eq!(failover.step(true, 1.0), FailoverCommand::Stop);
    }

    #[test]
    fn test_clearing_jam_resets_timer() {
        let mut failover = JammingFailover::new(3.0, 13.0);
        failover.step(true, 2.5);
        assert_eq!(failover.step(false, DT), FailoverCommand::Resume);

        // New jam starts a fresh grace period.
        assert_eq!(failover.step(true, 2.5), FailoverCommand::Cruise(13.0));
    }

    #[test]
    fn test_zero_grace_stops_immediately() {
        let mut failover = JammingFailover::new(0.0, 13.0);
        assert_eq!(failover.step(true, DT), FailoverCommand::Stop);
    }

    #[test]
    fn test_jamming_speed_profile() {
        let mut failover = JammingFailover::new(3.0, 50.0 / 3.6);
        let mut model = KinematicModel::new(0.0, 3.0, 5.0).with_speed(20.0);

        // Blind cruise pulls speed toward the cruise speed, then the forced
        // stop brakes monotonically to zero and holds.
        let mut stop_speeds = Vec::new();
        for _ in 0..400 {
            match failover.step(true, DT) {
                FailoverCommand::Cruise(speed) => model.update(speed, DT),
                FailoverCommand::Stop => {
                    model.update(0.0, DT);
                    stop_speeds.push(model.speed());
                }
                FailoverCommand::Resume => unreachable!(),
            }
        }

        assert!(!stop_speeds.is_empty());
        assert!(stop_speeds.windows(2).all(|w| w[1] <= w[0]));
        assert_relative_eq!(model.speed(), 0.0);

        // Standstill until jamming clears.
        assert_eq!(failover.step(true, DT), FailoverCommand::Stop);
        assert_eq!(failover.step(false, DT), FailoverCommand::Resume);
    }
}
