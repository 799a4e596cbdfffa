//! Bounded-acceleration point-mass model.
//!
//! Speed moves toward the commanded target at no more than `max_accel`
//! (speeding up) or `max_decel` (slowing down), then position integrates
//! the new speed. The model knows nothing about braking distances.

use serde::{Deserialize, Serialize};

/// Longitudinal state of one truck.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicModel {
    position: f64,
    speed: f64,
    max_accel: f64,
    max_decel: f64,
}

impl KinematicModel {
    /// Creates a stationary truck at `position`.
    pub fn new(position: f64, max_accel: f64, max_decel: f64) -> Self {
        Self {
            position,
            speed: 0.0,
            max_accel,
            max_decel,
        }
    }

    /// Starting slot of truck `index` in a line spaced by `gap`.
    pub fn starting_position(index: u32, gap: f64) -> f64 {
        -(index as f64 * gap)
    }

    /// Sets the current speed (used to seed scenarios).
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed.max(0.0);
        self
    }

    /// Advances the model by `dt` seconds toward `target_speed`.
    ///
    /// Non-positive or non-finite `dt` leaves the state untouched.
    pub fn update(&mut self, target_speed: f64, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        let target = if target_speed.is_finite() { target_speed.max(0.0) } else { 0.0 };

        if self.speed < target {
            self.speed += (target - self.speed).min(self.max_accel * dt);
        } else if self.speed > target {
            self.speed -= (self.speed - target).min(self.max_decel * dt);
        }
        self.position += self.speed * dt;
    }

    /// Current position in meters.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Current speed in m/s.
    pub fn speed(&self) -> f64 {
        self.speed
    }
}
