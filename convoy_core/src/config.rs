//! Platoon configuration.
//!
//! Every tunable the controller, failover and loops consume lives in
//! [`PlatoonConfig`]. Defaults reproduce the field-tested constants; any
//! subset can be overridden from a JSON file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Conversion factor from km/h to m/s.
pub const KMH_TO_MS: f64 = 1.0 / 3.6;

/// Role of a truck in the convoy.
///
/// Exactly one truck of a fleet is configured as `Leader`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Rank-0 truck; waits until `target_size` trucks (itself included) are heard.
    Leader { target_size: usize },

    /// Everyone else.
    #[default]
    Follower,
}

impl Role {
    /// Returns true for the leader role.
    pub fn is_leader(&self) -> bool {
        matches!(self, Role::Leader { .. })
    }
}

/// Errors loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid parameter `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for one platoon agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatoonConfig {
    /// Leader or follower
    pub role: Role,

    /// Speed the leader holds once the formation is complete (m/s, default: 50 km/h)
    pub leader_cruise_speed: f64,

    /// Gap per rank behind the leader (m, default: 30)
    pub base_gap: f64,

    /// Additional gap per decoupled truck at or ahead of self (m, default: 30)
    pub extra_gap: f64,

    /// Proportional gain on the position error (1/s, default: 1.0)
    pub kp: f64,

    /// Position error below which the leader's speed is matched exactly (m, default: 1.0)
    pub gap_deadband: f64,

    /// Leader records older than this are not extrapolated (s, default: 1.0)
    pub dead_reckoning_horizon: f64,

    /// Age after which a neighbor is treated as a stopped obstacle (s, default: 2.0)
    pub stale_after: f64,

    /// Age after which a neighbor is forgotten (s, default: 10.0)
    pub evict_after: f64,

    /// Time spent cruising blind after jamming starts (s, default: 3.0)
    pub jamming_grace: f64,

    /// Speed held while cruising blind (m/s, default: 50 km/h)
    pub blind_cruise_speed: f64,

    /// Hard upper bound on any target speed (m/s, default: 100 km/h)
    pub max_speed: f64,

    /// Kinematic acceleration limit (m/s², default: 3.0)
    pub max_accel: f64,

    /// Kinematic braking limit, also used for stopping distance (m/s², default: 5.0)
    pub max_decel: f64,

    /// Buffer added to the stopping distance (m, default: 10.0)
    pub safety_margin: f64,

    /// Within this gap, never exceed the speed of the truck ahead (m, default: 30.0)
    pub proximity_gap: f64,

    /// The leader waits when the truck behind it is farther than this (m, default: 300.0)
    pub lost_follower_gap: f64,

    /// Control loop rate (Hz, default: 20)
    pub tick_rate_hz: u32,

    /// Period of the communication loop (ms, default: 50)
    pub broadcast_interval_ms: u64,
}

impl Default for PlatoonConfig {
    fn default() -> Self {
        Self {
            role: Role::Follower,
            leader_cruise_speed: 50.0 * KMH_TO_MS,
            base_gap: 30.0,
            extra_gap: 30.0,
            kp: 1.0,
            gap_deadband: 1.0,
            dead_reckoning_horizon: 1.0,
            stale_after: 2.0,
            evict_after: 10.0,
            jamming_grace: 3.0,
            blind_cruise_speed: 50.0 * KMH_TO_MS,
            max_speed: 100.0 * KMH_TO_MS,
            max_accel: 3.0,
            max_decel: 5.0,
            safety_margin: 10.0,
            proximity_gap: 30.0,
            lost_follower_gap: 300.0,
            tick_rate_hz: 20,
            broadcast_interval_ms: 50,
        }
    }
}

impl PlatoonConfig {
    /// Default configuration for the leader of a `target_size` platoon.
    pub fn leader(target_size: usize) -> Self {
        Self {
            role: Role::Leader { target_size },
            ..Self::default()
        }
    }

    /// Default configuration for a follower.
    pub fn follower() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Period of one control tick.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz.max(1) as f64)
    }

    /// Period of one communication cycle.
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    /// Minimum distance needed to stop from `speed` at full braking.
    pub fn stopping_distance(&self, speed: f64) -> f64 {
        speed * speed / (2.0 * self.max_decel)
    }

    /// Checks the relationships the control algorithm depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid { name, reason: reason.into() }
        }

        let positive = [
            ("max_speed", self.max_speed),
            ("max_accel", self.max_accel),
            ("max_decel", self.max_decel),
            ("stale_after", self.stale_after),
            ("evict_after", self.evict_after),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(name, format!("must be positive, got {}", value)));
            }
        }

        let non_negative = [
            ("leader_cruise_speed", self.leader_cruise_speed),
            ("blind_cruise_speed", self.blind_cruise_speed),
            ("base_gap", self.base_gap),
            ("extra_gap", self.extra_gap),
            ("kp", self.kp),
            ("gap_deadband", self.gap_deadband),
            ("dead_reckoning_horizon", self.dead_reckoning_horizon),
            ("jamming_grace", self.jamming_grace),
            ("safety_margin", self.safety_margin),
            ("proximity_gap", self.proximity_gap),
            ("lost_follower_gap", self.lost_follower_gap),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(name, format!("must be non-negative, got {}", value)));
            }
        }

        if self.stale_after >= self.evict_after {
            return Err(invalid(
                "stale_after",
                format!("must be below evict_after ({} >= {})", self.stale_after, self.evict_after),
            ));
        }
        if self.tick_rate_hz == 0 {
            return Err(invalid("tick_rate_hz", "must be at least 1"));
        }
        if self.broadcast_interval_ms == 0 {
            return Err(invalid("broadcast_interval_ms", "must be at least 1"));
        }
        if let Role::Leader { target_size: 0 } = self.role {
            return Err(invalid("role", "leader target_size must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_config_default() {
        let config = PlatoonConfig::default();
        assert_eq!(config.role, Role::Follower);
        assert_relative_eq!(config.leader_cruise_speed, 13.8889, epsilon = 1e-3);
        assert_relative_eq!(config.max_speed, 27.7778, epsilon = 1e-3);
        assert_eq!(config.tick_rate_hz, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stopping_distance() {
        let config = PlatoonConfig::default();
        assert_relative_eq!(config.stopping_distance(20.0), 40.0);
        assert_relative_eq!(config.stopping_distance(0.0), 0.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "role": { "leader": { "target_size": 4 } }, "base_gap": 25.0 }"#;
        let config: PlatoonConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.role, Role::Leader { target_size: 4 });
        assert_relative_eq!(config.base_gap, 25.0);
        assert_relative_eq!(config.extra_gap, 30.0);
    }

    #[test]
    fn test_follower_role_json() {
        let config: PlatoonConfig = serde_json::from_str(r#"{ "role": "follower" }"#).unwrap();
        assert_eq!(config.role, Role::Follower);
    }

    #[test]
    fn test_validate_rejects_inverted_ages() {
        let config = PlatoonConfig {
            stale_after: 10.0,
            evict_after: 2.0,
            ..PlatoonConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "stale_after", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_decel() {
        let config = PlatoonConfig {
            max_decel: 0.0,
            ..PlatoonConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_platoon() {
        assert!(PlatoonConfig::leader(0).validate().is_err());
        assert!(PlatoonConfig::leader(1).validate().is_ok());
    }
}
