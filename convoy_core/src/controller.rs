//! The platoon controller: one pure decision per control tick.
//!
//! Given the local truck's state, the ghost-filtered neighbor view and the
//! configuration, the controller returns a target speed. Checks run in a
//! fixed priority order and the first one that fires wins:
//!
//! 1. Own emergency brake                      -> stop
//! 2. Leader waiting for the full formation    -> stop
//! 3. Any neighbor braking (global)            -> stop
//! 4. Rank and gap resolution
//! 5. Leader waiting for a straggler behind it -> stop
//! 6. Leader cruise                            -> cruise speed
//! 7. Follower without a leader reference      -> stop
//! 8. Dead-reckon the leader position
//! 9. Desired distance from rank + decoupling
//! 10. Proportional gap control with deadband
//! 11. Stopping-distance check on the truck ahead -> stop
//! 12. Proximity cap to the speed of the truck ahead
//! 13. Clamp to `[0, max_speed]`
//!
//! Missing information never produces an error; it produces a stop.

use crate::config::{PlatoonConfig, Role};
use crate::neighbors::NeighborSnapshot;
use crate::rank::{self, RankedEntry};
use convoy_env::AgentId;
use serde::{Deserialize, Serialize};

/// The local truck as the controller sees it for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelfView {
    pub id: AgentId,
    pub position: f64,
    pub speed: f64,
    pub emergency_brake: bool,
    pub decoupled: bool,
}

/// Why the controller chose its output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DecisionReason {
    SelfEmergency,
    WaitingForPlatoon { present: usize, target: usize },
    GlobalEmergency { source: AgentId },
    WaitingForStraggler { gap: f64 },
    LeaderCruise,
    NoLeaderReference,
    CollisionAvoidance { gap: f64, required: f64 },
    Following { rank: usize, error: f64 },
}

impl DecisionReason {
    /// Short label used in status lines and exports.
    pub fn label(&self) -> &'static str {
        match self {
            DecisionReason::SelfEmergency => "self_emergency",
            DecisionReason::WaitingForPlatoon { .. } => "waiting_for_platoon",
            DecisionReason::GlobalEmergency { .. } => "global_emergency",
            DecisionReason::WaitingForStraggler { .. } => "waiting_for_straggler",
            DecisionReason::LeaderCruise => "leader_cruise",
            DecisionReason::NoLeaderReference => "no_leader_reference",
            DecisionReason::CollisionAvoidance { .. } => "collision_avoidance",
            DecisionReason::Following { .. } => "following",
        }
    }

    /// True when two reasons are the same kind of decision.
    pub fn same_kind(&self, other: &DecisionReason) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Output of one controller evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub target_speed: f64,
    pub reason: DecisionReason,
}

impl Decision {
    fn stop(reason: DecisionReason) -> Self {
        Self { target_speed: 0.0, reason }
    }
}

/// Stateless gap-keeping controller.
#[derive(Debug, Clone)]
pub struct PlatoonController {
    config: PlatoonConfig,
}

impl PlatoonController {
    /// Creates a controller with the given configuration.
    pub fn new(config: PlatoonConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &PlatoonConfig {
        &self.config
    }

    /// Returns the target speed for this tick.
    pub fn decide(&self, me: &SelfView, neighbors: &NeighborSnapshot, now: f64) -> f64 {
        self.evaluate(me, neighbors, now).target_speed
    }

    /// Returns the target speed for this tick together with the reason.
    ///
    /// `now` is the local clock in seconds, comparable with the neighbors'
    /// `received_at` stamps.
    pub fn evaluate(&self, me: &SelfView, neighbors: &NeighborSnapshot, now: f64) -> Decision {
        let config = &self.config;

        if me.emergency_brake {
            return Decision::stop(DecisionReason::SelfEmergency);
        }

        if let Role::Leader { target_size } = config.role {
            let present = 1 + neighbors.len();
            if present < target_size {
                return Decision::stop(DecisionReason::WaitingForPlatoon {
                    present,
                    target: target_size,
                });
            }
        }

        if let Some(source) = neighbors
            .records()
            .find(|record| record.state.emergency_brake)
            .map(|record| record.state.agent_id)
        {
            return Decision::stop(DecisionReason::GlobalEmergency { source });
        }

        let info = rank::resolve(
            RankedEntry {
                agent_id: me.id,
                position: me.position,
                decoupled: me.decoupled,
            },
            neighbors,
        );

        if config.role.is_leader() {
            if let Some(behind) = info.behind_entry() {
                let gap = me.position - behind.position;
                if gap > config.lost_follower_gap {
                    return Decision::stop(DecisionReason::WaitingForStraggler { gap });
                }
            }
            return Decision {
                target_speed: clamp_speed(config.leader_cruise_speed, config.max_speed),
                reason: DecisionReason::LeaderCruise,
            };
        }

        let leader = match info.front() {
            Some(front) if front.agent_id != me.id => neighbors.get(front.agent_id),
            _ => None,
        };
        let Some(leader) = leader else {
            return Decision::stop(DecisionReason::NoLeaderReference);
        };

        let mut leader_position = leader.state.position;
        let since_update = now - leader.received_at;
        if since_update > 0.0 && since_update < config.dead_reckoning_horizon {
            leader_position += leader.state.speed * since_update;
        }

        let desired_distance =
            info.my_rank as f64 * config.base_gap + info.extra_gap_units as f64 * config.extra_gap;
        let error = (leader_position - desired_distance) - me.position;

        let mut desired_speed = leader.state.speed;
        if error.abs() > config.gap_deadband {
            desired_speed += config.kp * error;
        }

        if let Some(ahead) = info.ahead.and_then(|id| neighbors.get(id)) {
            let gap = ahead.state.position - me.position;
            let required = config.stopping_distance(me.speed) + config.safety_margin;
            if gap < required {
                return Decision::stop(DecisionReason::CollisionAvoidance { gap, required });
            }
            if gap < config.proximity_gap {
                desired_speed = desired_speed.min(ahead.state.speed);
            }
        }

        Decision {
            target_speed: clamp_speed(desired_speed, config.max_speed),
            reason: DecisionReason::Following {
                rank: info.my_rank,
                error,
            },
        }
    }
}

/// Clamps into `[0, max_speed]`; NaN becomes 0.
fn clamp_speed(speed: f64, max_speed: f64) -> f64 {
    speed.max(0.0).min(max_speed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::NeighborRecord;
    use approx::assert_relative_eq;
    use convoy_env::AgentState;
    use proptest::prelude::*;

    const NOW: f64 = 100.0;

    fn me(id: u32, position: f64, speed: f64) -> SelfView {
        SelfView {
            id: AgentId(id),
            position,
            speed,
            emergency_brake: false,
            decoupled: false,
        }
    }

    fn record(id: u32, position: f64, speed: f64) -> NeighborRecord {
        NeighborRecord {
            state: AgentState::new(AgentId(id), position, speed, 0),
            received_at: NOW,
        }
    }

    fn view(records: Vec<NeighborRecord>) -> NeighborSnapshot {
        NeighborSnapshot::from_records(records)
    }

    fn follower() -> PlatoonController {
        PlatoonController::new(PlatoonConfig::follower())
    }

    #[test]
    fn test_leader_waits_for_platoon() {
        let controller = PlatoonController::new(PlatoonConfig::leader(2));
        let decision = controller.evaluate(&me(0, 0.0, 0.0), &NeighborSnapshot::default(), NOW);

        assert_eq!(decision.target_speed, 0.0);
        assert_eq!(
            decision.reason,
            DecisionReason::WaitingForPlatoon { present: 1, target: 2 }
        );
    }

    #[test]
    fn test_leader_cruises_when_formed() {
        let controller = PlatoonController::new(PlatoonConfig::leader(2));
        let decision = controller.evaluate(
            &me(0, 0.0, 0.0),
            &view(vec![record(1, -30.0, 0.0)]),
            NOW,
        );

        assert_relative_eq!(decision.target_speed, 50.0 / 3.6);
        assert_eq!(decision.reason, DecisionReason::LeaderCruise);
    }

    #[test]
    fn test_leader_waits_for_straggler() {
        let controller = PlatoonController::new(PlatoonConfig::leader(2));
        let decision = controller.evaluate(
            &me(0, 0.0, 5.0),
            &view(vec![record(1, -301.0, 20.0)]),
            NOW,
        );

        assert_eq!(decision.target_speed, 0.0);
        assert!(matches!(decision.reason, DecisionReason::WaitingForStraggler { .. }));
    }

    #[test]
    fn test_follower_ignores_straggler_behind() {
        let decision = follower().evaluate(
            &me(1, 0.0, 0.0),
            &view(vec![record(0, 30.0, 10.0), record(2, -500.0, 0.0)]),
            NOW,
        );
        assert!(matches!(decision.reason, DecisionReason::Following { rank: 1, .. }));
        assert_relative_eq!(decision.target_speed, 10.0);
    }

    #[test]
    fn test_follower_proportional_gap_control() {
        let decision = follower().evaluate(&me(1, 0.0, 0.0), &view(vec![record(0, 35.0, 10.0)]), NOW);

        // desired position 5, error 5 -> 10 + 1.0 * 5
        assert_relative_eq!(decision.target_speed, 15.0);
        match decision.reason {
            DecisionReason::Following { rank, error } => {
                assert_eq!(rank, 1);
                assert_relative_eq!(error, 5.0);
            }
            other => panic!("unexpected reason {:?}", other),
        }
    }

    #[test]
    fn test_deadband_matches_leader_speed() {
        let decision = follower().evaluate(&me(1, 0.0, 0.0), &view(vec![record(0, 30.8, 10.0)]), NOW);
        assert_relative_eq!(decision.target_speed, 10.0);
    }

    #[test]
    fn test_decoupled_ahead_widens_gap() {
        let mut leader = record(0, 60.0, 10.0);
        leader.state.decoupled = true;
        let decision = follower().evaluate(&me(1, 0.0, 0.0), &view(vec![leader]), NOW);

        // 1 * 30 + 1 * 30 = 60 -> on target
        assert_relative_eq!(decision.target_speed, 10.0);
    }

    #[test]
    fn test_dead_reckoning_within_horizon() {
        let mut leader = record(0, 30.0, 10.0);
        leader.received_at = NOW - 0.5;
        let decision = follower().evaluate(&me(1, 0.0, 0.0), &view(vec![leader]), NOW);

        // leader projected to 35 -> error 5
        assert_relative_eq!(decision.target_speed, 15.0);
    }

    #[test]
    fn test_dead_reckoning_skipped_past_horizon() {
        let mut leader = record(0, 30.0, 10.0);
        leader.received_at = NOW - 1.5;
        let decision = follower().evaluate(&me(1, 0.0, 0.0), &view(vec![leader]), NOW);
        assert_relative_eq!(decision.target_speed, 10.0);
    }

    #[test]
    fn test_stopping_distance_override() {
        // 20 m/s needs 40 m + 10 m margin; only 15 m available.
        let decision = follower().evaluate(&me(1, 0.0, 20.0), &view(vec![record(0, 15.0, 20.0)]), NOW);

        assert_eq!(decision.target_speed, 0.0);
        match decision.reason {
            DecisionReason::CollisionAvoidance { gap, required } => {
                assert_relative_eq!(gap, 15.0);
                assert_relative_eq!(required, 50.0);
            }
            other => panic!("unexpected reason {:?}", other),
        }
    }

    #[test]
    fn test_proximity_caps_to_truck_ahead() {
        // Leader far ahead pulls hard, but truck 1 is 20 m ahead at 4 m/s.
        let decision = follower().evaluate(
            &me(2, 0.0, 0.0),
            &view(vec![record(0, 200.0, 10.0), record(1, 20.0, 4.0)]),
            NOW,
        );
        assert_relative_eq!(decision.target_speed, 4.0);
    }

    #[test]
    fn test_output_clamped_to_max_speed() {
        let decision = follower().evaluate(&me(1, 0.0, 0.0), &view(vec![record(0, 500.0, 20.0)]), NOW);
        assert_relative_eq!(decision.target_speed, 100.0 / 3.6);
    }

    #[test]
    fn test_follower_without_leader_stops() {
        let decision = follower().evaluate(&me(1, 0.0, 5.0), &NeighborSnapshot::default(), NOW);
        assert_eq!(decision.reason, DecisionReason::NoLeaderReference);
        assert_eq!(decision.target_speed, 0.0);
    }

    #[test]
    fn test_follower_in_front_stops() {
        // Follower is the most advanced truck: rank 0 is itself.
        let decision = follower().evaluate(&me(1, 50.0, 5.0), &view(vec![record(0, 10.0, 5.0)]), NOW);
        assert_eq!(decision.reason, DecisionReason::NoLeaderReference);
    }

    #[test]
    fn test_global_emergency_names_source() {
        let mut braking = record(3, -60.0, 0.0);
        braking.state.emergency_brake = true;
        let decision = follower().evaluate(
            &me(1, 0.0, 10.0),
            &view(vec![record(0, 30.0, 10.0), braking]),
            NOW,
        );
        assert_eq!(decision.reason, DecisionReason::GlobalEmergency { source: AgentId(3) });
    }

    #[test]
    fn test_self_emergency_beats_readiness_gate() {
        let controller = PlatoonController::new(PlatoonConfig::leader(5));
        let mut leader = me(0, 0.0, 0.0);
        leader.emergency_brake = true;
        let decision = controller.evaluate(&leader, &NeighborSnapshot::default(), NOW);
        assert_eq!(decision.reason, DecisionReason::SelfEmergency);
    }

    fn arb_record() -> impl Strategy<Value = NeighborRecord> {
        (0u32..8, -500.0f64..500.0, 0.0f64..40.0, any::<bool>(), any::<bool>(), 90.0f64..100.0)
            .prop_map(|(id, position, speed, emergency, decoupled, received_at)| NeighborRecord {
                state: AgentState::new(AgentId(id), position, speed, 0)
                    .with_emergency(emergency)
                    .with_decoupled(decoupled),
                received_at,
            })
    }

    fn arb_self() -> impl Strategy<Value = SelfView> {
        (8u32..10, -500.0f64..500.0, 0.0f64..40.0, any::<bool>(), any::<bool>()).prop_map(
            |(id, position, speed, emergency_brake, decoupled)| SelfView {
                id: AgentId(id),
                position,
                speed,
                emergency_brake,
                decoupled,
            },
        )
    }

    fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::Follower),
            (1usize..6).prop_map(|target_size| Role::Leader { target_size }),
        ]
    }

    proptest! {
        #[test]
        fn prop_output_within_bounds(
            me in arb_self(),
            records in prop::collection::vec(arb_record(), 0..6),
            role in arb_role(),
        ) {
            let config = PlatoonConfig { role, ..PlatoonConfig::default() };
            let max_speed = config.max_speed;
            let speed = PlatoonController::new(config).decide(&me, &view(records), NOW);
            prop_assert!((0.0..=max_speed).contains(&speed));
        }

        #[test]
        fn prop_any_neighbor_emergency_stops(
            mut me in arb_self(),
            mut records in prop::collection::vec(arb_record(), 1..6),
            pick in any::<prop::sample::Index>(),
            role in arb_role(),
        ) {
            me.emergency_brake = false;
            // Ids may repeat; flag every copy so the surviving record brakes.
            let target = records[pick.index(records.len())].state.agent_id;
            for record in records.iter_mut().filter(|r| r.state.agent_id == target) {
                record.state.emergency_brake = true;
            }

            let config = PlatoonConfig { role, ..PlatoonConfig::default() };
            let decision = PlatoonController::new(config).evaluate(&me, &view(records), NOW);
            prop_assert_eq!(decision.target_speed, 0.0);
        }

        #[test]
        fn prop_self_emergency_stops(
            mut me in arb_self(),
            records in prop::collection::vec(arb_record(), 0..6),
            role in arb_role(),
        ) {
            me.emergency_brake = true;
            let config = PlatoonConfig { role, ..PlatoonConfig::default() };
            let decision = PlatoonController::new(config).evaluate(&me, &view(records), NOW);
            prop_assert_eq!(decision.target_speed, 0.0);
            prop_assert_eq!(decision.reason, DecisionReason::SelfEmergency);
        }

        #[test]
        fn prop_wider_gap_ahead_never_slows(
            speed in 0.0f64..30.0,
            ahead_speed in 0.0f64..30.0,
            gap in 0.0f64..150.0,
            extra in 0.0f64..50.0,
        ) {
            // Truck 1 sits between the leader (400 m ahead) and self.
            let controller = follower();
            let me = me(2, 0.0, speed);
            let near = view(vec![record(0, 400.0, 12.0), record(1, gap, ahead_speed)]);
            let far = view(vec![record(0, 400.0, 12.0), record(1, gap + extra, ahead_speed)]);

            let slow = controller.decide(&me, &near, NOW);
            let fast = controller.decide(&me, &far, NOW);
            prop_assert!(fast >= slow);
        }

        #[test]
        fn prop_leader_further_ahead_never_slows(
            speed in 0.0f64..30.0,
            leader_speed in 0.0f64..30.0,
            gap in 0.0f64..150.0,
            extra in 0.0f64..50.0,
        ) {
            let controller = follower();
            let me = me(1, 0.0, speed);
            let near = controller.decide(&me, &view(vec![record(0, gap, leader_speed)]), NOW);
            let far = controller.decide(&me, &view(vec![record(0, gap + extra, leader_speed)]), NOW);
            prop_assert!(far >= near);
        }
    }
}
