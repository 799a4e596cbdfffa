//! Scenario runner - executes chaos scenarios and checks their outcome.

use crate::exporter::{SimExport, SimFrame};
use crate::network::HubStats;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use convoy_core::{DecisionReason, DriveMode, StatusReport};
use convoy_env::AgentId;
use thiserror::Error;
use tracing::{info, warn};

/// Errors setting up a run.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("cannot start simulation runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("invalid platoon configuration: {0}")]
    Config(#[from] convoy_core::ConfigError),
}

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// One line per failed check
    pub failures: Vec<String>,

    /// Full per-tick record of the run
    pub trace: SimExport,
}

impl ScenarioResult {
    /// First failure, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failures.first().map(String::as_str)
    }
}

/// Runs chaos scenarios.
pub struct ScenarioRunner {
    config: SimConfig,

    /// Overrides the scenario's own duration
    duration_secs: Option<f64>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            config: SimConfig {
                seed,
                ..SimConfig::default()
            },
            duration_secs: None,
        }
    }

    /// Replaces the simulation configuration (the seed is kept).
    pub fn with_config(mut self, config: SimConfig) -> Self {
        let seed = self.config.seed;
        self.config = SimConfig { seed, ..config };
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn seed(&self) -> u64 {
        self.config.seed
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        self.config.platoon.validate()?;
        let plan = scenario.plan();
        let duration = self.duration_secs.unwrap_or(plan.duration_secs);
        info!(
            "Starting scenario: {} (seed={}, {} trucks, {:.0}s)",
            scenario.name(),
            self.config.seed,
            plan.fleet_size,
            duration
        );

        let runtime = tokio::runtime::Builder::new_current_thread().build()?;
        let mut world = SimWorld::new(self.config.clone(), &plan);
        runtime.block_on(world.run_for(duration));

        let total_ticks = world.ticks();
        let final_time_secs = world.time();
        let (mut trace, oracle, network) = world.into_trace();

        let mut failures = Vec::new();
        if let Some(first) = oracle.violations.first() {
            failures.push(format!(
                "oracle: {} violation(s), first {:?}",
                oracle.violation_count,
                first
            ));
        }
        // Shortened runs only get the safety check.
        if duration >= plan.duration_secs {
            let checks = Checks {
                trace: &trace,
                network,
                failures: &mut failures,
            };
            match scenario {
                ScenarioId::FormUp => checks.form_up(),
                ScenarioId::EmergencyStop => checks.emergency_stop(),
                ScenarioId::Decouple => checks.decouple(),
                ScenarioId::Jamming => checks.jamming(),
                ScenarioId::LostLeader => checks.lost_leader(),
                ScenarioId::Straggler => checks.straggler(),
                ScenarioId::PacketLoss => checks.packet_loss(),
            }
        }

        for failure in &failures {
            warn!("{}: {}", scenario.name(), failure);
        }
        trace.finalize(failures.clone(), oracle, network);

        Ok(ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed: failures.is_empty(),
            total_ticks,
            final_time_secs,
            failures,
            trace,
        })
    }
}

/// Post-run assertions over a trace.
struct Checks<'a> {
    trace: &'a SimExport,
    network: HubStats,
    failures: &'a mut Vec<String>,
}

const CRUISE: f64 = 50.0 / 3.6;

impl Checks<'_> {
    fn fail(&mut self, message: String) {
        self.failures.push(message);
    }

    fn truck_at(&mut self, time: f64, id: u32) -> Option<StatusReport> {
        let report = self
            .trace
            .frame_at(time)
            .and_then(|frame| frame.truck(AgentId(id)))
            .cloned();
        if report.is_none() {
            self.fail(format!("no record of T{} at {:.2}s", id, time));
        }
        report
    }

    fn last(&mut self) -> Option<SimFrame> {
        let frame = self.trace.last_frame().cloned();
        if frame.is_none() {
            self.fail("empty trace".to_string());
        }
        frame
    }

    fn expect_speed(&mut self, report: &StatusReport, check: impl Fn(f64) -> bool, what: &str) {
        if !check(report.speed) {
            self.fail(format!(
                "{} at {:.2}s: expected {}, speed {:.2} m/s",
                report.id, report.time, what, report.speed
            ));
        }
    }

    fn all_stopped_at(&mut self, time: f64) {
        if let Some(frame) = self.trace.frame_at(time).cloned() {
            for report in &frame.trucks {
                self.expect_speed(report, |v| v == 0.0, "standstill");
            }
        } else {
            self.fail(format!("no frame at {:.2}s", time));
        }
    }

    fn followers_advanced(&mut self, meters: f64) {
        let (Some(first), Some(last)) = (self.trace.frames.first().cloned(), self.last()) else {
            return;
        };
        for report in last.trucks.iter().skip(1) {
            let Some(start) = first.truck(report.id) else { continue };
            let travelled = report.position - start.position;
            if travelled < meters {
                self.fail(format!("{} only travelled {:.1} m", report.id, travelled));
            }
        }
    }

    fn leader_cruising_at_end(&mut self) {
        if let Some(leader) = self.last().and_then(|f| f.truck(AgentId(0)).cloned()) {
            self.expect_speed(&leader, |v| (v - CRUISE).abs() < 0.5, "cruise speed");
        }
    }

    fn form_up(mut self) {
        if let Some(leader) = self.truck_at(0.0, 0) {
            if !matches!(leader.reason, Some(DecisionReason::WaitingForPlatoon { .. })) {
                self.fail(format!("leader did not wait for the fleet: {:?}", leader.reason));
            }
        }
        self.leader_cruising_at_end();
        self.followers_advanced(100.0);
    }

    fn emergency_stop(mut self) {
        self.all_stopped_at(19.0);
        if let Some(frame) = self.trace.frame_at(19.0).cloned() {
            for report in &frame.trucks {
                let expected = if report.id == AgentId(2) {
                    matches!(report.reason, Some(DecisionReason::SelfEmergency))
                } else {
                    report.reason == Some(DecisionReason::GlobalEmergency { source: AgentId(2) })
                };
                if !expected {
                    self.fail(format!("{} stopped for {:?}", report.id, report.reason));
                }
            }
        }
        if let Some(leader) = self.last().and_then(|f| f.truck(AgentId(0)).cloned()) {
            self.expect_speed(&leader, |v| v > 5.0, "convoy moving again");
        }
    }

    fn decouple(mut self) {
        let Some(last) = self.last() else { return };
        let (Some(t0), Some(t1)) = (last.truck(AgentId(0)), last.truck(AgentId(1))) else {
            self.fail("missing trucks in final frame".to_string());
            return;
        };
        if !t1.decoupled {
            self.fail("T1 does not report decoupled".to_string());
        }
        let gap = t0.position - t1.position;
        if gap < 45.0 {
            self.fail(format!("gap behind T0 only {:.1} m after decoupling", gap));
        }
    }

    fn jamming(mut self) {
        if let Some(t2) = self.truck_at(10.5, 2) {
            if t2.mode != DriveMode::BlindCruise {
                self.fail(format!("T2 not cruising blind at 10.5s: {:?}", t2.mode));
            }
        }

        let stopping: Vec<f64> = self
            .trace
            .frames
            .iter()
            .filter(|f| f.time_sec < 20.0)
            .filter_map(|f| f.truck(AgentId(2)))
            .filter(|r| r.mode == DriveMode::ForcedStop)
            .map(|r| r.speed)
            .collect();
        if stopping.is_empty() {
            self.fail("T2 never entered forced stop".to_string());
        } else if !stopping.windows(2).all(|w| w[1] <= w[0]) {
            self.fail("T2 speed increased during forced stop".to_string());
        } else if stopping.last() != Some(&0.0) {
            self.fail("T2 not at standstill before jamming cleared".to_string());
        }

        self.all_stopped_at(19.0);
        if let Some(leader) = self.last().and_then(|f| f.truck(AgentId(0)).cloned()) {
            self.expect_speed(&leader, |v| v > 5.0, "convoy moving again");
        }
    }

    fn lost_leader(mut self) {
        self.all_stopped_at(19.0);
        let Some(last) = self.last() else { return };
        for report in last.trucks.iter().take(2) {
            self.expect_speed(report, |v| v == 0.0, "standstill");
        }
        if let Some(t0) = last.truck(AgentId(0)) {
            if !matches!(t0.reason, Some(DecisionReason::WaitingForPlatoon { present: 1, .. })) {
                self.fail(format!("T0 should be alone and waiting: {:?}", t0.reason));
            }
        }
        if let Some(t1) = last.truck(AgentId(1)) {
            if t1.reason != Some(DecisionReason::NoLeaderReference) {
                self.fail(format!("T1 should have lost its leader: {:?}", t1.reason));
            }
        }
    }

    fn straggler(mut self) {
        if let Some(leader) = self.truck_at(2.0, 0) {
            if !matches!(leader.reason, Some(DecisionReason::WaitingForStraggler { .. })) {
                self.fail(format!("leader did not wait for T1: {:?}", leader.reason));
            }
            self.expect_speed(&leader, |v| v == 0.0, "standstill");
        }
        let Some(last) = self.last() else { return };
        let (Some(t0), Some(t1)) = (last.truck(AgentId(0)), last.truck(AgentId(1))) else {
            self.fail("missing trucks in final frame".to_string());
            return;
        };
        let gap = t0.position - t1.position;
        if gap > 60.0 {
            self.fail(format!("T1 still {:.1} m behind the leader", gap));
        }
        self.expect_speed(t0, |v| v > 10.0, "leader under way");
    }

    fn packet_loss(mut self) {
        let rate = self.network.loss_rate();
        if !(0.25..=0.35).contains(&rate) {
            self.fail(format!("unexpected loss rate {:.1}%", rate * 100.0));
        }
        self.leader_cruising_at_end();
        self.followers_advanced(100.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(scenario: ScenarioId) -> ScenarioResult {
        ScenarioRunner::new(42).run(scenario).unwrap()
    }

    fn assert_passed(result: &ScenarioResult) {
        assert!(
            result.passed,
            "{} failed: {:?}",
            result.scenario,
            result.failures
        );
        assert!(result.trace.oracle.is_clean());
    }

    #[test]
    fn test_form_up_scenario() {
        let result = run(ScenarioId::FormUp);
        assert_passed(&result);
        assert_eq!(result.total_ticks, 600);
    }

    #[test]
    fn test_emergency_stop_scenario() {
        assert_passed(&run(ScenarioId::EmergencyStop));
    }

    #[test]
    fn test_decouple_scenario() {
        assert_passed(&run(ScenarioId::Decouple));
    }

    #[test]
    fn test_jamming_scenario() {
        let result = run(ScenarioId::Jamming);
        assert_passed(&result);
        assert_eq!(result.trace.events.len(), 2);
    }

    #[test]
    fn test_lost_leader_scenario() {
        assert_passed(&run(ScenarioId::LostLeader));
    }

    #[test]
    fn test_straggler_scenario() {
        assert_passed(&run(ScenarioId::Straggler));
    }

    #[test]
    fn test_packet_loss_scenario() {
        let result = run(ScenarioId::PacketLoss);
        assert_passed(&result);
        assert!(result.trace.network.dropped_loss > 0);
    }

    #[test]
    fn test_same_seed_same_run() {
        let a = ScenarioRunner::new(7).run(ScenarioId::PacketLoss).unwrap();
        let b = ScenarioRunner::new(7).run(ScenarioId::PacketLoss).unwrap();

        assert_eq!(a.trace.network, b.trace.network);
        let positions = |r: &ScenarioResult| -> Vec<f64> {
            r.trace.last_frame().unwrap().trucks.iter().map(|t| t.position).collect()
        };
        assert_eq!(positions(&a), positions(&b));
    }

    #[test]
    fn test_short_run_only_checks_safety() {
        let result = ScenarioRunner::new(42)
            .with_duration(1.0)
            .run(ScenarioId::Jamming)
            .unwrap();
        assert_passed(&result);
        assert_eq!(result.total_ticks, 20);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = SimConfig::default();
        config.platoon.max_decel = 0.0;
        let runner = ScenarioRunner::new(1).with_config(config);
        assert!(matches!(runner.run(ScenarioId::FormUp), Err(SimError::Config(_))));
    }
}
