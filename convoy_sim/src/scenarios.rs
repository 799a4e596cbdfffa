//! Chaos scenarios for the convoy simulator.

use convoy_core::KinematicModel;
use convoy_env::AgentId;
use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// CV-001: Leader waits for the fleet, then everyone forms up at cruise
    FormUp,

    /// CV-002: One truck brakes, the whole convoy stops, then resumes
    EmergencyStop,

    /// CV-003: A truck decouples and the gap behind the truck ahead of it doubles
    Decouple,

    /// CV-004: A truck loses its radio: blind cruise, forced stop, recovery
    Jamming,

    /// CV-005: The leader drops off the channel for good
    LostLeader,

    /// CV-006: The first follower starts far behind; the leader waits for it
    Straggler,

    /// CV-007: 30% packet loss on every link
    PacketLoss,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::FormUp,
            ScenarioId::EmergencyStop,
            ScenarioId::Decouple,
            ScenarioId::Jamming,
            ScenarioId::LostLeader,
            ScenarioId::Straggler,
            ScenarioId::PacketLoss,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::FormUp => "form_up",
            ScenarioId::EmergencyStop => "emergency_stop",
            ScenarioId::Decouple => "decouple",
            ScenarioId::Jamming => "jamming",
            ScenarioId::LostLeader => "lost_leader",
            ScenarioId::Straggler => "straggler",
            ScenarioId::PacketLoss => "packet_loss",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::FormUp => "4 trucks, leader waits for the fleet then cruises at 50 km/h",
            ScenarioId::EmergencyStop => "T2 brakes at 10s and releases at 20s, convoy halts and resumes",
            ScenarioId::Decouple => "T1 decouples at 10s, gap T0-T1 opens to 60 m",
            ScenarioId::Jamming => "T2 jammed from 10s to 20s, blind cruise then forced stop",
            ScenarioId::LostLeader => "T0 partitioned away at 10s, followers halt and forget it",
            ScenarioId::Straggler => "T1 starts 350 m behind, leader holds until it closes in",
            ScenarioId::PacketLoss => "30% loss on all links, formation stays safe",
        }
    }

    /// Returns the run plan for this scenario.
    pub fn plan(&self) -> ScenarioPlan {
        use SimAction::*;

        let t = AgentId;
        match self {
            ScenarioId::FormUp => ScenarioPlan::line(*self, 4, 30.0),
            ScenarioId::EmergencyStop => ScenarioPlan::line(*self, 4, 30.0)
                .at(10.0, Emergency { id: t(2), engaged: true })
                .at(20.0, Emergency { id: t(2), engaged: false }),
            ScenarioId::Decouple => ScenarioPlan::line(*self, 3, 30.0)
                .at(10.0, Decouple { id: t(1), decoupled: true }),
            ScenarioId::Jamming => ScenarioPlan::line(*self, 4, 30.0)
                .at(10.0, Jam { id: t(2), jamming: true })
                .at(20.0, Jam { id: t(2), jamming: false }),
            ScenarioId::LostLeader => ScenarioPlan::line(*self, 3, 25.0).at(
                10.0,
                Partition {
                    group_a: vec![t(0)],
                    group_b: vec![t(1), t(2)],
                },
            ),
            ScenarioId::Straggler => {
                let mut plan = ScenarioPlan::line(*self, 3, 40.0);
                plan.placement = vec![0.0, -350.0, -380.0];
                plan
            }
            ScenarioId::PacketLoss => ScenarioPlan::line(*self, 4, 30.0).at(0.0, Loss(0.3)),
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "form_up" | "formup" | "cv-001" => Ok(ScenarioId::FormUp),
            "emergency_stop" | "emergency" | "cv-002" => Ok(ScenarioId::EmergencyStop),
            "decouple" | "cv-003" => Ok(ScenarioId::Decouple),
            "jamming" | "jam" | "cv-004" => Ok(ScenarioId::Jamming),
            "lost_leader" | "lostleader" | "cv-005" => Ok(ScenarioId::LostLeader),
            "straggler" | "cv-006" => Ok(ScenarioId::Straggler),
            "packet_loss" | "packetloss" | "cv-007" => Ok(ScenarioId::PacketLoss),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

/// A fault or operator input injected at a point in virtual time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimAction {
    Emergency { id: AgentId, engaged: bool },
    Decouple { id: AgentId, decoupled: bool },
    Jam { id: AgentId, jamming: bool },
    Partition { group_a: Vec<AgentId>, group_b: Vec<AgentId> },
    Heal,
    /// Loss rate on every link
    Loss(f64),
}

impl std::fmt::Display for SimAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimAction::Emergency { id, engaged } => {
                write!(f, "{} emergency brake {}", id, if *engaged { "on" } else { "off" })
            }
            SimAction::Decouple { id, decoupled } => {
                write!(f, "{} {}", id, if *decoupled { "decouples" } else { "couples" })
            }
            SimAction::Jam { id, jamming } => {
                write!(f, "{} jamming {}", id, if *jamming { "on" } else { "off" })
            }
            SimAction::Partition { group_a, group_b } => {
                write!(f, "partition {:?} | {:?}", group_a, group_b)
            }
            SimAction::Heal => write!(f, "heal all partitions"),
            SimAction::Loss(rate) => write!(f, "link loss {:.0}%", rate * 100.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledEvent {
    /// Virtual time (seconds) at or after which the action fires
    pub at: f64,
    pub action: SimAction,
}

/// Everything needed to set up and drive one run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioPlan {
    pub scenario: ScenarioId,

    /// Trucks `T0..T{n-1}`; `T0` leads
    pub fleet_size: u32,
    pub duration_secs: f64,

    /// Starting position per truck id
    pub placement: Vec<f64>,

    /// Sorted by `at`
    pub events: Vec<ScheduledEvent>,
}

impl ScenarioPlan {
    /// Trucks on their default slots, `-(id * 30 m)`.
    pub fn line(scenario: ScenarioId, fleet_size: u32, duration_secs: f64) -> Self {
        Self {
            scenario,
            fleet_size,
            duration_secs,
            placement: (0..fleet_size)
                .map(|i| KinematicModel::starting_position(i, 30.0))
                .collect(),
            events: Vec::new(),
        }
    }

    /// Adds an event, keeping the list sorted.
    pub fn at(mut self, at: f64, action: SimAction) -> Self {
        let index = self.events.partition_point(|e| e.at <= at);
        self.events.insert(index, ScheduledEvent { at, action });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
        }
        assert_eq!("CV-004".parse::<ScenarioId>(), Ok(ScenarioId::Jamming));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_plans_are_consistent() {
        for id in ScenarioId::all() {
            let plan = id.plan();
            assert_eq!(plan.placement.len(), plan.fleet_size as usize, "{}", id);
            assert!(plan.events.windows(2).all(|w| w[0].at <= w[1].at), "{}", id);
            assert!(plan.events.iter().all(|e| e.at < plan.duration_secs), "{}", id);
        }
    }

    #[test]
    fn test_events_stay_sorted() {
        let plan = ScenarioPlan::line(ScenarioId::FormUp, 2, 10.0)
            .at(5.0, SimAction::Heal)
            .at(1.0, SimAction::Loss(0.1));
        assert_eq!(plan.events[0].at, 1.0);
        assert_eq!(plan.events[1].at, 5.0);
    }
}
