//! SimWorld - The simulation harness container.
//!
//! Owns the virtual clock, the shared radio hub, every truck and the
//! oracle. One [`SimWorld::step`] is one control period:
//!
//! ```text
//! advance clock -> fire due events -> per truck: drain inbox, control tick
//!               -> oracle check -> per truck: broadcast (when due)
//! ```
//!
//! Trucks are stepped in id order so a seed fully determines the run.

use crate::context::SimContext;
use crate::exporter::{SimExport, SimFrame};
use crate::network::{BroadcastHub, SimNetwork};
use crate::oracle::{FormationOracle, TruckSample};
use crate::scenarios::{ScenarioPlan, ScheduledEvent, SimAction};

use convoy_core::{PlatoonAgent, PlatoonConfig, SharedState, StatusReport};
use convoy_env::{AgentId, ConvoyContext, NetworkController};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Template for every truck; the role is set per id
    pub platoon: PlatoonConfig,

    /// Gaps below this are collisions (meters)
    pub min_separation: f64,

    /// Keep every n-th tick in the trace (default: 1)
    pub frame_interval: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            platoon: PlatoonConfig::default(),
            min_separation: 1.0,
            frame_interval: 1,
        }
    }
}

type SimAgent = PlatoonAgent<SimContext, SimNetwork>;

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    /// Radio channel shared by every truck
    pub hub: Arc<BroadcastHub>,

    /// Trucks in id order
    pub agents: Vec<Arc<SimAgent>>,

    /// Ground truth checks
    pub oracle: FormationOracle,

    pending: VecDeque<ScheduledEvent>,
    trace: SimExport,
    tick: u64,
    broadcast_every: u64,
}

impl SimWorld {
    /// Builds the fleet described by `plan`.
    pub fn new(config: SimConfig, plan: &ScenarioPlan) -> Self {
        let context = SimContext::shared(config.seed);
        let hub = BroadcastHub::new(config.seed.wrapping_mul(0x9e3779b97f4a7c15));

        let agents: Vec<Arc<SimAgent>> = plan
            .placement
            .iter()
            .enumerate()
            .map(|(index, &position)| {
                let id = AgentId(index as u32);
                let mut platoon = config.platoon.clone();
                platoon.role = if index == 0 {
                    convoy_core::Role::Leader { target_size: plan.fleet_size as usize }
                } else {
                    convoy_core::Role::Follower
                };
                let state = SharedState::new(id, position, &platoon);
                Arc::new(PlatoonAgent::with_state(
                    Arc::clone(&context),
                    Arc::new(hub.attach(id)),
                    platoon,
                    state,
                ))
            })
            .collect();

        let start: Vec<TruckSample> = agents.iter().map(|agent| sample(agent)).collect();
        let oracle = FormationOracle::new(&start, config.min_separation, config.platoon.max_speed);

        let tick_period = config.platoon.tick_period().as_secs_f64();
        let interval = config.platoon.broadcast_interval().as_secs_f64();
        let broadcast_every = ((interval / tick_period).round() as u64).max(1);

        Self {
            trace: SimExport::new(plan.scenario.name(), config.seed),
            pending: plan.events.iter().cloned().collect(),
            config,
            context,
            hub,
            agents,
            oracle,
            tick: 0,
            broadcast_every,
        }
    }

    /// Current virtual time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now_secs()
    }

    pub fn agent(&self, id: AgentId) -> Option<&Arc<SimAgent>> {
        self.agents.get(id.get() as usize)
    }

    /// Runs one control period.
    pub async fn step(&mut self) -> Vec<StatusReport> {
        let period = self.config.platoon.tick_period();
        self.context.advance_time(period);
        let dt = period.as_secs_f64();
        let now = self.time();

        while self.pending.front().is_some_and(|e| e.at <= now + 1e-9) {
            if let Some(event) = self.pending.pop_front() {
                self.apply(&event.action);
                self.trace.add_event(now, event.action.to_string());
            }
        }

        let reports: Vec<StatusReport> = self
            .agents
            .iter()
            .map(|agent| {
                agent.drain_inbox();
                agent.control_tick(dt)
            })
            .collect();

        let truth: Vec<TruckSample> = reports
            .iter()
            .map(|r| TruckSample { id: r.id, position: r.position, speed: r.speed })
            .collect();
        self.oracle.observe(now, &truth);

        if self.tick % self.broadcast_every == 0 {
            for agent in &self.agents {
                agent.broadcast_self().await;
            }
        }

        if self.tick % self.config.frame_interval.max(1) == 0 {
            self.trace.add_frame(SimFrame { time_sec: now, trucks: reports.clone() });
        }
        if self.tick % 20 == 0 {
            for report in &reports {
                debug!("t={:.2}s {}", now, report);
            }
        }
        self.tick += 1;
        reports
    }

    /// Steps until virtual time reaches `duration_secs`.
    pub async fn run_for(&mut self, duration_secs: f64) {
        let ticks = (duration_secs / self.config.platoon.tick_period().as_secs_f64()).round() as u64;
        for _ in 0..ticks {
            self.step().await;
        }
    }

    fn apply(&self, action: &SimAction) {
        info!("t={:.2}s event: {}", self.time(), action);
        let operator = |id: &AgentId| self.agent(*id).map(|agent| agent.operator());
        match action {
            SimAction::Emergency { id, engaged } => {
                if let Some(op) = operator(id) {
                    op.set_emergency(*engaged);
                }
            }
            SimAction::Decouple { id, decoupled } => {
                if let Some(op) = operator(id) {
                    op.set_decoupled(*decoupled);
                }
            }
            SimAction::Jam { id, jamming } => {
                if let Some(op) = operator(id) {
                    op.set_jamming(*jamming);
                }
            }
            SimAction::Partition { group_a, group_b } => {
                self.hub.controller().partition(group_a, group_b);
            }
            SimAction::Heal => self.hub.controller().heal_all(),
            SimAction::Loss(rate) => self.hub.controller().set_default_loss(*rate),
        }
    }

    /// Ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Consumes the world, returning the recorded trace.
    pub fn into_trace(self) -> (SimExport, crate::oracle::OracleReport, crate::network::HubStats) {
        let stats = self.hub.stats();
        (self.trace, self.oracle.into_report(), stats)
    }
}

fn sample(agent: &SimAgent) -> TruckSample {
    let state = agent.snapshot();
    TruckSample {
        id: state.id,
        position: state.kinematics.position(),
        speed: state.kinematics.speed(),
    }
}
