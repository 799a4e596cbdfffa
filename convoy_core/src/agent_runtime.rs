//! Agent Runtime - runs one truck against an environment context.
//!
//! This module wires the pure pieces (neighbor table, controller, failover,
//! kinematics) to the environment abstraction (`ConvoyContext`) and the
//! radio (`BroadcastTransport`).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       PlatoonAgent                           │
//! │                                                              │
//! │  communication task            control task                  │
//! │  ┌────────────────────┐        ┌──────────────────────────┐  │
//! │  │ drain try_recv()   │        │ evict / ghost snapshot   │  │
//! │  │ build AgentState   │        │ failover or controller   │  │
//! │  │ broadcast (unless  │        │ kinematics update        │  │
//! │  │   jamming)         │        │ status report            │  │
//! │  └─────────┬──────────┘        └────────────┬─────────────┘  │
//! │            └──────── Mutex<SharedState> ────┘                │
//! │                            ▲                                 │
//! │                     OperatorHandle (b / d / j)               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The lock is only taken for short synchronous sections and is never held
//! across an `.await`.
//!
//! # Usage
//!
//! ```ignore
//! use convoy_core::agent_runtime::PlatoonAgent;
//! use convoy_core::PlatoonConfig;
//! use convoy_env::TokioContext;
//!
//! let agent = PlatoonAgent::new(TokioContext::shared(), transport, PlatoonConfig::leader(3));
//! agent.spawn_tasks();
//! agent.operator().toggle_emergency();
//! ```

use crate::config::PlatoonConfig;
use crate::controller::{DecisionReason, PlatoonController};
use crate::failover::FailoverCommand;
use crate::state::SharedState;
use crate::status::StatusReport;
use convoy_env::{AgentId, BroadcastTransport, ConvoyContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

fn lock_state(state: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    // Every critical section leaves the state consistent, so a panic in
    // another holder does not invalidate it.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Result of one broadcast attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Handed to this many peers
    Sent(usize),
    /// Radio is jammed; nothing left the truck
    Suppressed,
    /// Transport reported a local failure
    Failed,
}

/// Operator controls for one truck.
///
/// Cheap to clone; every call takes the state lock briefly.
#[derive(Debug, Clone)]
pub struct OperatorHandle {
    id: AgentId,
    state: Arc<Mutex<SharedState>>,
}

impl OperatorHandle {
    /// Flips the emergency brake and returns the new value.
    pub fn toggle_emergency(&self) -> bool {
        let engaged = {
            let mut state = lock_state(&self.state);
            state.emergency_brake = !state.emergency_brake;
            state.emergency_brake
        };
        if engaged {
            warn!("[{}] !!! BRAKING !!!", self.id);
        } else {
            info!("[{}] >>> RESUMING", self.id);
        }
        engaged
    }

    /// Flips the decoupled flag and returns the new value.
    pub fn toggle_decoupled(&self) -> bool {
        let decoupled = {
            let mut state = lock_state(&self.state);
            state.decoupled = !state.decoupled;
            state.decoupled
        };
        info!("[{}] >>> {}", self.id, if decoupled { "DECOUPLING" } else { "COUPLING" });
        decoupled
    }

    /// Flips the simulated radio failure and returns the new value.
    pub fn toggle_jamming(&self) -> bool {
        let jamming = {
            let mut state = lock_state(&self.state);
            state.jamming = !state.jamming;
            state.jamming
        };
        warn!("[{}] >>> JAMMING {}", self.id, if jamming { "ON" } else { "OFF" });
        jamming
    }

    pub fn set_emergency(&self, engaged: bool) {
        lock_state(&self.state).emergency_brake = engaged;
    }

    pub fn set_decoupled(&self, decoupled: bool) {
        lock_state(&self.state).decoupled = decoupled;
    }

    pub fn set_jamming(&self, jamming: bool) {
        lock_state(&self.state).jamming = jamming;
    }
}

/// One truck of the convoy.
///
/// Generic over the context and transport, so the same agent runs on tokio
/// with UDP in production and on a virtual clock with an in-memory hub in
/// simulation.
pub struct PlatoonAgent<Ctx, Net>
where
    Ctx: ConvoyContext,
    Net: BroadcastTransport,
{
    id: AgentId,
    context: Arc<Ctx>,
    network: Arc<Net>,
    controller: PlatoonController,
    state: Arc<Mutex<SharedState>>,
    running: AtomicBool,

    /// Emit an `info` status line every this many ticks (0 disables)
    status_every: u64,
}

impl<Ctx, Net> PlatoonAgent<Ctx, Net>
where
    Ctx: ConvoyContext,
    Net: BroadcastTransport,
{
    /// Creates an agent at its default starting slot, `-(id * base_gap)`.
    pub fn new(context: Arc<Ctx>, network: Arc<Net>, config: PlatoonConfig) -> Self {
        let id = network.local_id();
        let state = SharedState::at_starting_slot(id, &config);
        Self::with_state(context, network, config, state)
    }

    /// Creates an agent from a prepared state.
    pub fn with_state(
        context: Arc<Ctx>,
        network: Arc<Net>,
        config: PlatoonConfig,
        state: SharedState,
    ) -> Self {
        Self {
            id: network.local_id(),
            context,
            network,
            controller: PlatoonController::new(config),
            state: Arc::new(Mutex::new(state)),
            running: AtomicBool::new(true),
            status_every: 0,
        }
    }

    /// Logs the status line at `info` every `ticks` control ticks.
    pub fn with_status_interval(mut self, ticks: u64) -> Self {
        self.status_every = ticks;
        self
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn config(&self) -> &PlatoonConfig {
        self.controller.config()
    }

    pub fn operator(&self) -> OperatorHandle {
        OperatorHandle {
            id: self.id,
            state: Arc::clone(&self.state),
        }
    }

    /// Copy of the shared state.
    pub fn snapshot(&self) -> SharedState {
        lock_state(&self.state).clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Asks both loops to exit after their current cycle.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Runs one control cycle of `dt` seconds.
    pub fn control_tick(&self, dt: f64) -> StatusReport {
        let config = self.controller.config();
        let now = self.context.now_secs();

        let (report, previous, evicted) = {
            let mut state = lock_state(&self.state);
            let evicted = state.neighbors.evict_older_than(now, config.evict_after);
            let previous = state.last_reason;

            let jamming = state.jamming;
            let mut ghosts = 0;
            let (target, reason) = match state.failover.step(jamming, dt) {
                FailoverCommand::Resume => {
                    let snapshot =
                        state
                            .neighbors
                            .ghost_snapshot(now, config.stale_after, config.evict_after);
                    ghosts = snapshot.ghosts().len();
                    let decision = self.controller.evaluate(&state.self_view(), &snapshot, now);
                    (decision.target_speed, Some(decision.reason))
                }
                // The operator brake still wins over blind cruise.
                FailoverCommand::Cruise(_) if state.emergency_brake => (0.0, None),
                FailoverCommand::Cruise(speed) => (speed, None),
                FailoverCommand::Stop => (0.0, None),
            };

            state.kinematics.update(target, dt);
            state.last_target = target;
            state.last_reason = reason;
            (StatusReport::capture(&state, now, ghosts), previous, evicted.len())
        };

        if evicted > 0 {
            debug!("[{}] {} neighbor(s) evicted this tick", self.id, evicted);
        }
        if let Some(reason) = &report.reason {
            if !previous.is_some_and(|p| p.same_kind(reason)) {
                info!("[{}] decision: {}", self.id, describe(reason));
            }
        }
        debug!("{}", report);
        report
    }

    /// Control loop: one tick per `tick_period`, `dt` measured on the context clock.
    pub async fn run_control(&self) {
        let period = self.config().tick_period();
        let mut last = self.context.now();
        let mut ticks: u64 = 0;

        info!("[{}] control loop started at {} Hz", self.id, self.config().tick_rate_hz);
        while self.is_running() {
            self.context.sleep(period).await;
            let now = self.context.now();
            let dt = now.saturating_sub(last).as_secs_f64();
            last = now;

            let report = self.control_tick(dt);
            ticks += 1;
            if self.status_every > 0 && ticks % self.status_every == 0 {
                info!("{}", report);
            }
        }
        info!("[{}] control loop stopped after {} ticks", self.id, ticks);
    }

    /// Moves every queued inbound state into the neighbor table.
    pub fn drain_inbox(&self) -> usize {
        let mut received = 0;
        while let Some(state) = self.network.try_recv() {
            let now = self.context.now_secs();
            if lock_state(&self.state).neighbors.upsert(state, now) {
                received += 1;
            }
        }
        received
    }

    /// Broadcasts the current state unless the radio is jammed.
    pub async fn broadcast_self(&self) -> BroadcastOutcome {
        let timestamp = self.context.unix_secs();
        let (message, jamming) = {
            let state = lock_state(&self.state);
            (state.outgoing(timestamp), state.jamming)
        };
        if jamming {
            return BroadcastOutcome::Suppressed;
        }

        match self.network.broadcast(&message).await {
            Ok(peers) => BroadcastOutcome::Sent(peers),
            Err(e) => {
                warn!("[{}] broadcast failed: {}", self.id, e);
                BroadcastOutcome::Failed
            }
        }
    }

    /// Communication loop: drain, broadcast, sleep.
    pub async fn run_communication(&self) {
        let interval = self.config().broadcast_interval();
        info!("[{}] communication loop started every {:?}", self.id, interval);
        while self.is_running() {
            self.drain_inbox();
            self.broadcast_self().await;
            self.context.sleep(interval).await;
        }
        info!("[{}] communication loop stopped", self.id);
    }

    /// Spawns the communication and control loops on the context.
    pub fn spawn_tasks(self: &Arc<Self>) {
        let comm = Arc::clone(self);
        self.context.spawn(&format!("{}-comm", self.id), async move {
            comm.run_communication().await;
        });

        let control = Arc::clone(self);
        self.context.spawn(&format!("{}-control", self.id), async move {
            control.run_control().await;
        });
    }
}

fn describe(reason: &DecisionReason) -> String {
    match reason {
        DecisionReason::SelfEmergency => "emergency brake engaged".to_string(),
        DecisionReason::WaitingForPlatoon { present, target } => {
            format!("waiting for platoon ({}/{})", present, target)
        }
        DecisionReason::GlobalEmergency { source } => format!("emergency signalled by {}", source),
        DecisionReason::WaitingForStraggler { gap } => {
            format!("waiting for straggler {:.1} m behind", gap)
        }
        DecisionReason::LeaderCruise => "leading at cruise speed".to_string(),
        DecisionReason::NoLeaderReference => "no leader in view, holding".to_string(),
        DecisionReason::CollisionAvoidance { gap, required } => {
            format!("too close: gap {:.1} m < {:.1} m", gap, required)
        }
        DecisionReason::Following { rank, .. } => format!("following at rank {}", rank),
    }
}
