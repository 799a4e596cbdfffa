//! Convoy Core - decentralized platoon keeping for autonomous trucks
//!
//! Every truck runs the same agent: it broadcasts its own state, keeps a
//! table of what it hears, and picks a target speed each tick from that
//! table alone. There is no coordinator.
//!
//! 1. **Stale data**: silent neighbors degrade to stopped obstacles, then vanish
//! 2. **Ordering**: rank is recomputed locally from positions every tick
//! 3. **Radio loss**: a failover cruises blind for a grace period, then stops

pub mod config;
pub mod kinematics;
pub mod neighbors;
pub mod rank;
pub mod controller;
pub mod failover;
pub mod state;
pub mod status;
pub mod agent_runtime;

// Re-export key types for convenience
pub use agent_runtime::{BroadcastOutcome, OperatorHandle, PlatoonAgent};
pub use config::{ConfigError, PlatoonConfig, Role, KMH_TO_MS};
pub use controller::{Decision, DecisionReason, PlatoonController, SelfView};
pub use failover::{FailoverCommand, FailoverState, JammingFailover};
pub use kinematics::KinematicModel;
pub use neighbors::{NeighborRecord, NeighborSnapshot, NeighborTable};
pub use rank::{RankInfo, RankedEntry};
pub use state::SharedState;
pub use status::{DriveMode, StatusReport};
