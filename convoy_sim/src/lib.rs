//! Convoy Deterministic Simulation Testing (DST) Harness
//!
//! This crate provides a controlled world where a whole convoy runs
//! deterministically on one thread.
//!
//! # Core Principle: The Reactor Pattern
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances one control period per step
//! - **Network**: In-memory broadcast hub with seeded loss and partitions
//! - **Scheduling**: Trucks are stepped in id order
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (Virtual Clock)                           │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼────┐              ┌────▼────┐                       │
//! │  │  Truck  │◄────────────►│  Truck  │     ...               │
//! │  │   T0    │ BroadcastHub │   T1    │                       │
//! │  └─────────┘              └─────────┘                       │
//! │       ▲                        ▲                            │
//! │       │                        │                            │
//! │  ┌────┴────────────────────────┴────┐                       │
//! │  │        FormationOracle           │                       │
//! │  │  (collisions, order, overspeed)  │                       │
//! │  └──────────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use convoy_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::Jamming)?;
//! assert!(result.passed);
//! ```

mod context;
mod world;
mod oracle;
mod network;
mod runner;
mod exporter;
pub mod scenarios;

pub use context::SimContext;
pub use world::{SimWorld, SimConfig};
pub use oracle::{FormationOracle, MAX_RECORDED_VIOLATIONS, OracleReport, TruckSample, Violation};
pub use network::{BroadcastHub, HubStats, SimNetwork, SimNetworkController};
pub use runner::{ScenarioRunner, ScenarioResult, SimError};
pub use exporter::{SimExport, SimFrame, SimEvent};
