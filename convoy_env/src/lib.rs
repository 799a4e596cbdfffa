//! Convoy Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the platoon
//! controller to run in both **Production** (tokio + UDP) and **Simulation**
//! (virtual clock + in-memory broadcast hub) environments.
//!
//! # Core Concept
//!
//! Everything the control algorithm needs from the outside world goes
//! through two traits:
//! - Time and task spawning (`ConvoyContext::now()`, `sleep()`, `spawn()`)
//! - Best-effort broadcast (`BroadcastTransport::broadcast()`, `try_recv()`)
//!
//! Because "now" is always injected, every decision the controller makes is
//! reproducible from the inputs alone.
//!
//! # Example
//!
//! ```ignore
//! use convoy_env::{ConvoyContext, BroadcastTransport};
//!
//! async fn comms_loop<Ctx: ConvoyContext, Net: BroadcastTransport>(
//!     ctx: &Ctx,
//!     net: &Net,
//! ) {
//!     loop {
//!         while let Some(state) = net.try_recv() {
//!             handle_state(state);
//!         }
//!         ctx.sleep(Duration::from_millis(50)).await;
//!     }
//! }
//! ```

mod context;
mod network;
mod types;
mod error;
mod tokio_impl;
mod udp;
pub mod wire;

pub use context::ConvoyContext;
pub use network::{BroadcastTransport, NetworkController};
pub use types::{AgentId, AgentState};
pub use error::{EnvError, WireError};
pub use tokio_impl::TokioContext;
pub use udp::{UdpConfig, UdpTransport};
