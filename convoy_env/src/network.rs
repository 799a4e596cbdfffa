//! Broadcast transport abstraction for Convoy agents.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{AgentId, AgentState};

/// Abstraction for the shared radio channel between trucks.
///
/// # Implementations
///
/// - **Production**: `UdpTransport` - one UDP port per truck
/// - **Simulation**: in-memory hub with configurable loss and partitions
///
/// # Delivery Semantics
///
/// ```text
/// Truck A                    Channel                    Truck B
///   |                           |                          |
///   |-- broadcast(state) ------>|                          |
///   |                           |-- [may drop/reorder] --->|
///   |                           |                          |-- try_recv() -> state
/// ```
///
/// At-most-once, unordered, no flow control. A sender never receives its
/// own broadcast.
#[async_trait]
pub trait BroadcastTransport: Send + Sync + 'static {
    /// Sends this truck's state to every other known truck.
    ///
    /// # Returns
    /// * `Ok(n)` - Number of peers the state was handed to
    /// * `Err(EnvError)` - Immediate local failure (socket error, hub closed)
    ///
    /// # Note
    /// Success does not guarantee delivery.
    async fn broadcast(&self, state: &AgentState) -> Result<usize, EnvError>;

    /// Returns one pending inbound state, if any.
    ///
    /// Never blocks: `None` means nothing is queued right now.
    fn try_recv(&self) -> Option<AgentState>;

    /// Returns this truck's ID.
    fn local_id(&self) -> AgentId;
}

/// Marker trait for network controllers in simulation.
///
/// Allows injecting faults like partitions and packet loss.
pub trait NetworkController: Send + Sync {
    /// Creates a network partition between two node sets.
    fn partition(&self, group_a: &[AgentId], group_b: &[AgentId]);

    /// Heals all partitions.
    fn heal_all(&self);

    /// Sets packet loss probability for a link (0.0 - 1.0).
    fn set_link_loss(&self, from: AgentId, to: AgentId, loss_rate: f64);
}
