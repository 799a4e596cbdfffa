//! Simulated radio channel with fault injection.
//!
//! All trucks of a run share one [`BroadcastHub`]. A broadcast is copied
//! into the inbox of every other attached truck unless the link is
//! partitioned or the seeded loss roll drops it.

use async_trait::async_trait;
use convoy_env::{AgentId, AgentState, BroadcastTransport, EnvError, NetworkController};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Bernoulli, Distribution};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Delivery counters for one hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Copies attempted (one per receiver per broadcast)
    pub sent: u64,
    pub delivered: u64,
    pub dropped_loss: u64,
    pub dropped_partition: u64,
}

impl HubStats {
    /// Fraction of attempted copies lost to the loss roll.
    pub fn loss_rate(&self) -> f64 {
        self.dropped_loss as f64 / self.sent.max(1) as f64
    }
}

struct HubState {
    inboxes: BTreeMap<AgentId, VecDeque<AgentState>>,
    rng: ChaCha8Rng,
    stats: HubStats,
}

/// Shared broadcast medium.
pub struct BroadcastHub {
    state: Mutex<HubState>,
    controller: SimNetworkController,
}

impl BroadcastHub {
    /// Creates a hub whose loss decisions derive from `seed`.
    pub fn new(seed: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HubState {
                inboxes: BTreeMap::new(),
                rng: ChaCha8Rng::seed_from_u64(seed),
                stats: HubStats::default(),
            }),
            controller: SimNetworkController::new(),
        })
    }

    /// Registers `id` and returns its transport.
    pub fn attach(self: &Arc<Self>, id: AgentId) -> SimNetwork {
        lock(&self.state).inboxes.entry(id).or_default();
        SimNetwork {
            local_id: id,
            hub: Arc::clone(self),
        }
    }

    /// Fault injection handle.
    pub fn controller(&self) -> &SimNetworkController {
        &self.controller
    }

    pub fn stats(&self) -> HubStats {
        lock(&self.state).stats
    }

    fn deliver(&self, state: &AgentState) -> Result<usize, EnvError> {
        let from = state.agent_id;
        let mut hub = lock(&self.state);
        if !hub.inboxes.contains_key(&from) {
            return Err(EnvError::network(format!("{} is not attached to the hub", from)));
        }

        let receivers: Vec<AgentId> = hub.inboxes.keys().copied().filter(|id| *id != from).collect();
        for to in &receivers {
            hub.stats.sent += 1;
            if !self.controller.can_communicate(from, *to) {
                hub.stats.dropped_partition += 1;
                continue;
            }
            let loss = self.controller.get_loss(from, *to);
            let dropped = loss > 0.0
                && Bernoulli::new(loss)
                    .map(|roll| roll.sample(&mut hub.rng))
                    .unwrap_or(false);
            if dropped {
                hub.stats.dropped_loss += 1;
                continue;
            }
            if let Some(inbox) = hub.inboxes.get_mut(to) {
                inbox.push_back(*state);
            }
            hub.stats.delivered += 1;
        }
        Ok(receivers.len())
    }

    fn take(&self, id: AgentId) -> Option<AgentState> {
        lock(&self.state).inboxes.get_mut(&id).and_then(|inbox| inbox.pop_front())
    }
}

/// Simulated radio of one truck.
pub struct SimNetwork {
    local_id: AgentId,
    hub: Arc<BroadcastHub>,
}

#[async_trait]
impl BroadcastTransport for SimNetwork {
    async fn broadcast(&self, state: &AgentState) -> Result<usize, EnvError> {
        self.hub.deliver(state)
    }

    fn try_recv(&self) -> Option<AgentState> {
        self.hub.take(self.local_id)
    }

    fn local_id(&self) -> AgentId {
        self.local_id
    }
}

/// Network controller for fault injection.
pub struct SimNetworkController {
    /// Loss rate applied to links without an explicit entry
    default_loss: Mutex<f64>,

    /// Per-link packet loss rate (0.0 - 1.0)
    link_loss: Mutex<HashMap<(AgentId, AgentId), f64>>,

    /// Active partitions (nodes that cannot communicate)
    partitions: Mutex<Vec<(Vec<AgentId>, Vec<AgentId>)>>,
}

impl SimNetworkController {
    /// Creates a new network controller.
    pub fn new() -> Self {
        Self {
            default_loss: Mutex::new(0.0),
            link_loss: Mutex::new(HashMap::new()),
            partitions: Mutex::new(Vec::new()),
        }
    }

    /// Sets the loss rate of every link without its own setting.
    pub fn set_default_loss(&self, loss_rate: f64) {
        *lock(&self.default_loss) = sanitize(loss_rate);
    }

    /// Checks if two nodes can communicate (not partitioned).
    pub fn can_communicate(&self, from: AgentId, to: AgentId) -> bool {
        let partitions = lock(&self.partitions);

        for (group_a, group_b) in partitions.iter() {
            let from_in_a = group_a.contains(&from);
            let from_in_b = group_b.contains(&from);
            let to_in_a = group_a.contains(&to);
            let to_in_b = group_b.contains(&to);

            // Partitioned if one is in A and other in B (or vice versa)
            if (from_in_a && to_in_b) || (from_in_b && to_in_a) {
                return false;
            }
        }

        true
    }

    /// Gets the loss rate for a link.
    pub fn get_loss(&self, from: AgentId, to: AgentId) -> f64 {
        let explicit = lock(&self.link_loss).get(&(from, to)).copied();
        explicit.unwrap_or_else(|| *lock(&self.default_loss))
    }
}

fn sanitize(loss_rate: f64) -> f64 {
    if loss_rate.is_nan() {
        0.0
    } else {
        loss_rate.clamp(0.0, 1.0)
    }
}

impl NetworkController for SimNetworkController {
    fn partition(&self, group_a: &[AgentId], group_b: &[AgentId]) {
        lock(&self.partitions).push((group_a.to_vec(), group_b.to_vec()));
    }

    fn heal_all(&self) {
        lock(&self.partitions).clear();
    }

    fn set_link_loss(&self, from: AgentId, to: AgentId, loss_rate: f64) {
        lock(&self.link_loss).insert((from, to), sanitize(loss_rate));
    }
}

impl Default for SimNetworkController {
    fn default() -> Self {
        Self::new()
    }
}
