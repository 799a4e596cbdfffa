//! Neighbor table and ghost filter.
//!
//! The table keeps the last state heard from every other truck together
//! with the local time it arrived. Three age bands drive how the control
//! tick sees a neighbor:
//!
//! ```text
//!  age:  0 ........ stale_after ........ evict_after ........>
//!        |  fresh    |   ghost             |   evicted
//!        |  as sent  |   speed=0, braking  |   gone
//! ```
//!
//! A ghost keeps its last known position so the controller can still reason
//! about where it was, but it is presented as a stopped, braking obstacle.
//! The ghost view is a copy; the stored record is never modified.

use convoy_env::{AgentId, AgentState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Last message from a neighbor plus its local receipt time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeighborRecord {
    /// State as broadcast by the neighbor
    pub state: AgentState,

    /// Local clock (seconds) when the state arrived
    pub received_at: f64,
}

impl NeighborRecord {
    /// Seconds elapsed since receipt.
    pub fn age(&self, now: f64) -> f64 {
        now - self.received_at
    }
}

/// All neighbors heard recently, keyed by id.
#[derive(Debug, Clone)]
pub struct NeighborTable {
    local_id: AgentId,
    records: BTreeMap<AgentId, NeighborRecord>,
}

impl NeighborTable {
    /// Creates an empty table owned by `local_id`.
    pub fn new(local_id: AgentId) -> Self {
        Self {
            local_id,
            records: BTreeMap::new(),
        }
    }

    /// Stores `state` as the latest record for its sender.
    ///
    /// Last write wins: duplicates and out-of-order arrivals simply
    /// overwrite. A state carrying our own id is ignored and `false` is
    /// returned.
    pub fn upsert(&mut self, state: AgentState, now: f64) -> bool {
        if state.agent_id == self.local_id {
            debug!("{} ignoring echo of own state", self.local_id);
            return false;
        }
        self.records.insert(
            state.agent_id,
            NeighborRecord {
                state,
                received_at: now,
            },
        );
        true
    }

    /// Removes every record older than `evict_after` seconds.
    ///
    /// Returns the evicted ids in ascending order.
    pub fn evict_older_than(&mut self, now: f64, evict_after: f64) -> Vec<AgentId> {
        let expired: Vec<AgentId> = self
            .records
            .iter()
            .filter(|(_, record)| record.age(now) > evict_after)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(record) = self.records.remove(id) {
                warn!(
                    "[{}] removing ghost truck {} (silent for {:.1}s)",
                    self.local_id,
                    id,
                    record.age(now)
                );
            }
        }
        expired
    }

    /// Builds the control-time view of the table.
    ///
    /// Records with `age <= stale_after` pass through unchanged; records
    /// with `stale_after < age <= evict_after` are reported as stopped and
    /// braking; anything older is left out.
    pub fn ghost_snapshot(&self, now: f64, stale_after: f64, evict_after: f64) -> NeighborSnapshot {
        let mut snapshot = NeighborSnapshot::default();

        for (id, record) in &self.records {
            let age = record.age(now);
            if age > evict_after {
                continue;
            }

            let mut view = *record;
            if age > stale_after {
                view.state.speed = 0.0;
                view.state.emergency_brake = true;
                snapshot.ghosts.push(*id);
                debug!("[{}] ghost detected: {} (age {:.1}s)", self.local_id, id, age);
            }
            snapshot.records.insert(*id, view);
        }
        snapshot
    }

    /// Returns the stored record for `id`.
    pub fn get(&self, id: AgentId) -> Option<&NeighborRecord> {
        self.records.get(&id)
    }

    /// Iterates over stored records in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&AgentId, &NeighborRecord)> {
        self.records.iter()
    }

    /// Number of stored neighbors.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no neighbor is stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Id of the truck owning this table.
    pub fn local_id(&self) -> AgentId {
        self.local_id
    }
}

/// Read-only neighbor view handed to the controller for one tick.
#[derive(Debug, Clone, Default)]
pub struct NeighborSnapshot {
    records: BTreeMap<AgentId, NeighborRecord>,
    ghosts: Vec<AgentId>,
}

impl NeighborSnapshot {
    /// Builds a snapshot directly from records (no ghosting applied).
    pub fn from_records(records: impl IntoIterator<Item = NeighborRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.state.agent_id, record))
                .collect(),
            ghosts: Vec::new(),
        }
    }

    /// Returns the record for `id`.
    pub fn get(&self, id: AgentId) -> Option<&NeighborRecord> {
        self.records.get(&id)
    }

    /// Iterates over records in id order.
    pub fn records(&self) -> impl Iterator<Item = &NeighborRecord> {
        self.records.values()
    }

    /// Number of neighbors in view.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no neighbor is in view.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids that were degraded to ghosts, ascending.
    pub fn ghosts(&self) -> &[AgentId] {
        &self.ghosts
    }
}
