//! Rank resolution.
//!
//! Orders every known truck by position, most advanced first. Rank 0 is the
//! front of the convoy. Equal positions are broken by ascending id so every
//! truck with the same view computes the same order.

use crate::neighbors::NeighborSnapshot;
use convoy_env::AgentId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One truck in the position-sorted order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub agent_id: AgentId,
    pub position: f64,
    pub decoupled: bool,
}

/// Where the local truck sits in the convoy.
#[derive(Debug, Clone, PartialEq)]
pub struct RankInfo {
    /// 0-based rank of the local truck
    pub my_rank: usize,

    /// Decoupled trucks strictly ahead, plus one if self is decoupled
    pub extra_gap_units: u32,

    /// Truck at `my_rank - 1`
    pub ahead: Option<AgentId>,

    /// Truck at `my_rank + 1`
    pub behind: Option<AgentId>,

    /// Full order, rank 0 first
    pub order: Vec<RankedEntry>,
}

impl RankInfo {
    /// Entry at rank 0.
    pub fn front(&self) -> Option<&RankedEntry> {
        self.order.first()
    }

    /// Entry directly behind the local truck.
    pub fn behind_entry(&self) -> Option<&RankedEntry> {
        self.order.get(self.my_rank + 1)
    }
}

/// Position-descending order with deterministic tie-break.
///
/// NaN positions sort behind every real position.
fn front_first(a: &RankedEntry, b: &RankedEntry) -> Ordering {
    match (a.position.is_nan(), b.position.is_nan()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => b
            .position
            .total_cmp(&a.position)
            .then_with(|| a.agent_id.cmp(&b.agent_id)),
    }
}

/// Computes the local truck's rank among itself and its neighbors.
pub fn resolve(me: RankedEntry, neighbors: &NeighborSnapshot) -> RankInfo {
    let mut order: Vec<RankedEntry> = Vec::with_capacity(neighbors.len() + 1);
    order.push(me);
    order.extend(
        neighbors
            .records()
            .filter(|record| record.state.agent_id != me.agent_id)
            .map(|record| RankedEntry {
                agent_id: record.state.agent_id,
                position: record.state.position,
                decoupled: record.state.decoupled,
            }),
    );
    order.sort_by(front_first);

    let mut my_rank = 0;
    let mut extra_gap_units = 0;
    for (rank, entry) in order.iter().enumerate() {
        if entry.agent_id == me.agent_id {
            my_rank = rank;
            if me.decoupled {
                extra_gap_units += 1;
            }
            break;
        }
        if entry.decoupled {
            extra_gap_units += 1;
        }
    }

    let ahead = my_rank.checked_sub(1).map(|r| order[r].agent_id);
    let behind = order.get(my_rank + 1).map(|e| e.agent_id);

    RankInfo {
        my_rank,
        extra_gap_units,
        ahead,
        behind,
        order,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::NeighborRecord;
    use convoy_env::AgentState;

    fn snapshot(entries: &[(u32, f64, bool)]) -> NeighborSnapshot {
        NeighborSnapshot::from_records(entries.iter().map(|&(id, position, decoupled)| {
            NeighborRecord {
                state: AgentState::new(AgentId(id), position, 0.0, 0).with_decoupled(decoupled),
                received_at: 0.0,
            }
        }))
    }

    fn me(id: u32, position: f64, decoupled: bool) -> RankedEntry {
        RankedEntry { agent_id: AgentId(id), position, decoupled }
    }

    #[test]
    fn test_middle_of_three() {
        let info = resolve(me(1, 70.0, false), &snapshot(&[(0, 100.0, false), (2, 40.0, false)]));

        assert_eq!(info.my_rank, 1);
        assert_eq!(info.ahead, Some(AgentId(0)));
        assert_eq!(info.behind, Some(AgentId(2)));
        assert_eq!(info.front().map(|e| e.agent_id), Some(AgentId(0)));
        assert_eq!(info.extra_gap_units, 0);
    }

    #[test]
    fn test_alone_is_rank_zero() {
        let info = resolve(me(0, 0.0, false), &NeighborSnapshot::default());
        assert_eq!(info.my_rank, 0);
        assert_eq!(info.ahead, None);
        assert_eq!(info.behind, None);
    }

    #[test]
    fn test_extra_gap_counts_ahead_and_self() {
        let neighbors = snapshot(&[(0, 100.0, true), (1, 70.0, false), (3, 10.0, true)]);

        // Decoupled truck ahead only.
        assert_eq!(resolve(me(2, 40.0, false), &neighbors).extra_gap_units, 1);
        // Plus self.
        assert_eq!(resolve(me(2, 40.0, true), &neighbors).extra_gap_units, 2);
        // Decoupled trucks behind never count.
        assert_eq!(resolve(me(2, 40.0, false), &neighbors).behind, Some(AgentId(3)));
    }

    #[test]
    fn test_ties_break_by_ascending_id() {
        let info = resolve(me(2, 50.0, false), &snapshot(&[(5, 50.0, false), (1, 50.0, false)]));
        let ids: Vec<u32> = info.order.iter().map(|e| e.agent_id.0).collect();
        assert_eq!(ids, vec![1, 2, 5]);
        assert_eq!(info.my_rank, 1);
    }

    #[test]
    fn test_nan_position_sorts_last() {
        let info = resolve(me(0, 10.0, false), &snapshot(&[(1, f64::NAN, false), (2, -5.0, false)]));
        let ids: Vec<u32> = info.order.iter().map(|e| e.agent_id.0).collect();
        assert_eq!(ids, vec![0, 2, 1]);
    }
}
