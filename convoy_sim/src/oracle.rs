//! Ground truth oracle for simulation.
//!
//! The Oracle sees the true position of every truck after each tick and
//! checks the physical invariants no controller output may break:
//! - Trucks never close to within `min_separation` of the truck ahead
//! - Trucks never overtake the truck they started behind
//! - No truck exceeds the configured maximum speed

use convoy_env::AgentId;
use serde::Serialize;
use tracing::warn;

/// One truck's true state after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TruckSample {
    pub id: AgentId,
    pub position: f64,
    pub speed: f64,
}

/// A recorded invariant breach.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Violation {
    /// Gap to the truck ahead fell below the minimum separation
    Collision { time: f64, ahead: AgentId, behind: AgentId, gap: f64 },

    /// A truck is now ahead of the truck it started behind
    OrderInversion { time: f64, ahead: AgentId, behind: AgentId },

    /// Speed above the configured maximum
    Overspeed { time: f64, id: AgentId, speed: f64 },
}

/// Violations kept in full; later ones are only counted.
pub const MAX_RECORDED_VIOLATIONS: usize = 32;

/// Summary of everything the oracle observed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OracleReport {
    pub samples: u64,
    pub min_gap: Option<f64>,
    pub max_speed: f64,

    /// Every violation seen, recorded or not
    pub violation_count: u64,

    /// The first [`MAX_RECORDED_VIOLATIONS`] violations
    pub violations: Vec<Violation>,
}

impl OracleReport {
    pub fn is_clean(&self) -> bool {
        self.violation_count == 0
    }
}

/// The Oracle - checks physical safety of the formation.
pub struct FormationOracle {
    /// Trucks front to back as placed at the start
    initial_order: Vec<AgentId>,

    /// Gaps below this count as a collision (meters)
    min_separation: f64,

    /// Speed ceiling (m/s), with a small tolerance for float noise
    max_speed: f64,

    report: OracleReport,
}

impl FormationOracle {
    /// Creates an oracle for trucks starting at the given positions.
    pub fn new(initial: &[TruckSample], min_separation: f64, max_speed: f64) -> Self {
        let mut ordered = initial.to_vec();
        ordered.sort_by(|a, b| b.position.total_cmp(&a.position).then(a.id.cmp(&b.id)));
        Self {
            initial_order: ordered.into_iter().map(|s| s.id).collect(),
            min_separation,
            max_speed,
            report: OracleReport::default(),
        }
    }

    /// Trucks front to back as placed at the start.
    pub fn initial_order(&self) -> &[AgentId] {
        &self.initial_order
    }

    /// Checks one tick of ground truth.
    pub fn observe(&mut self, time: f64, trucks: &[TruckSample]) {
        self.report.samples += 1;

        for truck in trucks {
            self.report.max_speed = self.report.max_speed.max(truck.speed);
            if truck.speed > self.max_speed + 1e-9 {
                self.record(Violation::Overspeed { time, id: truck.id, speed: truck.speed });
            }
        }

        let find = |id: AgentId| trucks.iter().find(|t| t.id == id);
        let mut found = Vec::new();
        for pair in self.initial_order.windows(2) {
            let (Some(ahead), Some(behind)) = (find(pair[0]), find(pair[1])) else {
                continue;
            };
            let gap = ahead.position - behind.position;
            self.report.min_gap = Some(self.report.min_gap.map_or(gap, |g| g.min(gap)));

            if gap < 0.0 {
                found.push(Violation::OrderInversion { time, ahead: ahead.id, behind: behind.id });
            } else if gap < self.min_separation {
                found.push(Violation::Collision { time, ahead: ahead.id, behind: behind.id, gap });
            }
        }
        for violation in found {
            self.record(violation);
        }
    }

    fn record(&mut self, violation: Violation) {
        self.report.violation_count += 1;
        // Log the first few only.
        if self.report.violation_count <= 5 {
            warn!("oracle: {:?}", violation);
        }
        if self.report.violations.len() < MAX_RECORDED_VIOLATIONS {
            self.report.violations.push(violation);
        }
    }

    pub fn report(&self) -> &OracleReport {
        &self.report
    }

    pub fn into_report(self) -> OracleReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: u32, position: f64, speed: f64) -> TruckSample {
        TruckSample { id: AgentId(id), position, speed }
    }

    fn oracle() -> FormationOracle {
        let start = [sample(2, -60.0, 0.0), sample(0, 0.0, 0.0), sample(1, -30.0, 0.0)];
        FormationOracle::new(&start, 1.0, 28.0)
    }

    #[test]
    fn test_initial_order_front_first() {
        assert_eq!(oracle().initial_order(), &[AgentId(0), AgentId(1), AgentId(2)]);
    }

    #[test]
    fn test_clean_formation() {
        let mut oracle = oracle();
        oracle.observe(0.05, &[sample(0, 10.0, 13.0), sample(1, -19.0, 13.0), sample(2, -50.0, 12.0)]);

        let report = oracle.report();
        assert!(report.is_clean());
        assert_eq!(report.min_gap, Some(29.0));
        assert_eq!(report.max_speed, 13.0);
    }

    #[test]
    fn test_detects_collision_and_inversion() {
        let mut oracle = oracle();
        oracle.observe(1.0, &[sample(0, 10.0, 5.0), sample(1, 9.5, 5.0), sample(2, 12.0, 5.0)]);

        let violations = &oracle.report().violations;
        assert_eq!(violations.len(), 2);
        assert_eq!(oracle.report().violation_count, 2);
        assert!(matches!(violations[0], Violation::Collision { behind: AgentId(1), .. }));
        assert!(matches!(violations[1], Violation::OrderInversion { behind: AgentId(2), .. }));
    }

    #[test]
    fn test_detects_overspeed() {
        let mut oracle = oracle();
        oracle.observe(1.0, &[sample(0, 100.0, 30.0)]);
        assert!(matches!(oracle.report().violations[0], Violation::Overspeed { .. }));
    }

    #[test]
    fn test_violation_list_is_bounded() {
        let mut oracle = oracle();
        for tick in 0..100 {
            oracle.observe(tick as f64, &[sample(0, 100.0, 30.0)]);
        }

        let report = oracle.report();
        assert!(!report.is_clean());
        assert_eq!(report.violation_count, 100);
        assert_eq!(report.violations.len(), MAX_RECORDED_VIOLATIONS);
        assert!(matches!(report.violations[0], Violation::Overspeed { time, .. } if time == 0.0));
    }
}
