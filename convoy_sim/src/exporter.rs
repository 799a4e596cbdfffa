//! JSON trace exporter.
//!
//! Collects per-tick status reports of every truck so a run can be checked
//! after the fact or plotted offline.

use crate::network::HubStats;
use crate::oracle::OracleReport;
use convoy_core::StatusReport;
use convoy_env::AgentId;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// One report per truck, id order
    pub trucks: Vec<StatusReport>,
}

impl SimFrame {
    pub fn truck(&self, id: AgentId) -> Option<&StatusReport> {
        self.trucks.iter().find(|report| report.id == id)
    }
}

/// Simulation event.
#[derive(Debug, Clone, Serialize)]
pub struct SimEvent {
    pub time_sec: f64,
    pub message: String,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// Every `frame_interval`-th tick
    pub frames: Vec<SimFrame>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,

    pub oracle: OracleReport,
    pub network: HubStats,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            events: Vec::new(),
            passed: false,
            failures: Vec::new(),
            oracle: OracleReport::default(),
            network: HubStats::default(),
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    pub fn add_event(&mut self, time_sec: f64, message: impl Into<String>) {
        self.events.push(SimEvent {
            time_sec,
            message: message.into(),
        });
    }

    /// First frame at or after `time_sec`.
    pub fn frame_at(&self, time_sec: f64) -> Option<&SimFrame> {
        self.frames.iter().find(|frame| frame.time_sec >= time_sec - 1e-9)
    }

    pub fn last_frame(&self) -> Option<&SimFrame> {
        self.frames.last()
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, failures: Vec<String>, oracle: OracleReport, network: HubStats) {
        self.passed = failures.is_empty();
        self.failures = failures;
        self.oracle = oracle;
        self.network = network;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
