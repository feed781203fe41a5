//! Night-by-night survey simulation.
//!
//! [`SimulationDriver`] runs the survey as a small state machine:
//!
//! ```text
//! Init --init()--> NightLoop --run_night()*--> Done
//! ```
//!
//! Each night is staged on a copy of [`SimulationState`] and only replaces
//! the live state once the store has accepted the night's writes.

pub mod driver;
pub mod state;

pub use driver::SimulationDriver;
pub use state::SimulationState;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimPhase {
    #[default]
    Init,
    NightLoop,
    Done,
}

/// What happened in one simulated night.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightReport {
    pub date: NaiveDate,
    pub tiles_observed: usize,
    /// Science targets that received a visit.
    pub targets_observed: usize,
    /// Science targets completed tonight.
    pub targets_satisfied: usize,
    /// Tiles created by retiling after the night.
    pub tiles_retiled: usize,
    /// Survey completeness after the night.
    pub completeness: f64,
}

/// Totals at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub nights_run: u32,
    pub final_date: Option<NaiveDate>,
    pub completeness: f64,
    pub tiles_observed: usize,
    pub targets_satisfied: usize,
    pub phase: SimPhase,
}
