//! # Taipan Survey Simulator
//!
//! Tile allocation and night-scheduling engine for a multi-fibre
//! spectroscopic survey telescope.
//!
//! The crate partitions a sky region into circular tiles, assigns each tile a
//! bounded set of fibres (science targets, flux standards, guide stars and sky
//! fibres), and simulates night-by-night observation of those tiles against
//! an observability calendar, updating target completion state after every
//! simulated visit.
//!
//! ## Architecture
//!
//! - [`models`]: Targets, tiles, fields, sky windows and time helpers
//! - [`geometry`]: Angular separations, airmass and Sun/Moon ephemerides
//! - [`catalog`]: Async store trait plus an in-memory implementation
//! - [`almanac`]: Dark-time calendar and per-field observability almanacs
//! - [`allocation`]: Greedy tile covering and fibre assignment
//! - [`outcome`]: Probabilistic per-visit success model
//! - [`scheduler`]: Per-night tile selection
//! - [`simulation`]: The `INIT → NIGHT_LOOP → DONE` driver
//! - [`config`]: TOML configuration shared by every layer
//!
//! ## Concurrency
//!
//! The night loop is sequential. Tile planning inside one allocation pass and
//! almanac construction per field run on the rayon pool; store access is
//! async and single-writer.

// Allow large error types - StoreError carries rich context for debugging
#![allow(clippy::result_large_err)]

pub mod allocation;
pub mod almanac;
pub mod catalog;
pub mod config;
pub mod error;
pub mod geometry;
pub mod models;
pub mod outcome;
pub mod scheduler;
pub mod simulation;

pub use allocation::{AllocationOutcome, AllocationRequest, TileAllocator};
pub use almanac::{AlmanacCache, AlmanacEntry, CacheOutcome, DarkAlmanac, SkyCondition};
pub use catalog::{CatalogStore, LocalCatalogStore, StoreError, StoreResult};
pub use config::SurveyConfig;
pub use error::{SurveyError, SurveyResult};
pub use geometry::{GeometryService, LowPrecisionEphemeris};
pub use outcome::ObservationOutcomeModel;
pub use scheduler::{NightScheduler, ScheduledTile};
pub use simulation::{NightReport, SimPhase, SimulationDriver, SimulationSummary};
