//! Greedy tile covering and fibre assignment.
//!
//! [`TileAllocator`] turns a target catalog into a set of configured tiles:
//!
//! 1. Candidate centres come from [`tiling`] (hexagonal lattice,
//!    Sloane–Hardin covering file, or the store's field list).
//! 2. Every centre is planned against the remaining pool in parallel
//!    ([`fibres`] lays out the fibres, [`ranking`] scores the tile).
//! 3. The best plan is committed, its science targets leave the pool, and
//!    crowding around it is recomputed ([`difficulty`]). Centres within reach
//!    of the new tile are planned again (`repick_after_complete`) or have the
//!    placed targets pruned from their cached plans.
//!
//! The loop stops at the completeness target, when no centre can take a
//! science target any more, or when the pool is empty.

pub mod difficulty;
pub mod fibres;
pub mod greedy;
pub mod ranking;
pub mod tiling;

pub use difficulty::{compute_target_difficulties, NeighbourIndex};
pub use ranking::{difficulty_weight, target_rank};
pub use tiling::{generate_centres, hexagonal_centres, read_sloane_hardin};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

use crate::config::TilingConfig;
use crate::error::SurveyResult;
use crate::geometry::GeometryService;
use crate::models::{Field, Roles, SkyWindow, Target, TargetId, Tile};

/// Snapshot of a target used while planning.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate {
    pub id: TargetId,
    pub ra: f64,
    pub dec: f64,
    pub xyz: [f64; 3],
    pub priority: i32,
    pub mag: f64,
    pub difficulty: u32,
    pub roles: Roles,
}

impl From<&Target> for Candidate {
    fn from(target: &Target) -> Self {
        Self {
            id: target.id,
            ra: target.ra,
            dec: target.dec,
            xyz: target.xyz,
            priority: target.priority,
            mag: target.mag,
            difficulty: target.difficulty,
            roles: target.roles,
        }
    }
}

/// Inputs of one allocation run.
#[derive(Debug, Clone, Copy)]
pub struct AllocationRequest<'a> {
    /// Science targets to cover.
    pub candidates: &'a [TargetId],
    pub standards: &'a [TargetId],
    pub guides: &'a [TargetId],
    /// Science candidates outside this window are ignored.
    pub window: SkyWindow,
    /// Tile centres to choose from.
    pub centres: &'a [Field],
}

/// Result of an allocation run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AllocationOutcome {
    pub tiles: Vec<Tile>,
    /// Fraction of the candidate pool placed on tiles.
    pub completeness: f64,
    /// Running completeness after each committed tile.
    pub progress: Vec<f64>,
    /// Candidates never placed.
    pub remaining: Vec<TargetId>,
    /// True when the run stopped short of the completeness target because
    /// no centre could take another science target.
    pub exhausted: bool,
}

/// Greedy tile allocator.
///
/// Owns its random stream, seeded from `TilingConfig::seed`, so identical
/// inputs give identical tiles. Tile ids keep increasing across calls.
#[derive(Clone)]
pub struct TileAllocator {
    config: TilingConfig,
    geometry: Arc<dyn GeometryService>,
    rng: ChaCha8Rng,
    next_tile_id: u64,
}

impl TileAllocator {
    pub fn new(config: TilingConfig, geometry: Arc<dyn GeometryService>) -> SurveyResult<Self> {
        config.validate()?;
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            geometry,
            rng,
            next_tile_id: 1,
        })
    }

    pub fn config(&self) -> &TilingConfig {
        &self.config
    }

    /// Id the next committed tile will get.
    pub fn next_tile_id(&self) -> u64 {
        self.next_tile_id
    }

    /// Candidate centres for `window`.
    pub fn tile_centres(&mut self, window: &SkyWindow, fields: &[Field]) -> SurveyResult<Vec<Field>> {
        generate_centres(&self.config, window, fields, &mut self.rng)
    }
}
