//! Tiles: fibre-configured pointings produced by the allocator.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::sky::FieldId;
use super::target::{FibreRole, TargetId};

/// Identifier of a tile configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TileId(pub u64);

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Targets placed on a tile, keyed by fibre role.
///
/// With multi-role quota counting a science fibre on a standard star is
/// listed under both roles; it still occupies a single fibre.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FibreAssignment {
    pub science: Vec<TargetId>,
    pub standard: Vec<TargetId>,
    pub guide: Vec<TargetId>,
    pub sky: u16,
}

impl FibreAssignment {
    pub fn count(&self, role: FibreRole) -> usize {
        match role {
            FibreRole::Science => self.science.len(),
            FibreRole::Standard => self.standard.len(),
            FibreRole::Guide => self.guide.len(),
            FibreRole::Sky => self.sky as usize,
        }
    }

    /// Distinct targets on the tile.
    pub fn target_ids(&self) -> HashSet<TargetId> {
        self.science
            .iter()
            .chain(&self.standard)
            .chain(&self.guide)
            .copied()
            .collect()
    }

    /// Fibres in use, counting each target once plus the sky fibres.
    pub fn fibres_used(&self) -> usize {
        self.target_ids().len() + self.sky as usize
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.science.contains(&id) || self.standard.contains(&id) || self.guide.contains(&id)
    }
}

/// A configured tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub id: TileId,
    pub field_id: FieldId,
    pub ra: f64,
    pub dec: f64,
    /// Position angle in degrees.
    pub pa: f64,
    pub fibres: FibreAssignment,
    pub score: f64,
    /// False when the tile is short of standards or guides.
    pub valid: bool,
}

impl Tile {
    pub fn count_science(&self) -> usize {
        self.fibres.count(FibreRole::Science)
    }

    pub fn count_standard(&self) -> usize {
        self.fibres.count(FibreRole::Standard)
    }

    pub fn count_guide(&self) -> usize {
        self.fibres.count(FibreRole::Guide)
    }
}

/// Scheduler view of a tile awaiting observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileScore {
    pub tile_id: TileId,
    pub field_id: FieldId,
    pub ra: f64,
    pub dec: f64,
    pub score: f64,
}

impl From<&Tile> for TileScore {
    fn from(tile: &Tile) -> Self {
        Self {
            tile_id: tile.id,
            field_id: tile.field_id,
            ra: tile.ra,
            dec: tile.dec,
            score: tile.score,
        }
    }
}
