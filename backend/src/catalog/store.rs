//! Catalog store trait.
//!
//! The engine reads targets, fields and scored tiles through this trait and
//! writes tiles, almanacs and observation state back through it. Writes go
//! through [`CatalogStore::commit_batch`], which applies a whole
//! [`WriteBatch`] or nothing.

use async_trait::async_trait;

use super::error::StoreResult;
use crate::almanac::{AlmanacRecord, DarkAlmanac};
use crate::config::ScoreMetric;
use crate::models::{FibreRole, Field, SkyWindow, Target, TargetId, Tile, TileId, TileScore};

/// New visit count and completion flag for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetUpdate {
    pub target_id: TargetId,
    pub visits: u32,
    pub satisfied: bool,
}

/// Writes produced by one simulation step.
///
/// Within a batch, tiles are saved before retirements are applied, so a
/// batch may retire a tile it also saves.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub dark: Option<DarkAlmanac>,
    pub almanacs: Vec<AlmanacRecord>,
    pub tiles: Vec<Tile>,
    pub retired: Vec<TileId>,
    pub targets: Vec<TargetUpdate>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.dark.is_none()
            && self.almanacs.is_empty()
            && self.tiles.is_empty()
            && self.retired.is_empty()
            && self.targets.is_empty()
    }
}

/// Repository trait for survey catalog persistence.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    // ==================== Reads ====================

    /// Load every target holding `role` whose position lies in `window`.
    ///
    /// Targets are built with [`Target::from_record`], so role flags, tier
    /// and observation state come straight from the stored row.
    async fn load_targets(&self, role: FibreRole, window: &SkyWindow) -> StoreResult<Vec<Target>>;

    /// Load the survey field list.
    async fn load_fields(&self) -> StoreResult<Vec<Field>>;

    /// Load scored rows for every tile that has not been retired.
    ///
    /// The score of a row is the sum of the requested metrics.
    async fn load_tile_scores(&self, metrics: &[ScoreMetric]) -> StoreResult<Vec<TileScore>>;

    // ==================== Writes ====================

    /// Apply every write in `batch`, or none of them.
    ///
    /// Retiring an unknown tile or updating an unknown target fails the
    /// whole batch with `NotFound`.
    async fn commit_batch(&self, batch: &WriteBatch) -> StoreResult<()>;

    /// Insert tiles, replacing any stored tile with the same id.
    async fn save_tiles(&self, tiles: &[Tile]) -> StoreResult<()> {
        self.commit_batch(&WriteBatch {
            tiles: tiles.to_vec(),
            ..Default::default()
        })
        .await
    }

    /// Mark tiles as superseded. They no longer appear in score queries.
    async fn retire_tiles(&self, tile_ids: &[TileId]) -> StoreResult<()> {
        self.commit_batch(&WriteBatch {
            retired: tile_ids.to_vec(),
            ..Default::default()
        })
        .await
    }

    /// Store an almanac, replacing the entry held for the same field.
    async fn save_almanac(&self, record: &AlmanacRecord) -> StoreResult<()> {
        self.commit_batch(&WriteBatch {
            almanacs: vec![record.clone()],
            ..Default::default()
        })
        .await
    }

    /// Store the dark-time calendar, replacing the previous one.
    async fn save_dark_almanac(&self, dark: &DarkAlmanac) -> StoreResult<()> {
        self.commit_batch(&WriteBatch {
            dark: Some(dark.clone()),
            ..Default::default()
        })
        .await
    }

    /// Record a target's visit count and completion flag.
    async fn update_target_state(
        &self,
        target_id: TargetId,
        visits: u32,
        satisfied: bool,
    ) -> StoreResult<()> {
        self.commit_batch(&WriteBatch {
            targets: vec![TargetUpdate {
                target_id,
                visits,
                satisfied,
            }],
            ..Default::default()
        })
        .await
    }
}
