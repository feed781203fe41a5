//! In-memory catalog store.
//!
//! Holds targets, fields, tiles and almanacs in memory. Used by the test
//! suite and the demo binary; also supports injected failures so the
//! driver's persistence error path can be exercised.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::error::{ErrorContext, StoreError, StoreResult};
use super::store::{CatalogStore, WriteBatch};
use crate::almanac::{AlmanacRecord, DarkAlmanac};
use crate::config::ScoreMetric;
use crate::models::{
    FibreRole, Field, FieldId, SkyWindow, Target, TargetId, TargetRecord, Tile, TileId, TileScore,
};

/// In-memory catalog store.
///
/// Cloning shares the underlying data, so a test can keep a handle for
/// inspection while the driver owns another.
///
/// # Example
/// ```
/// use taipan_sim::catalog::{CatalogStore, LocalCatalogStore};
/// use taipan_sim::models::{FibreRole, SkyWindow, Target};
///
/// let store = LocalCatalogStore::new();
/// store.insert_targets(&[Target::science(1, 35.0, -30.0, 2, 9.1)]);
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let science = rt
///     .block_on(store.load_targets(FibreRole::Science, &SkyWindow::full_sky()))
///     .unwrap();
/// assert_eq!(science.len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct LocalCatalogStore {
    data: Arc<RwLock<LocalData>>,
}

struct StoredTile {
    tile: Tile,
    retired: bool,
}

struct LocalData {
    targets: BTreeMap<TargetId, TargetRecord>,
    fields: Vec<Field>,
    tiles: BTreeMap<TileId, StoredTile>,
    almanacs: HashMap<FieldId, AlmanacRecord>,
    dark: Option<DarkAlmanac>,

    // Failure injection
    failing_writes: u32,
    is_healthy: bool,
    writes: usize,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            targets: BTreeMap::new(),
            fields: Vec::new(),
            tiles: BTreeMap::new(),
            almanacs: HashMap::new(),
            dark: None,
            failing_writes: 0,
            is_healthy: true,
            writes: 0,
        }
    }
}

impl LocalData {
    fn check_health(&self, operation: &str) -> StoreResult<()> {
        if !self.is_healthy {
            return Err(StoreError::connection("Store is not healthy").with_operation(operation));
        }
        Ok(())
    }

    fn take_injected_failure(&mut self, operation: &str) -> StoreResult<()> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(StoreError::write_with_context(
                "injected write failure",
                ErrorContext::new(operation).with_entity("batch").retryable(),
            ));
        }
        Ok(())
    }

    /// Every id the batch refers to must exist once its tiles are saved.
    fn validate(&self, batch: &WriteBatch) -> StoreResult<()> {
        for id in &batch.retired {
            if !self.tiles.contains_key(id) && !batch.tiles.iter().any(|t| t.id == *id) {
                return Err(StoreError::not_found_with_context(
                    format!("Tile {} not found", id),
                    ErrorContext::new("commit_batch")
                        .with_entity("tile")
                        .with_entity_id(id),
                ));
            }
        }
        for update in &batch.targets {
            if !self.targets.contains_key(&update.target_id) {
                return Err(StoreError::not_found_with_context(
                    format!("Target {} not found", update.target_id),
                    ErrorContext::new("commit_batch")
                        .with_entity("target")
                        .with_entity_id(update.target_id),
                ));
            }
        }
        Ok(())
    }

    fn apply(&mut self, batch: &WriteBatch) {
        if let Some(dark) = &batch.dark {
            self.dark = Some(dark.clone());
        }
        for record in &batch.almanacs {
            self.almanacs.insert(record.field_id, record.clone());
        }
        for tile in &batch.tiles {
            self.tiles.insert(
                tile.id,
                StoredTile {
                    tile: tile.clone(),
                    retired: false,
                },
            );
        }
        for id in &batch.retired {
            if let Some(stored) = self.tiles.get_mut(id) {
                stored.retired = true;
            }
        }
        for update in &batch.targets {
            if let Some(record) = self.targets.get_mut(&update.target_id) {
                record.visits = update.visits;
                record.success = update.satisfied;
            }
        }
        self.writes += 1;
    }
}

impl LocalCatalogStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, LocalData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LocalData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ==================== Seeding ====================

    /// Add targets, merging role flags into rows already held for the same id.
    pub fn insert_targets(&self, targets: &[Target]) {
        let mut data = self.write();
        for target in targets {
            let record = target.to_record();
            data.targets
                .entry(target.id)
                .and_modify(|existing| {
                    existing.is_science |= record.is_science;
                    existing.is_standard |= record.is_standard;
                    existing.is_guide |= record.is_guide;
                })
                .or_insert(record);
        }
    }

    pub fn insert_fields(&self, fields: &[Field]) {
        self.write().fields.extend_from_slice(fields);
    }

    // ==================== Failure injection ====================

    /// Remove targets from the catalog.
    pub fn remove_targets(&self, ids: &[TargetId]) {
        let mut data = self.write();
        for id in ids {
            data.targets.remove(id);
        }
    }

    /// Make the next `n` batch commits fail with a retryable write error.
    pub fn fail_next_writes(&self, n: u32) {
        self.write().failing_writes = n;
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.write().is_healthy = healthy;
    }

    // ==================== Inspection ====================

    pub fn target_record(&self, id: TargetId) -> Option<TargetRecord> {
        self.read().targets.get(&id).cloned()
    }

    pub fn target_count(&self) -> usize {
        self.read().targets.len()
    }

    /// Number of stored tiles, retired ones included.
    pub fn tile_count(&self) -> usize {
        self.read().tiles.len()
    }

    pub fn active_tile_ids(&self) -> Vec<TileId> {
        self.read()
            .tiles
            .iter()
            .filter(|(_, stored)| !stored.retired)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn tile(&self, id: TileId) -> Option<Tile> {
        self.read().tiles.get(&id).map(|stored| stored.tile.clone())
    }

    pub fn almanac(&self, field_id: FieldId) -> Option<AlmanacRecord> {
        self.read().almanacs.get(&field_id).cloned()
    }

    pub fn almanac_count(&self) -> usize {
        self.read().almanacs.len()
    }

    pub fn dark_almanac(&self) -> Option<DarkAlmanac> {
        self.read().dark.clone()
    }

    /// Batches committed so far.
    pub fn write_count(&self) -> usize {
        self.read().writes
    }
}

fn metric_value(metric: ScoreMetric, tile: &Tile, targets: &BTreeMap<TargetId, TargetRecord>) -> f64 {
    let remaining = || {
        tile.fibres
            .science
            .iter()
            .filter_map(|id| targets.get(id))
            .filter(|record| !record.success)
    };
    match metric {
        ScoreMetric::CwSum => tile.score,
        ScoreMetric::PrioSum => remaining().map(|record| record.priority as f64).sum(),
        ScoreMetric::NSciRem => remaining().count() as f64,
    }
}

#[async_trait]
impl CatalogStore for LocalCatalogStore {
    async fn load_targets(&self, role: FibreRole, window: &SkyWindow) -> StoreResult<Vec<Target>> {
        let data = self.read();
        data.check_health("load_targets")?;
        Ok(data
            .targets
            .values()
            .filter(|record| match role {
                FibreRole::Science => record.is_science,
                FibreRole::Standard => record.is_standard,
                FibreRole::Guide => record.is_guide,
                FibreRole::Sky => false,
            })
            .filter(|record| window.contains(record.ra, record.dec))
            .map(Target::from_record)
            .collect())
    }

    async fn load_fields(&self) -> StoreResult<Vec<Field>> {
        let data = self.read();
        data.check_health("load_fields")?;
        Ok(data.fields.clone())
    }

    async fn load_tile_scores(&self, metrics: &[ScoreMetric]) -> StoreResult<Vec<TileScore>> {
        let data = self.read();
        data.check_health("load_tile_scores")?;
        Ok(data
            .tiles
            .values()
            .filter(|stored| !stored.retired)
            .map(|stored| {
                let score = metrics
                    .iter()
                    .map(|metric| metric_value(*metric, &stored.tile, &data.targets))
                    .sum();
                TileScore {
                    score,
                    ..TileScore::from(&stored.tile)
                }
            })
            .collect())
    }

    async fn commit_batch(&self, batch: &WriteBatch) -> StoreResult<()> {
        let mut data = self.write();
        data.check_health("commit_batch")?;
        data.take_injected_failure("commit_batch")?;
        data.validate(batch)?;
        data.apply(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::store::TargetUpdate;
    use crate::models::{FibreAssignment, Roles};

    fn tile(id: u64, science: &[u64], score: f64) -> Tile {
        Tile {
            id: TileId(id),
            field_id: FieldId(0),
            ra: 35.0,
            dec: -30.0,
            pa: 0.0,
            fibres: FibreAssignment {
                science: science.iter().map(|i| TargetId(*i)).collect(),
                ..Default::default()
            },
            score,
            valid: true,
        }
    }

    #[tokio::test]
    async fn test_load_targets_filters_role_and_window() {
        let store = LocalCatalogStore::new();
        store.insert_targets(&[
            Target::science(1, 35.0, -30.0, 1, 9.0),
            Target::science(2, 50.0, -30.0, 1, 9.0),
            Target::standard(3, 35.5, -30.5, 0, 12.0),
            Target::with_roles(4, 36.0, -31.0, 2, 10.0, Roles::SCIENCE.union(Roles::GUIDE)),
        ]);
        let window = SkyWindow::new(30.0, 40.0, -35.0, -25.0);

        let science = store.load_targets(FibreRole::Science, &window).await.unwrap();
        let ids: Vec<u64> = science.iter().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![1, 4]);

        let guides = store.load_targets(FibreRole::Guide, &window).await.unwrap();
        assert_eq!(guides.len(), 1);
        assert!(guides[0].is_science());
    }

    #[tokio::test]
    async fn test_insert_merges_roles() {
        let store = LocalCatalogStore::new();
        store.insert_targets(&[
            Target::science(7, 35.0, -30.0, 3, 9.0),
            Target::standard(7, 35.0, -30.0, 0, 9.0),
        ]);
        assert_eq!(store.target_count(), 1);
        let record = store.target_record(TargetId(7)).unwrap();
        assert!(record.is_science && record.is_standard);
        assert_eq!(record.priority, 3);
    }

    #[tokio::test]
    async fn test_tile_scores_sum_metrics_over_active_tiles() {
        let store = LocalCatalogStore::new();
        store.insert_targets(&[
            Target::science(1, 35.0, -30.0, 2, 9.0),
            Target::science(2, 35.1, -30.0, 5, 9.0),
        ]);
        store
            .save_tiles(&[tile(10, &[1, 2], 4.0), tile(11, &[1], 1.0)])
            .await
            .unwrap();
        store.update_target_state(TargetId(2), 1, true).await.unwrap();
        store.retire_tiles(&[TileId(11)]).await.unwrap();

        let rows = store
            .load_tile_scores(&[ScoreMetric::CwSum, ScoreMetric::PrioSum, ScoreMetric::NSciRem])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tile_id, TileId(10));
        // 4.0 stored + priority 2 + one remaining target
        assert!((rows[0].score - 7.0).abs() < 1e-12);
        assert_eq!(store.active_tile_ids(), vec![TileId(10)]);
        assert_eq!(store.tile_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_write_failures() {
        let store = LocalCatalogStore::new();
        store.fail_next_writes(1);

        let err = store.save_tiles(&[tile(1, &[], 0.0)]).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.context().operation.as_deref(), Some("commit_batch"));
        assert_eq!(store.tile_count(), 0);

        store.save_tiles(&[tile(1, &[], 0.0)]).await.unwrap();
        assert_eq!(store.tile_count(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let store = LocalCatalogStore::new();
        let err = store
            .update_target_state(TargetId(99), 1, false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(store.retire_tiles(&[TileId(5)]).await.is_err());
    }

    #[tokio::test]
    async fn test_batch_with_unknown_target_applies_nothing() {
        let store = LocalCatalogStore::new();
        store.insert_targets(&[Target::science(1, 35.0, -30.0, 2, 9.0)]);
        store.save_tiles(&[tile(1, &[1], 1.0)]).await.unwrap();
        let writes = store.write_count();

        let batch = WriteBatch {
            tiles: vec![tile(2, &[1], 2.0)],
            retired: vec![TileId(1)],
            targets: vec![
                TargetUpdate {
                    target_id: TargetId(1),
                    visits: 1,
                    satisfied: true,
                },
                TargetUpdate {
                    target_id: TargetId(99),
                    visits: 1,
                    satisfied: false,
                },
            ],
            ..Default::default()
        };
        let err = store.commit_batch(&batch).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(!err.is_retryable());

        assert_eq!(store.active_tile_ids(), vec![TileId(1)]);
        assert_eq!(store.tile_count(), 1);
        assert_eq!(store.target_record(TargetId(1)).unwrap().visits, 0);
        assert_eq!(store.write_count(), writes);

        // Without the unknown target the same batch goes through whole
        let batch = WriteBatch {
            targets: batch.targets[..1].to_vec(),
            ..batch
        };
        store.commit_batch(&batch).await.unwrap();
        assert_eq!(store.active_tile_ids(), vec![TileId(2)]);
        assert!(store.target_record(TargetId(1)).unwrap().success);
    }

    #[tokio::test]
    async fn test_batch_may_retire_tile_it_saves() {
        let store = LocalCatalogStore::new();
        let batch = WriteBatch {
            tiles: vec![tile(3, &[], 0.0)],
            retired: vec![TileId(3)],
            ..Default::default()
        };
        store.commit_batch(&batch).await.unwrap();
        assert_eq!(store.tile_count(), 1);
        assert!(store.active_tile_ids().is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_store_rejects_reads() {
        let store = LocalCatalogStore::new();
        store.set_healthy(false);
        let err = store.load_fields().await.unwrap_err();
        assert!(matches!(err, StoreError::ConnectionError { .. }));
        store.set_healthy(true);
        assert!(store.load_fields().await.unwrap().is_empty());
    }
}
