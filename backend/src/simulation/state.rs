//! In-memory survey state between nights.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

use super::SimPhase;
use crate::almanac::{AlmanacCache, DarkAlmanac};
use crate::models::{Field, FieldId, TargetCatalog, TargetId, Tile, TileId};

/// Everything the driver carries from one night to the next.
#[derive(Debug, Clone)]
pub struct SimulationState {
    /// Next night to simulate.
    pub date: NaiveDate,
    pub catalog: TargetCatalog,
    /// Tiles awaiting observation.
    pub tiles: BTreeMap<TileId, Tile>,
    pub almanacs: AlmanacCache,
    pub dark: DarkAlmanac,
    /// Candidate tile centres for retiling.
    pub centres: Vec<Field>,
    pub phase: SimPhase,
    pub nights_run: u32,
    pub last_night: Option<NaiveDate>,
    pub tiles_observed: usize,
}

impl SimulationState {
    pub fn new(
        date: NaiveDate,
        catalog: TargetCatalog,
        almanacs: AlmanacCache,
        dark: DarkAlmanac,
        centres: Vec<Field>,
    ) -> Self {
        Self {
            date,
            catalog,
            tiles: BTreeMap::new(),
            almanacs,
            dark,
            centres,
            phase: SimPhase::NightLoop,
            nights_run: 0,
            last_night: None,
            tiles_observed: 0,
        }
    }

    /// Distinct fields of the active tiles, in field id order.
    pub fn tile_fields(&self) -> Vec<Field> {
        let mut seen = HashSet::new();
        let mut fields: Vec<Field> = self
            .tiles
            .values()
            .filter(|tile| seen.insert(tile.field_id))
            .map(|tile| Field::new(tile.field_id, tile.ra, tile.dec))
            .collect();
        fields.sort_by_key(|f| f.field_id);
        fields
    }

    /// Science targets held by active tiles.
    pub fn assigned_science(&self) -> HashSet<TargetId> {
        self.tiles
            .values()
            .flat_map(|tile| tile.fibres.science.iter().copied())
            .collect()
    }

    /// Swap `retired` tiles for `added` ones.
    pub fn replace_tiles(&mut self, retired: &[TileId], added: &[Tile]) {
        for id in retired {
            self.tiles.remove(id);
        }
        for tile in added {
            self.tiles.insert(tile.id, tile.clone());
        }
    }

    pub fn targets_satisfied(&self) -> usize {
        self.catalog
            .iter()
            .filter(|t| t.is_science() && t.state.satisfied)
            .count()
    }
}
