//! Shared fixtures for the simulation integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use taipan_sim::config::TilingMethod;
use taipan_sim::geometry::GeometryService;
use taipan_sim::models::{SkyWindow, Target, TargetTier};
use taipan_sim::{LocalCatalogStore, SimulationDriver, SurveyConfig};

/// A sky with the Sun down from 20:00 to 04:00 UTC, the Moon always down and
/// every field at zenith.
pub struct StubSky;

impl GeometryService for StubSky {
    fn airmass(&self, _ra: f64, _dec: f64, _at: NaiveDateTime) -> f64 {
        1.0
    }

    fn sun_altitude(&self, at: NaiveDateTime) -> f64 {
        let h = at.hour();
        if h >= 20 || h < 4 {
            -30.0
        } else {
            20.0
        }
    }

    fn moon_altitude(&self, _at: NaiveDateTime) -> f64 {
        -20.0
    }

    fn moon_illumination(&self, _at: NaiveDateTime) -> f64 {
        0.0
    }

    fn site_longitude(&self) -> f64 {
        0.0
    }
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 4, day).unwrap()
}

pub fn window() -> SkyWindow {
    SkyWindow::new(25.0, 35.0, -35.0, -25.0)
}

/// Hex-tiled survey over [`window`] for nights `first..=last` of April 2026.
pub fn survey_config(first: u32, last: u32) -> SurveyConfig {
    let mut config = SurveyConfig::default();
    config.simulation.window = window();
    config.simulation.date_start = date(first);
    config.simulation.date_end = date(last);
    config.simulation.seed = 5;
    config.tiling.seed = 5;
    config.tiling.standards_per_tile_min = 1;
    config.tiling.guides_per_tile_min = 1;
    config
}

/// Single tile at (30, -30) taken from the store's field list.
pub fn single_field_config() -> SurveyConfig {
    let mut config = survey_config(1, 3);
    config.tiling.tiling_method = TilingMethod::Fields;
    config.tiling.standards_per_tile_min = 3;
    config.tiling.randomise_pa = false;
    config
}

/// `cols x rows` science grid at 0.1 deg spacing centred on (ra, dec).
pub fn science_grid(first_id: u64, cols: u64, rows: u64, ra: f64, dec: f64, tier: TargetTier) -> Vec<Target> {
    (0..cols * rows)
        .map(|k| {
            let i = (k % cols) as f64 - (cols - 1) as f64 / 2.0;
            let j = (k / cols) as f64 - (rows - 1) as f64 / 2.0;
            Target::science(first_id + k, ra + 0.1 * i, dec + 0.1 * j, 1, 9.5).in_tier(tier)
        })
        .collect()
}

/// `count` standards on a 1 deg ring and `count` guides on a 2 deg ring
/// around (ra, dec).
pub fn supplements(first_id: u64, count: u64, ra: f64, dec: f64) -> Vec<Target> {
    let mut targets = Vec::new();
    for k in 0..count {
        let angle = (k as f64 * 360.0 / count as f64).to_radians();
        targets.push(Target::standard(
            first_id + k,
            ra + angle.cos(),
            dec + angle.sin(),
            0,
            10.0,
        ));
        targets.push(Target::guide(
            first_id + 1000 + k,
            ra + 2.0 * angle.cos(),
            dec + 2.0 * angle.sin(),
            0,
            10.0,
        ));
    }
    targets
}

/// Store holding a 5x4 science cluster at (30, -30) plus supplements.
pub fn cluster_store(tier: TargetTier) -> LocalCatalogStore {
    let store = LocalCatalogStore::new();
    store.insert_targets(&science_grid(1, 5, 4, 30.0, -30.0, tier));
    store.insert_targets(&supplements(10_000, 12, 30.0, -30.0));
    store
}

pub fn driver(config: SurveyConfig, store: &LocalCatalogStore) -> SimulationDriver {
    SimulationDriver::new(config, Arc::new(store.clone()), Arc::new(StubSky)).unwrap()
}
