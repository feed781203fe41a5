//! Survey configuration.
//!
//! Every knob of the allocator, almanacs, outcome model and simulation driver
//! lives in one immutable [`SurveyConfig`] value that is threaded through the
//! calls that need it. Configurations are read from TOML; parse failures
//! report the offending key path.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{SurveyError, SurveyResult};
use crate::geometry::SiteConfig;
use crate::models::{FibreRole, SkyWindow};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveyConfig {
    #[serde(default)]
    pub tiling: TilingConfig,
    #[serde(default)]
    pub almanac: AlmanacConfig,
    #[serde(default)]
    pub outcome: OutcomeProbabilities,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub site: SiteConfig,
}

/// Source of candidate tile centres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TilingMethod {
    /// Precomputed Sloane–Hardin sphere covering read from `tiling_file`.
    #[serde(alias = "SH")]
    SloaneHardin,
    /// Hexagonal lattice over the survey window.
    #[default]
    Hexagonal,
    /// The catalog store's field list.
    Fields,
}

/// How fibres inside a tile are handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    /// Trade target rank against fill gain, see `combined_weight`.
    #[default]
    CombinedWeighted,
    /// Fill roles strictly in `sequential_ordering`.
    Sequential,
}

/// Tile score used to pick the next tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RankingMethod {
    /// Number of science targets.
    Completeness,
    PrioritySum,
    DifficultySum,
    /// Sum of target ranks (priority, magnitude band and difficulty).
    #[default]
    CombinedWeightedSum,
    /// Sum of `2^priority`.
    PriorityExpSum,
}

/// Tile generation and fibre assignment knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    pub seed: u64,
    pub tiling_method: TilingMethod,
    pub tiling_file: Option<PathBuf>,
    /// Tile radius in degrees.
    pub tile_radius: f64,
    pub fibres_per_tile: u32,
    pub targets_per_tile: u32,
    pub standards_per_tile: u32,
    pub standards_per_tile_min: u32,
    pub guides_per_tile: u32,
    pub guides_per_tile_min: u32,
    pub sky_per_tile: u32,
    /// Minimum spacing between two fibres, arcseconds.
    pub fibre_exclusion_diameter: f64,
    /// Science targets are restricted to these `[low, high)` bands when non-empty.
    pub mag_ranges: Vec<[f64; 2]>,
    pub mag_ranges_prioritise: Vec<[f64; 2]>,
    pub prioritise_extra: i32,
    pub completeness_target: f64,
    pub completeness_priority: f64,
    pub completeness_priority_threshold: f64,
    pub allocation_method: AllocationMethod,
    pub combined_weight: f64,
    pub sequential_ordering: Vec<FibreRole>,
    pub ranking_method: RankingMethod,
    pub randomise_pa: bool,
    #[serde(alias = "randomise_SH")]
    pub randomise_sh: bool,
    pub rank_supplements: bool,
    pub repick_after_complete: bool,
    pub recompute_difficulty: bool,
    pub disqualify_below_min: bool,
    /// A science fibre on a standard or guide star also counts toward that quota.
    pub multi_role_counts_both: bool,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            tiling_method: TilingMethod::default(),
            tiling_file: None,
            tile_radius: 3.0,
            fibres_per_tile: 150,
            targets_per_tile: 120,
            standards_per_tile: 10,
            standards_per_tile_min: 5,
            guides_per_tile: 9,
            guides_per_tile_min: 3,
            sky_per_tile: 20,
            fibre_exclusion_diameter: 60.0,
            mag_ranges: Vec::new(),
            mag_ranges_prioritise: Vec::new(),
            prioritise_extra: 2,
            completeness_target: 0.975,
            completeness_priority: 4.0,
            completeness_priority_threshold: 0.9,
            allocation_method: AllocationMethod::default(),
            combined_weight: 1.0,
            sequential_ordering: vec![FibreRole::Standard, FibreRole::Guide],
            ranking_method: RankingMethod::default(),
            randomise_pa: true,
            randomise_sh: true,
            rank_supplements: false,
            repick_after_complete: true,
            recompute_difficulty: true,
            disqualify_below_min: true,
            multi_role_counts_both: false,
        }
    }
}

fn validate_bands(name: &str, bands: &[[f64; 2]]) -> SurveyResult<()> {
    for [low, high] in bands {
        if !(low < high) {
            return Err(SurveyError::configuration(format!(
                "{} band [{}, {}) is malformed: low must be below high",
                name, low, high
            )));
        }
    }
    Ok(())
}

impl TilingConfig {
    /// Fibre exclusion diameter in degrees.
    pub fn exclusion_degrees(&self) -> f64 {
        self.fibre_exclusion_diameter / 3600.0
    }

    /// Whether `mag` falls in one of the prioritised bands.
    pub fn in_priority_band(&self, mag: f64) -> bool {
        self.mag_ranges_prioritise
            .iter()
            .any(|[low, high]| mag >= *low && mag < *high)
    }

    /// Whether a science target of magnitude `mag` is eligible at all.
    pub fn in_mag_ranges(&self, mag: f64) -> bool {
        self.mag_ranges.is_empty()
            || self
                .mag_ranges
                .iter()
                .any(|[low, high]| mag >= *low && mag < *high)
    }

    pub fn validate(&self) -> SurveyResult<()> {
        validate_bands("mag_ranges", &self.mag_ranges)?;
        validate_bands("mag_ranges_prioritise", &self.mag_ranges_prioritise)?;

        if !(self.tile_radius > 0.0 && self.tile_radius < 90.0) {
            return Err(SurveyError::configuration(format!(
                "tile_radius must be in (0, 90) degrees, got {}",
                self.tile_radius
            )));
        }
        if !(self.completeness_target > 0.0 && self.completeness_target <= 1.0) {
            return Err(SurveyError::configuration(format!(
                "completeness_target must be in (0, 1], got {}",
                self.completeness_target
            )));
        }
        if !(0.0..=1.0).contains(&self.completeness_priority_threshold) {
            return Err(SurveyError::configuration(format!(
                "completeness_priority_threshold must be in [0, 1], got {}",
                self.completeness_priority_threshold
            )));
        }
        if self.standards_per_tile_min > self.standards_per_tile {
            return Err(SurveyError::configuration(
                "standards_per_tile_min exceeds standards_per_tile",
            ));
        }
        if self.guides_per_tile_min > self.guides_per_tile {
            return Err(SurveyError::configuration(
                "guides_per_tile_min exceeds guides_per_tile",
            ));
        }
        if self.sky_per_tile > self.fibres_per_tile {
            return Err(SurveyError::configuration(
                "sky_per_tile exceeds fibres_per_tile",
            ));
        }
        if self.fibre_exclusion_diameter < 0.0 || self.combined_weight < 0.0 {
            return Err(SurveyError::configuration(
                "fibre_exclusion_diameter and combined_weight must be non-negative",
            ));
        }
        if self.sequential_ordering.contains(&FibreRole::Sky) {
            return Err(SurveyError::configuration(
                "sequential_ordering may only name science, standard and guide",
            ));
        }
        if self.tiling_method == TilingMethod::SloaneHardin && self.tiling_file.is_none() {
            return Err(SurveyError::configuration(
                "tiling_method = \"sloane_hardin\" requires tiling_file",
            ));
        }
        Ok(())
    }
}

/// Almanac sampling knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlmanacConfig {
    /// Step between samples, minutes. Must divide a day.
    pub resolution_minutes: u32,
    /// Highest airmass at which a field counts as observable.
    pub minimum_airmass: f64,
    /// Sun altitude (degrees) below which the sky is dark enough.
    pub twilight_altitude: f64,
    /// Moon illumination up to which a moon-up step is grey rather than bright.
    pub grey_moon_illumination: f64,
}

impl Default for AlmanacConfig {
    fn default() -> Self {
        Self {
            resolution_minutes: 15,
            minimum_airmass: 2.0,
            twilight_altitude: -18.0,
            grey_moon_illumination: 0.4,
        }
    }
}

impl AlmanacConfig {
    pub fn validate(&self) -> SurveyResult<()> {
        if self.resolution_minutes == 0 || 1440 % self.resolution_minutes != 0 {
            return Err(SurveyError::configuration(format!(
                "resolution_minutes must divide 1440, got {}",
                self.resolution_minutes
            )));
        }
        if !(self.minimum_airmass >= 1.0) {
            return Err(SurveyError::configuration(format!(
                "minimum_airmass must be at least 1, got {}",
                self.minimum_airmass
            )));
        }
        if !(0.0..=1.0).contains(&self.grey_moon_illumination) {
            return Err(SurveyError::configuration(
                "grey_moon_illumination must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Per-visit success probabilities of the outcome model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeProbabilities {
    pub prob_vpec_first: f64,
    /// Conditional on no success at the first visit; likewise for later visits.
    pub prob_vpec_second: f64,
    pub prob_vpec_third: f64,
    pub prob_vpec_fourth: f64,
    pub prob_lowz_each: f64,
}

impl Default for OutcomeProbabilities {
    fn default() -> Self {
        Self {
            prob_vpec_first: 0.18,
            prob_vpec_second: 0.510,
            prob_vpec_third: 0.675,
            prob_vpec_fourth: 0.845,
            prob_lowz_each: 0.85,
        }
    }
}

impl OutcomeProbabilities {
    pub fn validate(&self) -> SurveyResult<()> {
        let named = [
            ("prob_vpec_first", self.prob_vpec_first),
            ("prob_vpec_second", self.prob_vpec_second),
            ("prob_vpec_third", self.prob_vpec_third),
            ("prob_vpec_fourth", self.prob_vpec_fourth),
            ("prob_lowz_each", self.prob_lowz_each),
        ];
        for (name, p) in named {
            if !(0.0..=1.0).contains(&p) {
                return Err(SurveyError::configuration(format!(
                    "{} must be in the range [0,1], got {}",
                    name, p
                )));
            }
        }
        let vpec = [
            self.prob_vpec_first,
            self.prob_vpec_second,
            self.prob_vpec_third,
            self.prob_vpec_fourth,
        ];
        if vpec.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(SurveyError::configuration(
                "prob_vpec_* must be non-decreasing with visit number",
            ));
        }
        Ok(())
    }
}

/// Metrics a tile-score query can sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMetric {
    /// The allocation score stored with the tile.
    CwSum,
    /// Summed priority of unsatisfied science targets on the tile.
    PrioSum,
    /// Number of unsatisfied science targets on the tile.
    NSciRem,
}

/// Simulation run knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub window: SkyWindow,
    pub seed: u64,
    pub exposure_minutes: u32,
    pub overhead_minutes: u32,
    pub score_metrics: Vec<ScoreMetric>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            date_start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap_or(NaiveDate::MIN),
            date_end: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap_or(NaiveDate::MAX),
            window: SkyWindow::full_sky(),
            seed: 0,
            exposure_minutes: 30,
            overhead_minutes: 5,
            score_metrics: vec![ScoreMetric::CwSum],
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> SurveyResult<()> {
        if self.date_start > self.date_end {
            return Err(SurveyError::configuration(format!(
                "date_start {} is after date_end {}",
                self.date_start, self.date_end
            )));
        }
        if self.exposure_minutes == 0 {
            return Err(SurveyError::configuration("exposure_minutes must be positive"));
        }
        if self.score_metrics.is_empty() {
            return Err(SurveyError::configuration("score_metrics must not be empty"));
        }
        self.window.validate()
    }

    /// Check that `date` lies inside the run.
    pub fn check_date(&self, date: NaiveDate) -> SurveyResult<()> {
        if date < self.date_start || date > self.date_end {
            return Err(SurveyError::configuration(format!(
                "date {} must be in the range [{}, {}]",
                date, self.date_start, self.date_end
            )));
        }
        Ok(())
    }
}

impl SurveyConfig {
    /// Parse a TOML document, reporting the failing key path on error.
    pub fn from_toml_str(content: &str) -> SurveyResult<Self> {
        let deserializer = toml::Deserializer::new(content);
        let config: SurveyConfig = serde_path_to_error::deserialize(deserializer).map_err(|e| {
            SurveyError::configuration(format!(
                "Failed to parse config at '{}': {}",
                e.path(),
                e.inner()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> SurveyResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            SurveyError::configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> SurveyResult<()> {
        self.tiling.validate()?;
        self.almanac.validate()?;
        self.outcome.validate()?;
        self.simulation.validate()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
