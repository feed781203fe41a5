//! Per-field observability almanacs.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::{DarkAlmanac, TimeGrid};
use crate::config::AlmanacConfig;
use crate::error::SurveyResult;
use crate::geometry::GeometryService;
use crate::models::{Field, FieldId};

/// Airmass of one field sampled over a range of nights.
#[derive(Debug, Clone, PartialEq)]
pub struct AlmanacEntry {
    pub field_id: FieldId,
    pub ra: f64,
    pub dec: f64,
    pub minimum_airmass: f64,
    grid: TimeGrid,
    /// One sample per step, `f64::INFINITY` below the horizon.
    airmass: Vec<f64>,
}

/// Persisted almanac layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlmanacRecord {
    pub field_id: FieldId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub resolution_minutes: u32,
    /// Airmass per step; `None` below the horizon.
    pub samples: Vec<Option<f32>>,
}

impl AlmanacEntry {
    /// Sample the airmass of `field` for the nights `[start, end]`.
    pub fn build(
        field: &Field,
        start: NaiveDate,
        end: NaiveDate,
        config: &AlmanacConfig,
        geometry: &dyn GeometryService,
    ) -> SurveyResult<Self> {
        let grid = TimeGrid::new(start, end, config, geometry.site_longitude())?;
        let airmass = (0..grid.len())
            .map(|i| geometry.airmass(field.ra, field.dec, grid.time_at(i)))
            .collect();
        Ok(Self {
            field_id: field.field_id,
            ra: field.ra,
            dec: field.dec,
            minimum_airmass: config.minimum_airmass,
            grid,
            airmass,
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.grid.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.grid.end_date
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    /// Whether every night of `[start, end]` is sampled.
    pub fn covers_range(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.grid.covers(start, end)
    }

    pub fn airmass_at(&self, at: NaiveDateTime) -> Option<f64> {
        self.grid.index_of(at).map(|i| self.airmass[i])
    }

    /// Low enough and in dark or grey time.
    pub fn is_observable(&self, at: NaiveDateTime, dark: &DarkAlmanac) -> bool {
        self.airmass_at(at)
            .is_some_and(|airmass| airmass <= self.minimum_airmass)
            && dark.is_dark_or_grey(at)
    }

    /// Observable time in the night of `date`.
    pub fn observable_minutes(&self, date: NaiveDate, dark: &DarkAlmanac) -> u32 {
        let steps = dark
            .usable_steps(date)
            .into_iter()
            .filter(|&i| self.is_observable(dark.grid().time_at(i), dark))
            .count();
        steps as u32 * self.grid.resolution_minutes
    }

    pub fn to_record(&self) -> AlmanacRecord {
        AlmanacRecord {
            field_id: self.field_id,
            start_date: self.grid.start_date,
            end_date: self.grid.end_date,
            resolution_minutes: self.grid.resolution_minutes,
            samples: self
                .airmass
                .iter()
                .map(|a| a.is_finite().then_some(*a as f32))
                .collect(),
        }
    }
}
