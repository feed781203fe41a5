//! Dark-time calendar.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::TimeGrid;
use crate::config::AlmanacConfig;
use crate::error::SurveyResult;
use crate::geometry::GeometryService;

/// Sky brightness class of one time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkyCondition {
    /// Sun above astronomical twilight.
    Day,
    /// Sun down, Moon below the horizon.
    Dark,
    /// Moon up but faint.
    Grey,
    /// Moon up and bright.
    Bright,
}

impl SkyCondition {
    /// Dark and grey time can be used for survey observations.
    pub fn is_usable(self) -> bool {
        matches!(self, SkyCondition::Dark | SkyCondition::Grey)
    }
}

/// Site-wide sky condition per time step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DarkAlmanac {
    grid: TimeGrid,
    samples: Vec<SkyCondition>,
}

fn classify(geometry: &dyn GeometryService, at: NaiveDateTime, config: &AlmanacConfig) -> SkyCondition {
    if geometry.sun_altitude(at) > config.twilight_altitude {
        SkyCondition::Day
    } else if geometry.moon_altitude(at) < 0.0 {
        SkyCondition::Dark
    } else if geometry.moon_illumination(at) <= config.grey_moon_illumination {
        SkyCondition::Grey
    } else {
        SkyCondition::Bright
    }
}

impl DarkAlmanac {
    /// Classify every step of the nights `[start, end]`.
    pub fn build(
        geometry: &dyn GeometryService,
        start: NaiveDate,
        end: NaiveDate,
        config: &AlmanacConfig,
    ) -> SurveyResult<Self> {
        let grid = TimeGrid::new(start, end, config, geometry.site_longitude())?;
        let samples: Vec<SkyCondition> = (0..grid.len())
            .into_par_iter()
            .map(|i| classify(geometry, grid.time_at(i), config))
            .collect();
        debug!(
            "Built dark almanac {} to {} ({} steps, {} usable)",
            start,
            end,
            samples.len(),
            samples.iter().filter(|c| c.is_usable()).count()
        );
        Ok(Self { grid, samples })
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn start_date(&self) -> NaiveDate {
        self.grid.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.grid.end_date
    }

    pub fn resolution_minutes(&self) -> u32 {
        self.grid.resolution_minutes
    }

    /// Whether the night starting on `date` is inside the calendar.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.grid.covers(date, date)
    }

    pub fn condition_at(&self, at: NaiveDateTime) -> Option<SkyCondition> {
        self.grid.index_of(at).map(|i| self.samples[i])
    }

    pub fn is_dark_or_grey(&self, at: NaiveDateTime) -> bool {
        self.condition_at(at).is_some_and(SkyCondition::is_usable)
    }

    /// Step indices of dark or grey time in the night of `date`.
    pub fn usable_steps(&self, date: NaiveDate) -> Vec<usize> {
        self.grid
            .night(date)
            .map(|night| night.filter(|&i| self.samples[i].is_usable()).collect())
            .unwrap_or_default()
    }

    /// Sunset-to-sunrise span of the night of `date`, from the first to the
    /// end of the last non-day step.
    pub fn night_window(&self, date: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let night = self.grid.night(date)?;
        let mut dark = night.filter(|&i| self.samples[i] != SkyCondition::Day);
        let first = dark.next()?;
        let last = dark.last().unwrap_or(first);
        Some((
            self.grid.time_at(first),
            self.grid.time_at(last) + TimeDelta::minutes(self.grid.resolution_minutes as i64),
        ))
    }

    /// Dark plus grey time available in the night of `date`.
    pub fn usable_minutes(&self, date: NaiveDate) -> u32 {
        self.usable_steps(date).len() as u32 * self.grid.resolution_minutes
    }

    pub fn samples(&self) -> &[SkyCondition] {
        &self.samples
    }
}
