//! Observability calendars.
//!
//! - [`DarkAlmanac`]: site-wide dark/grey/bright classification
//! - [`AlmanacEntry`]: per-field airmass samples on the same time grid
//! - [`AlmanacCache`]: one canonical entry per field, rebuilt on extension
//!
//! All calendars sample a [`TimeGrid`] anchored at local noon of the first
//! date, so each night is a contiguous block of steps.

pub mod cache;
pub mod dark;
pub mod field;

pub use cache::{AlmanacCache, CacheOutcome};
pub use dark::{DarkAlmanac, SkyCondition};
pub use field::{AlmanacEntry, AlmanacRecord};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::config::AlmanacConfig;
use crate::error::{SurveyError, SurveyResult};
use crate::models::{days_inclusive, local_noon_utc};

const MINUTES_PER_DAY: u32 = 1440;

/// Fixed-resolution sampling of the nights `[start_date, end_date]`.
///
/// Step 0 starts at local noon of `start_date`; the last step ends at local
/// noon of the day after `end_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeGrid {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub resolution_minutes: u32,
    pub origin: NaiveDateTime,
}

impl TimeGrid {
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        config: &AlmanacConfig,
        longitude: f64,
    ) -> SurveyResult<Self> {
        config.validate()?;
        if start_date > end_date {
            return Err(SurveyError::configuration(format!(
                "almanac start {} is after end {}",
                start_date, end_date
            )));
        }
        Ok(Self {
            start_date,
            end_date,
            resolution_minutes: config.resolution_minutes,
            origin: local_noon_utc(start_date, longitude),
        })
    }

    pub fn steps_per_night(&self) -> usize {
        (MINUTES_PER_DAY / self.resolution_minutes) as usize
    }

    pub fn len(&self) -> usize {
        days_inclusive(self.start_date, self.end_date) as usize * self.steps_per_night()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start instant of step `index`.
    pub fn time_at(&self, index: usize) -> NaiveDateTime {
        self.origin + TimeDelta::minutes(index as i64 * self.resolution_minutes as i64)
    }

    /// Step containing `at`, if inside the grid.
    pub fn index_of(&self, at: NaiveDateTime) -> Option<usize> {
        let seconds = (at - self.origin).num_seconds();
        if seconds < 0 {
            return None;
        }
        let index = (seconds / (self.resolution_minutes as i64 * 60)) as usize;
        (index < self.len()).then_some(index)
    }

    /// Steps of the night starting on `date`.
    pub fn night(&self, date: NaiveDate) -> Option<Range<usize>> {
        if !self.covers(date, date) {
            return None;
        }
        let per_night = self.steps_per_night();
        let first = (date - self.start_date).num_days() as usize * per_night;
        Some(first..first + per_night)
    }

    pub fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= start && end <= self.end_date
    }
}
