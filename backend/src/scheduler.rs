//! Per-night tile selection.
//!
//! The night's dark and grey time is cut into observing slots of
//! `exposure_minutes + overhead_minutes`. Tiles are taken in score order and
//! each is given the earliest free slot in which its field is observable.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::almanac::{AlmanacCache, DarkAlmanac};
use crate::config::SimulationConfig;
use crate::models::{FieldId, TileId, TileScore};

/// A tile booked into a slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTile {
    pub tile_id: TileId,
    pub field_id: FieldId,
    /// Slot start (UTC).
    pub start: NaiveDateTime,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightScheduler {
    exposure_minutes: u32,
    overhead_minutes: u32,
}

impl NightScheduler {
    pub fn new(exposure_minutes: u32, overhead_minutes: u32) -> Self {
        Self {
            exposure_minutes,
            overhead_minutes,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.exposure_minutes, config.overhead_minutes)
    }

    pub fn slot_minutes(&self) -> u32 {
        self.exposure_minutes + self.overhead_minutes
    }

    /// Slot start times in the dark and grey time of the night of `date`.
    ///
    /// Slots run back to back through each stretch of usable time and
    /// restart at the beginning of the next stretch.
    pub fn slots(&self, date: NaiveDate, dark: &DarkAlmanac) -> Vec<NaiveDateTime> {
        let step = TimeDelta::minutes(dark.resolution_minutes() as i64);
        let slot = TimeDelta::minutes(self.slot_minutes().max(1) as i64);

        let mut slots = Vec::new();
        let mut next_free: Option<NaiveDateTime> = None;
        for i in dark.usable_steps(date) {
            let step_start = dark.grid().time_at(i);
            let mut t = match next_free {
                Some(free) if free > step_start => free,
                _ => step_start,
            };
            while t < step_start + step {
                slots.push(t);
                t += slot;
            }
            next_free = Some(t);
        }
        slots
    }

    /// Tiles to observe in the night of `date`, ordered by slot start.
    ///
    /// Tiles go by score (highest first, ties by tile id). A tile whose
    /// field has no almanac, or is never observable tonight, is skipped.
    pub fn select_tiles_for_night(
        &self,
        date: NaiveDate,
        tile_scores: &[TileScore],
        almanacs: &AlmanacCache,
        dark: &DarkAlmanac,
    ) -> Vec<ScheduledTile> {
        let slots = self.slots(date, dark);
        if slots.is_empty() {
            debug!("No dark or grey time on {}", date);
            return Vec::new();
        }

        let mut ranked: Vec<&TileScore> = tile_scores.iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.tile_id.cmp(&b.tile_id)));

        let mut taken = vec![false; slots.len()];
        let mut free = slots.len();
        let mut scheduled = Vec::new();
        for tile in ranked {
            if free == 0 {
                break;
            }
            let Some(almanac) = almanacs.get(tile.field_id) else {
                debug!(
                    "Tile {} skipped: no almanac for field {}",
                    tile.tile_id, tile.field_id
                );
                continue;
            };
            let slot = (0..slots.len())
                .find(|&s| !taken[s] && almanac.is_observable(slots[s], dark));
            if let Some(s) = slot {
                taken[s] = true;
                free -= 1;
                scheduled.push(ScheduledTile {
                    tile_id: tile.tile_id,
                    field_id: tile.field_id,
                    start: slots[s],
                    score: tile.score,
                });
            }
        }

        scheduled.sort_by_key(|t| (t.start, t.tile_id));
        debug!(
            "Scheduled {} of {} tiles in {} slots on {}",
            scheduled.len(),
            tile_scores.len(),
            slots.len(),
            date
        );
        scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlmanacConfig;
    use crate::geometry::GeometryService;
    use crate::models::Field;
    use chrono::Timelike;

    /// Sun down 20:00-04:00 UTC, Moon always down. Fields at RA >= 180 never
    /// rise; fields at RA >= 90 only after midnight.
    struct StubSky;

    impl GeometryService for StubSky {
        fn airmass(&self, ra: f64, _dec: f64, at: NaiveDateTime) -> f64 {
            if ra >= 180.0 || (ra >= 90.0 && at.hour() >= 12) {
                f64::INFINITY
            } else {
                1.2
            }
        }

        fn sun_altitude(&self, at: NaiveDateTime) -> f64 {
            let h = at.hour();
            if h >= 20 || h < 4 {
                -30.0
            } else {
                10.0
            }
        }

        fn moon_altitude(&self, _at: NaiveDateTime) -> f64 {
            -10.0
        }

        fn moon_illumination(&self, _at: NaiveDateTime) -> f64 {
            0.5
        }

        fn site_longitude(&self) -> f64 {
            0.0
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    fn score(id: u64, field: u32, score: f64) -> TileScore {
        TileScore {
            tile_id: TileId(id),
            field_id: FieldId(field),
            ra: 0.0,
            dec: 0.0,
            score,
        }
    }

    fn setup(fields: &[Field]) -> (AlmanacCache, DarkAlmanac) {
        let config = AlmanacConfig::default();
        let dark = DarkAlmanac::build(&StubSky, date(1), date(3), &config).unwrap();
        let mut cache = AlmanacCache::new(config);
        cache.build_all(fields, date(1), date(3), &StubSky).unwrap();
        (cache, dark)
    }

    #[test]
    fn test_slots_fill_the_night() {
        let (_, dark) = setup(&[]);
        let slots = NightScheduler::new(30, 5).slots(date(1), &dark);
        // 8 hours of dark time, 35 minute slots
        assert_eq!(slots.len(), 14);
        assert_eq!(slots[0], date(1).and_hms_opt(20, 0, 0).unwrap());
        assert_eq!(slots[1], date(1).and_hms_opt(20, 35, 0).unwrap());
        assert_eq!(slots[13], date(2).and_hms_opt(3, 35, 0).unwrap());
    }

    #[test]
    fn test_highest_scores_win_the_night() {
        let fields = [Field::new(FieldId(0), 10.0, -30.0)];
        let (cache, dark) = setup(&fields);
        let tiles: Vec<TileScore> = (1..=20).map(|i| score(i, 0, i as f64)).collect();

        let plan = NightScheduler::new(30, 5).select_tiles_for_night(date(1), &tiles, &cache, &dark);
        assert_eq!(plan.len(), 14);
        assert_eq!(plan[0].tile_id, TileId(20));
        assert_eq!(plan[13].tile_id, TileId(7));
        assert!(plan.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn test_unobservable_and_unknown_fields_skipped() {
        let fields = [
            Field::new(FieldId(0), 10.0, -30.0),
            Field::new(FieldId(1), 200.0, -30.0),
        ];
        let (cache, dark) = setup(&fields);
        let tiles = [score(1, 1, 9.0), score(2, 5, 8.0), score(3, 0, 1.0)];

        let plan = NightScheduler::new(30, 5).select_tiles_for_night(date(2), &tiles, &cache, &dark);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].tile_id, TileId(3));
    }

    #[test]
    fn test_late_rising_field_takes_later_slot() {
        let fields = [
            Field::new(FieldId(0), 10.0, -30.0),
            Field::new(FieldId(1), 100.0, -30.0),
        ];
        let (cache, dark) = setup(&fields);
        let tiles = [score(1, 1, 9.0), score(2, 0, 1.0)];

        let plan = NightScheduler::new(30, 5).select_tiles_for_night(date(1), &tiles, &cache, &dark);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].tile_id, TileId(2));
        assert_eq!(plan[1].tile_id, TileId(1));
        assert_eq!(plan[1].start, date(2).and_hms_opt(0, 5, 0).unwrap());
    }

    #[test]
    fn test_ties_broken_by_tile_id() {
        let fields = [Field::new(FieldId(0), 10.0, -30.0)];
        let (cache, dark) = setup(&fields);
        let tiles = [score(5, 0, 2.0), score(3, 0, 2.0), score(4, 0, 2.0)];

        let scheduler = NightScheduler::new(30, 5);
        let first = scheduler.select_tiles_for_night(date(1), &tiles, &cache, &dark);
        let ids: Vec<TileId> = first.iter().map(|t| t.tile_id).collect();
        assert_eq!(ids, vec![TileId(3), TileId(4), TileId(5)]);
        assert_eq!(first, scheduler.select_tiles_for_night(date(1), &tiles, &cache, &dark));
    }

    #[test]
    fn test_night_outside_calendar_is_empty() {
        let fields = [Field::new(FieldId(0), 10.0, -30.0)];
        let (cache, dark) = setup(&fields);
        let plan = NightScheduler::new(30, 5).select_tiles_for_night(
            date(20),
            &[score(1, 0, 1.0)],
            &cache,
            &dark,
        );
        assert!(plan.is_empty());
    }
}
