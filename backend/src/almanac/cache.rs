//! Almanac cache holding one canonical entry per field.

use chrono::NaiveDate;
use log::debug;
use rayon::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::AlmanacEntry;
use crate::config::AlmanacConfig;
use crate::error::SurveyResult;
use crate::geometry::GeometryService;
use crate::models::{Field, FieldId};

/// How a cache lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The held entry already covered the range.
    Hit,
    /// No entry was held; a new one was built.
    Built,
    /// The held entry fell short and was replaced by one spanning both ranges.
    Rebuilt,
}

/// Field almanacs keyed by field id.
///
/// An entry that does not cover a requested range is never patched: it is
/// rebuilt over the union of its own range and the request, and the old
/// entry is dropped.
#[derive(Debug, Clone, Default)]
pub struct AlmanacCache {
    config: AlmanacConfig,
    entries: HashMap<FieldId, AlmanacEntry>,
}

impl AlmanacCache {
    pub fn new(config: AlmanacConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AlmanacConfig {
        &self.config
    }

    /// Range an entry for `field_id` must span to cover `[start, end]`, or
    /// `None` if the held entry already does.
    fn required_range(
        &self,
        field_id: FieldId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<(NaiveDate, NaiveDate)> {
        match self.entries.get(&field_id) {
            Some(held) if held.covers_range(start, end) => None,
            Some(held) => Some((held.start_date().min(start), held.end_date().max(end))),
            None => Some((start, end)),
        }
    }

    /// Entry for `field` covering the nights `[start, end]`.
    pub fn get_or_build(
        &mut self,
        field: &Field,
        start: NaiveDate,
        end: NaiveDate,
        geometry: &dyn GeometryService,
    ) -> SurveyResult<(&AlmanacEntry, CacheOutcome)> {
        let Some((from, to)) = self.required_range(field.field_id, start, end) else {
            return Ok((&self.entries[&field.field_id], CacheOutcome::Hit));
        };

        let built = AlmanacEntry::build(field, from, to, &self.config, geometry)?;
        match self.entries.entry(field.field_id) {
            Entry::Occupied(mut slot) => {
                debug!(
                    "Rebuilding almanac for field {} over {} to {}",
                    field.field_id, from, to
                );
                slot.insert(built);
                Ok((slot.into_mut(), CacheOutcome::Rebuilt))
            }
            Entry::Vacant(slot) => Ok((slot.insert(built), CacheOutcome::Built)),
        }
    }

    /// Make sure every field in `fields` covers `[start, end]`, building the
    /// missing entries in parallel. Returns the ids of the entries that were
    /// built or rebuilt, in input order.
    pub fn build_all(
        &mut self,
        fields: &[Field],
        start: NaiveDate,
        end: NaiveDate,
        geometry: &dyn GeometryService,
    ) -> SurveyResult<Vec<FieldId>> {
        let jobs: Vec<(Field, NaiveDate, NaiveDate)> = fields
            .iter()
            .filter_map(|field| {
                self.required_range(field.field_id, start, end)
                    .map(|(from, to)| (*field, from, to))
            })
            .collect();
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let config = &self.config;
        let built = jobs
            .par_iter()
            .map(|(field, from, to)| AlmanacEntry::build(field, *from, *to, config, geometry))
            .collect::<SurveyResult<Vec<_>>>()?;

        debug!("Built {} field almanacs for {} to {}", built.len(), start, end);
        let mut changed = Vec::with_capacity(built.len());
        for entry in built {
            if !changed.contains(&entry.field_id) {
                changed.push(entry.field_id);
            }
            self.entries.insert(entry.field_id, entry);
        }
        Ok(changed)
    }

    pub fn get(&self, field_id: FieldId) -> Option<&AlmanacEntry> {
        self.entries.get(&field_id)
    }

    /// Entries in field-id order.
    pub fn entries(&self) -> Vec<&AlmanacEntry> {
        let mut entries: Vec<&AlmanacEntry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.field_id);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
