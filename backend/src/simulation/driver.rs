//! The simulation driver.

use chrono::NaiveDate;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::sync::Arc;

use super::{NightReport, SimPhase, SimulationState, SimulationSummary};
use crate::allocation::{AllocationRequest, TileAllocator};
use crate::almanac::{AlmanacCache, AlmanacRecord, DarkAlmanac};
use crate::catalog::{CatalogStore, TargetUpdate, WriteBatch};
use crate::config::SurveyConfig;
use crate::error::{SurveyError, SurveyResult};
use crate::geometry::GeometryService;
use crate::models::{FibreRole, FieldId, SkyWindow, TargetCatalog, TargetId, Tile, TileId};
use crate::outcome::ObservationOutcomeModel;
use crate::scheduler::NightScheduler;

fn almanac_records(cache: &AlmanacCache, changed: &[FieldId]) -> Vec<AlmanacRecord> {
    changed
        .iter()
        .filter_map(|id| cache.get(*id))
        .map(|entry| entry.to_record())
        .collect()
}

/// Runs the survey night by night against a catalog store.
pub struct SimulationDriver {
    config: SurveyConfig,
    store: Arc<dyn CatalogStore>,
    geometry: Arc<dyn GeometryService>,
    allocator: TileAllocator,
    outcome: ObservationOutcomeModel,
    scheduler: NightScheduler,
    rng: ChaCha8Rng,
    state: Option<SimulationState>,
}

impl SimulationDriver {
    pub fn new(
        config: SurveyConfig,
        store: Arc<dyn CatalogStore>,
        geometry: Arc<dyn GeometryService>,
    ) -> SurveyResult<Self> {
        config.validate()?;
        let allocator = TileAllocator::new(config.tiling.clone(), geometry.clone())?;
        let outcome = ObservationOutcomeModel::new(config.outcome.clone())?;
        let scheduler = NightScheduler::from_config(&config.simulation);
        let rng = ChaCha8Rng::seed_from_u64(config.simulation.seed);
        Ok(Self {
            config,
            store,
            geometry,
            allocator,
            outcome,
            scheduler,
            rng,
            state: None,
        })
    }

    pub fn config(&self) -> &SurveyConfig {
        &self.config
    }

    pub fn phase(&self) -> SimPhase {
        self.state.as_ref().map_or(SimPhase::Init, |s| s.phase)
    }

    pub fn state(&self) -> Option<&SimulationState> {
        self.state.as_ref()
    }

    /// Load the catalog, build the calendars and lay out the initial tiles.
    pub async fn init(&mut self) -> SurveyResult<()> {
        if self.state.is_some() {
            return Err(SurveyError::state("simulation is already initialised"));
        }
        let sim = &self.config.simulation;
        let window = sim.window;
        let reach = window.inflate(self.config.tiling.tile_radius);
        info!(
            "Initialising survey {} to {} over RA [{}, {}] Dec [{}, {}]",
            sim.date_start, sim.date_end, window.ra_min, window.ra_max, window.dec_min, window.dec_max
        );

        // Step 1: catalog
        let science = self.store.load_targets(FibreRole::Science, &window).await?;
        let standards = self.store.load_targets(FibreRole::Standard, &reach).await?;
        let guides = self.store.load_targets(FibreRole::Guide, &reach).await?;
        let fields = self.store.load_fields().await?;
        let mut catalog = TargetCatalog::merge([science, standards, guides]);
        info!(
            "Loaded {} targets ({} science) and {} fields",
            catalog.len(),
            catalog.science_count(),
            fields.len()
        );

        // Step 2: tiling, staged on a copy of the allocator
        let mut allocator = self.allocator.clone();
        let centres = allocator.tile_centres(&window, &fields)?;
        let candidates = catalog.remaining_science();
        let standards = catalog.ids_with_role(FibreRole::Standard);
        let guides = catalog.ids_with_role(FibreRole::Guide);
        let outcome = allocator.allocate(
            &mut catalog,
            &AllocationRequest {
                candidates: &candidates,
                standards: &standards,
                guides: &guides,
                window,
                centres: &centres,
            },
        )?;
        if outcome.exhausted {
            warn!(
                "Initial tiling stopped at completeness {:.4} with {} targets unplaced",
                outcome.completeness,
                outcome.remaining.len()
            );
        }

        // Step 3: calendars
        let dark = DarkAlmanac::build(
            self.geometry.as_ref(),
            sim.date_start,
            sim.date_end,
            &self.config.almanac,
        )?;
        let mut state = SimulationState::new(
            sim.date_start,
            catalog,
            AlmanacCache::new(self.config.almanac.clone()),
            dark.clone(),
            centres,
        );
        state.replace_tiles(&[], &outcome.tiles);
        let changed = state.almanacs.build_all(
            &state.tile_fields(),
            sim.date_start,
            sim.date_end,
            self.geometry.as_ref(),
        )?;

        // Step 4: persist, then commit
        let batch = WriteBatch {
            tiles: outcome.tiles,
            almanacs: almanac_records(&state.almanacs, &changed),
            dark: Some(dark),
            ..Default::default()
        };
        self.persist(&batch).await?;
        info!(
            "Survey initialised with {} tiles over {} fields",
            state.tiles.len(),
            state.almanacs.len()
        );
        self.allocator = allocator;
        self.state = Some(state);
        Ok(())
    }

    /// Simulate the night starting on `date`.
    ///
    /// `date` must lie in `[date_start, date_end]`. The night is worked out
    /// on a copy of the state, which replaces the live state only once the
    /// store has taken all of the night's writes.
    pub async fn run_night(&mut self, date: NaiveDate) -> SurveyResult<NightReport> {
        self.config.simulation.check_date(date)?;
        let Some(current) = self.state.as_ref() else {
            return Err(SurveyError::state("simulation has not been initialised"));
        };
        if current.phase == SimPhase::Done {
            return Err(SurveyError::state("simulation has already finished"));
        }

        let mut state = current.clone();
        let mut allocator = self.allocator.clone();
        let mut rng = self.rng.clone();
        let mut batch = WriteBatch::default();

        // Step 1: calendar coverage
        if !state.dark.covers(date) {
            let start = state.dark.start_date().min(date);
            let end = state.dark.end_date().max(date);
            debug!("Dark almanac does not cover {}, rebuilding {} to {}", date, start, end);
            state.dark = DarkAlmanac::build(self.geometry.as_ref(), start, end, &self.config.almanac)?;
            batch.dark = Some(state.dark.clone());
        }
        let changed = state.almanacs.build_all(
            &state.tile_fields(),
            date,
            self.config.simulation.date_end.max(date),
            self.geometry.as_ref(),
        )?;
        batch.almanacs = almanac_records(&state.almanacs, &changed);

        // Step 2: schedule
        let scores: Vec<_> = self
            .store
            .load_tile_scores(&self.config.simulation.score_metrics)
            .await?
            .into_iter()
            .filter(|row| state.tiles.contains_key(&row.tile_id))
            .collect();
        let tonight = self
            .scheduler
            .select_tiles_for_night(date, &scores, &state.almanacs, &state.dark);

        // Step 3: observe
        let mut observed: Vec<TargetId> = Vec::new();
        for slot in &tonight {
            if let Some(tile) = state.tiles.get(&slot.tile_id) {
                observed.extend(
                    tile.fibres
                        .science
                        .iter()
                        .copied()
                        .filter(|id| state.catalog.get(*id).is_some_and(|t| t.is_remaining())),
                );
            }
        }
        let mut tiers = Vec::with_capacity(observed.len());
        let mut visits = Vec::with_capacity(observed.len());
        for id in &observed {
            if let Some(target) = state.catalog.get_mut(*id) {
                target.state.visits += 1;
                tiers.push(target.tier);
                visits.push(target.state.visits);
            }
        }
        let outcomes = self.outcome.simulate_outcomes(&tiers, &visits, &mut rng)?;
        let mut satisfied = 0;
        for (id, success) in observed.iter().zip(&outcomes) {
            if let Some(target) = state.catalog.get_mut(*id) {
                if *success {
                    target.state.satisfied = true;
                    satisfied += 1;
                }
                batch.targets.push(TargetUpdate {
                    target_id: *id,
                    visits: target.state.visits,
                    satisfied: target.state.satisfied,
                });
            }
        }

        // Step 4: retile the footprints of observed tiles
        let retired: Vec<TileId> = tonight.iter().map(|s| s.tile_id).collect();
        let observed_tiles: Vec<Tile> = retired
            .iter()
            .filter_map(|id| state.tiles.get(id).cloned())
            .collect();
        state.replace_tiles(&retired, &[]);
        let new_tiles = self.retile(&mut state, &mut allocator, &observed_tiles)?;
        state.replace_tiles(&[], &new_tiles);
        if !new_tiles.is_empty() {
            let changed = state.almanacs.build_all(
                &state.tile_fields(),
                date,
                self.config.simulation.date_end.max(date),
                self.geometry.as_ref(),
            )?;
            batch.almanacs.extend(almanac_records(&state.almanacs, &changed));
        }
        batch.retired = retired;
        batch.tiles = new_tiles;

        // Step 5: persist as one batch, then commit
        state.nights_run += 1;
        state.tiles_observed += tonight.len();
        state.last_night = Some(date);
        state.date = date.succ_opt().unwrap_or(date);
        let completeness = state.catalog.survey_completeness();
        if completeness >= self.config.tiling.completeness_target
            || date >= self.config.simulation.date_end
        {
            state.phase = SimPhase::Done;
        }

        if !batch.is_empty() {
            self.persist(&batch).await?;
        }

        let report = NightReport {
            date,
            tiles_observed: tonight.len(),
            targets_observed: observed.len(),
            targets_satisfied: satisfied,
            tiles_retiled: batch.tiles.len(),
            completeness,
        };
        info!(
            "Night {}: {} tiles, {} targets observed, {} satisfied, {} retiled, completeness {:.4}",
            date,
            report.tiles_observed,
            report.targets_observed,
            report.targets_satisfied,
            report.tiles_retiled,
            completeness
        );
        if state.phase == SimPhase::Done {
            info!("Survey finished after {} nights", state.nights_run);
        }

        self.state = Some(state);
        self.allocator = allocator;
        self.rng = rng;
        Ok(report)
    }

    /// Run from the current state until the survey is done.
    pub async fn run(&mut self) -> SurveyResult<SimulationSummary> {
        if self.state.is_none() {
            self.init().await?;
        }
        while let Some(state) = self.state.as_ref() {
            if state.phase == SimPhase::Done {
                break;
            }
            if state.date > self.config.simulation.date_end {
                if let Some(state) = self.state.as_mut() {
                    state.phase = SimPhase::Done;
                }
                break;
            }
            let date = state.date;
            self.run_night(date).await?;
        }
        Ok(self.summary())
    }

    pub fn summary(&self) -> SimulationSummary {
        match &self.state {
            Some(state) => SimulationSummary {
                nights_run: state.nights_run,
                final_date: state.last_night,
                completeness: state.catalog.survey_completeness(),
                tiles_observed: state.tiles_observed,
                targets_satisfied: state.targets_satisfied(),
                phase: state.phase,
            },
            None => SimulationSummary {
                nights_run: 0,
                final_date: None,
                completeness: 0.0,
                tiles_observed: 0,
                targets_satisfied: 0,
                phase: SimPhase::Init,
            },
        }
    }

    /// New tiles for the unfinished targets around `observed`.
    ///
    /// Each group of overlapping footprints is retiled on its own. Targets
    /// still held by other active tiles are left where they are.
    fn retile(
        &self,
        state: &mut SimulationState,
        allocator: &mut TileAllocator,
        observed: &[Tile],
    ) -> SurveyResult<Vec<Tile>> {
        let radius = self.config.tiling.tile_radius;
        let regions = retile_regions(observed, radius, &self.config.simulation.window);
        if regions.is_empty() {
            return Ok(Vec::new());
        }

        let mut held: HashSet<TargetId> = state.assigned_science();
        let standards = state.catalog.ids_with_role(FibreRole::Standard);
        let guides = state.catalog.ids_with_role(FibreRole::Guide);
        let mut tiles = Vec::new();
        for region in regions {
            let candidates: Vec<TargetId> = state
                .catalog
                .remaining_science()
                .into_iter()
                .filter(|id| !held.contains(id))
                .filter(|id| {
                    state
                        .catalog
                        .get(*id)
                        .is_some_and(|t| region.contains(t.ra, t.dec))
                })
                .collect();
            let reach = region.inflate(radius);
            let centres: Vec<_> = state
                .centres
                .iter()
                .filter(|c| reach.contains(c.ra, c.dec))
                .copied()
                .collect();

            let outcome = allocator.allocate(
                &mut state.catalog,
                &AllocationRequest {
                    candidates: &candidates,
                    standards: &standards,
                    guides: &guides,
                    window: region,
                    centres: &centres,
                },
            )?;
            debug!(
                "Retiled RA [{:.2}, {:.2}] Dec [{:.2}, {:.2}]: {} tiles",
                region.ra_min,
                region.ra_max,
                region.dec_min,
                region.dec_max,
                outcome.tiles.len()
            );
            held.extend(outcome.tiles.iter().flat_map(|t| t.fibres.science.iter().copied()));
            tiles.extend(outcome.tiles);
        }
        Ok(tiles)
    }

    /// Commit a batch, retrying once if the store reports a retryable error.
    async fn persist(&self, batch: &WriteBatch) -> SurveyResult<()> {
        match self.store.commit_batch(batch).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_retryable() => {
                warn!("Store commit failed, retrying once: {}", e);
                self.store.commit_batch(batch).await.map_err(SurveyError::from)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Footprint boxes of `observed`, merged where they overlap and clipped to
/// the survey window.
fn retile_regions(observed: &[Tile], radius: f64, window: &SkyWindow) -> Vec<SkyWindow> {
    SkyWindow::merge_overlapping(
        observed
            .iter()
            .map(|tile| SkyWindow::around(tile.ra, tile.dec, radius)),
    )
    .into_iter()
    .filter_map(|region| region.intersect(window))
    .collect()
}
