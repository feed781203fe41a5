//! The greedy covering loop.

use log::{debug, info, warn};
use rand::Rng;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

use crate::config::TilingConfig;
use crate::error::{SurveyError, SurveyResult};
use crate::geometry::{unit_vector, GeometryService};
use crate::models::{
    FibreAssignment, FibreRole, Field, SkyWindow, Target, TargetCatalog, TargetId, Tile, TileId,
};

use super::difficulty::NeighbourIndex;
use super::fibres::{plan_fibres_ordered, ScienceOrder};
use super::ranking::tile_score;
use super::{AllocationOutcome, AllocationRequest, Candidate, TileAllocator};

/// A planned tile, detached from the pool it was planned against.
#[derive(Debug)]
struct Plan {
    centre: usize,
    fibres: FibreAssignment,
    score: f64,
    density: usize,
    valid: bool,
}

/// Supplement targets (standards or guides) and their per-centre footprints.
struct Supplements {
    pool: Vec<Candidate>,
    footprints: Vec<Vec<usize>>,
}

impl Supplements {
    fn new(
        catalog: &TargetCatalog,
        ids: &[TargetId],
        role: FibreRole,
        centres: &[Field],
        radius: f64,
    ) -> SurveyResult<Self> {
        let pool = collect_candidates(catalog, ids, |t| t.roles.has(role))?;
        let footprints = footprints(&pool, centres, radius);
        Ok(Self { pool, footprints })
    }

    fn around(&self, centre: usize) -> Vec<&Candidate> {
        self.footprints[centre].iter().map(|&i| &self.pool[i]).collect()
    }
}

/// Snapshot of the catalog targets behind `ids`, deduplicated, in id order.
fn collect_candidates(
    catalog: &TargetCatalog,
    ids: &[TargetId],
    keep: impl Fn(&Target) -> bool,
) -> SurveyResult<Vec<Candidate>> {
    let mut seen = HashSet::new();
    let mut pool = Vec::new();
    for id in ids {
        if !seen.insert(*id) {
            continue;
        }
        let target = catalog
            .get(*id)
            .ok_or_else(|| SurveyError::state(format!("target {} is not in the catalog", id)))?;
        if keep(target) {
            pool.push(Candidate::from(target));
        }
    }
    pool.sort_by_key(|c| c.id);
    Ok(pool)
}

fn footprints(pool: &[Candidate], centres: &[Field], radius: f64) -> Vec<Vec<usize>> {
    let index = NeighbourIndex::new(pool.iter().map(|c| (c.dec, c.xyz)));
    centres
        .par_iter()
        .map(|centre| index.within(&unit_vector(centre.ra, centre.dec), centre.dec, radius))
        .collect()
}

fn in_science_pool(config: &TilingConfig, window: &SkyWindow, target: &Target) -> bool {
    target.is_remaining() && window.contains(target.ra, target.dec) && config.in_mag_ranges(target.mag)
}

/// Immutable inputs shared by the parallel planning passes.
struct Planner<'a> {
    config: &'a TilingConfig,
    geometry: &'a dyn GeometryService,
    centres: &'a [Field],
    footprints: &'a [Vec<usize>],
    standards: &'a Supplements,
    guides: &'a Supplements,
}

impl Planner<'_> {
    fn plan(&self, pool: &[Candidate], centre: usize, live: &[bool], completeness: f64) -> Plan {
        self.plan_ordered(pool, centre, live, completeness, ScienceOrder::Ranked)
    }

    fn plan_ordered(
        &self,
        pool: &[Candidate],
        centre: usize,
        live: &[bool],
        completeness: f64,
        order: ScienceOrder,
    ) -> Plan {
        let science: Vec<&Candidate> = self.footprints[centre]
            .iter()
            .filter(|&&i| live[i])
            .map(|&i| &pool[i])
            .collect();
        let layout = plan_fibres_ordered(
            self.config,
            self.geometry,
            &self.centres[centre],
            &science,
            &self.standards.around(centre),
            &self.guides.around(centre),
            order,
        );
        Plan {
            centre,
            score: tile_score(self.config, &layout.science, completeness),
            density: science.len(),
            valid: layout.is_valid(),
            fibres: layout.into_assignment(),
        }
    }

    fn plan_all(
        &self,
        pool: &[Candidate],
        centres: &[usize],
        live: &[bool],
        completeness: f64,
    ) -> Vec<Plan> {
        centres
            .par_iter()
            .map(|&c| self.plan(pool, c, live, completeness))
            .collect()
    }

    /// Drop placed targets from a cached plan without laying it out again.
    fn prune(
        &self,
        plan: &mut Plan,
        pool: &[Candidate],
        slots: &HashMap<TargetId, usize>,
        live: &[bool],
        completeness: f64,
    ) {
        plan.fibres.science.retain(|id| live[slots[id]]);
        let science: Vec<&Candidate> = plan.fibres.science.iter().map(|id| &pool[slots[id]]).collect();
        plan.score = tile_score(self.config, &science, completeness);
        plan.density = self.footprints[plan.centre].iter().filter(|&&i| live[i]).count();
    }
}

/// Highest score, then fewest live candidates in the footprint, then the
/// lowest centre index.
fn outranks(plan: &Plan, current: &Plan) -> bool {
    plan.score
        .total_cmp(&current.score)
        .then(current.density.cmp(&plan.density))
        .then(current.centre.cmp(&plan.centre))
        .is_gt()
}

impl TileAllocator {
    /// Cover the science candidates of `request` with tiles.
    ///
    /// Candidates must be catalog ids; satisfied targets, targets outside
    /// the window and targets outside `mag_ranges` are ignored. Computed
    /// difficulties are written back to the catalog.
    pub fn allocate(
        &mut self,
        catalog: &mut TargetCatalog,
        request: &AllocationRequest<'_>,
    ) -> SurveyResult<AllocationOutcome> {
        let config = &self.config;
        let window = request.window;
        let mut pool = collect_candidates(catalog, request.candidates, |t| {
            in_science_pool(config, &window, t)
        })?;
        if pool.is_empty() {
            info!("No science candidates in window, nothing to allocate");
            return Ok(AllocationOutcome::default());
        }

        let exclusion = config.exclusion_degrees();
        let radius = config.tile_radius;
        let index = NeighbourIndex::new(pool.iter().map(|c| (c.dec, c.xyz)));
        let mut live = vec![true; pool.len()];
        for (candidate, difficulty) in pool.iter_mut().zip(index.all_counts(exclusion, &live)) {
            candidate.difficulty = difficulty;
        }
        let slots: HashMap<TargetId, usize> =
            pool.iter().enumerate().map(|(i, c)| (c.id, i)).collect();

        let centres = request.centres;
        let centre_index = NeighbourIndex::new(
            centres
                .iter()
                .map(|c| (c.dec, unit_vector(c.ra, c.dec))),
        );
        let science_footprints = footprints(&pool, centres, radius);
        let standards =
            Supplements::new(catalog, request.standards, FibreRole::Standard, centres, radius)?;
        let guides = Supplements::new(catalog, request.guides, FibreRole::Guide, centres, radius)?;
        let planner = Planner {
            config,
            geometry: self.geometry.as_ref(),
            centres,
            footprints: &science_footprints,
            standards: &standards,
            guides: &guides,
        };

        let total = pool.len();
        let mut assigned = 0usize;
        let mut disqualified = vec![false; centres.len()];
        let mut plans: Vec<Option<Plan>> = (0..centres.len()).map(|_| None).collect();
        let mut boosted = false;
        let mut tiles: Vec<Tile> = Vec::new();
        let mut tile_centres: Vec<usize> = Vec::new();
        let mut progress = Vec::new();
        let mut exhausted = false;

        info!(
            "Allocating {} science candidates over {} centres ({} standards, {} guides)",
            total,
            centres.len(),
            standards.pool.len(),
            guides.pool.len()
        );

        let mut stale: Vec<usize> = (0..centres.len()).collect();
        loop {
            let completeness = assigned as f64 / total as f64;
            if assigned == total || completeness >= config.completeness_target {
                break;
            }
            if !boosted && completeness >= config.completeness_priority_threshold {
                // Scores change shape past the threshold
                boosted = true;
                stale = (0..centres.len()).filter(|&c| !disqualified[c]).collect();
            }

            for plan in planner.plan_all(&pool, &stale, &live, completeness) {
                let centre = plan.centre;
                if !plan.valid && config.disqualify_below_min && !plan.fibres.science.is_empty() {
                    warn!(
                        "Centre {} disqualified: {} standards, {} guides",
                        centres[centre].field_id,
                        plan.fibres.standard.len(),
                        plan.fibres.guide.len()
                    );
                    disqualified[centre] = true;
                    plans[centre] = None;
                } else {
                    plans[centre] = Some(plan);
                }
            }

            let mut best: Option<&Plan> = None;
            for plan in plans.iter().flatten() {
                if plan.fibres.science.is_empty() {
                    continue;
                }
                if best.map_or(true, |current| outranks(plan, current)) {
                    best = Some(plan);
                }
            }
            let Some(chosen) = best.map(|p| p.centre) else {
                exhausted = true;
                warn!(
                    "Allocation exhausted at completeness {:.4} ({} of {} targets placed)",
                    completeness, assigned, total
                );
                break;
            };
            let Some(plan) = plans[chosen].take() else {
                break;
            };

            let centre = &centres[chosen];
            let pa = if config.randomise_pa {
                self.rng.gen_range(0.0..360.0)
            } else {
                0.0
            };
            let tile_id = TileId(self.next_tile_id);
            self.next_tile_id += 1;

            for id in &plan.fibres.science {
                live[slots[id]] = false;
            }
            assigned += plan.fibres.science.len();
            let completeness = assigned as f64 / total as f64;

            let xyz = unit_vector(centre.ra, centre.dec);
            if config.recompute_difficulty && exclusion > 0.0 {
                for i in index.within(&xyz, centre.dec, radius + exclusion) {
                    if live[i] {
                        pool[i].difficulty = index.neighbour_count(i, exclusion, &live);
                    }
                }
            }

            // Centres whose footprint or crowding the new tile touched
            let touched: Vec<usize> = centre_index
                .within(&xyz, centre.dec, 2.0 * radius + exclusion)
                .into_iter()
                .filter(|&c| !disqualified[c])
                .collect();
            if config.repick_after_complete {
                stale = touched;
            } else {
                stale = vec![chosen];
                for c in touched {
                    if let Some(cached) = plans[c].as_mut() {
                        planner.prune(cached, &pool, &slots, &live, completeness);
                    }
                }
            }

            debug!(
                "Tile {} at field {}: {} science, {} standards, {} guides, score {:.3}",
                tile_id,
                centre.field_id,
                plan.fibres.science.len(),
                plan.fibres.standard.len(),
                plan.fibres.guide.len(),
                plan.score
            );
            tiles.push(Tile {
                id: tile_id,
                field_id: centre.field_id,
                ra: centre.ra,
                dec: centre.dec,
                pa,
                fibres: plan.fibres,
                score: plan.score,
                valid: plan.valid,
            });
            tile_centres.push(chosen);
            progress.push(completeness);
        }

        let target_reached = assigned as f64 / total as f64 >= config.completeness_target;
        if config.repick_after_complete && target_reached && assigned < total {
            let before = assigned;
            let capacity = config.targets_per_tile as usize;
            for (tile, &centre) in tiles.iter_mut().zip(&tile_centres) {
                if tile.count_science() >= capacity {
                    continue;
                }
                let held: Vec<usize> = tile.fibres.science.iter().map(|id| slots[id]).collect();
                for &i in &held {
                    live[i] = true;
                }
                let completeness = (assigned - held.len()) as f64 / total as f64;
                let plan = planner.plan_ordered(
                    &pool,
                    centre,
                    &live,
                    completeness,
                    ScienceOrder::FewestConflicts,
                );
                let improves = plan.fibres.science.len() > held.len() && (plan.valid || !tile.valid);
                if improves {
                    for id in &plan.fibres.science {
                        live[slots[id]] = false;
                    }
                    assigned = assigned - held.len() + plan.fibres.science.len();
                    tile.fibres = plan.fibres;
                    tile.score = plan.score;
                    tile.valid = plan.valid;
                } else {
                    for &i in &held {
                        live[i] = false;
                    }
                }
            }
            if assigned > before {
                info!(
                    "Repick pass placed {} more science targets on under-filled tiles",
                    assigned - before
                );
            }
        }

        for candidate in &pool {
            if let Some(target) = catalog.get_mut(candidate.id) {
                target.difficulty = candidate.difficulty;
            }
        }

        let completeness = assigned as f64 / total as f64;
        info!(
            "Allocated {} tiles, completeness {:.4}{}",
            tiles.len(),
            completeness,
            if exhausted { " (exhausted)" } else { "" }
        );
        Ok(AllocationOutcome {
            tiles,
            completeness,
            progress,
            remaining: pool
                .iter()
                .zip(&live)
                .filter(|(_, live)| **live)
                .map(|(c, _)| c.id)
                .collect(),
            exhausted,
        })
    }
}

#[cfg(test)]
#[path = "greedy_tests.rs"]
mod greedy_tests;
