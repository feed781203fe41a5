//! Fibre assignment inside one tile.

use std::cmp::Ordering;

use crate::config::{AllocationMethod, TilingConfig};
use crate::geometry::{cos_separation, GeometryService};
use crate::models::{FibreAssignment, FibreRole, Field, TargetId};

use super::ranking::{candidate_rank, combined_value};
use super::Candidate;

/// Fibres placed so far on a tile under construction.
pub(crate) struct FibreLayout<'a> {
    config: &'a TilingConfig,
    cos_exclusion: f64,
    placed: Vec<(TargetId, [f64; 3])>,
    budget: usize,
    pub science: Vec<&'a Candidate>,
    pub standard: Vec<TargetId>,
    pub guide: Vec<TargetId>,
}

impl<'a> FibreLayout<'a> {
    pub fn new(config: &'a TilingConfig) -> Self {
        let exclusion = config.exclusion_degrees();
        Self {
            config,
            cos_exclusion: if exclusion > 0.0 {
                exclusion.to_radians().cos()
            } else {
                f64::INFINITY
            },
            placed: Vec::new(),
            budget: config.fibres_per_tile.saturating_sub(config.sky_per_tile) as usize,
            science: Vec::new(),
            standard: Vec::new(),
            guide: Vec::new(),
        }
    }

    fn holds(&self, id: TargetId) -> bool {
        self.placed.iter().any(|(placed, _)| *placed == id)
    }

    fn collides(&self, xyz: &[f64; 3]) -> bool {
        self.placed
            .iter()
            .any(|(_, other)| cos_separation(xyz, other) > self.cos_exclusion)
    }

    fn quota_full(&self, role: FibreRole) -> bool {
        match role {
            FibreRole::Science => self.science.len() >= self.config.targets_per_tile as usize,
            FibreRole::Standard => self.standard.len() >= self.config.standards_per_tile as usize,
            FibreRole::Guide => self.guide.len() >= self.config.guides_per_tile as usize,
            FibreRole::Sky => true,
        }
    }

    fn record(&mut self, candidate: &'a Candidate, role: FibreRole) {
        match role {
            FibreRole::Science => self.science.push(candidate),
            FibreRole::Standard => self.standard.push(candidate.id),
            FibreRole::Guide => self.guide.push(candidate.id),
            FibreRole::Sky => {}
        }
    }

    /// Try to give `candidate` a fibre in `role`.
    ///
    /// A target already on the tile only takes the extra role when
    /// `multi_role_counts_both` is set, and never a second fibre.
    pub fn try_place(&mut self, candidate: &'a Candidate, role: FibreRole) -> bool {
        if self.quota_full(role) {
            return false;
        }
        if self.holds(candidate.id) {
            if !self.config.multi_role_counts_both {
                return false;
            }
            let already = match role {
                FibreRole::Science => self.science.iter().any(|c| c.id == candidate.id),
                FibreRole::Standard => self.standard.contains(&candidate.id),
                FibreRole::Guide => self.guide.contains(&candidate.id),
                FibreRole::Sky => true,
            };
            if already {
                return false;
            }
            self.record(candidate, role);
            return true;
        }
        if self.budget == 0 || self.collides(&candidate.xyz) {
            return false;
        }
        self.budget -= 1;
        self.placed.push((candidate.id, candidate.xyz));
        self.record(candidate, role);
        true
    }

    pub fn fill(&mut self, role: FibreRole, ordered: &[&'a Candidate]) {
        for candidate in ordered {
            if self.quota_full(role) {
                break;
            }
            self.try_place(candidate, role);
        }
    }

    /// Fill a supplement role, keeping targets still wanted as science
    /// for last. Unless `multi_role_counts_both` is set those only make up a
    /// shortfall below the role's minimum.
    pub fn fill_supplements(
        &mut self,
        role: FibreRole,
        ordered: &[&'a Candidate],
        science: &[&Candidate],
    ) {
        let (wanted, free): (Vec<&'a Candidate>, Vec<&'a Candidate>) = ordered
            .iter()
            .copied()
            .partition(|c| science.iter().any(|s| s.id == c.id));
        self.fill(role, &free);
        if self.config.multi_role_counts_both {
            self.fill(role, &wanted);
            return;
        }
        let minimum = match role {
            FibreRole::Standard => self.config.standards_per_tile_min,
            FibreRole::Guide => self.config.guides_per_tile_min,
            _ => 0,
        } as usize;
        for candidate in wanted {
            let held = match role {
                FibreRole::Standard => self.standard.len(),
                _ => self.guide.len(),
            };
            if held >= minimum {
                break;
            }
            self.try_place(candidate, role);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.standard.len() >= self.config.standards_per_tile_min as usize
            && self.guide.len() >= self.config.guides_per_tile_min as usize
    }

    pub fn into_assignment(self) -> FibreAssignment {
        let sky = (self.config.sky_per_tile as usize)
            .min((self.config.fibres_per_tile as usize).saturating_sub(self.placed.len()));
        FibreAssignment {
            science: self.science.iter().map(|c| c.id).collect(),
            standard: self.standard,
            guide: self.guide,
            sky: sky as u16,
        }
    }
}

/// Roles in the order they are filled.
pub(crate) fn role_order(config: &TilingConfig) -> Vec<FibreRole> {
    const CANONICAL: [FibreRole; 3] = [FibreRole::Guide, FibreRole::Standard, FibreRole::Science];
    match config.allocation_method {
        AllocationMethod::CombinedWeighted => CANONICAL.to_vec(),
        AllocationMethod::Sequential => {
            let mut order: Vec<FibreRole> = Vec::with_capacity(3);
            for role in config.sequential_ordering.iter().chain(CANONICAL.iter()) {
                if *role != FibreRole::Sky && !order.contains(role) {
                    order.push(*role);
                }
            }
            order
        }
    }
}

fn descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

/// How science candidates are ordered before filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScienceOrder {
    /// By the configured allocation method.
    Ranked,
    /// Fewest in-tile conflicts first, then as `Ranked`.
    FewestConflicts,
}

/// For each candidate, how many others on the tile sit inside the fibre
/// exclusion radius.
pub(crate) fn in_tile_conflicts(config: &TilingConfig, science: &[&Candidate]) -> Vec<u32> {
    let mut conflicts = vec![0u32; science.len()];
    let exclusion = config.exclusion_degrees();
    if exclusion <= 0.0 {
        return conflicts;
    }
    let cos_exclusion = exclusion.to_radians().cos();
    for i in 0..science.len() {
        for j in i + 1..science.len() {
            if cos_separation(&science[i].xyz, &science[j].xyz) > cos_exclusion {
                conflicts[i] += 1;
                conflicts[j] += 1;
            }
        }
    }
    conflicts
}

/// Science candidates in pick order.
pub(crate) fn order_science<'a>(
    config: &TilingConfig,
    science: &[&'a Candidate],
    order: ScienceOrder,
) -> Vec<&'a Candidate> {
    let combined = config.allocation_method == AllocationMethod::CombinedWeighted;
    let conflicts = if combined || order == ScienceOrder::FewestConflicts {
        in_tile_conflicts(config, science)
    } else {
        vec![0; science.len()]
    };
    let mut keyed: Vec<(u32, f64, &Candidate)> = science
        .iter()
        .zip(conflicts)
        .map(|(c, n)| {
            let key = if combined {
                combined_value(config, c, n)
            } else {
                candidate_rank(config, c)
            };
            let crowding = match order {
                ScienceOrder::Ranked => 0,
                ScienceOrder::FewestConflicts => n,
            };
            (crowding, key, *c)
        })
        .collect();
    keyed.sort_by(|(na, ka, a), (nb, kb, b)| {
        na.cmp(nb)
            .then(descending(*ka, *kb))
            .then(a.id.cmp(&b.id))
    });
    keyed.into_iter().map(|(_, _, c)| c).collect()
}

/// Standards or guides in pick order.
///
/// Supplements that are still wanted as science on this tile go last.
pub(crate) fn order_supplements<'a>(
    config: &TilingConfig,
    geometry: &dyn GeometryService,
    centre: &Field,
    supplements: &[&'a Candidate],
    science: &[&Candidate],
) -> Vec<&'a Candidate> {
    let mut keyed: Vec<(bool, f64, &Candidate)> = supplements
        .iter()
        .map(|c| {
            let wanted = science.iter().any(|s| s.id == c.id);
            let key = if config.rank_supplements {
                -candidate_rank(config, c)
            } else {
                geometry
                    .angular_distance(centre.ra, centre.dec, c.ra, c.dec)
                    .value()
            };
            (wanted, key, *c)
        })
        .collect();
    keyed.sort_by(|(wa, ka, a), (wb, kb, b)| {
        wa.cmp(wb)
            .then(ka.total_cmp(kb))
            .then(a.id.cmp(&b.id))
    });
    keyed.into_iter().map(|(_, _, c)| c).collect()
}

/// Lay out fibres for one tile centre.
pub(crate) fn plan_fibres<'a>(
    config: &'a TilingConfig,
    geometry: &dyn GeometryService,
    centre: &Field,
    science: &[&'a Candidate],
    standards: &[&'a Candidate],
    guides: &[&'a Candidate],
) -> FibreLayout<'a> {
    plan_fibres_ordered(config, geometry, centre, science, standards, guides, ScienceOrder::Ranked)
}

pub(crate) fn plan_fibres_ordered<'a>(
    config: &'a TilingConfig,
    geometry: &dyn GeometryService,
    centre: &Field,
    science: &[&'a Candidate],
    standards: &[&'a Candidate],
    guides: &[&'a Candidate],
    order: ScienceOrder,
) -> FibreLayout<'a> {
    let mut layout = FibreLayout::new(config);
    for role in role_order(config) {
        match role {
            FibreRole::Science => layout.fill(role, &order_science(config, science, order)),
            FibreRole::Standard => layout.fill_supplements(
                role,
                &order_supplements(config, geometry, centre, standards, science),
                science,
            ),
            FibreRole::Guide => layout.fill_supplements(
                role,
                &order_supplements(config, geometry, centre, guides, science),
                science,
            ),
            FibreRole::Sky => {}
        }
    }
    layout
}
