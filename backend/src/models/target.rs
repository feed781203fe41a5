//! Survey targets and the merged target catalog.
//!
//! A physical object can be a science target, a flux standard and a guide
//! star at once. The catalog keeps one [`Target`] per object and tracks roles
//! as flags, so observation state never diverges between role lists.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::geometry::unit_vector;

/// Stable identifier of a catalog object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TargetId(pub u64);

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a fibre plays on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FibreRole {
    Science,
    Standard,
    Guide,
    Sky,
}

/// Role flags of a target. Not exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    pub science: bool,
    pub standard: bool,
    pub guide: bool,
}

impl Roles {
    pub const SCIENCE: Roles = Roles {
        science: true,
        standard: false,
        guide: false,
    };
    pub const STANDARD: Roles = Roles {
        science: false,
        standard: true,
        guide: false,
    };
    pub const GUIDE: Roles = Roles {
        science: false,
        standard: false,
        guide: true,
    };

    pub fn union(self, other: Roles) -> Roles {
        Roles {
            science: self.science || other.science,
            standard: self.standard || other.standard,
            guide: self.guide || other.guide,
        }
    }

    pub fn has(&self, role: FibreRole) -> bool {
        match role {
            FibreRole::Science => self.science,
            FibreRole::Standard => self.standard,
            FibreRole::Guide => self.guide,
            FibreRole::Sky => false,
        }
    }
}

/// Redshift programme a science target belongs to.
///
/// Drives the per-visit success probability of the outcome model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetTier {
    /// Primary calibration target, one visit always suffices.
    H0,
    /// Peculiar-velocity target, needs repeat visits.
    Vpec,
    /// Generic low-redshift target.
    #[default]
    LowZ,
}

/// Observation bookkeeping, mutated only by the simulation driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationState {
    pub visits: u32,
    pub satisfied: bool,
}

/// A catalog object with its derived survey position.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub id: TargetId,
    pub ra: f64,
    pub dec: f64,
    /// Unit vector on the celestial sphere, used for fast separation tests.
    pub xyz: [f64; 3],
    pub priority: i32,
    pub mag: f64,
    /// Neighbour count inside the fibre exclusion diameter.
    pub difficulty: u32,
    pub roles: Roles,
    pub tier: TargetTier,
    pub state: ObservationState,
}

/// Row layout of a target as held by a catalog store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub target_id: u64,
    pub ra: f64,
    pub dec: f64,
    #[serde(default)]
    pub priority: i32,
    pub mag: f64,
    #[serde(default)]
    pub is_science: bool,
    #[serde(default)]
    pub is_standard: bool,
    #[serde(default)]
    pub is_guide: bool,
    #[serde(default)]
    pub is_h0_target: bool,
    #[serde(default)]
    pub is_vpec_target: bool,
    #[serde(default)]
    pub visits: u32,
    #[serde(default)]
    pub success: bool,
}

impl Target {
    fn build(id: TargetId, ra: f64, dec: f64, priority: i32, mag: f64, roles: Roles) -> Self {
        Self {
            id,
            ra,
            dec,
            xyz: unit_vector(ra, dec),
            priority,
            mag,
            difficulty: 0,
            roles,
            tier: TargetTier::default(),
            state: ObservationState::default(),
        }
    }

    /// A science target.
    pub fn science(id: u64, ra: f64, dec: f64, priority: i32, mag: f64) -> Self {
        Self::build(TargetId(id), ra, dec, priority, mag, Roles::SCIENCE)
    }

    /// A flux-standard star.
    pub fn standard(id: u64, ra: f64, dec: f64, priority: i32, mag: f64) -> Self {
        Self::build(TargetId(id), ra, dec, priority, mag, Roles::STANDARD)
    }

    /// A guide star.
    pub fn guide(id: u64, ra: f64, dec: f64, priority: i32, mag: f64) -> Self {
        Self::build(TargetId(id), ra, dec, priority, mag, Roles::GUIDE)
    }

    /// A target holding an explicit set of roles.
    pub fn with_roles(id: u64, ra: f64, dec: f64, priority: i32, mag: f64, roles: Roles) -> Self {
        Self::build(TargetId(id), ra, dec, priority, mag, roles)
    }

    /// Set the redshift programme at construction time.
    pub fn in_tier(mut self, tier: TargetTier) -> Self {
        self.tier = tier;
        self
    }

    /// Build a fully-typed target from a store row.
    pub fn from_record(record: &TargetRecord) -> Self {
        let roles = Roles {
            science: record.is_science,
            standard: record.is_standard,
            guide: record.is_guide,
        };
        let tier = if record.is_h0_target {
            TargetTier::H0
        } else if record.is_vpec_target {
            TargetTier::Vpec
        } else {
            TargetTier::LowZ
        };
        let mut target = Self::build(
            TargetId(record.target_id),
            record.ra,
            record.dec,
            record.priority,
            record.mag,
            roles,
        )
        .in_tier(tier);
        target.state = ObservationState {
            visits: record.visits,
            satisfied: record.success,
        };
        target
    }

    /// Store row for this target.
    pub fn to_record(&self) -> TargetRecord {
        TargetRecord {
            target_id: self.id.0,
            ra: self.ra,
            dec: self.dec,
            priority: self.priority,
            mag: self.mag,
            is_science: self.roles.science,
            is_standard: self.roles.standard,
            is_guide: self.roles.guide,
            is_h0_target: self.tier == TargetTier::H0,
            is_vpec_target: self.tier == TargetTier::Vpec,
            visits: self.state.visits,
            success: self.state.satisfied,
        }
    }

    pub fn is_science(&self) -> bool {
        self.roles.science
    }

    pub fn is_standard(&self) -> bool {
        self.roles.standard
    }

    pub fn is_guide(&self) -> bool {
        self.roles.guide
    }

    /// Science target still needing observation.
    pub fn is_remaining(&self) -> bool {
        self.roles.science && !self.state.satisfied
    }
}

/// Arena of targets keyed by id, one entry per physical object.
#[derive(Debug, Clone, Default)]
pub struct TargetCatalog {
    targets: Vec<Target>,
    index: HashMap<TargetId, usize>,
}

impl TargetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge role lists into one catalog.
    ///
    /// The first occurrence of an id provides position, priority, magnitude
    /// and tier; later occurrences only add their role flags.
    pub fn merge<I>(lists: I) -> Self
    where
        I: IntoIterator<Item = Vec<Target>>,
    {
        let mut catalog = Self::new();
        for list in lists {
            for target in list {
                catalog.insert(target);
            }
        }
        catalog
    }

    /// Insert a target, folding its roles into an existing entry if present.
    pub fn insert(&mut self, target: Target) -> TargetId {
        let id = target.id;
        match self.index.get(&id) {
            Some(&slot) => {
                let existing = &mut self.targets[slot];
                existing.roles = existing.roles.union(target.roles);
            }
            None => {
                self.index.insert(id, self.targets.len());
                self.targets.push(target);
            }
        }
        id
    }

    pub fn get(&self, id: TargetId) -> Option<&Target> {
        self.index.get(&id).map(|&slot| &self.targets[slot])
    }

    pub fn get_mut(&mut self, id: TargetId) -> Option<&mut Target> {
        self.index.get(&id).map(|&slot| &mut self.targets[slot])
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    /// Ids of every target holding `role`, in insertion order.
    pub fn ids_with_role(&self, role: FibreRole) -> Vec<TargetId> {
        self.targets
            .iter()
            .filter(|t| t.roles.has(role))
            .map(|t| t.id)
            .collect()
    }

    /// Ids of unsatisfied science targets, in insertion order.
    pub fn remaining_science(&self) -> Vec<TargetId> {
        self.targets
            .iter()
            .filter(|t| t.is_remaining())
            .map(|t| t.id)
            .collect()
    }

    pub fn science_count(&self) -> usize {
        self.targets.iter().filter(|t| t.roles.science).count()
    }

    /// Fraction of science targets marked satisfied; 0 for an empty survey.
    pub fn survey_completeness(&self) -> f64 {
        let total = self.science_count();
        if total == 0 {
            return 0.0;
        }
        let done = self
            .targets
            .iter()
            .filter(|t| t.roles.science && t.state.satisfied)
            .count();
        done as f64 / total as f64
    }
}
