//! Target ranks and tile scores.

use crate::config::{RankingMethod, TilingConfig};

use super::Candidate;

/// Weight of crowding in a target's rank; grows towards 1 with difficulty.
pub fn difficulty_weight(difficulty: u32) -> f64 {
    let d = difficulty as f64;
    d / (1.0 + d)
}

/// Rank of a target: priority, magnitude-band boost, then crowding.
///
/// The difficulty term is below 1, so it only orders targets of equal
/// boosted priority.
pub fn target_rank(config: &TilingConfig, priority: i32, mag: f64, difficulty: u32) -> f64 {
    let boost = if config.in_priority_band(mag) {
        config.prioritise_extra
    } else {
        0
    };
    (priority + boost) as f64 + difficulty_weight(difficulty)
}

pub(crate) fn candidate_rank(config: &TilingConfig, candidate: &Candidate) -> f64 {
    target_rank(config, candidate.priority, candidate.mag, candidate.difficulty)
}

/// Value of a science candidate under combined-weighted allocation.
///
/// `rank + combined_weight / (1 + conflicts)`, where `conflicts` counts the
/// other candidates on the same tile inside the fibre exclusion radius.
pub(crate) fn combined_value(config: &TilingConfig, candidate: &Candidate, conflicts: u32) -> f64 {
    candidate_rank(config, candidate) + config.combined_weight / (1.0 + conflicts as f64)
}

/// Score of a tile carrying `science`.
///
/// Past `completeness_priority_threshold` the raw science count is added
/// with weight `completeness_priority`.
pub(crate) fn tile_score(
    config: &TilingConfig,
    science: &[&Candidate],
    running_completeness: f64,
) -> f64 {
    let base: f64 = match config.ranking_method {
        RankingMethod::Completeness => science.len() as f64,
        RankingMethod::PrioritySum => science.iter().map(|c| c.priority as f64).sum(),
        RankingMethod::DifficultySum => science.iter().map(|c| c.difficulty as f64).sum(),
        RankingMethod::CombinedWeightedSum => {
            science.iter().map(|c| candidate_rank(config, c)).sum()
        }
        RankingMethod::PriorityExpSum => science.iter().map(|c| 2f64.powi(c.priority)).sum(),
    };
    if running_completeness >= config.completeness_priority_threshold {
        base + config.completeness_priority * science.len() as f64
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Roles, TargetId};

    fn candidate(id: u64, priority: i32, mag: f64, difficulty: u32) -> Candidate {
        Candidate {
            id: TargetId(id),
            ra: 0.0,
            dec: 0.0,
            xyz: [1.0, 0.0, 0.0],
            priority,
            mag,
            difficulty,
            roles: Roles::SCIENCE,
        }
    }

    #[test]
    fn test_rank_includes_band_boost() {
        let config = TilingConfig {
            mag_ranges_prioritise: vec![[7.0, 8.0]],
            prioritise_extra: 2,
            ..Default::default()
        };
        assert_eq!(target_rank(&config, 3, 7.5, 0), 5.0);
        assert_eq!(target_rank(&config, 3, 8.0, 0), 3.0);
        assert!((target_rank(&config, 3, 9.0, 1) - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_difficulty_never_outranks_priority() {
        let config = TilingConfig::default();
        assert!(target_rank(&config, 2, 9.0, 0) > target_rank(&config, 1, 9.0, 1000));
    }

    #[test]
    fn test_combined_value_monotonic() {
        let config = TilingConfig {
            combined_weight: 2.0,
            ..Default::default()
        };
        let target = candidate(1, 3, 9.0, 0);
        let important = candidate(3, 4, 9.0, 0);
        assert!(combined_value(&config, &target, 0) > combined_value(&config, &target, 4));
        assert!(combined_value(&config, &important, 4) > combined_value(&config, &target, 0));
    }

    #[test]
    fn test_tile_score_methods() {
        let a = candidate(1, 2, 9.0, 0);
        let b = candidate(2, 3, 9.0, 1);
        let science = [&a, &b];
        let mut config = TilingConfig {
            completeness_priority_threshold: 0.9,
            completeness_priority: 4.0,
            ..Default::default()
        };

        config.ranking_method = RankingMethod::Completeness;
        assert_eq!(tile_score(&config, &science, 0.0), 2.0);
        config.ranking_method = RankingMethod::PrioritySum;
        assert_eq!(tile_score(&config, &science, 0.0), 5.0);
        config.ranking_method = RankingMethod::DifficultySum;
        assert_eq!(tile_score(&config, &science, 0.0), 1.0);
        config.ranking_method = RankingMethod::PriorityExpSum;
        assert_eq!(tile_score(&config, &science, 0.0), 12.0);
        config.ranking_method = RankingMethod::CombinedWeightedSum;
        assert!((tile_score(&config, &science, 0.0) - 5.5).abs() < 1e-12);

        // Past the threshold every science target adds completeness_priority
        assert!((tile_score(&config, &science, 0.95) - 13.5).abs() < 1e-12);
    }
}
