//! Per-visit redshift success model.
//!
//! Each observed target draws one uniform number; the visit succeeds when the
//! draw falls below the target's success probability. H0 targets always
//! succeed, low-z targets succeed with a fixed probability per visit, and
//! peculiar-velocity targets follow a per-visit schedule that reaches
//! certainty at the fifth visit.

use log::debug;
use rand::Rng;

use crate::config::OutcomeProbabilities;
use crate::error::{SurveyError, SurveyResult};
use crate::models::TargetTier;

/// Visit from which a peculiar-velocity target always succeeds.
pub const VPEC_GUARANTEED_VISIT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationOutcomeModel {
    probabilities: OutcomeProbabilities,
}

impl ObservationOutcomeModel {
    pub fn new(probabilities: OutcomeProbabilities) -> SurveyResult<Self> {
        probabilities.validate()?;
        Ok(Self { probabilities })
    }

    pub fn probabilities(&self) -> &OutcomeProbabilities {
        &self.probabilities
    }

    /// Probability that the `visits`-th visit of a target succeeds, given
    /// that no earlier visit did.
    pub fn success_probability(&self, tier: TargetTier, visits: u32) -> f64 {
        let p = &self.probabilities;
        match tier {
            TargetTier::H0 => 1.0,
            TargetTier::LowZ => p.prob_lowz_each,
            TargetTier::Vpec => match visits {
                0 | 1 => p.prob_vpec_first,
                2 => p.prob_vpec_second,
                3 => p.prob_vpec_third,
                4 => p.prob_vpec_fourth,
                _ => 1.0,
            },
        }
    }

    /// Draw one outcome per observed target.
    ///
    /// `visits` must already include the current visit.
    pub fn simulate_outcomes<R: Rng>(
        &self,
        tiers: &[TargetTier],
        visits: &[u32],
        rng: &mut R,
    ) -> SurveyResult<Vec<bool>> {
        if tiers.len() != visits.len() {
            return Err(SurveyError::configuration(format!(
                "{} target tiers but {} visit counts",
                tiers.len(),
                visits.len()
            )));
        }
        if let Some(position) = visits.iter().position(|&v| v == 0) {
            return Err(SurveyError::state(format!(
                "visit count at position {} is 0; increment visits before simulating outcomes",
                position
            )));
        }

        let success: Vec<bool> = tiers
            .iter()
            .zip(visits)
            .map(|(&tier, &visit)| rng.gen::<f64>() < self.success_probability(tier, visit))
            .collect();

        let successes = success.iter().filter(|s| **s).count();
        debug!(
            "Out of {} observed targets, {} successes, {} rejections",
            success.len(),
            successes,
            success.len() - successes
        );
        Ok(success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn model() -> ObservationOutcomeModel {
        ObservationOutcomeModel::new(OutcomeProbabilities::default()).unwrap()
    }

    #[test]
    fn test_fifth_vpec_visit_always_succeeds() {
        let model = model();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tiers = vec![TargetTier::Vpec; 500];
        let visits = vec![VPEC_GUARANTEED_VISIT; 500];
        let outcomes = model.simulate_outcomes(&tiers, &visits, &mut rng).unwrap();
        assert!(outcomes.iter().all(|s| *s));
    }

    #[test]
    fn test_h0_always_succeeds() {
        let model = model();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let outcomes = model
            .simulate_outcomes(&[TargetTier::H0; 100], &[1; 100], &mut rng)
            .unwrap();
        assert!(outcomes.iter().all(|s| *s));
    }

    #[test]
    fn test_zero_visits_is_state_error() {
        let model = model();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let err = model
            .simulate_outcomes(&[TargetTier::Vpec, TargetTier::LowZ], &[1, 0], &mut rng)
            .unwrap_err();
        assert!(err.is_state());
    }

    #[test]
    fn test_length_mismatch_is_configuration_error() {
        let model = model();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let err = model
            .simulate_outcomes(&[TargetTier::Vpec], &[1, 1], &mut rng)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let probabilities = OutcomeProbabilities {
            prob_vpec_second: 1.5,
            ..Default::default()
        };
        assert!(ObservationOutcomeModel::new(probabilities)
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_lowz_rate_close_to_configured() {
        let model = model();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let n = 20_000;
        let outcomes = model
            .simulate_outcomes(&vec![TargetTier::LowZ; n], &vec![1; n], &mut rng)
            .unwrap();
        let rate = outcomes.iter().filter(|s| **s).count() as f64 / n as f64;
        assert!((rate - 0.85).abs() < 0.02, "rate {}", rate);
    }

    #[test]
    fn test_same_seed_same_outcomes() {
        let model = model();
        let tiers = vec![TargetTier::Vpec; 64];
        let visits = vec![2; 64];
        let a = model
            .simulate_outcomes(&tiers, &visits, &mut ChaCha8Rng::seed_from_u64(9))
            .unwrap();
        let b = model
            .simulate_outcomes(&tiers, &visits, &mut ChaCha8Rng::seed_from_u64(9))
            .unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn prop_vpec_probability_non_decreasing(visit in 1u32..20) {
            let model = model();
            let now = model.success_probability(TargetTier::Vpec, visit);
            let next = model.success_probability(TargetTier::Vpec, visit + 1);
            prop_assert!(next >= now);
            prop_assert!((0.0..=1.0).contains(&now));
        }

        #[test]
        fn prop_guaranteed_from_fifth_visit(visit in VPEC_GUARANTEED_VISIT..1000) {
            prop_assert_eq!(model().success_probability(TargetTier::Vpec, visit), 1.0);
        }
    }
}
