//! Local crowding of candidate targets.
//!
//! A target's difficulty is the number of other candidates closer than the
//! fibre exclusion diameter: each of them competes for the same fibre.

use rayon::prelude::*;

use crate::geometry::cos_separation;
use crate::models::Target;

/// Declination-sorted index over a fixed set of points.
///
/// Radius queries first narrow to the declination band `dec ± radius`, then
/// test the exact separation with unit vectors.
#[derive(Debug, Clone)]
pub struct NeighbourIndex {
    xyz: Vec<[f64; 3]>,
    dec: Vec<f64>,
    order: Vec<usize>,
    sorted_dec: Vec<f64>,
}

impl NeighbourIndex {
    /// Build from `(dec, unit vector)` pairs; point `i` keeps index `i`.
    pub fn new(points: impl IntoIterator<Item = (f64, [f64; 3])>) -> Self {
        let (dec, xyz): (Vec<f64>, Vec<[f64; 3]>) = points.into_iter().unzip();
        let mut order: Vec<usize> = (0..dec.len()).collect();
        order.sort_by(|&a, &b| dec[a].total_cmp(&dec[b]));
        let sorted_dec = order.iter().map(|&i| dec[i]).collect();
        Self {
            xyz,
            dec,
            order,
            sorted_dec,
        }
    }

    pub fn len(&self) -> usize {
        self.xyz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xyz.is_empty()
    }

    fn band(&self, dec: f64, radius: f64) -> &[usize] {
        let lo = self.sorted_dec.partition_point(|d| *d < dec - radius);
        let hi = self.sorted_dec.partition_point(|d| *d <= dec + radius);
        &self.order[lo..hi]
    }

    /// Indices within `radius` degrees of a position, ascending.
    pub fn within(&self, centre: &[f64; 3], centre_dec: f64, radius: f64) -> Vec<usize> {
        let cos_radius = radius.to_radians().cos();
        let mut hits: Vec<usize> = self
            .band(centre_dec, radius)
            .iter()
            .copied()
            .filter(|&i| cos_separation(&self.xyz[i], centre) >= cos_radius)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Live points other than `i` strictly closer than `exclusion` degrees.
    pub fn neighbour_count(&self, i: usize, exclusion: f64, live: &[bool]) -> u32 {
        if exclusion <= 0.0 {
            return 0;
        }
        let cos_exclusion = exclusion.to_radians().cos();
        self.band(self.dec[i], exclusion)
            .iter()
            .filter(|&&j| j != i && live[j])
            .filter(|&&j| cos_separation(&self.xyz[i], &self.xyz[j]) > cos_exclusion)
            .count() as u32
    }

    /// Neighbour counts for every live point (0 for dead ones), in parallel.
    pub fn all_counts(&self, exclusion: f64, live: &[bool]) -> Vec<u32> {
        (0..self.len())
            .into_par_iter()
            .map(|i| {
                if live[i] {
                    self.neighbour_count(i, exclusion, live)
                } else {
                    0
                }
            })
            .collect()
    }
}

/// Difficulty of each target against the others in the slice.
pub fn compute_target_difficulties(targets: &[&Target], exclusion: f64) -> Vec<u32> {
    let index = NeighbourIndex::new(targets.iter().map(|t| (t.dec, t.xyz)));
    index.all_counts(exclusion, &vec![true; targets.len()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::unit_vector;

    fn index(points: &[(f64, f64)]) -> NeighbourIndex {
        NeighbourIndex::new(points.iter().map(|&(ra, dec)| (dec, unit_vector(ra, dec))))
    }

    #[test]
    fn test_within_radius() {
        let idx = index(&[(10.0, -30.0), (10.5, -30.0), (13.0, -30.0), (10.0, -32.5)]);
        let hits = idx.within(&unit_vector(10.0, -30.0), -30.0, 1.0);
        assert_eq!(hits, vec![0, 1]);
        let hits = idx.within(&unit_vector(10.0, -30.0), -30.0, 3.0);
        assert_eq!(hits, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_neighbour_counts_pairs_and_loners() {
        // Two targets 36 arcsec apart, one far away
        let idx = index(&[(10.0, -30.0), (10.0, -29.99), (11.0, -30.0)]);
        let exclusion = 60.0 / 3600.0;
        assert_eq!(idx.all_counts(exclusion, &[true, true, true]), vec![1, 1, 0]);
        assert_eq!(idx.all_counts(exclusion, &[true, false, true]), vec![0, 0, 0]);
    }

    #[test]
    fn test_compute_target_difficulties() {
        let targets = [
            Target::science(1, 20.0, -30.0, 1, 9.0),
            Target::science(2, 20.0, -30.005, 1, 9.0),
            Target::science(3, 20.0, -30.010, 1, 9.0),
        ];
        let refs: Vec<&Target> = targets.iter().collect();
        // 18 arcsec spacing, 60 arcsec exclusion: everyone sees everyone
        assert_eq!(compute_target_difficulties(&refs, 60.0 / 3600.0), vec![2, 2, 2]);
        assert_eq!(compute_target_difficulties(&refs, 0.0), vec![0, 0, 0]);
    }
}
