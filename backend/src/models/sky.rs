//! Sky regions and field pointings.

use serde::{Deserialize, Serialize};

use crate::error::{SurveyError, SurveyResult};

/// Identifier of a survey field (a fixed tile-centre pointing).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FieldId(pub u32);

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A field centre on the sky.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub field_id: FieldId,
    pub ra: f64,
    pub dec: f64,
}

impl Field {
    pub fn new(field_id: FieldId, ra: f64, dec: f64) -> Self {
        Self { field_id, ra, dec }
    }
}

/// Rectangular RA/Dec window in degrees.
///
/// Windows do not wrap through RA = 0; a survey straddling it must be split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyWindow {
    pub ra_min: f64,
    pub ra_max: f64,
    pub dec_min: f64,
    pub dec_max: f64,
}

impl Default for SkyWindow {
    fn default() -> Self {
        Self::full_sky()
    }
}

impl SkyWindow {
    pub fn new(ra_min: f64, ra_max: f64, dec_min: f64, dec_max: f64) -> Self {
        Self {
            ra_min,
            ra_max,
            dec_min,
            dec_max,
        }
    }

    /// The whole celestial sphere.
    pub fn full_sky() -> Self {
        Self::new(0.0, 360.0, -90.0, 90.0)
    }

    /// Check bounds ordering and ranges.
    pub fn validate(&self) -> SurveyResult<()> {
        if !(self.ra_min < self.ra_max) || self.ra_min < 0.0 || self.ra_max > 360.0 {
            return Err(SurveyError::configuration(format!(
                "RA window [{}, {}] must satisfy 0 <= ra_min < ra_max <= 360",
                self.ra_min, self.ra_max
            )));
        }
        if !(self.dec_min < self.dec_max) || self.dec_min < -90.0 || self.dec_max > 90.0 {
            return Err(SurveyError::configuration(format!(
                "Dec window [{}, {}] must satisfy -90 <= dec_min < dec_max <= 90",
                self.dec_min, self.dec_max
            )));
        }
        Ok(())
    }

    pub fn contains(&self, ra: f64, dec: f64) -> bool {
        ra >= self.ra_min && ra <= self.ra_max && dec >= self.dec_min && dec <= self.dec_max
    }

    /// Grow the window by `margin` degrees of arc on every side.
    ///
    /// The RA margin is stretched by `1/cos(dec)` at the most polar edge, and
    /// the result is clamped to the sphere.
    pub fn inflate(&self, margin: f64) -> Self {
        let dec_min = (self.dec_min - margin).max(-90.0);
        let dec_max = (self.dec_max + margin).min(90.0);
        let polar = dec_min.abs().max(dec_max.abs()).min(89.0);
        let ra_margin = margin / polar.to_radians().cos();
        Self {
            ra_min: (self.ra_min - ra_margin).max(0.0),
            ra_max: (self.ra_max + ra_margin).min(360.0),
            dec_min,
            dec_max,
        }
    }

    /// Smallest window containing both.
    pub fn union(&self, other: &SkyWindow) -> Self {
        Self {
            ra_min: self.ra_min.min(other.ra_min),
            ra_max: self.ra_max.max(other.ra_max),
            dec_min: self.dec_min.min(other.dec_min),
            dec_max: self.dec_max.max(other.dec_max),
        }
    }

    /// Overlap of the two windows, if any.
    pub fn intersect(&self, other: &SkyWindow) -> Option<Self> {
        let clipped = Self {
            ra_min: self.ra_min.max(other.ra_min),
            ra_max: self.ra_max.min(other.ra_max),
            dec_min: self.dec_min.max(other.dec_min),
            dec_max: self.dec_max.min(other.dec_max),
        };
        (clipped.ra_min <= clipped.ra_max && clipped.dec_min <= clipped.dec_max)
            .then_some(clipped)
    }

    /// Window of half-size `radius` around a point.
    pub fn around(ra: f64, dec: f64, radius: f64) -> Self {
        Self::new(ra, ra, dec, dec).inflate(radius)
    }

    /// Union overlapping windows, transitively, leaving disjoint ones apart.
    ///
    /// The result is sorted by lower RA then lower Dec.
    pub fn merge_overlapping(windows: impl IntoIterator<Item = SkyWindow>) -> Vec<SkyWindow> {
        let mut merged: Vec<SkyWindow> = Vec::new();
        for mut window in windows {
            while let Some(i) = merged.iter().position(|m| m.intersect(&window).is_some()) {
                window = window.union(&merged.swap_remove(i));
            }
            merged.push(window);
        }
        merged.sort_by(|a, b| {
            a.ra_min
                .total_cmp(&b.ra_min)
                .then(a.dec_min.total_cmp(&b.dec_min))
        });
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_contains() {
        let w = SkyWindow::new(30.0, 43.0, -34.0, -26.0);
        assert!(w.contains(35.0, -30.0));
        assert!(!w.contains(29.9, -30.0));
        assert!(!w.contains(35.0, -25.0));
    }

    #[test]
    fn test_window_validate() {
        assert!(SkyWindow::new(30.0, 43.0, -34.0, -26.0).validate().is_ok());
        assert!(SkyWindow::new(43.0, 30.0, -34.0, -26.0)
            .validate()
            .unwrap_err()
            .is_configuration());
        assert!(SkyWindow::new(30.0, 43.0, -26.0, -34.0).validate().is_err());
    }

    #[test]
    fn test_inflate_stretches_ra_at_high_dec() {
        let w = SkyWindow::new(100.0, 110.0, 50.0, 55.0).inflate(2.0);
        assert!((w.dec_min - 48.0).abs() < 1e-12);
        assert!((w.dec_max - 57.0).abs() < 1e-12);
        // 2 / cos(57 deg) ~ 3.67
        assert!(w.ra_min < 97.0);
        assert!(w.ra_max > 113.0);
    }

    #[test]
    fn test_inflate_clamps_to_sphere() {
        let w = SkyWindow::new(1.0, 359.0, -89.0, 89.0).inflate(5.0);
        assert_eq!(w.ra_min, 0.0);
        assert_eq!(w.ra_max, 360.0);
        assert_eq!(w.dec_min, -90.0);
        assert_eq!(w.dec_max, 90.0);
    }

    #[test]
    fn test_merge_overlapping_keeps_distant_windows_apart() {
        let east = SkyWindow::new(40.0, 44.0, -30.0, -26.0);
        let west = SkyWindow::new(10.0, 14.0, -30.0, -26.0);
        let bridge_a = SkyWindow::new(13.0, 20.0, -28.0, -20.0);
        let bridge_b = SkyWindow::new(19.0, 25.0, -22.0, -18.0);

        let merged = SkyWindow::merge_overlapping([east, west]);
        assert_eq!(merged, vec![west, east]);

        // Chains merge even when the last link arrives first
        let merged = SkyWindow::merge_overlapping([bridge_b, west, east, bridge_a]);
        assert_eq!(
            merged,
            vec![SkyWindow::new(10.0, 25.0, -30.0, -18.0), east]
        );
        assert!(SkyWindow::merge_overlapping(Vec::new()).is_empty());
    }

    #[test]
    fn test_intersect_disjoint() {
        let a = SkyWindow::new(0.0, 10.0, 0.0, 10.0);
        let b = SkyWindow::new(20.0, 30.0, 0.0, 10.0);
        assert!(a.intersect(&b).is_none());
        let c = SkyWindow::new(5.0, 30.0, 5.0, 30.0);
        assert_eq!(a.intersect(&c), Some(SkyWindow::new(5.0, 10.0, 5.0, 10.0)));
    }
}
