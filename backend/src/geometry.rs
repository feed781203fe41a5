//! Geometry and ephemeris collaborator.
//!
//! The engine only needs angular separations, airmass, and the altitudes of
//! the Sun and Moon. These sit behind [`GeometryService`] so a precise
//! astrometry backend can replace the built-in [`LowPrecisionEphemeris`],
//! which is good to a fraction of a degree and adequate for scheduling.

use chrono::NaiveDateTime;
use qtty::Degrees;
use serde::{Deserialize, Serialize};

use crate::models::ModifiedJulianDate;

/// Unit vector for a position given in degrees.
pub fn unit_vector(ra: f64, dec: f64) -> [f64; 3] {
    let (ra, dec) = (ra.to_radians(), dec.to_radians());
    [dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin()]
}

/// Position in degrees for a (not necessarily normalised) vector.
pub fn radec_from_vector(v: [f64; 3]) -> (f64, f64) {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    let dec = (v[2] / norm).clamp(-1.0, 1.0).asin().to_degrees();
    let ra = v[1].atan2(v[0]).to_degrees().rem_euclid(360.0);
    (ra, dec)
}

/// Cosine of the angle between two unit vectors.
pub fn cos_separation(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Great-circle distance in degrees (haversine).
pub fn haversine_degrees(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let (ra1, dec1, ra2, dec2) = (
        ra1.to_radians(),
        dec1.to_radians(),
        ra2.to_radians(),
        dec2.to_radians(),
    );
    let d_ra = ra2 - ra1;
    let d_dec = dec2 - dec1;
    let a = (d_dec / 2.0).sin().powi(2) + dec1.cos() * dec2.cos() * (d_ra / 2.0).sin().powi(2);
    (2.0 * a.sqrt().min(1.0).asin()).to_degrees()
}

/// Astrometric and ephemeris queries consumed by the engine.
///
/// Implementations must be thread-safe: almanac construction and tile
/// planning query them from worker threads.
pub trait GeometryService: Send + Sync {
    /// Angular distance between two positions.
    fn angular_distance(&self, ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> Degrees {
        Degrees::new(haversine_degrees(ra1, dec1, ra2, dec2))
    }

    /// Airmass of a position at `at` (UTC); `f64::INFINITY` below the horizon.
    fn airmass(&self, ra: f64, dec: f64, at: NaiveDateTime) -> f64;

    /// Altitude of the Sun in degrees.
    fn sun_altitude(&self, at: NaiveDateTime) -> f64;

    /// Altitude of the Moon in degrees.
    fn moon_altitude(&self, at: NaiveDateTime) -> f64;

    /// Illuminated fraction of the lunar disc, 0 (new) to 1 (full).
    fn moon_illumination(&self, at: NaiveDateTime) -> f64;

    /// Site longitude in degrees east; defines local noon.
    fn site_longitude(&self) -> f64;
}

/// Observatory location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
}

fn default_latitude() -> f64 {
    -31.2733
}

fn default_longitude() -> f64 {
    149.0617
}

impl Default for SiteConfig {
    /// Siding Spring Observatory.
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
        }
    }
}

/// Analytic Sun/Moon model plus Kasten–Young airmass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowPrecisionEphemeris {
    site: SiteConfig,
}

impl LowPrecisionEphemeris {
    pub fn new(site: SiteConfig) -> Self {
        Self { site }
    }

    /// Local apparent sidereal angle in degrees, [0, 360).
    pub fn local_sidereal_degrees(&self, at: NaiveDateTime) -> f64 {
        let d = ModifiedJulianDate::from_datetime(at).days_since_j2000();
        (280.46061837 + 360.98564736629 * d + self.site.longitude).rem_euclid(360.0)
    }

    fn altitude(&self, ra: f64, dec: f64, at: NaiveDateTime) -> f64 {
        let hour_angle = (self.local_sidereal_degrees(at) - ra).to_radians();
        let (lat, dec) = (self.site.latitude.to_radians(), dec.to_radians());
        let sin_alt = lat.sin() * dec.sin() + lat.cos() * dec.cos() * hour_angle.cos();
        sin_alt.clamp(-1.0, 1.0).asin().to_degrees()
    }
}

impl Default for LowPrecisionEphemeris {
    fn default() -> Self {
        Self::new(SiteConfig::default())
    }
}

fn obliquity(d: f64) -> f64 {
    (23.439 - 0.000_000_4 * d).to_radians()
}

fn ecliptic_to_equatorial(lambda: f64, beta: f64, eps: f64) -> (f64, f64) {
    let ra = (lambda.sin() * eps.cos() - beta.tan() * eps.sin()).atan2(lambda.cos());
    let dec = (beta.sin() * eps.cos() + beta.cos() * eps.sin() * lambda.sin()).asin();
    (ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
}

/// Ecliptic longitude of the Sun in radians.
fn sun_longitude(d: f64) -> f64 {
    let mean_long = 280.460 + 0.985_647_4 * d;
    let anomaly = (357.528 + 0.985_600_3 * d).to_radians();
    (mean_long + 1.915 * anomaly.sin() + 0.020 * (2.0 * anomaly).sin()).to_radians()
}

/// Ecliptic longitude and latitude of the Moon in radians.
fn moon_ecliptic(d: f64) -> (f64, f64) {
    let mean_long = 218.316 + 13.176_396 * d;
    let anomaly = (134.963 + 13.064_993 * d).to_radians();
    let node_dist = (93.272 + 13.229_350 * d).to_radians();
    let lambda = (mean_long + 6.289 * anomaly.sin()).to_radians();
    let beta = (5.128 * node_dist.sin()).to_radians();
    (lambda, beta)
}

/// Apparent (ra, dec) of the Sun in degrees.
pub fn sun_equatorial(at: NaiveDateTime) -> (f64, f64) {
    let d = ModifiedJulianDate::from_datetime(at).days_since_j2000();
    ecliptic_to_equatorial(sun_longitude(d), 0.0, obliquity(d))
}

/// Apparent (ra, dec) of the Moon in degrees.
pub fn moon_equatorial(at: NaiveDateTime) -> (f64, f64) {
    let d = ModifiedJulianDate::from_datetime(at).days_since_j2000();
    let (lambda, beta) = moon_ecliptic(d);
    ecliptic_to_equatorial(lambda, beta, obliquity(d))
}

impl GeometryService for LowPrecisionEphemeris {
    fn airmass(&self, ra: f64, dec: f64, at: NaiveDateTime) -> f64 {
        let alt = self.altitude(ra, dec, at);
        if alt <= 0.0 {
            return f64::INFINITY;
        }
        1.0 / (alt.to_radians().sin() + 0.50572 * (alt + 6.07995).powf(-1.6364))
    }

    fn sun_altitude(&self, at: NaiveDateTime) -> f64 {
        let (ra, dec) = sun_equatorial(at);
        self.altitude(ra, dec, at)
    }

    fn moon_altitude(&self, at: NaiveDateTime) -> f64 {
        let (ra, dec) = moon_equatorial(at);
        self.altitude(ra, dec, at)
    }

    fn moon_illumination(&self, at: NaiveDateTime) -> f64 {
        let d = ModifiedJulianDate::from_datetime(at).days_since_j2000();
        let (moon_lambda, moon_beta) = moon_ecliptic(d);
        let cos_elongation = moon_beta.cos() * (moon_lambda - sun_longitude(d)).cos();
        (1.0 - cos_elongation) / 2.0
    }

    fn site_longitude(&self) -> f64 {
        self.site.longitude
    }
}
