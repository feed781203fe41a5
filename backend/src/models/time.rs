use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::*;

/// Modified Julian Date representation.
/// MJD 0 = 1858-11-17 00:00:00 UTC
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ModifiedJulianDate(qtty::Days);

/// MJD of the J2000.0 epoch (2000-01-01 12:00 TT, treated as UTC here).
pub const MJD_J2000: f64 = 51544.5;

impl ModifiedJulianDate {
    /// Create a new MJD value.
    pub fn new<V: Into<qtty::Days>>(v: V) -> Self {
        Self(v.into())
    }

    /// Raw MJD value as f64.
    pub fn value(&self) -> f64 {
        self.0.value()
    }

    /// Days elapsed since J2000.0.
    pub fn days_since_j2000(&self) -> f64 {
        self.value() - MJD_J2000
    }

    /// Create from Unix timestamp (seconds since 1970-01-01 00:00:00 UTC).
    pub fn from_unix_timestamp(timestamp: f64) -> Self {
        Self::new(timestamp / 86400.0 + 40587.0)
    }

    /// Create from a naive UTC datetime.
    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        let utc = dt.and_utc();
        Self::from_unix_timestamp(
            utc.timestamp() as f64 + utc.timestamp_subsec_nanos() as f64 / 1e9,
        )
    }
}

/// UTC instant of local noon on `date` for a site at `longitude` (degrees east).
///
/// Nights are indexed by the local date on which they start, so the night of
/// `date` runs from this instant to the same instant one day later.
pub fn local_noon_utc(date: NaiveDate, longitude: f64) -> NaiveDateTime {
    let offset_minutes = (longitude / 15.0 * 60.0).round() as i64;
    date.and_time(NaiveTime::MIN) + TimeDelta::hours(12) - TimeDelta::minutes(offset_minutes)
}

/// Number of whole days in the inclusive range `[start, end]`.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mjd_new() {
        let mjd = ModifiedJulianDate::new(50000.0);
        assert_eq!(mjd.value(), 50000.0);
    }

    #[test]
    fn test_mjd_ordering() {
        let mjd1 = ModifiedJulianDate::new(50000.0);
        let mjd2 = ModifiedJulianDate::new(51000.0);

        assert!(mjd1 < mjd2);
        assert!(mjd2 > mjd1);
    }

    #[test]
    fn test_unix_epoch_is_mjd_40587() {
        assert_eq!(ModifiedJulianDate::from_unix_timestamp(0.0).value(), 40587.0);
        let evening = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();
        let mjd = ModifiedJulianDate::from_datetime(evening);
        assert!((mjd.value() - 40587.75).abs() < 1e-9);
    }

    #[test]
    fn test_j2000_epoch() {
        let dt = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let mjd = ModifiedJulianDate::from_datetime(dt);
        assert!(mjd.days_since_j2000().abs() < 1e-9);
    }

    #[test]
    fn test_local_noon_utc_east_of_greenwich() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        // 150 degrees east is UTC+10h, so local noon is 02:00 UTC
        let noon = local_noon_utc(date, 150.0);
        assert_eq!(noon, date.and_hms_opt(2, 0, 0).unwrap());
    }

    #[test]
    fn test_local_noon_utc_greenwich() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(local_noon_utc(date, 0.0), date.and_hms_opt(12, 0, 0).unwrap());
    }

    #[test]
    fn test_days_inclusive() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        assert_eq!(days_inclusive(start, end), 15);
        assert_eq!(days_inclusive(start, start), 1);
    }
}
