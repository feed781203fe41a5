use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_defaults_are_valid() {
    assert!(SurveyConfig::default().validate().is_ok());
}

#[test]
fn test_parse_full_config() {
    let toml = r#"
[tiling]
seed = 7
tiling_method = "hexagonal"
tile_radius = 2.5
standards_per_tile_min = 3
mag_ranges_prioritise = [[7.0, 8.0], [8.0, 9.0]]
prioritise_extra = 4
completeness_target = 0.999
allocation_method = "sequential"
sequential_ordering = ["guide", "standard"]
ranking_method = "priority-sum"
randomise_SH = false

[almanac]
resolution_minutes = 30
minimum_airmass = 1.8

[outcome]
prob_vpec_first = 0.2

[simulation]
date_start = "2026-03-01"
date_end = "2026-03-31"
window = { ra_min = 30.0, ra_max = 43.0, dec_min = -34.0, dec_max = -26.0 }
score_metrics = ["cw_sum", "n_sci_rem"]

[site]
latitude = -31.0
"#;

    let config = SurveyConfig::from_toml_str(toml).unwrap();
    assert_eq!(config.tiling.seed, 7);
    assert_eq!(config.tiling.tile_radius, 2.5);
    assert_eq!(config.tiling.standards_per_tile_min, 3);
    assert_eq!(config.tiling.allocation_method, AllocationMethod::Sequential);
    assert_eq!(
        config.tiling.sequential_ordering,
        vec![FibreRole::Guide, FibreRole::Standard]
    );
    assert_eq!(config.tiling.ranking_method, RankingMethod::PrioritySum);
    assert!(!config.tiling.randomise_sh);
    assert!(config.tiling.in_priority_band(8.5));
    assert!(!config.tiling.in_priority_band(9.0));
    assert_eq!(config.almanac.resolution_minutes, 30);
    assert_eq!(config.outcome.prob_vpec_first, 0.2);
    assert_eq!(config.outcome.prob_lowz_each, 0.85);
    assert_eq!(
        config.simulation.date_start,
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    );
    assert_eq!(config.simulation.window.ra_max, 43.0);
    assert_eq!(
        config.simulation.score_metrics,
        vec![ScoreMetric::CwSum, ScoreMetric::NSciRem]
    );
    assert_eq!(config.site.latitude, -31.0);
    assert_eq!(config.site.longitude, 149.0617);
}

#[test]
fn test_sh_alias_for_tiling_method() {
    let toml = r#"
[tiling]
tiling_method = "SH"
tiling_file = "ipack.3.4112.txt"
"#;
    let config = SurveyConfig::from_toml_str(toml).unwrap();
    assert_eq!(config.tiling.tiling_method, TilingMethod::SloaneHardin);
}

#[test]
fn test_parse_error_reports_key_path() {
    let toml = r#"
[tiling]
tile_radius = "wide"
"#;
    let err = SurveyConfig::from_toml_str(toml).unwrap_err();
    assert!(err.is_configuration());
    assert!(
        err.to_string().contains("tiling.tile_radius"),
        "unexpected message: {}",
        err
    );
}

#[test]
fn test_malformed_magnitude_band_rejected() {
    let mut config = SurveyConfig::default();
    config.tiling.mag_ranges_prioritise = vec![[9.0, 8.0]];
    let err = config.validate().unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("mag_ranges_prioritise"));

    config.tiling.mag_ranges_prioritise = vec![[8.0, 8.0]];
    assert!(config.validate().is_err());
}

#[test]
fn test_probability_out_of_range_rejected() {
    let mut config = SurveyConfig::default();
    config.outcome.prob_vpec_third = 1.2;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("prob_vpec_third"));

    config.outcome.prob_vpec_third = 0.5;
    config.outcome.prob_lowz_each = -0.1;
    assert!(config.validate().is_err());
}

#[test]
fn test_vpec_probabilities_must_not_decrease() {
    let mut config = SurveyConfig::default();
    config.outcome.prob_vpec_second = 0.1;
    assert!(config.validate().unwrap_err().is_configuration());
}

#[test]
fn test_resolution_must_divide_day() {
    let mut config = SurveyConfig::default();
    config.almanac.resolution_minutes = 7;
    assert!(config.validate().is_err());
    config.almanac.resolution_minutes = 0;
    assert!(config.validate().is_err());
    config.almanac.resolution_minutes = 10;
    assert!(config.validate().is_ok());
}

#[test]
fn test_sloane_hardin_requires_file() {
    let mut config = SurveyConfig::default();
    config.tiling.tiling_method = TilingMethod::SloaneHardin;
    assert!(config.validate().is_err());
}

#[test]
fn test_sky_not_allowed_in_sequential_ordering() {
    let mut config = SurveyConfig::default();
    config.tiling.sequential_ordering = vec![FibreRole::Sky];
    assert!(config.validate().is_err());
}

#[test]
fn test_check_date() {
    let config = SimulationConfig {
        date_start: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        date_end: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
        ..Default::default()
    };
    assert!(config
        .check_date(NaiveDate::from_ymd_opt(2026, 3, 5).unwrap())
        .is_ok());
    assert!(config
        .check_date(NaiveDate::from_ymd_opt(2026, 3, 11).unwrap())
        .unwrap_err()
        .is_configuration());
    assert!(config
        .check_date(NaiveDate::from_ymd_opt(2026, 2, 28).unwrap())
        .is_err());
}

#[test]
fn test_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[almanac]\nminimum_airmass = 1.5").unwrap();
    let config = SurveyConfig::from_file(file.path()).unwrap();
    assert_eq!(config.almanac.minimum_airmass, 1.5);
}

#[test]
fn test_from_missing_file() {
    let err = SurveyConfig::from_file("/nonexistent/survey.toml").unwrap_err();
    assert!(err.is_configuration());
}
