//! Survey simulation binary.
//!
//! Generates a seeded synthetic catalog, loads it into the in-memory store and
//! runs the survey night by night, printing the final summary as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Built-in demo configuration
//! cargo run --bin survey-sim
//!
//! # Explicit configuration
//! cargo run --bin survey-sim -- survey.toml
//! ```
//!
//! # Environment Variables
//!
//! - `SURVEY_TARGETS`: Number of synthetic science targets (default: 2000)
//! - `RUST_LOG`: Log level (default: info)

use std::env;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use taipan_sim::models::{SkyWindow, Target, TargetTier};
use taipan_sim::{LocalCatalogStore, LowPrecisionEphemeris, SimulationDriver, SurveyConfig};

fn demo_config() -> SurveyConfig {
    let mut config = SurveyConfig::default();
    config.simulation.window = SkyWindow::new(30.0, 60.0, -40.0, -20.0);
    config.simulation.date_start = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap_or(NaiveDate::MIN);
    config.simulation.date_end = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap_or(NaiveDate::MIN);
    config
}

/// Science targets spread over `window`, plus standards and guides over the
/// tile reach around it.
fn synthetic_catalog(config: &SurveyConfig, science: u64) -> Vec<Target> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.simulation.seed);
    let window = config.simulation.window;
    let reach = window.inflate(config.tiling.tile_radius);
    let position = |w: &SkyWindow, rng: &mut ChaCha8Rng| {
        let ra = rng.gen_range(w.ra_min..=w.ra_max);
        let sin_dec = rng.gen_range(w.dec_min.to_radians().sin()..=w.dec_max.to_radians().sin());
        (ra, sin_dec.asin().to_degrees())
    };

    let mut targets = Vec::new();
    for id in 0..science {
        let (ra, dec) = position(&window, &mut rng);
        let tier = match rng.gen_range(0..10) {
            0 => TargetTier::H0,
            1..=3 => TargetTier::Vpec,
            _ => TargetTier::LowZ,
        };
        targets.push(
            Target::science(id, ra, dec, rng.gen_range(1..=5), rng.gen_range(8.0..12.5))
                .in_tier(tier),
        );
    }
    let supplements = (science / 4).max(50);
    for k in 0..supplements {
        let (ra, dec) = position(&reach, &mut rng);
        targets.push(Target::standard(1_000_000 + k, ra, dec, 0, rng.gen_range(9.0..11.0)));
        let (ra, dec) = position(&reach, &mut rng);
        targets.push(Target::guide(2_000_000 + k, ra, dec, 0, rng.gen_range(9.0..11.0)));
    }
    targets
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; library `log` records are bridged into tracing
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .init();

    let config = match env::args().nth(1) {
        Some(path) => SurveyConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => demo_config(),
    };
    let science: u64 = env::var("SURVEY_TARGETS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2000);

    let store = LocalCatalogStore::new();
    store.insert_targets(&synthetic_catalog(&config, science));
    info!("Seeded store with {} targets", store.target_count());

    let geometry = Arc::new(LowPrecisionEphemeris::new(config.site));
    let mut driver = SimulationDriver::new(config, Arc::new(store.clone()), geometry)?;
    let summary = driver.run().await?;

    info!(
        "Finished after {} nights: completeness {:.4}, {} tiles observed",
        summary.nights_run, summary.completeness, summary.tiles_observed
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
