//! Candidate tile centres.
//!
//! Centres are generated once per survey window and keep their index (or
//! store field id) as their [`FieldId`] for the whole run, so field almanacs
//! stay valid across retiling.

use log::{debug, info};
use rand::Rng;
use std::fs;
use std::path::Path;

use crate::config::{TilingConfig, TilingMethod};
use crate::error::{SurveyError, SurveyResult};
use crate::geometry::radec_from_vector;
use crate::models::{Field, FieldId, SkyWindow};

/// Highest declination used to scale RA spacing.
const MAX_SCALED_DEC: f64 = 89.0;

/// Centres for `window` according to the configured tiling method.
pub fn generate_centres<R: Rng>(
    config: &TilingConfig,
    window: &SkyWindow,
    fields: &[Field],
    rng: &mut R,
) -> SurveyResult<Vec<Field>> {
    window.validate()?;
    let reach = window.inflate(config.tile_radius);
    let centres = match config.tiling_method {
        TilingMethod::Hexagonal => hexagonal_centres(window, config.tile_radius),
        TilingMethod::Fields => fields
            .iter()
            .filter(|field| reach.contains(field.ra, field.dec))
            .copied()
            .collect(),
        TilingMethod::SloaneHardin => {
            let path = config.tiling_file.as_deref().ok_or_else(|| {
                SurveyError::configuration("sloane_hardin tiling requires tiling_file")
            })?;
            let rotation = if config.randomise_sh {
                rng.gen_range(0.0..360.0)
            } else {
                0.0
            };
            read_sloane_hardin(path)?
                .into_iter()
                .map(|(ra, dec)| ((ra + rotation).rem_euclid(360.0), dec))
                .filter(|&(ra, dec)| reach.contains(ra, dec))
                .enumerate()
                .map(|(i, (ra, dec))| Field::new(FieldId(i as u32), ra, dec))
                .collect()
        }
    };
    info!(
        "Generated {} tile centres ({:?}) for window RA [{}, {}] Dec [{}, {}]",
        centres.len(),
        config.tiling_method,
        window.ra_min,
        window.ra_max,
        window.dec_min,
        window.dec_max
    );
    Ok(centres)
}

/// Hexagonal covering of `window` by circles of `radius` degrees.
///
/// Rows are `1.5 r` apart in Dec with centres `sqrt(3) r` apart along each
/// row, odd rows shifted by half a step. One RA step is used for every row,
/// stretched by `1/cos(dec)` at the most equatorward Dec the tiles reach, so
/// the lattice stays hexagonal and only gets denser towards the poles.
pub fn hexagonal_centres(window: &SkyWindow, radius: f64) -> Vec<Field> {
    let row_step = 1.5 * radius;
    let spacing = 3f64.sqrt() * radius;
    let reach = window.inflate(row_step);
    let equatorward = if reach.dec_min <= 0.0 && reach.dec_max >= 0.0 {
        0.0
    } else {
        reach.dec_min.abs().min(reach.dec_max.abs()).min(MAX_SCALED_DEC)
    };
    let ra_step = (spacing / equatorward.to_radians().cos()).min(360.0);

    let mut centres = Vec::new();
    let mut row = 0usize;
    loop {
        let dec = (window.dec_min + row as f64 * row_step).min(90.0);
        let offset = if row % 2 == 1 { ra_step / 2.0 } else { 0.0 };

        let mut ra = window.ra_min - offset;
        loop {
            let wrapped = ra.rem_euclid(360.0);
            centres.push(Field::new(FieldId(centres.len() as u32), wrapped, dec));
            if ra >= window.ra_max || ra + ra_step >= window.ra_min + 360.0 {
                break;
            }
            ra += ra_step;
        }

        if dec >= window.dec_max || dec >= 90.0 {
            break;
        }
        row += 1;
    }
    debug!(
        "Hexagonal tiling: {} centres at radius {} deg",
        centres.len(),
        radius
    );
    centres
}

/// Read a sphere-covering file of unit vectors.
///
/// The file holds whitespace-separated `x y z` triplets, in any line
/// layout; `#` starts a comment.
pub fn read_sloane_hardin(path: &Path) -> SurveyResult<Vec<(f64, f64)>> {
    let content = fs::read_to_string(path).map_err(|e| {
        SurveyError::tiling(format!("Failed to read tiling file {}: {}", path.display(), e))
    })?;

    let mut values = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let data = line.split('#').next().unwrap_or("");
        for token in data.split_whitespace() {
            let value: f64 = token.parse().map_err(|_| {
                SurveyError::tiling(format!(
                    "{}:{}: '{}' is not a number",
                    path.display(),
                    line_no + 1,
                    token
                ))
            })?;
            values.push(value);
        }
    }
    if values.is_empty() || values.len() % 3 != 0 {
        return Err(SurveyError::tiling(format!(
            "{}: expected x y z triplets, found {} values",
            path.display(),
            values.len()
        )));
    }

    Ok(values
        .chunks_exact(3)
        .map(|v| radec_from_vector([v[0], v[1], v[2]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::haversine_degrees;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hexagonal_covers_window() {
        let window = SkyWindow::new(30.0, 43.0, -34.0, -26.0);
        let radius = 1.0;
        let centres = hexagonal_centres(&window, radius);
        assert!(!centres.is_empty());

        for i in 0..=26 {
            for j in 0..=16 {
                let ra = 30.0 + 0.5 * i as f64;
                let dec = -34.0 + 0.5 * j as f64;
                let nearest = centres
                    .iter()
                    .map(|c| haversine_degrees(ra, dec, c.ra, c.dec))
                    .fold(f64::INFINITY, f64::min);
                assert!(nearest <= radius + 1e-9, "({}, {}) uncovered: {}", ra, dec, nearest);
            }
        }
    }

    #[test]
    fn test_hexagonal_ids_are_indices() {
        let centres = hexagonal_centres(&SkyWindow::new(10.0, 20.0, -10.0, 0.0), 3.0);
        for (i, centre) in centres.iter().enumerate() {
            assert_eq!(centre.field_id, FieldId(i as u32));
        }
    }

    #[test]
    fn test_read_sloane_hardin() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# three points").unwrap();
        writeln!(file, "1 0 0").unwrap();
        writeln!(file, "0\n1\n0").unwrap();
        writeln!(file, "0 0 -1 # south pole").unwrap();

        let points = read_sloane_hardin(file.path()).unwrap();
        assert_eq!(points.len(), 3);
        assert!((points[0].0 - 0.0).abs() < 1e-9 && points[0].1.abs() < 1e-9);
        assert!((points[1].0 - 90.0).abs() < 1e-9);
        assert!((points[2].1 + 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_sloane_hardin_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1 0").unwrap();
        assert!(matches!(
            read_sloane_hardin(file.path()),
            Err(SurveyError::Tiling { .. })
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1 0 x").unwrap();
        assert!(read_sloane_hardin(file.path()).is_err());

        assert!(read_sloane_hardin(Path::new("/nonexistent/ipack.txt")).is_err());
    }

    #[test]
    fn test_sloane_hardin_filtered_to_window() {
        let mut file = NamedTempFile::new().unwrap();
        for (ra, dec) in [(35.0f64, -30.0f64), (36.0, -29.0), (200.0, 40.0)] {
            let v = crate::geometry::unit_vector(ra, dec);
            writeln!(file, "{} {} {}", v[0], v[1], v[2]).unwrap();
        }
        let config = TilingConfig {
            tiling_method: TilingMethod::SloaneHardin,
            tiling_file: Some(file.path().to_path_buf()),
            randomise_sh: false,
            ..Default::default()
        };
        let window = SkyWindow::new(30.0, 43.0, -34.0, -26.0);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let centres = generate_centres(&config, &window, &[], &mut rng).unwrap();
        assert_eq!(centres.len(), 2);
        assert_eq!(centres[1].field_id, FieldId(1));
    }

    #[test]
    fn test_fields_method_keeps_store_ids() {
        let config = TilingConfig {
            tiling_method: TilingMethod::Fields,
            ..Default::default()
        };
        let fields = [
            Field::new(FieldId(40), 35.0, -30.0),
            Field::new(FieldId(41), 120.0, 10.0),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let centres = generate_centres(
            &config,
            &SkyWindow::new(30.0, 43.0, -34.0, -26.0),
            &fields,
            &mut rng,
        )
        .unwrap();
        assert_eq!(centres, vec![fields[0]]);
    }
}
