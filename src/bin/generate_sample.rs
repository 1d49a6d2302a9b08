use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::Float64Array;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use track_restore::data::exchange::{write_curve_elements, write_restrictions};
use track_restore::data::loader::write_series_csv;
use track_restore::data::model::{
    CurveDirection, CurveElement, Restriction, RestrictionDirection, Series,
};
use track_restore::pipeline::curve_trapezoid::CurveTrapezoidModel;

const INTERVAL: f64 = 0.25;
const LENGTH: f64 = 600.0;
const CHORD: f64 = 10.0;

/// Deterministic noise source (splitmix64).
struct Noise {
    state: u64,
}

impl Noise {
    fn new(seed: u64) -> Self {
        Noise { state: seed }
    }

    fn next_unit(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        (z >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Normal deviate via Box-Muller.
    fn gauss(&mut self, std_dev: f64) -> f64 {
        let u1 = self.next_unit().max(1e-15);
        let u2 = self.next_unit();
        std_dev * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

/// Sum of sine defects `(wavelength m, amplitude mm, phase rad)` plus noise.
fn irregularity(
    positions: &[f64],
    defects: &[(f64, f64, f64)],
    noise: f64,
    rng: &mut Noise,
) -> Vec<f64> {
    positions
        .iter()
        .map(|&p| {
            let signal: f64 = defects
                .iter()
                .map(|&(wl, amp, phase)| amp * (std::f64::consts::TAU * p / wl + phase).sin())
                .sum();
            signal + rng.gauss(noise)
        })
        .collect()
}

fn write_parquet(path: &Path, series: &Series) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("position", DataType::Float64, false),
        Field::new("value", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Float64Array::from(series.positions())),
            Arc::new(Float64Array::from(series.values())),
        ],
    )
    .context("Failed to create RecordBatch")?;

    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("Failed to create writer")?;
    writer.write(&batch).context("Failed to write batch")?;
    writer.close().context("Failed to close writer")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = Noise::new(42);

    let n = (LENGTH / INTERVAL) as usize + 1;
    let positions: Vec<f64> = (0..n).map(|i| i as f64 * INTERVAL).collect();

    // Level: short and mid-wave defects on a 4 per-mille grade
    let level_defects = [(12.0, 3.0, 0.0), (31.0, 5.0, 1.1), (4.5, 0.8, 0.3)];
    let level: Vec<f64> = irregularity(&positions, &level_defects, 0.2, &mut rng)
        .into_iter()
        .zip(&positions)
        .map(|(v, &p)| v + 4.0 * p)
        .collect();
    let level = Series::from_values(0.0, INTERVAL, &level)?;
    write_parquet(Path::new("sample_level.parquet"), &level)?;
    write_series_csv(Path::new("sample_level.csv"), &level)?;

    // Alignment: defects on top of the theoretical versine of one right-hand curve
    let curves = vec![
        CurveElement::circular(150.0, 450.0, 800.0, CurveDirection::Right).with_transition(50.0),
    ];
    let model = CurveTrapezoidModel::new(&curves, CHORD)?;
    let align_defects = [(18.0, 4.0, 0.7), (40.0, 6.0, 2.0)];
    let align: Vec<f64> = irregularity(&positions, &align_defects, 0.3, &mut rng)
        .into_iter()
        .zip(&positions)
        .map(|(v, &p)| v + model.versine_at(p))
        .collect();
    let align = Series::from_values(0.0, INTERVAL, &align)?;
    write_series_csv(Path::new("sample_alignment.csv"), &align)?;

    let file = File::create("sample_curves.csv").context("Failed to create sample_curves.csv")?;
    write_curve_elements(file, &curves)?;

    let restrictions = vec![
        Restriction::fixed(280.0, 300.0, RestrictionDirection::Both)?,
        Restriction::new(100.0, 140.0, RestrictionDirection::Vertical, 15.0)?,
    ];
    let file = File::create("sample_restrictions.csv")
        .context("Failed to create sample_restrictions.csv")?;
    write_restrictions(file, &restrictions)?;

    println!(
        "Wrote level and alignment series ({n} samples at {INTERVAL} m), {} curve and {} restriction rows",
        curves.len(),
        restrictions.len()
    );
    Ok(())
}
