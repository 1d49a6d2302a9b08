use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::model::Series;
use crate::error::{Result, TrackError};

/// A grade change at `vpi` (m) rounded by a parabola of `radius` (m).
/// Grades are in per-mille (mm/m).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerticalCurve {
    pub vpi: f64,
    pub radius: f64,
    pub grade_in: f64,
    pub grade_out: f64,
}

impl VerticalCurve {
    /// Length of the parabolic transition between the two grades.
    pub fn length(&self) -> f64 {
        self.radius * (self.grade_out - self.grade_in).abs() / 1000.0
    }

    /// Grade (‰) at `position`, ignoring any other curve.
    fn grade_at(&self, position: f64) -> f64 {
        let half = self.length() / 2.0;
        if half <= 0.0 {
            return if position < self.vpi {
                self.grade_in
            } else {
                self.grade_out
            };
        }
        let t = ((position - (self.vpi - half)) / (2.0 * half)).clamp(0.0, 1.0);
        self.grade_in + t * (self.grade_out - self.grade_in)
    }
}

/// How the long-wavelength grade trend is estimated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExclusionMethod {
    /// Centred moving average over `window_size` samples.
    MovingAverage { window_size: usize },
    /// Grade profile built from known vertical curves.
    Parametric { curves: Vec<VerticalCurve> },
}

/// Output of vertical-curve exclusion: `processed + excluded == original`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExclusionResult {
    pub processed: Series,
    pub excluded: Series,
}

/// Split a level series into the grade trend and the remaining irregularity.
pub fn exclude(series: &Series, method: &ExclusionMethod) -> Result<ExclusionResult> {
    let values = series.values();
    let excluded = match method {
        ExclusionMethod::MovingAverage { window_size } => {
            if *window_size == 0 {
                return Err(TrackError::InvalidParameter(
                    "moving-average window must be at least one sample".to_string(),
                ));
            }
            reflected_moving_average(&values, *window_size)
        }
        ExclusionMethod::Parametric { curves } => {
            for c in curves {
                if !(c.radius > 0.0) {
                    return Err(TrackError::InvalidRadius(c.radius));
                }
            }
            grade_profile(series, curves)
        }
    };
    let processed: Vec<f64> = values
        .iter()
        .zip(&excluded)
        .map(|(o, e)| o - e)
        .collect();
    debug!("vertical-curve exclusion over {} samples", values.len());
    Ok(ExclusionResult {
        processed: series.with_values(processed)?,
        excluded: series.with_values(excluded)?,
    })
}

/// Centred moving average; the window is made odd and the ends are padded by
/// point reflection (`2·v[0] - v[k]`) so a straight grade passes unchanged.
pub fn reflected_moving_average(values: &[f64], window_size: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let half = (window_size / 2).min(n - 1);
    let width = (2 * half + 1) as f64;

    let at = |i: isize| -> f64 {
        let last = (n - 1) as isize;
        if i < 0 {
            2.0 * values[0] - values[(-i) as usize]
        } else if i > last {
            2.0 * values[n - 1] - values[(2 * last - i) as usize]
        } else {
            values[i as usize]
        }
    };

    let half = half as isize;
    let mut sum: f64 = (-half..=half).map(at).sum();
    let mut out = Vec::with_capacity(n);
    for i in 0..n as isize {
        out.push(sum / width);
        if i + 1 < n as isize {
            sum += at(i + half + 1) - at(i - half);
        }
    }
    out
}

/// Elevation (mm) implied by the curves, offset to best fit the series.
fn grade_profile(series: &Series, curves: &[VerticalCurve]) -> Vec<f64> {
    let samples = series.samples();
    if samples.is_empty() {
        return Vec::new();
    }
    let mut sorted = curves.to_vec();
    sorted.sort_by(|a, b| a.vpi.total_cmp(&b.vpi));

    // the curve whose VPI is nearest governs each position
    let grade = |p: f64| -> f64 {
        match sorted.as_slice() {
            [] => 0.0,
            [only] => only.grade_at(p),
            many => {
                let idx = many.partition_point(|c| c.vpi <= p);
                let before = idx.checked_sub(1).map(|i| &many[i]);
                let after = many.get(idx);
                match (before, after) {
                    (Some(b), Some(a)) if (p - b.vpi) > (a.vpi - p) => a.grade_at(p),
                    (Some(b), _) => b.grade_at(p),
                    (None, Some(a)) => a.grade_at(p),
                    (None, None) => 0.0,
                }
            }
        }
    };

    let mut profile = Vec::with_capacity(samples.len());
    let mut elevation = 0.0;
    profile.push(elevation);
    for w in samples.windows(2) {
        let dx = w[1].position - w[0].position;
        elevation += 0.5 * (grade(w[0].position) + grade(w[1].position)) * dx;
        profile.push(elevation);
    }

    let offset = samples
        .iter()
        .zip(&profile)
        .map(|(s, e)| s.value - e)
        .sum::<f64>()
        / samples.len() as f64;
    profile.into_iter().map(|e| e + offset).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn graded_defect() -> Series {
        let values: Vec<f64> = (0..401)
            .map(|i| {
                let p = i as f64 * 0.25;
                0.5 * p + 5.0 * (2.0 * PI * p / 20.0).sin()
            })
            .collect();
        Series::from_values(0.0, 0.25, &values).unwrap()
    }

    #[test]
    fn parts_sum_to_original() {
        let s = graded_defect();
        for method in [
            ExclusionMethod::MovingAverage { window_size: 81 },
            ExclusionMethod::Parametric {
                curves: vec![VerticalCurve {
                    vpi: 50.0,
                    radius: 3000.0,
                    grade_in: 0.0,
                    grade_out: 5.0,
                }],
            },
        ] {
            let r = exclude(&s, &method).unwrap();
            for ((o, p), e) in s.samples().iter().zip(r.processed.samples()).zip(r.excluded.samples()) {
                assert!((p.value + e.value - o.value).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn moving_average_keeps_straight_grade() {
        let values: Vec<f64> = (0..50).map(|i| 3.0 + 0.2 * i as f64).collect();
        let avg = reflected_moving_average(&values, 11);
        for (a, v) in avg.iter().zip(&values) {
            assert!((a - v).abs() < 1e-9);
        }
    }

    #[test]
    fn oversized_window_is_limited_to_series() {
        let avg = reflected_moving_average(&[1.0, 2.0, 3.0], 99);
        assert_eq!(avg.len(), 3);
        assert!((avg[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn zero_window_is_rejected() {
        let s = graded_defect();
        assert!(exclude(&s, &ExclusionMethod::MovingAverage { window_size: 0 }).is_err());
    }

    #[test]
    fn parametric_profile_follows_grades() {
        // constant 2‰ grade everywhere: the profile is the straight line itself
        let values: Vec<f64> = (0..41).map(|i| 7.0 + 2.0 * i as f64).collect();
        let s = Series::from_values(0.0, 1.0, &values).unwrap();
        let curve = VerticalCurve {
            vpi: 20.0,
            radius: 5000.0,
            grade_in: 2.0,
            grade_out: 2.0,
        };
        let r = exclude(&s, &ExclusionMethod::Parametric { curves: vec![curve] }).unwrap();
        for p in r.processed.samples() {
            assert!(p.value.abs() < 1e-9);
        }
    }
}
