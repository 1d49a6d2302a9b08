//! Theoretical chord versine of horizontal curves ("curve trapezoid").
//!
//! Each curve element is turned into a lateral offset profile along the
//! line: tangent, entry transition (cubic D/6 term), circular body, exit
//! transition, then a straight continuation. The mid-chord versine of that
//! profile is a trapezoid with rounded corners; summed over all elements it
//! is what an alignment recording shows on a perfectly laid curve.
//!
//! ```text
//!  versine
//!    ▲        ┌──────────────┐   ← L²·1000 / 8R
//!    │       ╱                ╲
//!    │______╱                  ╲______
//!    └──────────────────────────────────▶ position
//!          TS  SC            CS  ST
//! ```

use log::{debug, warn};

use crate::data::model::{CurveElement, CurveType, Series, validate_curve_elements};
use crate::error::{Result, TrackError};

/// Snap distance when deciding whether two elements are adjacent.
const ADJACENCY_EPS: f64 = 1e-6;

/// Chord versine (mm) of a circular curve: `L² · 1000 / (8R)`.
pub fn circular_versine(chord: f64, radius: f64) -> Result<f64> {
    if !(radius > 0.0) {
        return Err(TrackError::InvalidRadius(radius));
    }
    Ok(chord * chord * 1000.0 / (8.0 * radius))
}

/// Cubic transition offset (mm) `x³ · 1000 / (6·R·T)` at `x` metres into a
/// transition of length `T` leading into radius `R`.
///
/// Zero at the transition start; at `x == T` it equals the offset of the
/// adjoining circular arc, `T² · 1000 / (6R)`. `None` outside `[0, T]`.
pub fn transition_correction(x: f64, radius: f64, length: f64) -> Option<f64> {
    if !(radius > 0.0) || !(length > 0.0) || !(0.0..=length).contains(&x) {
        return None;
    }
    Some(x.powi(3) * 1000.0 / (6.0 * radius * length))
}

// ---------------------------------------------------------------------------
// Offset profile of one element
// ---------------------------------------------------------------------------

/// Stretch of linearly varying curvature (1/m, signed).
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: f64,
    length: f64,
    k0: f64,
    k1: f64,
    /// Offset and slope at `start`.
    y0: f64,
    dy0: f64,
}

impl Piece {
    fn offset(&self, t: f64) -> f64 {
        let dk = self.k1 - self.k0;
        let cubic = if dk == 0.0 {
            0.0
        } else {
            // the D/6 term of a linear curvature ramp, in metres
            let c = transition_correction(t, 1.0 / dk.abs(), self.length).unwrap_or(0.0);
            dk.signum() * c / 1000.0
        };
        self.y0 + self.dy0 * t + self.k0 * t * t / 2.0 + cubic
    }

    fn slope(&self, t: f64) -> f64 {
        let dk = self.k1 - self.k0;
        self.dy0 + self.k0 * t + dk * t * t / (2.0 * self.length)
    }
}

#[derive(Debug, Clone)]
struct OffsetProfile {
    start: f64,
    end: f64,
    pieces: Vec<Piece>,
    end_offset: f64,
    end_slope: f64,
}

impl OffsetProfile {
    /// Build from `(length, k0, k1)` runs laid end to end from `start`.
    fn from_runs(start: f64, runs: &[(f64, f64, f64)]) -> Self {
        let mut pieces = Vec::with_capacity(runs.len());
        let (mut pos, mut y, mut dy) = (start, 0.0, 0.0);
        for &(length, k0, k1) in runs.iter().filter(|r| r.0 > 0.0) {
            let piece = Piece {
                start: pos,
                length,
                k0,
                k1,
                y0: y,
                dy0: dy,
            };
            y = piece.offset(length);
            dy = piece.slope(length);
            pos += length;
            pieces.push(piece);
        }
        Self {
            start,
            end: pos,
            pieces,
            end_offset: y,
            end_slope: dy,
        }
    }

    /// Lateral offset (m) at `s`: zero before the element, straight after.
    fn offset(&self, s: f64) -> f64 {
        if s <= self.start {
            return 0.0;
        }
        if s >= self.end {
            return self.end_offset + self.end_slope * (s - self.end);
        }
        let idx = self
            .pieces
            .partition_point(|p| p.start <= s)
            .saturating_sub(1);
        let piece = &self.pieces[idx];
        piece.offset((s - piece.start).min(piece.length))
    }
}

fn element_runs(element: &CurveElement, next_start: Option<f64>) -> Vec<(f64, f64, f64)> {
    let k = element.direction.sign() / element.radius;
    let length = element.length();
    match element.curve_type {
        CurveType::Compound => vec![(length, k, k)],
        CurveType::Transition => {
            let is_entry = next_start.is_some_and(|s| (s - element.end_km).abs() < ADJACENCY_EPS);
            if is_entry {
                vec![(length, 0.0, k)]
            } else {
                vec![(length, k, 0.0)]
            }
        }
        CurveType::Circular => {
            let mut t = element.transition_length.unwrap_or(0.0).max(0.0);
            if 2.0 * t > length {
                warn!(
                    "transition length {t} m does not fit curve [{}, {}]; shortened",
                    element.start_km, element.end_km
                );
                t = length / 2.0;
            }
            vec![(t, 0.0, k), (length - 2.0 * t, k, k), (t, k, 0.0)]
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Alignment series split into defect part and theoretical curve versine.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapezoidSplit {
    pub corrected: Series,
    pub theoretical: Series,
}

/// Curve versine model for a set of non-overlapping curve elements.
#[derive(Debug, Clone)]
pub struct CurveTrapezoidModel {
    elements: Vec<CurveElement>,
    chord: f64,
    profiles: Vec<OffsetProfile>,
}

impl CurveTrapezoidModel {
    /// Validate the elements and prepare their offset profiles for chord
    /// length `chord` (m; 10, 20 and 40 m are the usual recording chords).
    pub fn new(elements: &[CurveElement], chord: f64) -> Result<Self> {
        if !(chord >= 0.0) {
            return Err(TrackError::InvalidParameter(format!(
                "chord length {chord} must not be negative"
            )));
        }
        let elements = validate_curve_elements(elements)?;
        let profiles = elements
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let next_start = elements.get(i + 1).map(|n| n.start_km);
                OffsetProfile::from_runs(e.start_km, &element_runs(e, next_start))
            })
            .collect();
        debug!("curve model: {} elements, chord {chord} m", elements.len());
        Ok(Self {
            elements,
            chord,
            profiles,
        })
    }

    pub fn elements(&self) -> &[CurveElement] {
        &self.elements
    }

    pub fn chord(&self) -> f64 {
        self.chord
    }

    /// Theoretical mid-chord versine (mm) at `position`.
    pub fn versine_at(&self, position: f64) -> f64 {
        let h = self.chord / 2.0;
        if h == 0.0 {
            return 0.0;
        }
        self.profiles
            .iter()
            .filter(|p| position + h > p.start)
            .map(|p| {
                let mid = p.offset(position);
                let ends = 0.5 * (p.offset(position - h) + p.offset(position + h));
                (ends - mid) * 1000.0
            })
            .sum()
    }

    /// Theoretical versine at every position of `series`.
    pub fn theoretical(&self, series: &Series) -> Result<Series> {
        let values = series
            .samples()
            .iter()
            .map(|s| self.versine_at(s.position))
            .collect();
        series.with_values(values)
    }

    /// Remove the curve versine from an alignment recording.
    pub fn subtract(&self, series: &Series) -> Result<TrapezoidSplit> {
        let theoretical = self.theoretical(series)?;
        let corrected = series.with_values(
            series
                .samples()
                .iter()
                .zip(theoretical.samples())
                .map(|(s, t)| s.value - t.value)
                .collect(),
        )?;
        Ok(TrapezoidSplit {
            corrected,
            theoretical,
        })
    }

    /// Add the curve versine back onto a plan computed on corrected data.
    pub fn recombine(&self, corrected_plan: &Series, theoretical: &Series) -> Result<Series> {
        if corrected_plan.len() != theoretical.len() {
            return Err(TrackError::LengthMismatch {
                expected: corrected_plan.len(),
                found: theoretical.len(),
            });
        }
        corrected_plan.with_values(
            corrected_plan
                .samples()
                .iter()
                .zip(theoretical.samples())
                .map(|(p, t)| p.value + t.value)
                .collect(),
        )
    }
}
