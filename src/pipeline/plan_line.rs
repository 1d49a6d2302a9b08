use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::vertical_curve::reflected_moving_average;
use crate::data::model::Series;
use crate::error::Warning;

/// Margin by which a raised point clears the restored waveform.
const UPWARD_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeedMethod {
    /// Piecewise-linear through the zero crossings.
    ZeroCrossing,
    /// Moving average of the restored waveform.
    MovingAverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PriorityMode {
    /// Raise segments until the upward ratio target is met.
    Upward,
    /// Keep the seed line.
    Balanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanLineConfig {
    pub method: SeedMethod,
    pub priority: PriorityMode,
    pub max_upward_mm: f64,
    pub max_downward_mm: f64,
    pub target_upward_ratio: f64,
    pub iteration_limit: usize,
    /// Length (m) over which a segment lift fades out on each side.
    pub taper_length: f64,
    /// Moving-average window (samples) for the seed line.
    pub seed_window: usize,
}

impl Default for PlanLineConfig {
    fn default() -> Self {
        Self {
            method: SeedMethod::ZeroCrossing,
            priority: PriorityMode::Upward,
            max_upward_mm: 50.0,
            max_downward_mm: 10.0,
            target_upward_ratio: 0.7,
            iteration_limit: 50,
            taper_length: 2.0,
            seed_window: 41,
        }
    }
}

impl PlanLineConfig {
    fn sanitized(&self) -> Self {
        Self {
            max_upward_mm: self.max_upward_mm.max(0.0),
            max_downward_mm: self.max_downward_mm.max(0.0),
            target_upward_ratio: self.target_upward_ratio.clamp(0.0, 1.0),
            taper_length: self.taper_length.max(0.0),
            seed_window: self.seed_window.max(1),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossingKind {
    Ascending,
    Descending,
}

/// Where the restored waveform passes through zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZeroCrossing {
    pub position: f64,
    /// Index of the first sample after the crossing.
    pub index: usize,
    pub kind: CrossingKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanLineStatistics {
    pub upward_ratio: f64,
    pub iterations: usize,
    pub ratio_not_reached: bool,
    /// Sum of |plan - restored| in mm.
    pub total_movement: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanLineResult {
    pub plan_line: Series,
    pub statistics: PlanLineStatistics,
    pub warnings: Vec<Warning>,
}

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

/// Scan for sign changes, interpolating the crossing position.
pub fn zero_crossings(series: &Series) -> Vec<ZeroCrossing> {
    series
        .samples()
        .windows(2)
        .enumerate()
        .filter_map(|(i, w)| {
            let (a, b) = (w[0].value, w[1].value);
            let kind = if a < 0.0 && b >= 0.0 {
                CrossingKind::Ascending
            } else if a >= 0.0 && b < 0.0 {
                CrossingKind::Descending
            } else {
                return None;
            };
            let position = w[0].position + (w[1].position - w[0].position) * a / (a - b);
            Some(ZeroCrossing {
                position,
                index: i + 1,
                kind,
            })
        })
        .collect()
}

/// Fraction of samples where the plan lies above the restored waveform.
pub fn upward_ratio(plan: &[f64], restored: &[f64]) -> f64 {
    if restored.is_empty() {
        return 0.0;
    }
    let up = plan.iter().zip(restored).filter(|(p, r)| p > r).count();
    up as f64 / restored.len() as f64
}

fn total_movement(plan: &[f64], restored: &[f64]) -> f64 {
    plan.iter().zip(restored).map(|(p, r)| (p - r).abs()).sum()
}

fn interpolate_knots(positions: &[f64], knots: &[(f64, f64)]) -> Vec<f64> {
    positions
        .iter()
        .map(|&p| {
            let idx = knots.partition_point(|k| k.0 <= p);
            match (idx.checked_sub(1).map(|i| knots[i]), knots.get(idx)) {
                (Some(a), Some(b)) if b.0 > a.0 => a.1 + (b.1 - a.1) * (p - a.0) / (b.0 - a.0),
                (Some(a), _) => a.1,
                (None, Some(b)) => b.1,
                (None, None) => 0.0,
            }
        })
        .collect()
}

fn seed_line(series: &Series, restored: &[f64], crossings: &[ZeroCrossing], cfg: &PlanLineConfig) -> Vec<f64> {
    let smoothed = reflected_moving_average(restored, cfg.seed_window);
    if cfg.method == SeedMethod::MovingAverage || crossings.is_empty() {
        return smoothed;
    }
    let smooth_series = match series.with_values(smoothed.clone()) {
        Ok(s) => s,
        Err(_) => return smoothed,
    };
    let knots: Vec<(f64, f64)> = crossings
        .iter()
        .map(|c| (c.position, smooth_series.value_at(c.position).unwrap_or(0.0)))
        .collect();
    interpolate_knots(&series.positions(), &knots)
}

/// Contiguous index ranges between crossings (head and tail included).
fn segments(n: usize, crossings: &[ZeroCrossing]) -> Vec<(usize, usize)> {
    let mut bounds = vec![0];
    bounds.extend(crossings.iter().map(|c| c.index));
    bounds.push(n);
    bounds.dedup();
    bounds.windows(2).map(|w| (w[0], w[1])).collect()
}

/// One candidate segment lift: `delta` at full weight over `lo..hi`,
/// fading to zero over `taper` samples each side.
#[derive(Debug, Clone, Copy)]
struct Lift {
    lo: usize,
    hi: usize,
    from: usize,
    to: usize,
    taper: usize,
    delta: f64,
}

impl Lift {
    fn weight(&self, i: usize) -> f64 {
        if i < self.lo {
            1.0 - (self.lo - i) as f64 / (self.taper + 1) as f64
        } else if i >= self.hi {
            1.0 - (i + 1 - self.hi) as f64 / (self.taper + 1) as f64
        } else {
            1.0
        }
    }

    /// Change in upward-sample count and in total movement if applied.
    fn effect(&self, plan: &[f64], restored: &[f64]) -> (i64, f64) {
        (self.from..self.to).fold((0, 0.0), |(gain, moved), i| {
            let before = plan[i];
            let after = before + self.delta * self.weight(i);
            let gain = gain + i64::from(after > restored[i]) - i64::from(before > restored[i]);
            (gain, moved + (after - restored[i]).abs() - (before - restored[i]).abs())
        })
    }

    fn apply(&self, plan: &[f64]) -> Vec<f64> {
        let mut raised = plan.to_vec();
        for i in self.from..self.to {
            raised[i] += self.delta * self.weight(i);
        }
        raised
    }
}

/// Lift `segment` so every point clears the restored waveform, fading the
/// lift out over `taper` samples each side and staying under `max_up`.
fn raise_segment(
    plan: &[f64],
    restored: &[f64],
    segment: (usize, usize),
    taper: usize,
    max_up: f64,
) -> Option<Lift> {
    let (lo, hi) = segment;
    let need = (lo..hi)
        .map(|i| restored[i] - plan[i])
        .fold(f64::NEG_INFINITY, f64::max);
    if need < 0.0 {
        return None;
    }
    let need = need + UPWARD_EPS;

    let mut lift = Lift {
        lo,
        hi,
        from: lo.saturating_sub(taper),
        to: (hi + taper).min(plan.len()),
        taper,
        delta: 0.0,
    };
    let allowed = (lift.from..lift.to)
        .map(|i| (max_up - (plan[i] - restored[i])) / lift.weight(i))
        .fold(f64::INFINITY, f64::min);
    lift.delta = need.min(allowed);
    (lift.delta > 0.0).then_some(lift)
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Derive a plan line from a restored waveform, biased toward lifting.
///
/// Never fails: an unreachable ratio target is reported through
/// `statistics.ratio_not_reached` and a [`Warning::RatioNotReached`].
pub fn generate(restored: &Series, config: &PlanLineConfig) -> PlanLineResult {
    let cfg = config.sanitized();
    let r = restored.values();
    let n = r.len();

    let crossings = zero_crossings(restored);
    let mut plan: Vec<f64> = seed_line(restored, &r, &crossings, &cfg)
        .into_iter()
        .zip(&r)
        .map(|(p, &ri)| p.clamp(ri - cfg.max_downward_mm, ri + cfg.max_upward_mm))
        .collect();
    let mut ratio = upward_ratio(&plan, &r);
    debug!(
        "plan seed: {} crossings, upward ratio {ratio:.3}",
        crossings.len()
    );

    let mut iterations = 0;
    if cfg.priority == PriorityMode::Upward {
        let taper = match restored.interval() {
            Some(dx) => (cfg.taper_length / dx).round() as usize,
            None => 0,
        };
        let segs = segments(n, &crossings);

        let mut up = plan.iter().zip(&r).filter(|(p, ri)| p > ri).count() as i64;
        let mut moved = total_movement(&plan, &r);
        while ratio < cfg.target_upward_ratio && iterations < cfg.iteration_limit {
            // candidates are scored over their own window; only the winner is applied
            let best = segs
                .iter()
                .filter_map(|&seg| raise_segment(&plan, &r, seg, taper, cfg.max_upward_mm))
                .map(|lift| (lift, lift.effect(&plan, &r)))
                .fold(None::<(Lift, (i64, f64))>, |best, c| match best {
                    None => Some(c),
                    Some(b) => {
                        let ((_, (cg, cm)), (_, (bg, bm))) = (c, b);
                        let better = cg > bg || (cg == bg && cm < bm);
                        Some(if better { c } else { b })
                    }
                });

            match best {
                Some((lift, (gain, delta_moved))) if gain > 0 => {
                    plan = lift.apply(&plan);
                    up += gain;
                    moved += delta_moved;
                    ratio = up as f64 / n as f64;
                    iterations += 1;
                }
                _ => break,
            }
        }
        debug!("plan raising done, total movement {moved:.1} mm");
    }

    let ratio_not_reached = cfg.priority == PriorityMode::Upward && ratio < cfg.target_upward_ratio;
    let mut warnings = Vec::new();
    if ratio_not_reached {
        warnings.push(Warning::RatioNotReached {
            achieved: ratio,
            target: cfg.target_upward_ratio,
        });
    }
    let statistics = PlanLineStatistics {
        upward_ratio: ratio,
        iterations,
        ratio_not_reached,
        total_movement: total_movement(&plan, &r),
    };
    info!(
        "plan line: upward ratio {:.3} after {} iterations",
        statistics.upward_ratio, statistics.iterations
    );

    let plan_line = restored
        .with_values(plan)
        .unwrap_or_else(|_| restored.clone());
    PlanLineResult {
        plan_line,
        statistics,
        warnings,
    }
}
