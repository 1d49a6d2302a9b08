//! Taper the movement into untouched track at both ends of a work section
//! and apply the tamping machine's periodic correction.

use std::f64::consts::PI;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::data::model::{ConnectionType, MovementRecord, TrackDirection, WorkSection};
use crate::error::{Result, TrackError, Warning};

pub const DEFAULT_PEAK_LIMIT_MM: f64 = 50.0;
pub const DEFAULT_JUMP_LIMIT_MM: f64 = 10.0;
const LATERAL_CORRECTION_GAIN: f64 = 0.1;
const VERTICAL_CORRECTION_GAIN: f64 = 0.15;

// ---------------------------------------------------------------------------
// Machine table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineType {
    #[serde(rename = "08-16")]
    Mtt0816,
    #[serde(rename = "08-475")]
    Mtt08475,
    #[serde(rename = "08-275")]
    Mtt08275,
    #[serde(rename = "09-16")]
    Mtt0916,
    #[serde(rename = "09-32")]
    Mtt0932,
}

/// Geometry of one machine type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineParams {
    /// D-point (front measuring point) spacing in metres.
    pub d_point_spacing: f64,
    /// C-point (work point) spacing in metres.
    pub c_point_spacing: f64,
    pub lift_points: u32,
    pub lining_points: u32,
    /// Exponents of the two halves of the MTT easing curve.
    pub easing_exponents: (f64, f64),
}

impl MachineType {
    pub const ALL: [MachineType; 5] = [
        MachineType::Mtt0816,
        MachineType::Mtt08475,
        MachineType::Mtt08275,
        MachineType::Mtt0916,
        MachineType::Mtt0932,
    ];

    pub fn params(self) -> MachineParams {
        let (d, c, lift, line, exps) = match self {
            MachineType::Mtt0816 => (10.4, 5.2, 4, 4, (2.0, 2.0)),
            MachineType::Mtt08475 => (11.8, 6.1, 4, 4, (2.2, 1.8)),
            MachineType::Mtt08275 => (9.7, 4.9, 4, 4, (1.8, 1.5)),
            MachineType::Mtt0916 => (12.3, 6.3, 4, 4, (2.5, 2.0)),
            MachineType::Mtt0932 => (15.0, 7.5, 8, 8, (3.0, 2.0)),
        };
        MachineParams {
            d_point_spacing: d,
            c_point_spacing: c,
            lift_points: lift,
            lining_points: line,
            easing_exponents: exps,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MachineType::Mtt0816 => "08-16",
            MachineType::Mtt08475 => "08-475",
            MachineType::Mtt08275 => "08-275",
            MachineType::Mtt0916 => "09-16",
            MachineType::Mtt0932 => "09-32",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

// ---------------------------------------------------------------------------
// Easing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Easing {
    Linear,
    Quadratic,
    Cubic,
    Cosine,
    Exponential,
    Mtt,
}

impl Easing {
    pub const ALL: [Easing; 6] = [
        Easing::Linear,
        Easing::Quadratic,
        Easing::Cubic,
        Easing::Cosine,
        Easing::Exponential,
        Easing::Mtt,
    ];

    /// Connection factor at relative position `t`; 0 at the section edge,
    /// 1 at the far edge of the taper zone.
    pub fn factor(self, t: f64, machine: MachineType) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::Quadratic => t * t,
            Easing::Cubic => t * t * (3.0 - 2.0 * t),
            Easing::Cosine => (1.0 - (PI * t).cos()) / 2.0,
            Easing::Exponential => t.powf(2.5),
            Easing::Mtt => {
                let (a, b) = machine.params().easing_exponents;
                if t < 0.5 {
                    0.5 * (2.0 * t).powf(a)
                } else {
                    1.0 - 0.5 * (2.0 * (1.0 - t)).powf(b)
                }
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::Quadratic => "quadratic",
            Easing::Cubic => "cubic",
            Easing::Cosine => "cosine",
            Easing::Exponential => "exponential",
            Easing::Mtt => "mtt",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|e| e.as_str() == s)
    }
}

// ---------------------------------------------------------------------------
// Smoother
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmootherConfig {
    pub easing: Easing,
    pub machine: MachineType,
    pub apply_machine_correction: bool,
    pub peak_limit_mm: f64,
    pub jump_limit_mm: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            easing: Easing::Cubic,
            machine: MachineType::Mtt08475,
            apply_machine_correction: false,
            peak_limit_mm: DEFAULT_PEAK_LIMIT_MM,
            jump_limit_mm: DEFAULT_JUMP_LIMIT_MM,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingResult {
    pub records: Vec<MovementRecord>,
    pub warnings: Vec<Warning>,
}

/// One taper zone: `t` grows from 0 at `anchor` to 1 at `anchor + sign·length`.
#[derive(Debug, Clone, Copy)]
struct Zone {
    kind: ConnectionType,
    anchor: f64,
    length: f64,
    sign: f64,
}

impl Zone {
    fn far_edge(&self) -> f64 {
        self.anchor + self.sign * self.length
    }

    /// Relative position of `p` inside the zone, `None` outside.
    fn relative(&self, p: f64) -> Option<f64> {
        if self.length <= 0.0 {
            return None;
        }
        let d = (p - self.anchor) * self.sign;
        (0.0..=self.length).contains(&d).then(|| d / self.length)
    }
}

fn zone_name(kind: ConnectionType) -> &'static str {
    match kind {
        ConnectionType::Front => "front",
        ConnectionType::Rear => "rear",
        ConnectionType::None => "body",
    }
}

fn zones(section: &WorkSection) -> [Zone; 2] {
    let at_start = |kind, length| Zone {
        kind,
        anchor: section.start_km,
        length,
        sign: 1.0,
    };
    let at_end = |kind, length| Zone {
        kind,
        anchor: section.end_km,
        length,
        sign: -1.0,
    };
    match section.direction {
        TrackDirection::Up => [
            at_start(ConnectionType::Front, section.front_length),
            at_end(ConnectionType::Rear, section.rear_length),
        ],
        TrackDirection::Down => [
            at_end(ConnectionType::Front, section.front_length),
            at_start(ConnectionType::Rear, section.rear_length),
        ],
    }
}

/// Linearly interpolate one axis of the records at `position`.
fn interpolate(
    records: &[MovementRecord],
    position: f64,
    pick: impl Fn(&MovementRecord) -> Option<f64>,
) -> Option<f64> {
    let idx = records.partition_point(|r| r.position <= position);
    let before = idx.checked_sub(1).map(|i| &records[i]);
    match (before, records.get(idx)) {
        (Some(a), Some(b)) => {
            let (va, vb) = (pick(a)?, pick(b)?);
            let t = (position - a.position) / (b.position - a.position);
            Some(va + t * (vb - va))
        }
        (Some(a), None) => pick(a),
        (None, Some(b)) => pick(b),
        (None, None) => None,
    }
}

/// Multiplier pair `(lateral, vertical)` of the machine post-pass at `p`.
pub fn machine_correction(p: f64, machine: MachineType) -> (f64, f64) {
    let params = machine.params();
    let d = params.d_point_spacing;
    let c = params.c_point_spacing;
    let d_effect = (2.0 * PI * p.rem_euclid(d) / d).sin();
    let c_effect = (2.0 * PI * p.rem_euclid(c) / c).cos();
    (
        1.0 + LATERAL_CORRECTION_GAIN * d_effect,
        1.0 + VERTICAL_CORRECTION_GAIN * c_effect,
    )
}

/// Taper the movement at both ends of `section`.
///
/// Inside a zone the movement becomes `factor(t) · movement(far edge)`, with
/// the far-edge value taken from the unsmoothed input. Samples outside the
/// section are not worked and get zero movement.
pub fn smooth(
    records: &[MovementRecord],
    section: &WorkSection,
    config: &SmootherConfig,
) -> Result<SmoothingResult> {
    section.validate()?;
    if records
        .windows(2)
        .any(|w| !(w[1].position > w[0].position))
    {
        return Err(TrackError::InvalidParameter(
            "movement records must be sorted by position".to_string(),
        ));
    }

    let zones = zones(section);
    let edges: Vec<(Option<f64>, Option<f64>)> = zones
        .iter()
        .map(|z| {
            let edge = z.far_edge();
            (
                interpolate(records, edge, |r| r.lateral_movement),
                interpolate(records, edge, |r| r.vertical_movement),
            )
        })
        .collect();

    let mut out: Vec<MovementRecord> = records
        .iter()
        .map(|r| {
            let mut rec = *r;
            rec.connection_type = ConnectionType::None;
            rec.connection_factor = None;
            if !section.contains(r.position) {
                return rec.map_movement(|_| 0.0);
            }
            let hit = zones
                .iter()
                .zip(&edges)
                .find_map(|(z, e)| z.relative(r.position).map(|t| (z, e, t)));
            if let Some((zone, (lat_edge, vert_edge), t)) = hit {
                let f = config.easing.factor(t, config.machine);
                rec.lateral_movement = rec.lateral_movement.map(|m| lat_edge.unwrap_or(m) * f);
                rec.vertical_movement = rec.vertical_movement.map(|m| vert_edge.unwrap_or(m) * f);
                rec.connection_type = zone.kind;
                rec.connection_factor = Some(f);
            }
            rec
        })
        .collect();

    if config.apply_machine_correction {
        for rec in out.iter_mut().filter(|r| section.contains(r.position)) {
            let (lat, vert) = machine_correction(rec.position, config.machine);
            rec.lateral_movement = rec.lateral_movement.map(|m| m * lat);
            rec.vertical_movement = rec.vertical_movement.map(|m| m * vert);
        }
    }

    let warnings = validate(&out, config);
    for w in &warnings {
        warn!("{w}");
    }
    debug!(
        "smoothed {} records over [{}, {}] with {:?}",
        out.len(),
        section.start_km,
        section.end_km,
        config.easing
    );
    Ok(SmoothingResult {
        records: out,
        warnings,
    })
}

/// Advisory checks: peak |movement| per zone and adjacent-sample jumps.
pub fn validate(records: &[MovementRecord], config: &SmootherConfig) -> Vec<Warning> {
    let mut warnings = Vec::new();

    for kind in [ConnectionType::Front, ConnectionType::None, ConnectionType::Rear] {
        let peak = records
            .iter()
            .filter(|r| r.connection_type == kind)
            .map(|r| (r.position, r.movement().abs()))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((position, peak)) = peak {
            if peak > config.peak_limit_mm {
                warnings.push(Warning::PeakExceeded {
                    zone: zone_name(kind).to_string(),
                    position,
                    peak,
                });
            }
        }
    }

    for w in records.windows(2) {
        let jump = (w[1].movement() - w[0].movement()).abs();
        if jump > config.jump_limit_mm {
            warnings.push(Warning::JumpExceeded {
                position: w[1].position,
                jump,
            });
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Axis;

    fn flat_records(value: f64) -> Vec<MovementRecord> {
        (0..=100)
            .map(|i| MovementRecord::new(i as f64, Axis::Vertical, value))
            .collect()
    }

    fn section(direction: TrackDirection) -> WorkSection {
        WorkSection::new(10.0, 90.0, direction, 20.0, 10.0).unwrap()
    }

    #[test]
    fn every_easing_spans_zero_to_one() {
        for machine in MachineType::ALL {
            for easing in Easing::ALL {
                assert!(easing.factor(0.0, machine).abs() < 1e-12, "{easing:?}");
                assert!((easing.factor(1.0, machine) - 1.0).abs() < 1e-12, "{easing:?}");
                let mid = easing.factor(0.5, machine);
                assert!(mid > 0.0 && mid < 1.0);
            }
        }
    }

    #[test]
    fn factor_clamps_out_of_range_input() {
        assert_eq!(Easing::Linear.factor(-3.0, MachineType::Mtt0816), 0.0);
        assert_eq!(Easing::Quadratic.factor(4.0, MachineType::Mtt0816), 1.0);
    }

    #[test]
    fn far_edge_matches_unsmoothed_value() {
        // ramped movement so the far-edge value is distinctive
        let records: Vec<MovementRecord> = (0..=100)
            .map(|i| MovementRecord::new(i as f64, Axis::Lateral, 0.1 * i as f64))
            .collect();
        for easing in Easing::ALL {
            let cfg = SmootherConfig {
                easing,
                ..SmootherConfig::default()
            };
            let out = smooth(&records, &section(TrackDirection::Up), &cfg).unwrap().records;
            // front far edge at 30 m, rear far edge at 80 m
            assert!((out[30].movement() - records[30].movement()).abs() < 1e-12);
            assert!((out[80].movement() - records[80].movement()).abs() < 1e-12);
            assert_eq!(out[10].movement(), 0.0);
            assert_eq!(out[90].movement(), 0.0);
            assert_eq!(out[10].connection_type, ConnectionType::Front);
            assert_eq!(out[85].connection_type, ConnectionType::Rear);
            assert_eq!(out[50].connection_type, ConnectionType::None);
        }
    }

    #[test]
    fn outside_section_is_zeroed() {
        let out = smooth(&flat_records(5.0), &section(TrackDirection::Up), &SmootherConfig::default())
            .unwrap()
            .records;
        assert_eq!(out[0].movement(), 0.0);
        assert_eq!(out[100].movement(), 0.0);
        assert_eq!(out[50].movement(), 5.0);
    }

    #[test]
    fn zone_values_scale_far_edge_by_factor() {
        let cfg = SmootherConfig {
            easing: Easing::Linear,
            ..SmootherConfig::default()
        };
        let out = smooth(&flat_records(8.0), &section(TrackDirection::Up), &cfg).unwrap().records;
        // 5 m into a 20 m front zone
        assert!((out[15].movement() - 2.0).abs() < 1e-12);
        assert_eq!(out[15].connection_factor, Some(0.25));
    }

    #[test]
    fn down_direction_swaps_zones() {
        let out = smooth(&flat_records(4.0), &section(TrackDirection::Down), &SmootherConfig::default())
            .unwrap()
            .records;
        assert_eq!(out[85].connection_type, ConnectionType::Front);
        assert_eq!(out[15].connection_type, ConnectionType::Rear);
        // rear zone is 10 m long at the start: 25 m is already in the body
        assert_eq!(out[25].connection_type, ConnectionType::None);
    }

    #[test]
    fn machine_correction_scales_axes() {
        let cfg = SmootherConfig {
            easing: Easing::Linear,
            apply_machine_correction: true,
            ..SmootherConfig::default()
        };
        let out = smooth(&flat_records(10.0), &section(TrackDirection::Up), &cfg).unwrap().records;
        let (_, vert) = machine_correction(50.0, cfg.machine);
        assert!((out[50].movement() - 10.0 * vert).abs() < 1e-12);
        assert_eq!(out[10].movement(), 0.0);
        let (lat, vert) = machine_correction(0.0, MachineType::Mtt0816);
        assert!((lat - 1.0).abs() < 1e-12);
        assert!((vert - 1.15).abs() < 1e-12);
    }

    #[test]
    fn validation_flags_peaks_and_jumps() {
        let mut records = flat_records(0.0);
        records[50].vertical_movement = Some(60.0);
        let warnings = validate(&records, &SmootherConfig::default());
        assert!(warnings.iter().any(|w| matches!(w, Warning::PeakExceeded { peak, .. } if *peak == 60.0)));
        assert_eq!(
            warnings
                .iter()
                .filter(|w| matches!(w, Warning::JumpExceeded { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn unsorted_records_are_rejected() {
        let mut records = flat_records(1.0);
        records.swap(3, 4);
        assert!(smooth(&records, &section(TrackDirection::Up), &SmootherConfig::default()).is_err());
    }

    #[test]
    fn machine_names_round_trip() {
        for m in MachineType::ALL {
            assert_eq!(MachineType::parse(m.as_str()), Some(m));
        }
        assert_eq!(Easing::parse("Cosine"), Some(Easing::Cosine));
    }
}
