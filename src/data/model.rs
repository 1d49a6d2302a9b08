use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};

/// Relative tolerance used when checking uniform sample spacing.
const SPACING_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Sample / Series – the measurement shape handed to and returned by the core
// ---------------------------------------------------------------------------

/// One measurement: position along the line (m) and irregularity value (mm).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub position: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(position: f64, value: f64) -> Self {
        Self { position, value }
    }
}

/// An ordered, uniformly spaced run of samples.
///
/// Construction through [`Series::new`] checks that positions are strictly
/// increasing and evenly spaced, so stages further down never re-check it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series {
    samples: Vec<Sample>,
}

impl Series {
    /// Validate and wrap a sample vector.
    pub fn new(samples: Vec<Sample>) -> Result<Self> {
        if samples.len() >= 2 {
            let expected = samples[1].position - samples[0].position;
            for (i, w) in samples.windows(2).enumerate() {
                let step = w[1].position - w[0].position;
                if !(step > 0.0) {
                    return Err(TrackError::NonIncreasingPositions { index: i + 1 });
                }
                if (step - expected).abs() > SPACING_TOLERANCE * expected.max(1.0) {
                    return Err(TrackError::NonUniformSpacing {
                        index: i + 1,
                        expected,
                        found: step,
                    });
                }
            }
        }
        Ok(Self { samples })
    }

    /// Build a series from a start position, a spacing and the values.
    pub fn from_values(start: f64, interval: f64, values: &[f64]) -> Result<Self> {
        if values.len() >= 2 && !(interval > 0.0) {
            return Err(TrackError::InvalidParameter(format!(
                "sample interval must be positive, got {interval}"
            )));
        }
        Ok(Self {
            samples: values
                .iter()
                .enumerate()
                .map(|(i, &v)| Sample::new(start + i as f64 * interval, v))
                .collect(),
        })
    }

    /// Return a new series sharing these positions with different values.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.samples.len() {
            return Err(TrackError::LengthMismatch {
                expected: self.samples.len(),
                found: values.len(),
            });
        }
        Ok(Self {
            samples: self
                .samples
                .iter()
                .zip(values)
                .map(|(s, value)| Sample::new(s.position, value))
                .collect(),
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn positions(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.position).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    /// Sample spacing in metres, `None` for fewer than two samples.
    pub fn interval(&self) -> Option<f64> {
        match self.samples.as_slice() {
            [a, b, ..] => Some(b.position - a.position),
            _ => None,
        }
    }

    pub fn first_position(&self) -> Option<f64> {
        self.samples.first().map(|s| s.position)
    }

    pub fn last_position(&self) -> Option<f64> {
        self.samples.last().map(|s| s.position)
    }

    /// Linearly interpolated value at `position`, clamped to the end values
    /// outside the covered range.
    pub fn value_at(&self, position: f64) -> Option<f64> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;
        if position <= first.position {
            return Some(first.value);
        }
        if position >= last.position {
            return Some(last.value);
        }
        let idx = self
            .samples
            .partition_point(|s| s.position <= position)
            .saturating_sub(1);
        let a = self.samples[idx];
        let b = self.samples[(idx + 1).min(self.samples.len() - 1)];
        if b.position <= a.position {
            return Some(a.value);
        }
        let t = (position - a.position) / (b.position - a.position);
        Some(a.value + t * (b.value - a.value))
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Measurement channel of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    Level,
    Alignment,
    Gauge,
    CrossLevel,
}

/// The movement axis a channel is corrected along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    Lateral,
    Vertical,
}

impl Channel {
    pub fn axis(self) -> Axis {
        match self {
            Channel::Level | Channel::CrossLevel => Axis::Vertical,
            Channel::Alignment | Channel::Gauge => Axis::Lateral,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "level" | "vertical" => Some(Channel::Level),
            "alignment" | "lateral" => Some(Channel::Alignment),
            "gauge" => Some(Channel::Gauge),
            "crosslevel" | "cross_level" | "cross-level" | "cant" => Some(Channel::CrossLevel),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Channel::Level => "level",
            Channel::Alignment => "alignment",
            Channel::Gauge => "gauge",
            Channel::CrossLevel => "crossLevel",
        };
        write!(f, "{s}")
    }
}

/// A series tagged with the channel it was measured on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSeries {
    pub channel: Channel,
    pub series: Series,
}

// ---------------------------------------------------------------------------
// WavelengthBand
// ---------------------------------------------------------------------------

/// Wavelength interval in metres kept by restoration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WavelengthBand {
    pub lower: f64,
    pub upper: f64,
}

impl WavelengthBand {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if !(lower > 0.0) || !(upper > lower) {
            return Err(TrackError::InvalidBand { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub fn contains(&self, wavelength: f64) -> bool {
        wavelength >= self.lower && wavelength <= self.upper
    }
}

impl fmt::Display for WavelengthBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}-{:.1} m", self.lower, self.upper)
    }
}

// ---------------------------------------------------------------------------
// Curve elements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CurveDirection {
    Left,
    Right,
}

impl CurveDirection {
    /// Right-hand curves count positive.
    pub fn sign(self) -> f64 {
        match self {
            CurveDirection::Left => -1.0,
            CurveDirection::Right => 1.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Some(CurveDirection::Left),
            "right" | "r" => Some(CurveDirection::Right),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CurveDirection::Left => "left",
            CurveDirection::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CurveType {
    Circular,
    Transition,
    Compound,
}

impl CurveType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "circular" | "circle" => Some(CurveType::Circular),
            "transition" | "clothoid" => Some(CurveType::Transition),
            "compound" => Some(CurveType::Compound),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CurveType::Circular => "circular",
            CurveType::Transition => "transition",
            CurveType::Compound => "compound",
        }
    }
}

/// One horizontal curve element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveElement {
    pub start_km: f64,
    pub end_km: f64,
    /// Radius in metres.
    pub radius: f64,
    pub direction: CurveDirection,
    pub curve_type: CurveType,
    /// Length of the entry/exit transitions (circular elements only).
    pub transition_length: Option<f64>,
    /// Cant in mm.
    pub cant: Option<f64>,
    /// Design speed in km/h.
    pub speed: Option<f64>,
    pub notes: String,
}

impl CurveElement {
    pub fn circular(start_km: f64, end_km: f64, radius: f64, direction: CurveDirection) -> Self {
        Self {
            start_km,
            end_km,
            radius,
            direction,
            curve_type: CurveType::Circular,
            transition_length: None,
            cant: None,
            speed: None,
            notes: String::new(),
        }
    }

    pub fn with_transition(mut self, length: f64) -> Self {
        self.transition_length = Some(length);
        self
    }

    pub fn length(&self) -> f64 {
        self.end_km - self.start_km
    }

    pub fn covers(&self, position: f64) -> bool {
        position >= self.start_km && position <= self.end_km
    }
}

/// Reject non-positive radii, empty ranges and overlapping elements.
///
/// Elements may touch (`a.end_km == b.start_km`) but not overlap.
pub fn validate_curve_elements(elements: &[CurveElement]) -> Result<Vec<CurveElement>> {
    let mut sorted = elements.to_vec();
    for e in &sorted {
        if !(e.radius > 0.0) {
            return Err(TrackError::InvalidRadius(e.radius));
        }
        if !(e.end_km > e.start_km) {
            return Err(TrackError::InvalidParameter(format!(
                "curve element [{}, {}] has no length",
                e.start_km, e.end_km
            )));
        }
    }
    sorted.sort_by(|a, b| a.start_km.total_cmp(&b.start_km));
    for w in sorted.windows(2) {
        if w[1].start_km < w[0].end_km {
            return Err(TrackError::OverlappingCurveElements {
                first_start: w[0].start_km,
                first_end: w[0].end_km,
                second_start: w[1].start_km,
                second_end: w[1].end_km,
            });
        }
    }
    Ok(sorted)
}

// ---------------------------------------------------------------------------
// Restrictions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RestrictionDirection {
    Left,
    Right,
    Both,
    Vertical,
}

/// A zone where movement is limited or forbidden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restriction {
    pub start_km: f64,
    pub end_km: f64,
    pub direction: RestrictionDirection,
    /// Permitted movement in mm.
    pub restriction_amount: f64,
    /// Fixed zones force the movement to zero.
    pub is_fixed: bool,
    pub notes: String,
}

impl Restriction {
    pub fn new(
        start_km: f64,
        end_km: f64,
        direction: RestrictionDirection,
        restriction_amount: f64,
    ) -> Result<Self> {
        if !(end_km >= start_km) {
            return Err(TrackError::InvalidRestriction(format!(
                "range [{start_km}, {end_km}] is reversed"
            )));
        }
        if !(restriction_amount >= 0.0) {
            return Err(TrackError::InvalidRestriction(format!(
                "amount {restriction_amount} must not be negative"
            )));
        }
        Ok(Self {
            start_km,
            end_km,
            direction,
            restriction_amount,
            is_fixed: restriction_amount == 0.0,
            notes: String::new(),
        })
    }

    pub fn fixed(start_km: f64, end_km: f64, direction: RestrictionDirection) -> Result<Self> {
        Self::new(start_km, end_km, direction, 0.0)
    }

    pub fn covers(&self, position: f64) -> bool {
        position >= self.start_km && position <= self.end_km
    }

    /// Movement bounds `(min, max)` a capped zone imposes on `axis`, or
    /// `None` when its cap does not act on that axis. `Both` caps lateral
    /// movement only. Fixed zones pin every axis regardless.
    pub fn bounds(&self, axis: Axis) -> Option<(f64, f64)> {
        let a = self.restriction_amount;
        match (self.direction, axis) {
            (RestrictionDirection::Vertical, Axis::Vertical) => Some((-a, a)),
            (RestrictionDirection::Both, Axis::Lateral) => Some((-a, a)),
            (RestrictionDirection::Left, Axis::Lateral) => Some((-a, f64::INFINITY)),
            (RestrictionDirection::Right, Axis::Lateral) => Some((f64::NEG_INFINITY, a)),
            _ => None,
        }
    }

    pub fn applies_to(&self, axis: Axis) -> bool {
        self.is_fixed || self.bounds(axis).is_some()
    }
}

// ---------------------------------------------------------------------------
// Work section
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackDirection {
    Up,
    Down,
}

/// The track range corrected in one pass, with taper zone lengths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkSection {
    pub start_km: f64,
    pub end_km: f64,
    pub direction: TrackDirection,
    pub front_length: f64,
    pub rear_length: f64,
}

impl WorkSection {
    pub fn new(
        start_km: f64,
        end_km: f64,
        direction: TrackDirection,
        front_length: f64,
        rear_length: f64,
    ) -> Result<Self> {
        let section = Self {
            start_km,
            end_km,
            direction,
            front_length,
            rear_length,
        };
        section.validate()?;
        Ok(section)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.end_km > self.start_km) {
            return Err(TrackError::InvalidWorkSection(format!(
                "end {} must be beyond start {}",
                self.end_km, self.start_km
            )));
        }
        if !(self.front_length >= 0.0) || !(self.rear_length >= 0.0) {
            return Err(TrackError::InvalidWorkSection(
                "taper lengths must not be negative".to_string(),
            ));
        }
        if self.front_length + self.rear_length > self.length() + 1e-9 {
            return Err(TrackError::InvalidWorkSection(format!(
                "taper zones ({} + {}) exceed section length {}",
                self.front_length,
                self.rear_length,
                self.length()
            )));
        }
        Ok(())
    }

    pub fn length(&self) -> f64 {
        self.end_km - self.start_km
    }

    pub fn contains(&self, position: f64) -> bool {
        position >= self.start_km && position <= self.end_km
    }
}

// ---------------------------------------------------------------------------
// Movement records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionType {
    Front,
    Rear,
    None,
}

/// Movement the machine applies at one position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub position: f64,
    pub lateral_movement: Option<f64>,
    pub vertical_movement: Option<f64>,
    pub connection_type: ConnectionType,
    pub connection_factor: Option<f64>,
    /// A restriction zone altered the raw value.
    pub clamped: bool,
}

impl MovementRecord {
    pub fn new(position: f64, axis: Axis, movement: f64) -> Self {
        let (lateral_movement, vertical_movement) = match axis {
            Axis::Lateral => (Some(movement), None),
            Axis::Vertical => (None, Some(movement)),
        };
        Self {
            position,
            lateral_movement,
            vertical_movement,
            connection_type: ConnectionType::None,
            connection_factor: None,
            clamped: false,
        }
    }

    /// The movement on whichever axis is populated (lateral first).
    pub fn movement(&self) -> f64 {
        self.lateral_movement
            .or(self.vertical_movement)
            .unwrap_or(0.0)
    }

    /// Apply `f` to every populated axis.
    pub fn map_movement(mut self, f: impl Fn(f64) -> f64) -> Self {
        self.lateral_movement = self.lateral_movement.map(&f);
        self.vertical_movement = self.vertical_movement.map(&f);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_rejects_non_increasing_positions() {
        let samples = vec![Sample::new(0.0, 1.0), Sample::new(0.0, 2.0)];
        assert_eq!(
            Series::new(samples),
            Err(TrackError::NonIncreasingPositions { index: 1 })
        );
    }

    #[test]
    fn series_rejects_uneven_spacing() {
        let samples = vec![
            Sample::new(0.0, 1.0),
            Sample::new(0.25, 2.0),
            Sample::new(0.75, 2.0),
        ];
        assert!(matches!(
            Series::new(samples),
            Err(TrackError::NonUniformSpacing { index: 2, .. })
        ));
    }

    #[test]
    fn value_at_interpolates_and_clamps() {
        let s = Series::from_values(10.0, 1.0, &[0.0, 2.0, 4.0]).unwrap();
        assert_eq!(s.interval(), Some(1.0));
        assert!((s.value_at(10.5).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(s.value_at(5.0), Some(0.0));
        assert_eq!(s.value_at(99.0), Some(4.0));
    }

    #[test]
    fn overlapping_elements_are_rejected() {
        let a = CurveElement::circular(0.0, 100.0, 400.0, CurveDirection::Right);
        let b = CurveElement::circular(90.0, 150.0, 600.0, CurveDirection::Left);
        assert!(matches!(
            validate_curve_elements(&[b, a]),
            Err(TrackError::OverlappingCurveElements { .. })
        ));
    }

    #[test]
    fn touching_elements_are_accepted_and_sorted() {
        let a = CurveElement::circular(0.0, 100.0, 400.0, CurveDirection::Right);
        let b = CurveElement::circular(100.0, 150.0, 600.0, CurveDirection::Left);
        let sorted = validate_curve_elements(&[b, a]).unwrap();
        assert_eq!(sorted[0].start_km, 0.0);
    }

    #[test]
    fn restriction_bounds_follow_axis() {
        let left = Restriction::new(0.0, 10.0, RestrictionDirection::Left, 5.0).unwrap();
        assert_eq!(left.bounds(Axis::Lateral), Some((-5.0, f64::INFINITY)));
        assert_eq!(left.bounds(Axis::Vertical), None);
        let fixed = Restriction::fixed(0.0, 10.0, RestrictionDirection::Vertical).unwrap();
        assert!(fixed.is_fixed);
        assert!(fixed.applies_to(Axis::Lateral));
        let both = Restriction::new(0.0, 10.0, RestrictionDirection::Both, 5.0).unwrap();
        assert!(!both.applies_to(Axis::Vertical));
    }

    #[test]
    fn work_section_rejects_oversized_tapers() {
        assert!(WorkSection::new(0.0, 100.0, TrackDirection::Up, 60.0, 50.0).is_err());
        assert!(WorkSection::new(0.0, 100.0, TrackDirection::Up, 50.0, 50.0).is_ok());
    }
}
