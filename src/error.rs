use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Hard failures
// ---------------------------------------------------------------------------

/// Failures raised by the restoration core.
///
/// Every variant is raised before any output is produced; a stage either
/// returns a complete result or one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    #[error("invalid speed: {0} km/h (must be positive)")]
    InvalidSpeed(f64),
    #[error("invalid radius: {0} m (must be positive)")]
    InvalidRadius(f64),
    #[error("invalid wavelength band [{lower}, {upper}]")]
    InvalidBand { lower: f64, upper: f64 },
    #[error("series is empty")]
    EmptySeries,
    #[error("positions must be strictly increasing (index {index})")]
    NonIncreasingPositions { index: usize },
    #[error("non-uniform spacing at index {index}: expected {expected} m, found {found} m")]
    NonUniformSpacing {
        index: usize,
        expected: f64,
        found: f64,
    },
    #[error("curve elements overlap: [{first_start}, {first_end}] and [{second_start}, {second_end}]")]
    OverlappingCurveElements {
        first_start: f64,
        first_end: f64,
        second_start: f64,
        second_end: f64,
    },
    #[error("series length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("invalid work section: {0}")]
    InvalidWorkSection(String),
    #[error("invalid restriction: {0}")]
    InvalidRestriction(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("parameter file line {line}: {message}")]
    ParameterSyntax { line: usize, message: String },
}

/// Coarse classification of a [`TrackError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input rejected before computation.
    Validation,
    /// No sane default exists for a degenerate numeric input.
    NumericDegenerate,
}

impl TrackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackError::EmptySeries | TrackError::InvalidRadius(_) => ErrorKind::NumericDegenerate,
            _ => ErrorKind::Validation,
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackError>;

// ---------------------------------------------------------------------------
// Advisory warnings
// ---------------------------------------------------------------------------

/// Non-fatal conditions returned as data next to a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Warning {
    /// The plan line could not reach the requested upward ratio.
    RatioNotReached { achieved: f64, target: f64 },
    /// A restriction zone altered the raw movement at `position`.
    RestrictionClamped {
        position: f64,
        raw: f64,
        clamped: f64,
    },
    /// Peak |movement| in a zone exceeds the advisory limit.
    PeakExceeded {
        zone: String,
        position: f64,
        peak: f64,
    },
    /// Jump between adjacent samples exceeds the advisory limit.
    JumpExceeded { position: f64, jump: f64 },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::RatioNotReached { achieved, target } => {
                write!(f, "upward ratio {achieved:.3} below target {target:.3}")
            }
            Warning::RestrictionClamped {
                position,
                raw,
                clamped,
            } => write!(
                f,
                "movement clamped at {position:.2} m: {raw:.2} -> {clamped:.2} mm"
            ),
            Warning::PeakExceeded {
                zone,
                position,
                peak,
            } => write!(f, "{zone} zone peak {peak:.2} mm at {position:.2} m"),
            Warning::JumpExceeded { position, jump } => {
                write!(f, "jump of {jump:.2} mm at {position:.2} m")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_and_empty_series_are_degenerate() {
        assert_eq!(TrackError::InvalidRadius(0.0).kind(), ErrorKind::NumericDegenerate);
        assert_eq!(TrackError::EmptySeries.kind(), ErrorKind::NumericDegenerate);
        assert_eq!(TrackError::InvalidSpeed(-1.0).kind(), ErrorKind::Validation);
    }

    #[test]
    fn warnings_render_readably() {
        let w = Warning::JumpExceeded {
            position: 12.5,
            jump: 11.0,
        };
        assert_eq!(w.to_string(), "jump of 11.00 mm at 12.50 m");
    }
}
