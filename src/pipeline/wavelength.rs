use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::model::{Channel, WavelengthBand};
use crate::error::{Result, TrackError};

pub const DEFAULT_LOWER_WAVELENGTH: f64 = 6.0;
pub const DEFAULT_SPEED_COEFFICIENT: f64 = 1.75;
pub const HIGH_SPEED_UPPER_CAP: f64 = 200.0;
const GAUGE_UPPER_SCALE: f64 = 0.625;
const GAUGE_LOWER_SCALE: f64 = 0.5;
const SHORT_WAVELENGTH_BAND: (f64, f64) = (3.5, 6.0);
const ALIGNMENT_LOWER_LIMIT: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackClass {
    Conventional,
    HighSpeed,
}

impl TrackClass {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conventional" => Some(TrackClass::Conventional),
            "highspeed" | "high_speed" | "shinkansen" => Some(TrackClass::HighSpeed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackClass::Conventional => "conventional",
            TrackClass::HighSpeed => "highspeed",
        }
    }
}

/// Line parameters the restoration pass-band is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WavelengthRequest {
    pub max_speed_kmh: f64,
    pub track_class: TrackClass,
    pub channel: Channel,
    /// Allowed range `[1.5, 2.0]`.
    pub speed_coefficient: f64,
    pub short_wavelength_mode: bool,
    pub alignment_lower_limit_15m: bool,
}

impl WavelengthRequest {
    pub fn new(max_speed_kmh: f64, track_class: TrackClass, channel: Channel) -> Self {
        Self {
            max_speed_kmh,
            track_class,
            channel,
            speed_coefficient: DEFAULT_SPEED_COEFFICIENT,
            short_wavelength_mode: false,
            alignment_lower_limit_15m: false,
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Pick the restoration band for a line speed, track class and channel.
pub fn select_band(req: &WavelengthRequest) -> Result<WavelengthBand> {
    if !(req.max_speed_kmh > 0.0) {
        return Err(TrackError::InvalidSpeed(req.max_speed_kmh));
    }
    if !(1.5..=2.0).contains(&req.speed_coefficient) {
        return Err(TrackError::InvalidParameter(format!(
            "speed coefficient {} outside [1.5, 2.0]",
            req.speed_coefficient
        )));
    }

    let high_speed = req.track_class == TrackClass::HighSpeed;
    if high_speed && req.channel == Channel::Level && req.short_wavelength_mode {
        return WavelengthBand::new(SHORT_WAVELENGTH_BAND.0, SHORT_WAVELENGTH_BAND.1);
    }

    let mut lower = DEFAULT_LOWER_WAVELENGTH;
    let mut upper = req.max_speed_kmh * req.speed_coefficient;
    if high_speed {
        upper = upper.min(HIGH_SPEED_UPPER_CAP);
    }
    if req.channel == Channel::Gauge {
        upper *= GAUGE_UPPER_SCALE;
        lower *= GAUGE_LOWER_SCALE;
    }
    if high_speed && req.channel == Channel::Alignment && req.alignment_lower_limit_15m {
        lower = ALIGNMENT_LOWER_LIMIT;
    }

    let band = WavelengthBand::new(round1(lower), round1(upper))?;
    debug!(
        "band for {} km/h {} {}: {band}",
        req.max_speed_kmh,
        req.track_class.as_str(),
        req.channel
    );
    Ok(band)
}
