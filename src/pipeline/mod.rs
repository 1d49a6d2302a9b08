/// Restoration pipeline: one channel of one work section per run.
///
/// Architecture:
/// ```text
///   ChannelSeries
///        │
///        ▼
///   ┌────────────────┐   level      ┌────────────────┐
///   │ vertical_curve │◀────────────▶│ curve_trapezoid │ alignment
///   └────────────────┘              └────────────────┘
///        │   band from `wavelength`
///        ▼
///   ┌─────────────┐
///   │ restoration │  FFT pass-band
///   └─────────────┘
///        │
///        ▼
///   ┌────────────┐     ┌──────────┐     ┌──────────┐
///   │ plan_line  │ ──▶ │ movement │ ──▶ │ boundary │ ──▶ MovementRecord[]
///   └────────────┘     └──────────┘     └──────────┘
/// ```
///
/// `batch` and `cache` sit outside a single run: they fan independent jobs
/// out over a worker pool and memoise finished runs by content hash.

pub mod batch;
pub mod boundary;
pub mod cache;
pub mod curve_trapezoid;
pub mod fft;
pub mod movement;
pub mod plan_line;
pub mod restoration;
pub mod vertical_curve;
pub mod wavelength;

use log::info;
use serde::{Deserialize, Serialize};

use crate::data::model::{
    Channel, ChannelSeries, CurveElement, MovementRecord, Restriction, Series, WavelengthBand,
    WorkSection,
};
use crate::error::{Result, TrackError, Warning};
use boundary::SmootherConfig;
use curve_trapezoid::CurveTrapezoidModel;
use plan_line::{PlanLineConfig, PlanLineStatistics};
use vertical_curve::ExclusionMethod;
use wavelength::WavelengthRequest;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where the restoration band comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BandSelection {
    Fixed(WavelengthBand),
    /// Derived from line speed; the request's channel is replaced by the
    /// channel of the series being processed.
    Auto(WavelengthRequest),
}

/// Curve data for alignment runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveSettings {
    pub chord_length: f64,
    pub elements: Vec<CurveElement>,
}

impl Default for CurveSettings {
    fn default() -> Self {
        Self {
            chord_length: 10.0,
            elements: Vec::new(),
        }
    }
}

/// Immutable settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub band: BandSelection,
    /// Applied to level series only.
    pub exclusion: Option<ExclusionMethod>,
    /// Applied to alignment series only.
    pub curves: Option<CurveSettings>,
    pub plan: PlanLineConfig,
    pub restrictions: Vec<Restriction>,
    pub section: Option<WorkSection>,
    pub smoother: SmootherConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            band: BandSelection::Fixed(WavelengthBand {
                lower: wavelength::DEFAULT_LOWER_WAVELENGTH,
                upper: 40.0,
            }),
            exclusion: None,
            curves: None,
            plan: PlanLineConfig::default(),
            restrictions: Vec::new(),
            section: None,
            smoother: SmootherConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Every intermediate series of a run plus the final movements.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub channel: Channel,
    pub band: WavelengthBand,
    /// Input after grade or curve removal.
    pub preprocessed: Series,
    /// What was removed: grade trend (level) or theoretical versine (alignment).
    pub removed: Option<Series>,
    pub restored: Series,
    pub plan_line: Series,
    pub statistics: PlanLineStatistics,
    pub movements: Vec<MovementRecord>,
    pub warnings: Vec<Warning>,
}

fn resolve_band(selection: &BandSelection, channel: Channel) -> Result<WavelengthBand> {
    match selection {
        BandSelection::Fixed(band) => WavelengthBand::new(band.lower, band.upper),
        BandSelection::Auto(req) => wavelength::select_band(&WavelengthRequest { channel, ..*req }),
    }
}

fn add(a: &Series, b: &Series) -> Result<Series> {
    a.with_values(
        a.samples()
            .iter()
            .zip(b.samples())
            .map(|(x, y)| x.value + y.value)
            .collect(),
    )
}

/// Run the full restoration pipeline on one channel series.
pub fn run(input: &ChannelSeries, config: &PipelineConfig) -> Result<PipelineOutput> {
    let channel = input.channel;
    let series = &input.series;
    if series.len() < 2 {
        return Err(TrackError::EmptySeries);
    }
    let band = resolve_band(&config.band, channel)?;

    let mut trapezoid = None;
    let (preprocessed, removed) = match (channel, &config.exclusion, &config.curves) {
        (Channel::Level, Some(method), _) => {
            let r = vertical_curve::exclude(series, method)?;
            (r.processed, Some(r.excluded))
        }
        (Channel::Alignment, _, Some(curves)) => {
            let model = CurveTrapezoidModel::new(&curves.elements, curves.chord_length)?;
            let split = model.subtract(series)?;
            trapezoid = Some(model);
            (split.corrected, Some(split.theoretical))
        }
        _ => (series.clone(), None),
    };

    let restored = restoration::restore(&preprocessed, &band)?;
    let plan = plan_line::generate(&restored, &config.plan);
    let mut warnings = plan.warnings;

    // alignment plans are expressed on the curved line again
    let (restored, plan_line) = match (&trapezoid, &removed) {
        (Some(model), Some(theoretical)) => (
            add(&restored, theoretical)?,
            model.recombine(&plan.plan_line, theoretical)?,
        ),
        _ => (restored, plan.plan_line),
    };

    let moved = movement::calculate(&plan_line, &restored, channel, &config.restrictions)?;
    warnings.extend(moved.warnings);

    let movements = match &config.section {
        Some(section) => {
            let smoothed = boundary::smooth(&moved.records, section, &config.smoother)?;
            let pinned = movement::pin_fixed_zones(&smoothed.records, &config.restrictions);
            if pinned == smoothed.records {
                warnings.extend(smoothed.warnings);
            } else {
                warnings.extend(boundary::validate(&pinned, &config.smoother));
            }
            pinned
        }
        None => moved.records,
    };

    info!(
        "{channel} run: {} samples, band {band}, upward ratio {:.3}, {} warnings",
        series.len(),
        plan.statistics.upward_ratio,
        warnings.len()
    );
    Ok(PipelineOutput {
        channel,
        band,
        preprocessed,
        removed,
        restored,
        plan_line,
        statistics: plan.statistics,
        movements,
        warnings,
    })
}
