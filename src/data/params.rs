//! PRM parameter files: `[section]` headers followed by `key = value` lines.
//!
//! ```text
//! [restoration]
//! method = auto
//! speed = 130
//! trackClass = conventional
//! channel = level
//!
//! [planline]
//! maxUpward = 50
//!
//! [curve]
//! chordLength = 10
//! element = 120, 480, 600, right, circular, 40, 85, 120, "R600 #3"
//!
//! [machine]
//! type = 08-475
//! ```
//!
//! Unknown sections and keys are rejected; missing keys keep their defaults.
//! `#` starts a comment except inside a double-quoted element note.
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::Context;
use log::info;
use serde::{Deserialize, Serialize};

use crate::data::model::{Channel, CurveDirection, CurveElement, CurveType, WavelengthBand};
use crate::error::{Result, TrackError};
use crate::pipeline::boundary::{Easing, MachineType, SmootherConfig};
use crate::pipeline::plan_line::{PlanLineConfig, PriorityMode, SeedMethod};
use crate::pipeline::vertical_curve::ExclusionMethod;
use crate::pipeline::wavelength::{TrackClass, WavelengthRequest};
use crate::pipeline::{BandSelection, CurveSettings, PipelineConfig};

/// Everything a PRM file persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub band: BandSelection,
    /// Moving-average window for grade removal on level series.
    pub exclusion_window: Option<usize>,
    pub plan: PlanLineConfig,
    pub curves: CurveSettings,
    pub smoother: SmootherConfig,
}

impl Default for ParameterSet {
    fn default() -> Self {
        let base = PipelineConfig::default();
        Self {
            band: base.band,
            exclusion_window: None,
            plan: base.plan,
            curves: CurveSettings::default(),
            smoother: base.smoother,
        }
    }
}

fn seed_method_str(m: SeedMethod) -> &'static str {
    match m {
        SeedMethod::ZeroCrossing => "zeroCrossing",
        SeedMethod::MovingAverage => "movingAverage",
    }
}

fn priority_str(p: PriorityMode) -> &'static str {
    match p {
        PriorityMode::Upward => "upward",
        PriorityMode::Balanced => "balanced",
    }
}

fn opt(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

/// JSON string literal, so notes may hold commas, quotes and `#`.
fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

/// Cut a line at the first `#` that is not inside a quoted string.
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            '#' if !quoted => return &line[..i],
            _ => {}
        }
    }
    line
}

impl ParameterSet {
    /// Pipeline settings for one run; restrictions and work section come
    /// from their own files.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            band: self.band.clone(),
            exclusion: self
                .exclusion_window
                .map(|window_size| ExclusionMethod::MovingAverage { window_size }),
            curves: Some(self.curves.clone()),
            plan: self.plan.clone(),
            smoother: self.smoother.clone(),
            ..PipelineConfig::default()
        }
    }

    pub fn to_prm(&self) -> String {
        let mut out = String::from("# track-restore parameters\n\n[restoration]\n");
        match &self.band {
            BandSelection::Fixed(b) => {
                let _ = writeln!(out, "method = band\nlower = {}\nupper = {}", b.lower, b.upper);
            }
            BandSelection::Auto(r) => {
                let _ = writeln!(
                    out,
                    "method = auto\nspeed = {}\ntrackClass = {}\nchannel = {}\ncoefficient = {}\nshortWavelength = {}\nalignmentLower15 = {}",
                    r.max_speed_kmh,
                    r.track_class.as_str(),
                    r.channel,
                    r.speed_coefficient,
                    r.short_wavelength_mode,
                    r.alignment_lower_limit_15m
                );
            }
        }
        if let Some(w) = self.exclusion_window {
            let _ = writeln!(out, "exclusionWindow = {w}");
        }

        let p = &self.plan;
        let _ = writeln!(
            out,
            "\n[planline]\nmethod = {}\npriority = {}\nmaxUpward = {}\nmaxDownward = {}\ntargetRatio = {}\niterations = {}\ntaper = {}\nseedWindow = {}",
            seed_method_str(p.method),
            priority_str(p.priority),
            p.max_upward_mm,
            p.max_downward_mm,
            p.target_upward_ratio,
            p.iteration_limit,
            p.taper_length,
            p.seed_window
        );

        let _ = writeln!(out, "\n[curve]\nchordLength = {}", self.curves.chord_length);
        for e in &self.curves.elements {
            let _ = write!(
                out,
                "element = {}, {}, {}, {}, {}, {}, {}, {}",
                e.start_km,
                e.end_km,
                e.radius,
                e.direction.as_str(),
                e.curve_type.as_str(),
                opt(e.transition_length),
                opt(e.cant),
                opt(e.speed)
            );
            if !e.notes.is_empty() {
                let _ = write!(out, ", {}", quote(&e.notes));
            }
            out.push('\n');
        }

        let s = &self.smoother;
        let _ = writeln!(
            out,
            "\n[machine]\ntype = {}\ncorrection = {}\neasing = {}\npeakLimit = {}\njumpLimit = {}",
            s.machine.as_str(),
            s.apply_machine_correction,
            s.easing.as_str(),
            s.peak_limit_mm,
            s.jump_limit_mm
        );
        out
    }

    pub fn parse_prm(text: &str) -> Result<Self> {
        let mut set = ParameterSet::default();
        let mut section = String::new();
        let mut band_method: Option<String> = None;
        let (mut lower, mut upper) = (None, None);
        let mut request = WavelengthRequest::new(0.0, TrackClass::Conventional, Channel::Level);

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let err = |message: String| TrackError::ParameterSyntax { line, message };
            let content = strip_comment(raw).trim();
            if content.is_empty() {
                continue;
            }
            if let Some(name) = content.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                section = name.trim().to_ascii_lowercase();
                if !["restoration", "planline", "curve", "machine"].contains(&section.as_str()) {
                    return Err(err(format!("unknown section [{name}]")));
                }
                continue;
            }
            let (key, value) = content
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| err(format!("expected `key = value`, got `{content}`")))?;
            let num = || {
                value
                    .parse::<f64>()
                    .map_err(|_| err(format!("{key}: `{value}` is not a number")))
            };
            let count = || {
                value
                    .parse::<usize>()
                    .map_err(|_| err(format!("{key}: `{value}` is not a count")))
            };
            let flag = || {
                value
                    .parse::<bool>()
                    .map_err(|_| err(format!("{key}: `{value}` is not true/false")))
            };
            let unknown = || err(format!("unknown key `{key}` in [{section}]"));

            match (section.as_str(), key) {
                ("restoration", "method") => band_method = Some(value.to_ascii_lowercase()),
                ("restoration", "lower") => lower = Some(num()?),
                ("restoration", "upper") => upper = Some(num()?),
                ("restoration", "speed") => request.max_speed_kmh = num()?,
                ("restoration", "trackClass") => {
                    request.track_class = TrackClass::parse(value)
                        .ok_or_else(|| err(format!("unknown track class `{value}`")))?
                }
                ("restoration", "channel") => {
                    request.channel = Channel::parse(value)
                        .ok_or_else(|| err(format!("unknown channel `{value}`")))?
                }
                ("restoration", "coefficient") => request.speed_coefficient = num()?,
                ("restoration", "shortWavelength") => request.short_wavelength_mode = flag()?,
                ("restoration", "alignmentLower15") => request.alignment_lower_limit_15m = flag()?,
                ("restoration", "exclusionWindow") => set.exclusion_window = Some(count()?),

                ("planline", "method") => {
                    set.plan.method = match value.to_ascii_lowercase().as_str() {
                        "zerocrossing" => SeedMethod::ZeroCrossing,
                        "movingaverage" => SeedMethod::MovingAverage,
                        _ => return Err(err(format!("unknown plan-line method `{value}`"))),
                    }
                }
                ("planline", "priority") => {
                    set.plan.priority = match value.to_ascii_lowercase().as_str() {
                        "upward" => PriorityMode::Upward,
                        "balanced" => PriorityMode::Balanced,
                        _ => return Err(err(format!("unknown priority `{value}`"))),
                    }
                }
                ("planline", "maxUpward") => set.plan.max_upward_mm = num()?,
                ("planline", "maxDownward") => set.plan.max_downward_mm = num()?,
                ("planline", "targetRatio") => set.plan.target_upward_ratio = num()?,
                ("planline", "iterations") => set.plan.iteration_limit = count()?,
                ("planline", "taper") => set.plan.taper_length = num()?,
                ("planline", "seedWindow") => set.plan.seed_window = count()?,

                ("curve", "chordLength") => set.curves.chord_length = num()?,
                ("curve", "element") => set
                    .curves
                    .elements
                    .push(parse_element(value).map_err(err)?),

                ("machine", "type") => {
                    set.smoother.machine = MachineType::parse(value)
                        .ok_or_else(|| err(format!("unknown machine `{value}`")))?
                }
                ("machine", "correction") => set.smoother.apply_machine_correction = flag()?,
                ("machine", "easing") => {
                    set.smoother.easing = Easing::parse(value)
                        .ok_or_else(|| err(format!("unknown easing `{value}`")))?
                }
                ("machine", "peakLimit") => set.smoother.peak_limit_mm = num()?,
                ("machine", "jumpLimit") => set.smoother.jump_limit_mm = num()?,
                ("", _) => return Err(err(format!("`{key}` outside of any section"))),
                _ => return Err(unknown()),
            }
        }

        set.band = match band_method.as_deref() {
            None => set.band,
            Some("band") => match (lower, upper) {
                (Some(lo), Some(hi)) => BandSelection::Fixed(WavelengthBand::new(lo, hi)?),
                _ => {
                    return Err(TrackError::InvalidParameter(
                        "method = band needs lower and upper".into(),
                    ))
                }
            },
            Some("auto") => BandSelection::Auto(request),
            Some(other) => {
                return Err(TrackError::InvalidParameter(format!(
                    "unknown restoration method `{other}`"
                )))
            }
        };
        Ok(set)
    }
}

fn parse_element(value: &str) -> std::result::Result<CurveElement, String> {
    let fields: Vec<&str> = value.splitn(9, ',').map(str::trim).collect();
    if fields.len() < 5 {
        return Err(format!(
            "element needs start, end, radius, direction, type; got `{value}`"
        ));
    }
    let num = |s: &str| s.parse::<f64>().map_err(|_| format!("`{s}` is not a number"));
    let opt_num = |i: usize| match fields.get(i) {
        Some(s) if !s.is_empty() => num(s).map(Some),
        _ => Ok(None),
    };
    let direction =
        CurveDirection::parse(fields[3]).ok_or_else(|| format!("unknown direction `{}`", fields[3]))?;
    let curve_type =
        CurveType::parse(fields[4]).ok_or_else(|| format!("unknown curve type `{}`", fields[4]))?;
    let notes = match fields.get(8) {
        Some(s) if !s.is_empty() => serde_json::from_str::<String>(s)
            .map_err(|e| format!("notes must be a quoted string, got `{s}` ({e})"))?,
        _ => String::new(),
    };
    Ok(CurveElement {
        curve_type,
        transition_length: opt_num(5)?,
        cant: opt_num(6)?,
        speed: opt_num(7)?,
        notes,
        ..CurveElement::circular(num(fields[0])?, num(fields[1])?, num(fields[2])?, direction)
    })
}

pub fn read_parameters(path: &Path) -> anyhow::Result<ParameterSet> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let set = ParameterSet::parse_prm(&text)
        .with_context(|| format!("Invalid parameter file {}", path.display()))?;
    info!("Loaded parameters from {}", path.display());
    Ok(set)
}

pub fn write_parameters(path: &Path, set: &ParameterSet) -> anyhow::Result<()> {
    fs::write(path, set.to_prm()).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParameterSet {
        let mut request = WavelengthRequest::new(130.0, TrackClass::HighSpeed, Channel::Alignment);
        request.speed_coefficient = 1.8;
        request.alignment_lower_limit_15m = true;
        let mut curve = CurveElement::circular(120.0, 480.5, 600.0, CurveDirection::Left)
            .with_transition(40.0);
        curve.cant = Some(85.0);
        curve.notes = "R600, bridge #2 \"north\"".to_string();
        ParameterSet {
            band: BandSelection::Auto(request),
            exclusion_window: Some(81),
            plan: PlanLineConfig {
                method: SeedMethod::MovingAverage,
                max_upward_mm: 35.5,
                target_upward_ratio: 0.85,
                ..PlanLineConfig::default()
            },
            curves: CurveSettings {
                chord_length: 20.0,
                elements: vec![
                    curve,
                    CurveElement {
                        curve_type: CurveType::Compound,
                        ..CurveElement::circular(500.0, 560.0, 1200.0, CurveDirection::Right)
                    },
                ],
            },
            smoother: SmootherConfig {
                easing: Easing::Mtt,
                machine: MachineType::Mtt0932,
                apply_machine_correction: true,
                ..SmootherConfig::default()
            },
        }
    }

    #[test]
    fn export_then_import_is_identity() {
        let set = sample();
        assert_eq!(ParameterSet::parse_prm(&set.to_prm()).unwrap(), set);
        let default = ParameterSet::default();
        assert_eq!(ParameterSet::parse_prm(&default.to_prm()).unwrap(), default);
    }

    #[test]
    fn fixed_band_and_comments() {
        let text = "# header\n[restoration]\nmethod = band  # explicit\nlower = 6\nupper = 70\n";
        let set = ParameterSet::parse_prm(text).unwrap();
        assert_eq!(
            set.band,
            BandSelection::Fixed(WavelengthBand { lower: 6.0, upper: 70.0 })
        );
        assert_eq!(set.plan, PlanLineConfig::default());
    }

    #[test]
    fn element_notes_are_kept() {
        let text = "[curve]\nelement = 10, 90, 400, right, circular, , , , \"R400\"  # first\n\
                    element = 100, 150, 800, left, circular, 20\n";
        let set = ParameterSet::parse_prm(text).unwrap();
        assert_eq!(set.curves.elements[0].notes, "R400");
        assert_eq!(set.curves.elements[0].transition_length, None);
        assert_eq!(set.curves.elements[1].notes, "");
        assert_eq!(set.curves.elements[1].transition_length, Some(20.0));

        let prm = set.to_prm();
        assert!(prm.contains("element = 10, 90, 400, right, circular, , , , \"R400\"\n"));
        assert_eq!(ParameterSet::parse_prm(&prm).unwrap(), set);

        let err = ParameterSet::parse_prm("[curve]\nelement = 10, 90, 400, right, circular, , , , R400\n")
            .unwrap_err();
        assert!(matches!(err, TrackError::ParameterSyntax { line: 2, .. }));
    }

    #[test]
    fn hash_inside_notes_is_not_a_comment() {
        assert_eq!(strip_comment(r#"a = "x # y" # z"#), r#"a = "x # y" "#);
        assert_eq!(strip_comment(r#"a = "q\" # y" # z"#), r#"a = "q\" # y" "#);
        assert_eq!(strip_comment("lower = 6 # note"), "lower = 6 ");
    }

    #[test]
    fn syntax_errors_carry_line_numbers() {
        let err = ParameterSet::parse_prm("[planline]\nmaxUpward = lots\n").unwrap_err();
        assert!(matches!(err, TrackError::ParameterSyntax { line: 2, .. }));
        let err = ParameterSet::parse_prm("[planline]\nfoo = 1\n").unwrap_err();
        assert!(matches!(err, TrackError::ParameterSyntax { line: 2, .. }));
        let err = ParameterSet::parse_prm("speed = 1\n").unwrap_err();
        assert!(matches!(err, TrackError::ParameterSyntax { line: 1, .. }));
        let err = ParameterSet::parse_prm("[wheels]\n").unwrap_err();
        assert!(matches!(err, TrackError::ParameterSyntax { line: 1, .. }));
    }

    #[test]
    fn inverted_band_is_rejected() {
        let text = "[restoration]\nmethod = band\nlower = 40\nupper = 6\n";
        assert!(matches!(
            ParameterSet::parse_prm(text),
            Err(TrackError::InvalidBand { .. })
        ));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("section.prm");
        write_parameters(&path, &sample()).unwrap();
        assert_eq!(read_parameters(&path).unwrap(), sample());
    }
}
