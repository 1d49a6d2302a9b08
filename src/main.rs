use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum, ValueHint};
use log::{info, warn};

use track_restore::data::exchange::{read_curve_elements, read_restrictions, RejectedRow};
use track_restore::data::filter::crop_to_section;
use track_restore::data::loader::{load_series, write_movements_csv, write_series_csv};
use track_restore::data::model::{Channel, TrackDirection, WorkSection};
use track_restore::data::params::{read_parameters, write_parameters, ParameterSet};
use track_restore::pipeline::batch::{run_batch, OutputCache, PipelineJob};
use track_restore::pipeline::wavelength::{select_band, TrackClass, WavelengthRequest};
use track_restore::pipeline::CurveSettings;

#[derive(Parser, Debug)]
#[command(author, version, about = "Track-geometry restoration and movement planning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore measurement files and write plan lines and tamping movements
    Run(RunArgs),
    /// Print the restoration band for a line speed
    Band(BandArgs),
    /// Write a PRM parameter file (defaults, or a normalised copy of --from)
    Params(ParamsArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Measurement series (.parquet, .json, .csv)
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Channel the inputs were recorded on
    #[arg(long, value_parser = parse_channel, default_value = "level")]
    channel: Channel,

    /// PRM parameter file
    #[arg(long, value_hint = ValueHint::FilePath)]
    params: Option<PathBuf>,

    /// Curve elements CSV (replaces curves from the PRM file)
    #[arg(long, value_hint = ValueHint::FilePath)]
    curves: Option<PathBuf>,

    /// Restriction zones CSV
    #[arg(long, value_hint = ValueHint::FilePath)]
    restrictions: Option<PathBuf>,

    /// Work section start position
    #[arg(long, requires = "section_end")]
    section_start: Option<f64>,

    /// Work section end position
    #[arg(long, requires = "section_start")]
    section_end: Option<f64>,

    #[arg(long, value_enum, default_value_t = DirectionOpt::Up)]
    direction: DirectionOpt,

    /// Front taper length (m)
    #[arg(long, default_value_t = 10.0)]
    front: f64,

    /// Rear taper length (m)
    #[arg(long, default_value_t = 10.0)]
    rear: f64,

    /// Crop inputs to the work section before processing
    #[arg(long)]
    crop: bool,

    /// Output directory
    #[arg(short, long, default_value = "out", value_hint = ValueHint::DirPath)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct BandArgs {
    /// Maximum line speed (km/h)
    #[arg(long)]
    speed: f64,

    #[arg(long, value_parser = parse_track_class, default_value = "conventional")]
    class: TrackClass,

    #[arg(long, value_parser = parse_channel, default_value = "level")]
    channel: Channel,

    /// Speed coefficient, 1.5 to 2.0
    #[arg(long, default_value_t = 1.75)]
    coefficient: f64,

    /// High-speed level: use the 3.5-6 m short-wavelength band
    #[arg(long)]
    short_wavelength: bool,

    /// High-speed alignment: raise the lower limit to 15 m
    #[arg(long)]
    alignment_15m: bool,
}

#[derive(Parser, Debug)]
struct ParamsArgs {
    /// Destination PRM file
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Existing PRM file to re-export
    #[arg(long, value_hint = ValueHint::FilePath)]
    from: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum DirectionOpt {
    Up,
    Down,
}

impl From<DirectionOpt> for TrackDirection {
    fn from(d: DirectionOpt) -> Self {
        match d {
            DirectionOpt::Up => TrackDirection::Up,
            DirectionOpt::Down => TrackDirection::Down,
        }
    }
}

fn parse_channel(s: &str) -> std::result::Result<Channel, String> {
    Channel::parse(s).ok_or_else(|| format!("unknown channel `{s}`"))
}

fn parse_track_class(s: &str) -> std::result::Result<TrackClass, String> {
    TrackClass::parse(s).ok_or_else(|| format!("unknown track class `{s}`"))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
        Command::Band(args) => band(args),
        Command::Params(args) => params(args),
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn report_rejected(path: &Path, rejected: &[RejectedRow]) {
    for row in rejected {
        warn!("{}:{}: skipped ({})", path.display(), row.line, row.reason);
    }
}

fn run(args: RunArgs) -> Result<()> {
    let params = match &args.params {
        Some(path) => read_parameters(path)?,
        None => ParameterSet::default(),
    };
    let mut config = params.pipeline_config();

    if let Some(path) = &args.curves {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let report = read_curve_elements(file)
            .with_context(|| format!("Failed to import curves from {}", path.display()))?;
        report_rejected(path, &report.rejected);
        config.curves = Some(CurveSettings {
            chord_length: params.curves.chord_length,
            elements: report.items,
        });
    }
    if let Some(path) = &args.restrictions {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let report = read_restrictions(file)
            .with_context(|| format!("Failed to import restrictions from {}", path.display()))?;
        report_rejected(path, &report.rejected);
        config.restrictions = report.items;
    }
    config.section = match (args.section_start, args.section_end) {
        (Some(start), Some(end)) => Some(WorkSection::new(
            start,
            end,
            args.direction.into(),
            args.front,
            args.rear,
        )?),
        _ => None,
    };

    let mut jobs = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        let mut input = load_series(path, args.channel)?;
        if let (true, Some(section)) = (args.crop, &config.section) {
            input.series = crop_to_section(&input.series, section)?;
        }
        jobs.push(PipelineJob {
            id: path.display().to_string(),
            input,
            config: config.clone(),
        });
    }

    let cache = OutputCache::default();
    let outcomes = run_batch(&jobs, Some(&cache));

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut failed = 0;
    for (path, outcome) in args.inputs.iter().zip(&outcomes) {
        let out = match &outcome.result {
            Ok(out) => out,
            Err(e) => {
                eprintln!("{}: {e}", outcome.id);
                failed += 1;
                continue;
            }
        };
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("series");
        write_series_csv(&args.output.join(format!("{stem}_restored.csv")), &out.restored)?;
        write_series_csv(&args.output.join(format!("{stem}_plan.csv")), &out.plan_line)?;
        write_movements_csv(&args.output.join(format!("{stem}_movements.csv")), &out.movements)?;
        for w in &out.warnings {
            warn!("{}: {w}", outcome.id);
        }
        println!(
            "{}: band {}, upward ratio {:.3} after {} iterations, {} warnings",
            outcome.id,
            out.band,
            out.statistics.upward_ratio,
            out.statistics.iterations,
            out.warnings.len()
        );
    }
    info!("Results written to {}", args.output.display());

    if failed > 0 {
        bail!("{failed} of {} inputs failed", outcomes.len());
    }
    Ok(())
}

fn band(args: BandArgs) -> Result<()> {
    let request = WavelengthRequest {
        speed_coefficient: args.coefficient,
        short_wavelength_mode: args.short_wavelength,
        alignment_lower_limit_15m: args.alignment_15m,
        ..WavelengthRequest::new(args.speed, args.class, args.channel)
    };
    let band = select_band(&request)?;
    println!("{} ({} km/h, {})", band, args.speed, args.class.as_str());
    Ok(())
}

fn params(args: ParamsArgs) -> Result<()> {
    let set = match &args.from {
        Some(path) => read_parameters(path)?,
        None => ParameterSet::default(),
    };
    write_parameters(&args.output, &set)?;
    info!("Wrote {}", args.output.display());
    Ok(())
}
