use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, Float32Array, Float64Array, Int64Array};
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::model::{Channel, ChannelSeries, MovementRecord, Sample, Series};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a measurement series from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – Parquet file with `position` and `value` float columns
/// * `.json`    – `[{ "position": .., "value": .. }, ...]` or
///   `{ "channel": "level", "samples": [...] }`
/// * `.csv`     – header row with `position` and `value` columns
///
/// `channel` tags the result; a JSON file carrying its own channel wins.
pub fn load_series(path: &Path, channel: Channel) -> Result<ChannelSeries> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let (samples, channel) = match ext.as_str() {
        "parquet" | "pq" => (load_parquet(path)?, channel),
        "json" => load_json(path, channel)?,
        "csv" => (load_csv(path)?, channel),
        other => bail!("Unsupported file extension: .{other}"),
    };

    let series = Series::new(samples)
        .with_context(|| format!("validating samples from {}", path.display()))?;
    info!(
        "loaded {} {} samples from {} (interval {:?} m)",
        series.len(),
        channel,
        path.display(),
        series.interval()
    );
    Ok(ChannelSeries { channel, series })
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema, either a bare sample array:
///
/// ```json
/// [ { "position": 0.0, "value": 1.2 }, { "position": 0.25, "value": 1.4 } ]
/// ```
///
/// or a tagged object `{ "channel": "alignment", "samples": [ ... ] }`.
fn load_json(path: &Path, fallback: Channel) -> Result<(Vec<Sample>, Channel)> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let (records, channel) = match &root {
        JsonValue::Array(arr) => (arr, fallback),
        JsonValue::Object(obj) => {
            let channel = match obj.get("channel").and_then(|c| c.as_str()) {
                Some(name) => Channel::parse(name)
                    .with_context(|| format!("Unknown channel '{name}'"))?,
                None => fallback,
            };
            let arr = obj
                .get("samples")
                .and_then(|s| s.as_array())
                .context("Expected 'samples' array")?;
            (arr, channel)
        }
        _ => bail!("Expected top-level JSON array or object"),
    };

    let samples = records
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            let obj = rec
                .as_object()
                .with_context(|| format!("Row {i} is not a JSON object"))?;
            let position = json_f64(obj.get("position"), i, "position")?;
            let value = json_f64(obj.get("value"), i, "value")?;
            Ok(Sample::new(position, value))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((samples, channel))
}

fn json_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<f64> {
    val.and_then(|v| v.as_f64())
        .with_context(|| format!("Row {row}: missing or invalid '{col}'"))
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with `position` and `value` columns (any order,
/// extra columns ignored).
fn load_csv(path: &Path) -> Result<Vec<Sample>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let pos_idx = headers
        .iter()
        .position(|h| h == "position")
        .context("CSV missing 'position' column")?;
    let val_idx = headers
        .iter()
        .position(|h| h == "value")
        .context("CSV missing 'value' column")?;

    let mut samples = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let position = parse_field(record.get(pos_idx), row_no, "position")?;
        let value = parse_field(record.get(val_idx), row_no, "value")?;
        samples.push(Sample::new(position, value));
    }
    debug!("parsed {} CSV rows", samples.len());
    Ok(samples)
}

fn parse_field(field: Option<&str>, row: usize, col: &str) -> Result<f64> {
    let tok = field.unwrap_or("").trim();
    tok.parse::<f64>()
        .with_context(|| format!("Row {row}, {col}: '{tok}' is not a number"))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with `position` and `value` columns (Float64,
/// Float32 or Int64). Null values are rejected.
fn load_parquet(path: &Path) -> Result<Vec<Sample>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut samples = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let pos_idx = schema
            .index_of("position")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'position' column"))?;
        let val_idx = schema
            .index_of("value")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'value' column"))?;

        let positions = extract_f64_column(batch.column(pos_idx)).context("reading 'position'")?;
        let values = extract_f64_column(batch.column(val_idx)).context("reading 'value'")?;

        samples.extend(
            positions
                .into_iter()
                .zip(values)
                .map(|(p, v)| Sample::new(p, v)),
        );
    }

    Ok(samples)
}

// -- Parquet / Arrow helpers --

/// Extract a numeric column as `Vec<f64>`.
fn extract_f64_column(col: &Arc<dyn Array>) -> Result<Vec<f64>> {
    if col.null_count() > 0 {
        bail!("column contains {} null values", col.null_count());
    }
    if let Some(arr) = col.as_any().downcast_ref::<Float64Array>() {
        Ok(arr.values().iter().copied().collect())
    } else if let Some(arr) = col.as_any().downcast_ref::<Float32Array>() {
        Ok(arr.values().iter().map(|&v| v as f64).collect())
    } else if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
        Ok(arr.values().iter().map(|&v| v as f64).collect())
    } else {
        bail!("Expected a numeric column, got {:?}", col.data_type())
    }
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Write a series as `position,value` CSV.
pub fn write_series_csv(path: &Path, series: &Series) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    for sample in series.samples() {
        writer.serialize(sample).context("writing sample")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct MovementRow {
    position: f64,
    lateral: Option<f64>,
    vertical: Option<f64>,
    connection: String,
    factor: Option<f64>,
    clamped: bool,
}

/// Write movement records as CSV for export collaborators.
pub fn write_movements_csv(path: &Path, records: &[MovementRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    for r in records {
        let row = MovementRow {
            position: r.position,
            lateral: r.lateral_movement,
            vertical: r.vertical_movement,
            connection: format!("{:?}", r.connection_type).to_ascii_lowercase(),
            factor: r.connection_factor,
            clamped: r.clamped,
        };
        writer.serialize(&row).context("writing movement row")?;
    }
    writer.flush().context("flushing CSV")?;
    info!("wrote {} movement records to {}", records.len(), path.display());
    Ok(())
}
