//! CSV exchange of curve elements and restriction zones.
//!
//! Rows with unparseable numeric columns are rejected one by one and
//! reported; they never abort the whole file.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use log::warn;
use serde::Serialize;

use super::model::{
    CurveDirection, CurveElement, CurveType, Restriction, RestrictionDirection,
    validate_curve_elements,
};

pub const CURVE_COLUMNS: [&str; 8] = [
    "startKm",
    "endKm",
    "radius",
    "direction",
    "transitionLength",
    "cant",
    "speed",
    "notes",
];

pub const RESTRICTION_COLUMNS: [&str; 5] = [
    "startKm",
    "endKm",
    "directionCode",
    "restrictionAmount",
    "notes",
];

/// A data row that was skipped during import.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    /// 1-based line number in the file (header is line 1).
    pub line: usize,
    pub reason: String,
}

/// Items parsed from an exchange file plus rows that failed.
#[derive(Debug, Clone)]
pub struct ImportReport<T> {
    pub items: Vec<T>,
    pub rejected: Vec<RejectedRow>,
}

// ---------------------------------------------------------------------------
// Shared header handling
// ---------------------------------------------------------------------------

struct Columns {
    indices: Vec<Option<usize>>,
}

impl Columns {
    fn locate(headers: &csv::StringRecord, names: &[&str], required: &[&str]) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        for name in required {
            find(*name).with_context(|| format!("CSV missing '{name}' column"))?;
        }
        Ok(Self {
            indices: names.iter().map(|n| find(*n)).collect(),
        })
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, col: usize) -> &'r str {
        self.indices[col]
            .and_then(|i| record.get(i))
            .unwrap_or("")
            .trim()
    }
}

fn required_f64(field: &str, name: &str) -> std::result::Result<f64, String> {
    field
        .parse::<f64>()
        .map_err(|_| format!("{name}: '{field}' is not a number"))
}

fn optional_f64(field: &str, name: &str) -> std::result::Result<Option<f64>, String> {
    if field.is_empty() {
        Ok(None)
    } else {
        required_f64(field, name).map(Some)
    }
}

// ---------------------------------------------------------------------------
// Curve elements
// ---------------------------------------------------------------------------

/// Parse curve elements. Overlapping elements fail the whole import since
/// they cannot be applied partially.
pub fn read_curve_elements<R: Read>(input: R) -> Result<ImportReport<CurveElement>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(input);
    let mut names = CURVE_COLUMNS.to_vec();
    names.push("type");
    let headers = reader.headers().context("reading CSV headers")?.clone();
    let cols = Columns::locate(&headers, &names, &["startKm", "endKm", "radius", "direction"])?;

    let mut items = Vec::new();
    let mut rejected = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let line = i + 2;
        let parsed = result
            .map_err(|e| e.to_string())
            .and_then(|record| parse_curve_row(&cols, &record));
        match parsed {
            Ok(element) => items.push(element),
            Err(reason) => {
                warn!("curve CSV line {line} rejected: {reason}");
                rejected.push(RejectedRow { line, reason });
            }
        }
    }

    let items = validate_curve_elements(&items).context("validating curve elements")?;
    Ok(ImportReport { items, rejected })
}

fn parse_curve_row(cols: &Columns, record: &csv::StringRecord) -> std::result::Result<CurveElement, String> {
    let direction_field = cols.get(record, 3);
    let direction = CurveDirection::parse(direction_field)
        .ok_or_else(|| format!("direction: '{direction_field}' is not left/right"))?;
    let type_field = cols.get(record, 8);
    let curve_type = if type_field.is_empty() {
        CurveType::Circular
    } else {
        CurveType::parse(type_field).ok_or_else(|| format!("type: '{type_field}' is unknown"))?
    };
    Ok(CurveElement {
        start_km: required_f64(cols.get(record, 0), "startKm")?,
        end_km: required_f64(cols.get(record, 1), "endKm")?,
        radius: required_f64(cols.get(record, 2), "radius")?,
        direction,
        curve_type,
        transition_length: optional_f64(cols.get(record, 4), "transitionLength")?,
        cant: optional_f64(cols.get(record, 5), "cant")?,
        speed: optional_f64(cols.get(record, 6), "speed")?,
        notes: cols.get(record, 7).to_string(),
    })
}

#[derive(Serialize)]
struct CurveRow<'a> {
    #[serde(rename = "startKm")]
    start_km: f64,
    #[serde(rename = "endKm")]
    end_km: f64,
    radius: f64,
    direction: &'a str,
    #[serde(rename = "transitionLength")]
    transition_length: Option<f64>,
    cant: Option<f64>,
    speed: Option<f64>,
    notes: &'a str,
    #[serde(rename = "type")]
    curve_type: &'a str,
}

/// Write curve elements with the exchange header plus a trailing `type`.
pub fn write_curve_elements<W: Write>(output: W, elements: &[CurveElement]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(output);
    for e in elements {
        writer
            .serialize(CurveRow {
                start_km: e.start_km,
                end_km: e.end_km,
                radius: e.radius,
                direction: e.direction.as_str(),
                transition_length: e.transition_length,
                cant: e.cant,
                speed: e.speed,
                notes: &e.notes,
                curve_type: e.curve_type.as_str(),
            })
            .context("writing curve row")?;
    }
    writer.flush().context("flushing curve CSV")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Restrictions
// ---------------------------------------------------------------------------

fn direction_from_code(code: &str) -> std::result::Result<RestrictionDirection, String> {
    match code {
        "0" => Ok(RestrictionDirection::Both),
        "1" => Ok(RestrictionDirection::Left),
        "2" => Ok(RestrictionDirection::Right),
        "3" => Ok(RestrictionDirection::Vertical),
        other => Err(format!("directionCode: '{other}' is not 0-3")),
    }
}

fn direction_code(direction: RestrictionDirection) -> u8 {
    match direction {
        RestrictionDirection::Both => 0,
        RestrictionDirection::Left => 1,
        RestrictionDirection::Right => 2,
        RestrictionDirection::Vertical => 3,
    }
}

/// Parse restriction zones; `is_fixed` is inferred from a zero amount.
pub fn read_restrictions<R: Read>(input: R) -> Result<ImportReport<Restriction>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(input);
    let headers = reader.headers().context("reading CSV headers")?.clone();
    let cols = Columns::locate(
        &headers,
        &RESTRICTION_COLUMNS,
        &["startKm", "endKm", "directionCode", "restrictionAmount"],
    )?;

    let mut items = Vec::new();
    let mut rejected = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let line = i + 2;
        let parsed = result
            .map_err(|e| e.to_string())
            .and_then(|record| parse_restriction_row(&cols, &record));
        match parsed {
            Ok(r) => items.push(r),
            Err(reason) => {
                warn!("restriction CSV line {line} rejected: {reason}");
                rejected.push(RejectedRow { line, reason });
            }
        }
    }
    Ok(ImportReport { items, rejected })
}

fn parse_restriction_row(cols: &Columns, record: &csv::StringRecord) -> std::result::Result<Restriction, String> {
    let start = required_f64(cols.get(record, 0), "startKm")?;
    let end = required_f64(cols.get(record, 1), "endKm")?;
    let direction = direction_from_code(cols.get(record, 2))?;
    let amount = required_f64(cols.get(record, 3), "restrictionAmount")?;
    let mut restriction =
        Restriction::new(start, end, direction, amount).map_err(|e| e.to_string())?;
    restriction.notes = cols.get(record, 4).to_string();
    Ok(restriction)
}

#[derive(Serialize)]
struct RestrictionRow<'a> {
    #[serde(rename = "startKm")]
    start_km: f64,
    #[serde(rename = "endKm")]
    end_km: f64,
    #[serde(rename = "directionCode")]
    direction_code: u8,
    #[serde(rename = "restrictionAmount")]
    restriction_amount: f64,
    notes: &'a str,
}

pub fn write_restrictions<W: Write>(output: W, restrictions: &[Restriction]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(output);
    for r in restrictions {
        writer
            .serialize(RestrictionRow {
                start_km: r.start_km,
                end_km: r.end_km,
                direction_code: direction_code(r.direction),
                restriction_amount: if r.is_fixed { 0.0 } else { r.restriction_amount },
                notes: &r.notes,
            })
            .context("writing restriction row")?;
    }
    writer.flush().context("flushing restriction CSV")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_elements() -> Vec<CurveElement> {
        vec![
            CurveElement {
                start_km: 120.5,
                end_km: 480.25,
                radius: 400.0,
                direction: CurveDirection::Right,
                curve_type: CurveType::Circular,
                transition_length: Some(40.0),
                cant: Some(105.0),
                speed: Some(95.0),
                notes: "R400".to_string(),
            },
            CurveElement {
                start_km: 600.0,
                end_km: 650.0,
                radius: 1200.0,
                direction: CurveDirection::Left,
                curve_type: CurveType::Compound,
                transition_length: None,
                cant: None,
                speed: None,
                notes: String::new(),
            },
        ]
    }

    #[test]
    fn curve_elements_round_trip() {
        let mut buf = Vec::new();
        write_curve_elements(&mut buf, &sample_elements()).unwrap();
        let report = read_curve_elements(buf.as_slice()).unwrap();
        assert!(report.rejected.is_empty());
        assert_eq!(report.items.len(), 2);
        for (a, b) in report.items.iter().zip(sample_elements()) {
            assert!((a.start_km - b.start_km).abs() < 0.005);
            assert!((a.end_km - b.end_km).abs() < 0.005);
            assert!((a.radius - b.radius).abs() < 0.005);
            assert_eq!(a.direction, b.direction);
            assert_eq!(a.curve_type, b.curve_type);
            assert_eq!(a.transition_length, b.transition_length);
            assert_eq!(a.cant, b.cant);
            assert_eq!(a.speed, b.speed);
            assert_eq!(a.notes, b.notes);
        }
    }

    #[test]
    fn bad_numeric_row_is_rejected_alone() {
        let csv_text = "startKm,endKm,radius,direction,transitionLength,cant,speed,notes\n\
                        0,100,400,right,,,,ok\n\
                        200,abc,400,left,,,,bad\n\
                        300,400,800,left,20,50,90,ok2\n";
        let report = read_curve_elements(csv_text.as_bytes()).unwrap();
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].line, 3);
    }

    #[test]
    fn overlapping_import_fails() {
        let csv_text = "startKm,endKm,radius,direction,transitionLength,cant,speed,notes\n\
                        0,100,400,right,,,,\n\
                        50,150,400,left,,,,\n";
        assert!(read_curve_elements(csv_text.as_bytes()).is_err());
    }

    #[test]
    fn restrictions_infer_fixed_zones() {
        let csv_text = "startKm,endKm,directionCode,restrictionAmount,notes\n\
                        10,20,0,0,bridge\n\
                        30,40,1,15,platform\n\
                        50,60,9,5,bad code\n";
        let report = read_restrictions(csv_text.as_bytes()).unwrap();
        assert_eq!(report.items.len(), 2);
        assert!(report.items[0].is_fixed);
        assert_eq!(report.items[1].direction, RestrictionDirection::Left);
        assert!(!report.items[1].is_fixed);
        assert_eq!(report.rejected.len(), 1);
    }

    #[test]
    fn restrictions_round_trip() {
        let zones = vec![
            Restriction::new(0.0, 5.0, RestrictionDirection::Right, 12.5).unwrap(),
            Restriction::fixed(8.0, 9.0, RestrictionDirection::Both).unwrap(),
        ];
        let mut buf = Vec::new();
        write_restrictions(&mut buf, &zones).unwrap();
        let report = read_restrictions(buf.as_slice()).unwrap();
        assert_eq!(report.items, zones);
    }
}
