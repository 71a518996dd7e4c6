use crate::domain::model::{CellValue, NormalizedTable, Row};
use crate::utils::error::{EtlError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::{HashMap, HashSet};

/// Cell contents read as "no value".
const NULL_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

fn is_null(cell: &str) -> bool {
    NULL_MARKERS.contains(&cell)
}

pub fn is_date_column(name: &str) -> bool {
    name.to_lowercase().contains("date")
}

/// Parses the date and timestamp shapes AMC exports. Offsets are converted to UTC.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    {
        return Some(dt);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "True" | "TRUE" | "true" => Some(true),
        "False" | "FALSE" | "false" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Date,
    Integer,
    Float,
    Boolean,
    Text,
}

fn infer_kind<'a>(column: &str, cells: impl Iterator<Item = &'a str>) -> ValueKind {
    if is_date_column(column) {
        return ValueKind::Date;
    }

    let (mut integer, mut float, mut boolean) = (true, true, true);
    let mut seen = false;
    for cell in cells.filter(|c| !is_null(c)) {
        seen = true;
        integer &= cell.parse::<i64>().is_ok();
        float &= cell.parse::<f64>().is_ok();
        boolean &= parse_bool(cell).is_some();
    }

    match (seen, integer, float, boolean) {
        (false, ..) => ValueKind::Text,
        (true, true, _, _) => ValueKind::Integer,
        (true, _, true, _) => ValueKind::Float,
        (true, _, _, true) => ValueKind::Boolean,
        _ => ValueKind::Text,
    }
}

/// pandas-style names for repeated headers: `a`, `a.1`, `a.2`.
fn dedupe_headers(headers: &csv::StringRecord) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    headers
        .iter()
        .map(|header| {
            let mut name = header.to_string();
            while seen.contains(&name) {
                let count = counts.entry(header.to_string()).or_insert(0);
                *count += 1;
                name = format!("{}.{}", header, count);
            }
            seen.insert(name.clone());
            name
        })
        .collect()
}

/// Turns AMC's delimited text into a [`NormalizedTable`].
///
/// Columns with "date" in the name become timestamps; every empty cell becomes zero,
/// whatever the column holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transformer;

impl Transformer {
    pub fn new() -> Self {
        Self
    }

    pub fn transform(&self, raw_text: &str) -> Result<NormalizedTable> {
        tracing::info!("🔧 Transforming AMC data");

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(raw_text.as_bytes());

        let columns = dedupe_headers(reader.headers()?);
        let records = reader
            .records()
            .collect::<std::result::Result<Vec<_>, csv::Error>>()?;

        let kinds: Vec<ValueKind> = columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                infer_kind(column, records.iter().map(|r| r.get(index).unwrap_or("")))
            })
            .collect();

        let mut rows = Vec::with_capacity(records.len());
        for (row_index, record) in records.iter().enumerate() {
            let mut data = HashMap::with_capacity(columns.len());
            for (index, (column, kind)) in columns.iter().zip(&kinds).enumerate() {
                let cell = record.get(index).unwrap_or("");
                let value = if is_null(cell) || (*kind == ValueKind::Date && is_zero_fill(cell)) {
                    zero_for(*kind)
                } else {
                    convert(column, *kind, cell, row_index + 1)?
                };
                data.insert(column.clone(), value);
            }
            rows.push(Row { data });
        }

        let date_columns = kinds.iter().filter(|k| **k == ValueKind::Date).count();
        tracing::info!(
            "✅ Transform complete: {} rows, {} columns ({} date columns)",
            rows.len(),
            columns.len(),
            date_columns
        );

        Ok(NormalizedTable { columns, rows })
    }
}

/// A date cell written back out after zero fill. Read as absent so a second pass agrees.
fn is_zero_fill(cell: &str) -> bool {
    matches!(cell.trim(), "0" | "0.0")
}

/// Float columns keep a float zero so the column type survives a CSV round trip.
fn zero_for(kind: ValueKind) -> CellValue {
    match kind {
        ValueKind::Float => CellValue::Float(0.0),
        _ => CellValue::zero(),
    }
}

fn convert(column: &str, kind: ValueKind, cell: &str, row: usize) -> Result<CellValue> {
    let value = match kind {
        ValueKind::Date => {
            CellValue::Timestamp(parse_datetime(cell).ok_or_else(|| EtlError::MalformedDate {
                column: column.to_string(),
                row,
                value: cell.to_string(),
            })?)
        }
        ValueKind::Integer => cell
            .parse()
            .map(CellValue::Integer)
            .unwrap_or_else(|_| CellValue::Text(cell.to_string())),
        ValueKind::Float => cell
            .parse()
            .map(CellValue::Float)
            .unwrap_or_else(|_| CellValue::Text(cell.to_string())),
        ValueKind::Boolean => parse_bool(cell)
            .map(CellValue::Boolean)
            .unwrap_or_else(|| CellValue::Text(cell.to_string())),
        ValueKind::Text => CellValue::Text(cell.to_string()),
    };
    Ok(value)
}
