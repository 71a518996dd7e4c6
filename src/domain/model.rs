use chrono::{NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A named SQL template from the query catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDefinition {
    #[serde(default)]
    pub name: String,
    pub sql: String,
}

/// Optional bounds spliced into `{{start_date}}` / `{{end_date}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl DateRange {
    pub fn new(start_date: Option<String>, end_date: Option<String>) -> Self {
        Self {
            start_date,
            end_date,
        }
    }
}

/// Body of `POST /run-etl`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EtlRequest {
    pub query_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl EtlRequest {
    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.start_date.clone(), self.end_date.clone())
    }
}

/// Bearer token from the AMC identity endpoint. Lives for a single extraction.
#[derive(Clone, Deserialize)]
pub struct Credential {
    pub access_token: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl CellValue {
    /// 缺值一律補 0
    pub fn zero() -> Self {
        CellValue::Integer(0)
    }

    pub fn is_zero(&self) -> bool {
        match self {
            CellValue::Integer(n) => *n == 0,
            CellValue::Float(f) => *f == 0.0,
            _ => false,
        }
    }

    pub fn as_timestamp(&self) -> Option<&NaiveDateTime> {
        match self {
            CellValue::Timestamp(ts) => Some(ts),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(n) => write!(f, "{}", n),
            // 保留 ".0"，重新解析時仍是浮點欄位
            CellValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Boolean(b) => write!(f, "{}", b),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Text,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub data: HashMap<String, CellValue>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.data.get(column)
    }
}

/// Rows in source order plus the header-derived column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl NormalizedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a CellValue> + 'a {
        self.rows.iter().filter_map(move |row| row.get(column))
    }

    /// Narrowest kind that can hold every value of `column`.
    ///
    /// Integers next to timestamps are zero-filled gaps, so the column stays a timestamp.
    /// Zeros next to booleans cannot be expressed as either, so that mix widens to text.
    pub fn column_kind(&self, column: &str) -> ColumnKind {
        let (mut text, mut timestamp, mut float, mut boolean, mut integer) =
            (false, false, false, false, false);
        for value in self.column_values(column) {
            match value {
                CellValue::Text(_) => text = true,
                CellValue::Timestamp(_) => timestamp = true,
                CellValue::Float(_) => float = true,
                CellValue::Boolean(_) => boolean = true,
                CellValue::Integer(_) => integer = true,
            }
        }

        if text || self.is_empty() {
            ColumnKind::Text
        } else if timestamp {
            ColumnKind::Timestamp
        } else if float {
            if boolean {
                ColumnKind::Text
            } else {
                ColumnKind::Float
            }
        } else if boolean {
            if integer {
                ColumnKind::Text
            } else {
                ColumnKind::Boolean
            }
        } else {
            ColumnKind::Integer
        }
    }

    /// Writes the table back out as comma-delimited text with a header row.
    pub fn to_csv(&self) -> crate::utils::error::Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(
                self.columns
                    .iter()
                    .map(|column| row.get(column).map(ToString::to_string).unwrap_or_default()),
            )?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| crate::utils::error::EtlError::IoError(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| crate::utils::error::EtlError::ConfigError {
            message: format!("CSV output is not valid UTF-8: {}", e),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub success: bool,
    pub chunks_processed: usize,
    pub rows_loaded: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub status: String,
    /// Row count of the transformed table, not the warehouse-reported `rows_loaded`.
    pub records_processed: usize,
    pub timestamp: String,
    pub query_name: String,
    pub load_details: LoadOutcome,
}

impl PipelineResult {
    pub fn success(query_name: &str, records_processed: usize, load_details: LoadOutcome) -> Self {
        Self {
            status: "success".to_string(),
            records_processed,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            query_name: query_name.to_string(),
            load_details,
        }
    }
}
