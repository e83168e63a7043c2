use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::{MonitorError, MonitorResult};
use crate::models::{OverrideRecord, SegmentRecord};

pub const SEGMENT_TABLE: &str = "segment";
pub const OVERRIDE_TABLE: &str = "override";

pub const SEGMENT_REQUIRED_COLUMNS: [&str; 5] = [
    "score_bin",
    "risk_segment",
    "default_rate",
    "policy_trigger",
    "low_risk_anomaly",
];

#[derive(Debug, Clone)]
pub struct SegmentTable {
    columns: Vec<String>,
    rows: Vec<SegmentRecord>,
}

impl SegmentTable {
    pub fn from_path(path: &Path) -> MonitorResult<Self> {
        let file = std::fs::File::open(path).map_err(|source| MonitorError::Io {
            table: SEGMENT_TABLE,
            source,
        })?;
        let table = Self::from_reader(file)?;
        tracing::info!(
            path = %path.display(),
            rows = table.rows.len(),
            columns = table.columns.len(),
            "loaded segment summary"
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(input: R) -> MonitorResult<Self> {
        #[derive(Deserialize)]
        struct CsvRow {
            score_bin: String,
            risk_segment: String,
            default_rate: f64,
            policy_trigger: String,
            low_risk_anomaly: String,
            date: Option<String>,
            score: Option<String>,
        }

        let csv_err = |source| MonitorError::Csv {
            table: SEGMENT_TABLE,
            source,
        };

        let mut reader = csv_reader(input, csv::Trim::All);
        let columns = header_names(&mut reader).map_err(csv_err)?;

        for column in SEGMENT_REQUIRED_COLUMNS {
            if !columns.iter().any(|c| c == column) {
                return Err(MonitorError::MissingRequiredColumn {
                    table: SEGMENT_TABLE,
                    column,
                });
            }
        }

        let mut rows = Vec::new();
        for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
            let row = result.map_err(csv_err)?;
            rows.push(SegmentRecord {
                policy_trigger: required_bool(
                    SEGMENT_TABLE,
                    index,
                    "policy_trigger",
                    &row.policy_trigger,
                )?,
                low_risk_anomaly: required_bool(
                    SEGMENT_TABLE,
                    index,
                    "low_risk_anomaly",
                    &row.low_risk_anomaly,
                )?,
                score_bin: row.score_bin,
                risk_segment: row.risk_segment,
                default_rate: row.default_rate,
                date: row.date.filter(|value| !value.is_empty()),
                score: row.score.filter(|value| !is_na_token(value)),
            });
        }

        if rows.is_empty() {
            return Err(MonitorError::EmptyTable {
                table: SEGMENT_TABLE,
            });
        }

        Ok(Self { columns, rows })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[SegmentRecord] {
        &self.rows
    }

    /// Rows whose `policy_trigger` differs from row 0.
    pub fn policy_disagreements(&self) -> usize {
        match self.rows.first() {
            Some(first) => self
                .rows
                .iter()
                .filter(|row| row.policy_trigger != first.policy_trigger)
                .count(),
            None => 0,
        }
    }
}

/// Override simulation output. Columns beyond `risk_segment` and `approved`
/// are kept as text so the table can be shown verbatim.
#[derive(Debug, Clone)]
pub struct OverrideTable {
    columns: Vec<String>,
    raw_rows: Vec<Vec<String>>,
    records: Vec<OverrideRecord>,
}

impl OverrideTable {
    pub fn from_path(path: &Path) -> MonitorResult<Self> {
        let file = std::fs::File::open(path).map_err(|source| MonitorError::Io {
            table: OVERRIDE_TABLE,
            source,
        })?;
        let table = Self::from_reader(file)?;
        tracing::info!(
            path = %path.display(),
            rows = table.records.len(),
            columns = table.columns.len(),
            "loaded override simulation"
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(input: R) -> MonitorResult<Self> {
        let csv_err = |source| MonitorError::Csv {
            table: OVERRIDE_TABLE,
            source,
        };

        // Cells stay untrimmed so the passthrough view is verbatim.
        let mut reader = csv_reader(input, csv::Trim::Headers);
        let columns = header_names(&mut reader).map_err(csv_err)?;
        let segment_idx = columns.iter().position(|c| c == "risk_segment");
        let approved_idx = columns.iter().position(|c| c == "approved");

        let mut raw_rows = Vec::new();
        let mut records = Vec::new();

        for (index, result) in reader.records().enumerate() {
            let record = result.map_err(csv_err)?;

            let approved = match non_empty_field(&record, approved_idx) {
                Some(value) => Some(parse_bool(value).ok_or_else(|| {
                    MonitorError::InvalidBoolean {
                        table: OVERRIDE_TABLE,
                        row: index,
                        column: "approved",
                        value: value.to_string(),
                    }
                })?),
                None => None,
            };

            records.push(OverrideRecord {
                risk_segment: non_empty_field(&record, segment_idx).map(str::to_string),
                approved,
            });
            raw_rows.push(record.iter().map(str::to_string).collect());
        }

        if records.is_empty() {
            return Err(MonitorError::EmptyTable {
                table: OVERRIDE_TABLE,
            });
        }

        Ok(Self {
            columns,
            raw_rows,
            records,
        })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn raw_rows(&self) -> &[Vec<String>] {
        &self.raw_rows
    }

    pub fn records(&self) -> &[OverrideRecord] {
        &self.records
    }
}

fn non_empty_field(record: &csv::StringRecord, idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn csv_reader<R: Read>(input: R, trim: csv::Trim) -> csv::Reader<R> {
    csv::ReaderBuilder::new().trim(trim).from_reader(input)
}

/// Missing-value spellings pandas' `read_csv` turns into NaN by default.
const NA_TOKENS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub fn is_na_token(raw: &str) -> bool {
    NA_TOKENS.contains(&raw.trim())
}

fn header_names<R: Read>(reader: &mut csv::Reader<R>) -> Result<Vec<String>, csv::Error> {
    Ok(reader.headers()?.iter().map(str::to_string).collect())
}

/// Accepts `true`/`false` in any case (pandas writes `True`/`False`) and `1`/`0`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "1.0" => Some(true),
        "false" | "0" | "0.0" => Some(false),
        _ => None,
    }
}

fn required_bool(
    table: &'static str,
    row: usize,
    column: &'static str,
    raw: &str,
) -> MonitorResult<bool> {
    parse_bool(raw).ok_or_else(|| MonitorError::InvalidBoolean {
        table,
        row,
        column,
        value: raw.to_string(),
    })
}
