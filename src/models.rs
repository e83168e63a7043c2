use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    pub score_bin: String,
    pub risk_segment: String,
    pub default_rate: f64,
    pub policy_trigger: bool,
    pub low_risk_anomaly: bool,
    pub date: Option<String>,
    /// Raw cell text; only the score trend interprets it.
    pub score: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverrideRecord {
    pub risk_segment: Option<String>,
    pub approved: Option<bool>,
}

/// `{score_bin, risk_segment, default_rate}` projection shared by the
/// default-rate series, anomaly table and alert table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRow {
    pub score_bin: String,
    pub risk_segment: String,
    pub default_rate: f64,
}

impl From<&SegmentRecord> for SegmentRow {
    fn from(record: &SegmentRecord) -> Self {
        Self {
            score_bin: record.score_bin.clone(),
            risk_segment: record.risk_segment.clone(),
            default_rate: record.default_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSeries {
    pub risk_segment: String,
    pub points: Vec<SegmentRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefaultRateSeries {
    pub points: Vec<SegmentRow>,
    pub series: Vec<SegmentSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyStatus {
    pub triggered: bool,
    pub disagreeing_rows: usize,
}

impl PolicyStatus {
    pub fn is_consistent(&self) -> bool {
        self.disagreeing_rows == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRow {
    pub date: Option<NaiveDate>,
    pub score: Option<f64>,
    pub risk_segment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub avg_score: f64,
    pub observations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub risk_segment: String,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreTrend {
    pub available_segments: Vec<String>,
    pub selected_segments: Vec<String>,
    pub rows: Vec<TrendRow>,
    pub series: Vec<TrendSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideVolume {
    pub risk_segment: String,
    pub override_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalRate {
    pub risk_segment: String,
    pub approval_rate: f64,
    pub decisions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideSimulation {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Reason a conditional view could not be derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Unavailable {
    MissingColumn { table: String, column: String },
    UnparseableDate { row: usize, value: String },
    UnparseableScore { row: usize, value: String },
    EmptyTable { table: String },
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unavailable::MissingColumn { table, column } => {
                write!(f, "missing column `{column}` in {table} table")
            }
            Unavailable::UnparseableDate { row, value } => {
                write!(f, "unparseable date {value:?} in segment row {row}")
            }
            Unavailable::UnparseableScore { row, value } => {
                write!(f, "unparseable score {value:?} in segment row {row}")
            }
            Unavailable::EmptyTable { table } => write!(f, "{table} table has no rows"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Availability<T> {
    Available(T),
    Unavailable(Unavailable),
}

impl<T> Availability<T> {
    pub fn missing_column(table: &str, column: &str) -> Self {
        Availability::Unavailable(Unavailable::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Availability<U> {
        match self {
            Availability::Available(value) => Availability::Available(f(value)),
            Availability::Unavailable(reason) => Availability::Unavailable(reason),
        }
    }

    pub fn as_available(&self) -> Option<&T> {
        match self {
            Availability::Available(value) => Some(value),
            Availability::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardViews {
    pub default_rate_series: DefaultRateSeries,
    pub policy_status: Availability<PolicyStatus>,
    pub anomalies: Vec<SegmentRow>,
    pub score_trend: Availability<ScoreTrend>,
    pub override_volume: Availability<Vec<OverrideVolume>>,
    pub approval_rates: Availability<Vec<ApprovalRate>>,
    pub high_default_alerts: Vec<SegmentRow>,
    pub override_simulation: OverrideSimulation,
}
