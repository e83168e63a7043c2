use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::error::{MonitorError, MonitorResult};

/// Default-rate above which a low or medium segment bin is flagged.
pub const HIGH_DEFAULT_RATE_THRESHOLD: f64 = 0.15;

/// Segments expected to default rarely; only these can raise alerts.
pub const ALERT_SEGMENTS: [&str; 2] = ["low", "medium"];

const DEFAULT_DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

const DEFAULT_DATETIME_FORMATS: [&str; 3] =
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Row 0 decides; disagreement is logged and counted.
    FirstRow,
    /// Disagreement across rows is rejected at load time.
    Strict,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub high_default_threshold: f64,
    pub alert_segments: Vec<String>,
    pub policy_mode: PolicyMode,
    pub date_formats: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            high_default_threshold: HIGH_DEFAULT_RATE_THRESHOLD,
            alert_segments: ALERT_SEGMENTS.iter().map(|s| s.to_string()).collect(),
            policy_mode: PolicyMode::FirstRow,
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MonitorConfig {
    pub fn from_toml_str(raw: &str) -> MonitorResult<Self> {
        let config: MonitorConfig =
            toml::from_str(raw).map_err(|err| MonitorError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: Option<&Path>) -> MonitorResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|err| {
            MonitorError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded monitor config");
        Ok(config)
    }

    fn validate(&self) -> MonitorResult<()> {
        if !(0.0..=1.0).contains(&self.high_default_threshold) {
            return Err(MonitorError::Config(format!(
                "high_default_threshold must lie in [0, 1], got {}",
                self.high_default_threshold
            )));
        }
        if self.date_formats.is_empty() {
            return Err(MonitorError::Config(
                "date_formats must list at least one format".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_alert_segment(&self, segment: &str) -> bool {
        self.alert_segments.iter().any(|s| s == segment)
    }

    /// Parses a calendar date, falling back to date-time forms and keeping
    /// only the date part.
    pub fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        for format in &self.date_formats {
            if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
                return Some(date);
            }
        }
        for format in DEFAULT_DATETIME_FORMATS {
            if let Ok(stamp) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(stamp.date());
            }
        }
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|stamp| stamp.date_naive())
    }
}
