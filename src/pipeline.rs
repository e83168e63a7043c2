use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::config::MonitorConfig;
use crate::models::{
    ApprovalRate, Availability, DashboardViews, DefaultRateSeries, OverrideSimulation,
    OverrideVolume, PolicyStatus, ScoreTrend, SegmentRow, SegmentSeries, TrendPoint, TrendRow,
    TrendSeries, Unavailable,
};
use crate::session::SessionContext;
use crate::table::{OverrideTable, SegmentTable, OVERRIDE_TABLE, SEGMENT_TABLE};

/// Segments the caller wants in the score trend.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SegmentSelection {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl SegmentSelection {
    /// Exactly the named segments. An empty list selects nothing; use
    /// `SegmentSelection::All` for the unfiltered trend.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SegmentSelection::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, segment: &str) -> bool {
        match self {
            SegmentSelection::All => true,
            SegmentSelection::Only(names) => names.contains(segment),
        }
    }
}

pub fn derive_views(
    session: &SessionContext,
    selection: &SegmentSelection,
    config: &MonitorConfig,
) -> DashboardViews {
    let segments = &session.segments;
    let overrides = &session.overrides;

    let views = DashboardViews {
        default_rate_series: default_rate_series(segments),
        policy_status: policy_status(segments),
        anomalies: anomalies(segments),
        score_trend: score_trend(segments, selection, config),
        override_volume: override_volume(overrides),
        approval_rates: approval_rates(overrides),
        high_default_alerts: high_default_alerts(segments, config),
        override_simulation: override_simulation(overrides),
    };

    tracing::info!(
        session_id = %session.id,
        anomalies = views.anomalies.len(),
        alerts = views.high_default_alerts.len(),
        trend = views.score_trend.is_available(),
        override_volume = views.override_volume.is_available(),
        approval_rates = views.approval_rates.is_available(),
        "derived dashboard views"
    );
    views
}

/// One point per segment row, plus the same points split into per-segment
/// lines. Segments appear in first-seen order.
pub fn default_rate_series(segments: &SegmentTable) -> DefaultRateSeries {
    let points: Vec<SegmentRow> = segments.rows().iter().map(SegmentRow::from).collect();

    let mut series: Vec<SegmentSeries> = Vec::new();
    for point in &points {
        match series
            .iter_mut()
            .find(|s| s.risk_segment == point.risk_segment)
        {
            Some(existing) => existing.points.push(point.clone()),
            None => series.push(SegmentSeries {
                risk_segment: point.risk_segment.clone(),
                points: vec![point.clone()],
            }),
        }
    }

    DefaultRateSeries { points, series }
}

/// Row 0 decides the policy status; rows that disagree are only counted.
pub fn policy_status(segments: &SegmentTable) -> Availability<PolicyStatus> {
    match segments.rows().first() {
        Some(first) => Availability::Available(PolicyStatus {
            triggered: first.policy_trigger,
            disagreeing_rows: segments.policy_disagreements(),
        }),
        None => Availability::Unavailable(Unavailable::EmptyTable {
            table: SEGMENT_TABLE.to_string(),
        }),
    }
}

pub fn anomalies(segments: &SegmentTable) -> Vec<SegmentRow> {
    segments
        .rows()
        .iter()
        .filter(|row| row.low_risk_anomaly)
        .map(SegmentRow::from)
        .collect()
}

/// Distinct segment values in first-seen order; the candidate set for a
/// trend selection.
pub fn trend_segments(segments: &SegmentTable) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for row in segments.rows() {
        if !seen.contains(&row.risk_segment) {
            seen.push(row.risk_segment.clone());
        }
    }
    seen
}

pub fn score_trend(
    segments: &SegmentTable,
    selection: &SegmentSelection,
    config: &MonitorConfig,
) -> Availability<ScoreTrend> {
    if !segments.has_column("date") {
        return Availability::missing_column(SEGMENT_TABLE, "date");
    }
    if !segments.has_column("score") {
        return Availability::missing_column(SEGMENT_TABLE, "score");
    }

    // Every row is parsed before filtering so a bad value in an unselected
    // segment still makes the trend unavailable.
    let mut parsed: Vec<(Option<NaiveDate>, Option<f64>)> = Vec::new();
    for (index, row) in segments.rows().iter().enumerate() {
        let date = match row.date.as_deref() {
            None => None,
            Some(raw) => match config.parse_date(raw) {
                Some(date) => Some(date),
                None => {
                    tracing::warn!(row = index, value = raw, "unparseable date in segment table");
                    return Availability::Unavailable(Unavailable::UnparseableDate {
                        row: index,
                        value: raw.to_string(),
                    });
                }
            },
        };
        let score = match row.score.as_deref() {
            None => None,
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(score) => Some(score).filter(|s| s.is_finite()),
                Err(_) => {
                    tracing::warn!(row = index, value = raw, "unparseable score in segment table");
                    return Availability::Unavailable(Unavailable::UnparseableScore {
                        row: index,
                        value: raw.to_string(),
                    });
                }
            },
        };
        parsed.push((date, score));
    }

    let available_segments = trend_segments(segments);
    let selected_segments: Vec<String> = available_segments
        .iter()
        .filter(|segment| selection.contains(segment))
        .cloned()
        .collect();

    let rows: Vec<TrendRow> = segments
        .rows()
        .iter()
        .zip(parsed)
        .filter(|(record, _)| selection.contains(&record.risk_segment))
        .map(|(record, (date, score))| TrendRow {
            date,
            score,
            risk_segment: record.risk_segment.clone(),
        })
        .collect();

    // Undated or unscored rows stay in `rows` but cannot be plotted.
    let mut grouped: Vec<(String, BTreeMap<NaiveDate, (f64, usize)>)> = Vec::new();
    for row in &rows {
        let (Some(date), Some(score)) = (row.date, row.score) else {
            continue;
        };
        let idx = match grouped.iter().position(|(segment, _)| *segment == row.risk_segment) {
            Some(idx) => idx,
            None => {
                grouped.push((row.risk_segment.clone(), BTreeMap::new()));
                grouped.len() - 1
            }
        };
        let entry = grouped[idx].1.entry(date).or_insert((0.0, 0));
        entry.0 += score;
        entry.1 += 1;
    }

    let series = grouped
        .into_iter()
        .map(|(risk_segment, by_date)| TrendSeries {
            risk_segment,
            points: by_date
                .into_iter()
                .map(|(date, (total, observations))| TrendPoint {
                    date,
                    avg_score: total / observations as f64,
                    observations,
                })
                .collect(),
        })
        .collect();

    Availability::Available(ScoreTrend {
        available_segments,
        selected_segments,
        rows,
        series,
    })
}

/// Override counts per segment, largest first; ties keep first-seen order.
pub fn override_volume(overrides: &OverrideTable) -> Availability<Vec<OverrideVolume>> {
    if !overrides.has_column("risk_segment") {
        return Availability::missing_column(OVERRIDE_TABLE, "risk_segment");
    }

    let mut counts: Vec<OverrideVolume> = Vec::new();
    for segment in overrides
        .records()
        .iter()
        .filter_map(|record| record.risk_segment.as_deref())
    {
        match counts.iter_mut().find(|c| c.risk_segment == segment) {
            Some(existing) => existing.override_count += 1,
            None => counts.push(OverrideVolume {
                risk_segment: segment.to_string(),
                override_count: 1,
            }),
        }
    }

    counts.sort_by(|a, b| b.override_count.cmp(&a.override_count));
    Availability::Available(counts)
}

/// Mean of `approved` per segment, ordered by segment name.
pub fn approval_rates(overrides: &OverrideTable) -> Availability<Vec<ApprovalRate>> {
    if !overrides.has_column("approved") {
        return Availability::missing_column(OVERRIDE_TABLE, "approved");
    }
    if !overrides.has_column("risk_segment") {
        return Availability::missing_column(OVERRIDE_TABLE, "risk_segment");
    }

    let mut totals: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for record in overrides.records() {
        let (Some(segment), Some(approved)) = (record.risk_segment.as_deref(), record.approved)
        else {
            continue;
        };
        let entry = totals.entry(segment).or_insert((0, 0));
        if approved {
            entry.0 += 1;
        }
        entry.1 += 1;
    }

    let rates = totals
        .into_iter()
        .map(|(segment, (approved, decisions))| ApprovalRate {
            risk_segment: segment.to_string(),
            approval_rate: approved as f64 / decisions as f64,
            decisions,
        })
        .collect();
    Availability::Available(rates)
}

/// Bins in an alert segment whose default rate is strictly above the
/// configured threshold. Segment matching is exact and case-sensitive.
pub fn high_default_alerts(segments: &SegmentTable, config: &MonitorConfig) -> Vec<SegmentRow> {
    segments
        .rows()
        .iter()
        .filter(|row| {
            row.default_rate > config.high_default_threshold
                && config.is_alert_segment(&row.risk_segment)
        })
        .map(SegmentRow::from)
        .collect()
}

pub fn override_simulation(overrides: &OverrideTable) -> OverrideSimulation {
    OverrideSimulation {
        columns: overrides.columns().to_vec(),
        rows: overrides.raw_rows().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "score_bin,risk_segment,default_rate,policy_trigger,low_risk_anomaly";

    fn segments(body: &str) -> SegmentTable {
        let csv = format!("{HEADER}\n{body}");
        SegmentTable::from_reader(csv.as_bytes()).unwrap()
    }

    fn dated_segments(body: &str) -> SegmentTable {
        let csv = format!("{HEADER},date,score\n{body}");
        SegmentTable::from_reader(csv.as_bytes()).unwrap()
    }

    fn overrides(csv: &str) -> OverrideTable {
        OverrideTable::from_reader(csv.as_bytes()).unwrap()
    }

    fn worked_example() -> SegmentTable {
        segments("1,low,0.20,true,true\n2,high,0.30,true,false\n")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn worked_example_segment_views() {
        let table = worked_example();
        let config = MonitorConfig::default();

        let anomalies = anomalies(&table);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].score_bin, "1");
        assert_eq!(anomalies[0].risk_segment, "low");

        let alerts = high_default_alerts(&table, &config);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].score_bin, "1");
        assert!((alerts[0].default_rate - 0.20).abs() < 1e-9);

        let status = policy_status(&table);
        let status = status.as_available().unwrap();
        assert!(status.triggered);
        assert!(status.is_consistent());
    }

    #[test]
    fn worked_example_override_views() {
        let table = overrides("risk_segment,approved\nlow,True\nlow,False\nhigh,True\n");

        let volume = override_volume(&table);
        let volume = volume.as_available().unwrap();
        assert_eq!(
            volume,
            &vec![
                OverrideVolume {
                    risk_segment: "low".to_string(),
                    override_count: 2
                },
                OverrideVolume {
                    risk_segment: "high".to_string(),
                    override_count: 1
                },
            ]
        );

        let rates = approval_rates(&table);
        let rates = rates.as_available().unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].risk_segment, "high");
        assert!((rates[0].approval_rate - 1.0).abs() < 1e-9);
        assert_eq!(rates[1].risk_segment, "low");
        assert!((rates[1].approval_rate - 0.5).abs() < 1e-9);
        assert_eq!(rates[1].decisions, 2);
    }

    #[test]
    fn policy_status_uses_first_row_only() {
        let table = segments("1,low,0.1,false,false\n2,low,0.1,true,false\n3,low,0.1,true,false\n");
        let status = policy_status(&table);
        let status = status.as_available().unwrap();
        assert!(!status.triggered);
        assert_eq!(status.disagreeing_rows, 2);
        assert!(!status.is_consistent());
    }

    #[test]
    fn anomalies_preserve_order_and_can_be_empty() {
        let table = segments(
            "3,medium,0.05,true,true\n1,low,0.02,true,false\n2,low,0.04,true,true\n",
        );
        let bins: Vec<_> = anomalies(&table).into_iter().map(|r| r.score_bin).collect();
        assert_eq!(bins, vec!["3", "2"]);

        let quiet = segments("1,low,0.02,false,false\n");
        assert!(anomalies(&quiet).is_empty());
    }

    #[test]
    fn high_segment_never_alerts() {
        let table = segments(
            "1,low,0.15,true,false\n2,medium,0.10,true,false\n3,high,0.90,true,false\n4,Low,0.5,true,false\n",
        );
        assert!(high_default_alerts(&table, &MonitorConfig::default()).is_empty());
    }

    #[test]
    fn default_rate_series_groups_by_segment_in_row_order() {
        let table = segments(
            "1,low,0.01,true,false\n1,high,0.20,true,false\n2,low,0.03,true,false\n",
        );
        let series = default_rate_series(&table);
        assert_eq!(series.points.len(), 3);
        assert_eq!(series.points[1].risk_segment, "high");
        assert_eq!(series.series.len(), 2);
        assert_eq!(series.series[0].risk_segment, "low");
        let low_bins: Vec<_> = series.series[0]
            .points
            .iter()
            .map(|p| p.score_bin.as_str())
            .collect();
        assert_eq!(low_bins, vec!["1", "2"]);
    }

    #[test]
    fn trend_unavailable_without_date_column() {
        let table = worked_example();
        let trend = score_trend(&table, &SegmentSelection::All, &MonitorConfig::default());
        assert_eq!(
            trend,
            Availability::Unavailable(Unavailable::MissingColumn {
                table: "segment".to_string(),
                column: "date".to_string(),
            })
        );
    }

    #[test]
    fn trend_filters_by_selection_and_averages_per_day() {
        let table = dated_segments(
            "1,low,0.1,true,false,2024-01-02,600\n\
             2,low,0.1,true,false,2024-01-01,620\n\
             3,low,0.1,true,false,2024-01-02,640\n\
             1,high,0.3,true,false,2024-01-01,500\n",
        );
        let config = MonitorConfig::default();

        let all = score_trend(&table, &SegmentSelection::All, &config);
        let all = all.as_available().unwrap();
        assert_eq!(all.available_segments, vec!["low", "high"]);
        assert_eq!(all.rows.len(), 4);
        assert_eq!(all.series.len(), 2);

        let low = &all.series[0];
        assert_eq!(low.risk_segment, "low");
        assert_eq!(low.points.len(), 2);
        assert_eq!(low.points[0].date, date(2024, 1, 1));
        assert_eq!(low.points[1].date, date(2024, 1, 2));
        assert!((low.points[1].avg_score - 620.0).abs() < 1e-9);
        assert_eq!(low.points[1].observations, 2);

        let only_high = score_trend(&table, &SegmentSelection::from_names(["high"]), &config);
        let only_high = only_high.as_available().unwrap();
        assert_eq!(only_high.available_segments, vec!["low", "high"]);
        assert_eq!(only_high.selected_segments, vec!["high"]);
        assert_eq!(only_high.rows.len(), 1);
        assert_eq!(only_high.rows[0].risk_segment, "high");
        assert_eq!(only_high.rows[0].date, Some(date(2024, 1, 1)));

        let none = score_trend(
            &table,
            &SegmentSelection::from_names(Vec::<String>::new()),
            &config,
        );
        let none = none.as_available().unwrap();
        assert!(none.selected_segments.is_empty());
        assert!(none.rows.is_empty());
        assert!(none.series.is_empty());
    }

    #[test]
    fn trend_keeps_undated_rows_out_of_series_only() {
        let table = dated_segments(
            "1,low,0.1,true,false,2024-01-01,600\n2,low,0.1,true,false,,610\n",
        );
        let trend = score_trend(&table, &SegmentSelection::All, &MonitorConfig::default());
        let trend = trend.as_available().unwrap();
        assert_eq!(trend.rows.len(), 2);
        assert_eq!(trend.rows[1].date, None);
        assert_eq!(trend.rows[1].score, Some(610.0));
        assert_eq!(trend.series.len(), 1);
        assert_eq!(trend.series[0].points.len(), 1);
        assert_eq!(trend.series[0].points[0].observations, 1);
    }

    #[test]
    fn na_scores_are_missing_and_bad_scores_only_disable_trend() {
        let config = MonitorConfig::default();
        let with_na = dated_segments(
            "1,low,0.2,true,true,2024-01-01,NA\n2,low,0.1,true,false,2024-01-01,600\n",
        );
        let trend = score_trend(&with_na, &SegmentSelection::All, &config);
        let trend = trend.as_available().unwrap();
        assert_eq!(trend.rows[0].score, None);
        assert!((trend.series[0].points[0].avg_score - 600.0).abs() < 1e-9);

        let bad = dated_segments(
            "1,low,0.2,true,true,2024-01-01,600\n2,medium,0.3,true,false,2024-01-02,high\n",
        );
        assert_eq!(
            score_trend(&bad, &SegmentSelection::All, &config),
            Availability::Unavailable(Unavailable::UnparseableScore {
                row: 1,
                value: "high".to_string(),
            })
        );
        assert_eq!(anomalies(&bad).len(), 1);
        assert_eq!(high_default_alerts(&bad, &config).len(), 2);
    }

    #[test]
    fn unparseable_date_only_disables_trend() {
        let table = dated_segments(
            "1,low,0.2,true,true,2024-01-01,600\n2,low,0.1,true,false,someday,610\n",
        );
        let config = MonitorConfig::default();
        let trend = score_trend(&table, &SegmentSelection::All, &config);
        assert_eq!(
            trend,
            Availability::Unavailable(Unavailable::UnparseableDate {
                row: 1,
                value: "someday".to_string(),
            })
        );
        assert_eq!(anomalies(&table).len(), 1);
        assert_eq!(high_default_alerts(&table, &config).len(), 1);
    }

    #[test]
    fn override_volume_unavailable_without_segment_column() {
        let table = overrides("applicant_id,approved\na-1,true\n");
        assert_eq!(
            override_volume(&table),
            Availability::missing_column("override", "risk_segment")
        );
    }

    #[test]
    fn override_volume_sums_to_row_count_and_breaks_ties_by_first_seen() {
        let table = overrides("risk_segment\nmedium\nlow\nlow\nmedium\nhigh\n");
        let volume = override_volume(&table);
        let volume = volume.as_available().unwrap();
        let order: Vec<_> = volume.iter().map(|v| v.risk_segment.as_str()).collect();
        assert_eq!(order, vec!["medium", "low", "high"]);
        let total: usize = volume.iter().map(|v| v.override_count).sum();
        assert_eq!(total, table.records().len());
    }

    #[test]
    fn approval_rates_unavailable_without_approved_column() {
        let table = overrides("risk_segment\nlow\n");
        assert_eq!(
            approval_rates(&table),
            Availability::missing_column("override", "approved")
        );
    }

    #[test]
    fn approval_rates_skip_blank_decisions_and_stay_in_unit_range() {
        let table = overrides("risk_segment,approved\nlow,1\nlow,\nlow,0\nmedium,0\n");
        let rates = approval_rates(&table);
        let rates = rates.as_available().unwrap();
        for rate in rates {
            assert!((0.0..=1.0).contains(&rate.approval_rate));
        }
        assert_eq!(rates[0].risk_segment, "low");
        assert_eq!(rates[0].decisions, 2);
        assert!((rates[0].approval_rate - 0.5).abs() < 1e-9);
        assert_eq!(rates[1].approval_rate, 0.0);
    }

    #[test]
    fn override_simulation_is_verbatim() {
        let table = overrides("id,risk_segment\n7,low\n");
        let sim = override_simulation(&table);
        assert_eq!(sim.columns, vec!["id", "risk_segment"]);
        assert_eq!(sim.rows, vec![vec!["7".to_string(), "low".to_string()]]);
    }

    #[test]
    fn derive_views_collects_every_view() {
        let session = SessionContext::new(
            worked_example(),
            overrides("risk_segment,approved\nlow,true\n"),
            &MonitorConfig::default(),
        )
        .unwrap();
        let views = derive_views(&session, &SegmentSelection::All, &MonitorConfig::default());
        assert_eq!(views.default_rate_series.points.len(), 2);
        assert!(views.policy_status.is_available());
        assert!(!views.score_trend.is_available());
        assert!(views.override_volume.is_available());
        assert!(views.approval_rates.is_available());
        assert_eq!(views.high_default_alerts.len(), 1);
        assert_eq!(views.override_simulation.rows.len(), 1);
    }
}
