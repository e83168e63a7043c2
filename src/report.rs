use std::fmt::Write;

use crate::models::{Availability, DashboardViews, SegmentRow};
use crate::session::SessionContext;

pub fn render_json(views: &DashboardViews) -> serde_json::Result<String> {
    serde_json::to_string_pretty(views)
}

fn write_segment_rows(output: &mut String, rows: &[SegmentRow]) {
    let _ = writeln!(output, "| score_bin | risk_segment | default_rate |");
    let _ = writeln!(output, "|---|---|---|");
    for row in rows {
        let _ = writeln!(
            output,
            "| {} | {} | {:.4} |",
            row.score_bin, row.risk_segment, row.default_rate
        );
    }
}

pub fn build_report(session: &SessionContext, views: &DashboardViews) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# BNPL Risk Monitoring Report");
    let _ = writeln!(
        output,
        "Session {} loaded {} ({} segment rows, {} override rows)",
        session.id,
        session.loaded_at.format("%Y-%m-%d %H:%M UTC"),
        session.segments.rows().len(),
        session.overrides.records().len()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Default Rate by Score Bin");
    for series in &views.default_rate_series.series {
        let points: Vec<String> = series
            .points
            .iter()
            .map(|p| format!("{}={:.4}", p.score_bin, p.default_rate))
            .collect();
        let _ = writeln!(output, "- {}: {}", series.risk_segment, points.join(", "));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Policy Trigger Status");
    match &views.policy_status {
        Availability::Available(status) => {
            if status.triggered {
                let _ = writeln!(output, "Adaptive policy triggered.");
            } else {
                let _ = writeln!(output, "No policy triggered.");
            }
            if !status.is_consistent() {
                let _ = writeln!(
                    output,
                    "Note: {} rows disagree with the first row's policy_trigger.",
                    status.disagreeing_rows
                );
            }
        }
        Availability::Unavailable(reason) => {
            let _ = writeln!(output, "Unavailable: {reason}.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Anomaly Detection");
    if views.anomalies.is_empty() {
        let _ = writeln!(output, "No low-risk anomalies flagged.");
    } else {
        write_segment_rows(&mut output, &views.anomalies);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Override Simulation");
    let sim = &views.override_simulation;
    let _ = writeln!(output, "| {} |", sim.columns.join(" | "));
    let _ = writeln!(output, "|{}", "---|".repeat(sim.columns.len()));
    for row in &sim.rows {
        let _ = writeln!(output, "| {} |", row.join(" | "));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Score Trend Over Time");
    match &views.score_trend {
        Availability::Available(trend) => {
            let _ = writeln!(
                output,
                "Segments shown: {}",
                trend.selected_segments.join(", ")
            );
            for series in &trend.series {
                let _ = writeln!(output, "- {}:", series.risk_segment);
                for point in &series.points {
                    let _ = writeln!(
                        output,
                        "  - {} avg score {:.2} ({} obs)",
                        point.date, point.avg_score, point.observations
                    );
                }
            }
        }
        Availability::Unavailable(reason) => {
            let _ = writeln!(output, "Skipped: {reason}.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Override Volume by Segment");
    match &views.override_volume {
        Availability::Available(volume) => {
            for entry in volume {
                let _ = writeln!(
                    output,
                    "- {}: {} overrides",
                    entry.risk_segment, entry.override_count
                );
            }
        }
        Availability::Unavailable(reason) => {
            let _ = writeln!(output, "Skipped: {reason}.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Approval Rate by Segment");
    match &views.approval_rates {
        Availability::Available(rates) => {
            for rate in rates {
                let _ = writeln!(
                    output,
                    "- {}: {:.1}% of {} decisions",
                    rate.risk_segment,
                    rate.approval_rate * 100.0,
                    rate.decisions
                );
            }
        }
        Availability::Unavailable(reason) => {
            let _ = writeln!(output, "Cannot calculate approval rates: {reason}.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Alerts");
    if views.high_default_alerts.is_empty() {
        let _ = writeln!(output, "No abnormal segments detected.");
    } else {
        let _ = writeln!(output, "Segments with unexpected high default rates:");
        let _ = writeln!(output);
        write_segment_rows(&mut output, &views.high_default_alerts);
    }

    output
}
