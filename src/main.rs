use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod models;
mod pipeline;
mod report;
mod session;
mod table;

use config::MonitorConfig;
use models::Availability;
use pipeline::SegmentSelection;
use session::{SessionContext, SessionState};

/// Used when `RUST_LOG` is unset so data-quality warnings still surface.
const DEFAULT_LOG_DIRECTIVE: &str = "warn";

#[derive(Parser)]
#[command(name = "bnpl-risk-monitor")]
#[command(about = "Derives BNPL credit-risk monitoring views from segment and override tables", long_about = None)]
struct Cli {
    /// Segment score summary CSV
    #[arg(long, global = true, env = "BNPL_SEGMENT_CSV")]
    segments: Option<PathBuf>,
    /// Override simulation CSV
    #[arg(long, global = true, env = "BNPL_OVERRIDE_CSV")]
    overrides: Option<PathBuf>,
    /// Optional TOML file with alert thresholds and parsing options
    #[arg(long, global = true, env = "BNPL_MONITOR_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate both tables and list which views can be derived
    Check,
    /// Emit every derived view as JSON
    Views {
        /// Restrict the score trend to these segments (repeatable)
        #[arg(long = "segment")]
        segments: Vec<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long = "segment")]
        segments: Vec<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Print policy status, anomalies and high default-rate alerts
    Alerts,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = MonitorConfig::load(cli.config.as_deref()).context("failed to load config")?;

    let state = SessionState::open(cli.segments.as_deref(), cli.overrides.as_deref(), &config)
        .context("failed to load input tables")?;
    let session = match state {
        SessionState::Ready(session) => session,
        SessionState::AwaitingInput { missing } => {
            println!(
                "Waiting for input: please supply the {} file(s) via --segments / --overrides.",
                missing.join(" and ")
            );
            return Ok(());
        }
    };

    match cli.command {
        Commands::Check => print_check(&session, &config),
        Commands::Views { segments, out } => {
            let selection = trend_selection(segments);
            let views = pipeline::derive_views(&session, &selection, &config);
            let json = report::render_json(&views).context("failed to serialize views")?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Views written to {}.", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Report { segments, out } => {
            let selection = trend_selection(segments);
            let views = pipeline::derive_views(&session, &selection, &config);
            let report = report::build_report(&session, &views);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Alerts => {
            let status = pipeline::policy_status(&session.segments);
            match status {
                Availability::Available(status) if status.triggered => {
                    println!("Adaptive policy triggered.")
                }
                Availability::Available(_) => println!("No policy triggered."),
                Availability::Unavailable(reason) => println!("Policy status unavailable: {reason}"),
            }

            let anomalies = pipeline::anomalies(&session.segments);
            println!("Low-risk anomalies: {}", anomalies.len());
            for row in &anomalies {
                println!(
                    "- bin {} ({}) default rate {:.2}%",
                    row.score_bin,
                    row.risk_segment,
                    row.default_rate * 100.0
                );
            }

            let alerts = pipeline::high_default_alerts(&session.segments, &config);
            if alerts.is_empty() {
                println!("No abnormal segments detected.");
            } else {
                println!(
                    "Segments above {:.0}% default rate:",
                    config.high_default_threshold * 100.0
                );
                for row in &alerts {
                    println!(
                        "- bin {} ({}) default rate {:.2}%",
                        row.score_bin,
                        row.risk_segment,
                        row.default_rate * 100.0
                    );
                }
            }
        }
    }

    Ok(())
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE))
}

/// No `--segment` flags means the full trend, like the dashboard's default.
fn trend_selection(segments: Vec<String>) -> SegmentSelection {
    if segments.is_empty() {
        SegmentSelection::All
    } else {
        SegmentSelection::from_names(segments)
    }
}

fn print_check(session: &SessionContext, config: &MonitorConfig) {
    println!(
        "Segment table: {} rows, columns [{}]",
        session.segments.rows().len(),
        session.segments.columns().join(", ")
    );
    println!(
        "Override table: {} rows, columns [{}]",
        session.overrides.records().len(),
        session.overrides.columns().join(", ")
    );

    if let Some(status) = pipeline::policy_status(&session.segments).as_available() {
        if !status.is_consistent() {
            println!(
                "Warning: {} segment rows disagree with row 0 on policy_trigger",
                status.disagreeing_rows
            );
        }
    }

    let selection = SegmentSelection::All;
    let checks = [
        (
            "score trend",
            pipeline::score_trend(&session.segments, &selection, config).map(drop),
        ),
        (
            "override volume",
            pipeline::override_volume(&session.overrides).map(drop),
        ),
        (
            "approval rates",
            pipeline::approval_rates(&session.overrides).map(drop),
        ),
    ];
    for (name, availability) in checks {
        match availability {
            Availability::Available(()) => println!("- {name}: available"),
            Availability::Unavailable(reason) => println!("- {name}: unavailable ({reason})"),
        }
    }
}
