use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use diagnosis_analytics::models::{DiagnosisRecord, TimeRange};
use diagnosis_analytics::{analytics, dashboard, db, patients, report, source, AnalyticsConfig};

#[derive(Parser)]
#[command(name = "diagnosis-analytics")]
#[command(about = "Scan volume, disease mix and confidence analytics for diagnosis history", long_about = None)]
struct Cli {
    /// Analytics settings (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// History payload exported from the diagnosis endpoint
    #[arg(long)]
    json: Option<PathBuf>,
    /// CSV export of diagnosis records
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Read the Postgres `records` table
    #[arg(long)]
    database: bool,
}

#[derive(Args)]
struct InputArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Patients payload used for the active patient count
    #[arg(long)]
    patients: Option<PathBuf>,
    /// Restrict database rows to one user
    #[arg(long)]
    user_id: Option<Uuid>,
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
    /// week, month, quarter, year or all
    #[arg(long, default_value = "month")]
    range: TimeRange,
    /// Reference instant in RFC 3339; defaults to now
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print summary figures and the top diagnoses
    Summary {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "analytics.md")]
        out: PathBuf,
    },
    /// Write the analytics snapshot as JSON
    Export {
        #[command(flatten)]
        input: InputArgs,
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print today's scans, critical cases and recent diagnoses
    Dashboard {
        #[command(flatten)]
        input: InputArgs,
    },
    /// List patients derived from the scan history
    Patients {
        #[command(flatten)]
        input: InputArgs,
        /// Case-insensitive match on patient name or id
        #[arg(long, default_value = "")]
        search: String,
        /// Exact gender to keep, or "all"
        #[arg(long, default_value = patients::ALL_GENDERS)]
        gender: String,
    },
    /// Print every scan recorded for one patient
    Patient {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        id: String,
    },
}

struct Loaded {
    records: Vec<DiagnosisRecord>,
    pool: Option<PgPool>,
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

async fn load(input: &InputArgs, config: &AnalyticsConfig) -> anyhow::Result<Loaded> {
    let loaded = if let Some(path) = &input.source.json {
        Loaded {
            records: source::load_history_json(path)?,
            pool: None,
        }
    } else if let Some(path) = &input.source.csv {
        Loaded {
            records: source::load_history_csv(path)?,
            pool: None,
        }
    } else {
        let database_url = input
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set to read the records table")?;
        let pool = db::connect(database_url).await?;
        let records = db::fetch_diagnoses(&pool, input.user_id, config.fetch_limit).await?;
        Loaded {
            records,
            pool: Some(pool),
        }
    };

    info!(records = loaded.records.len(), "loaded diagnosis history");
    Ok(loaded)
}

/// Active patient count: a patients payload wins, then the database, then the
/// roster derived from the loaded records.
async fn patient_count(input: &InputArgs, loaded: &Loaded) -> anyhow::Result<usize> {
    let count = match (&input.patients, &loaded.pool) {
        (Some(path), _) => source::load_patient_count(path)?,
        (None, Some(pool)) => db::count_patients(pool, input.user_id).await?,
        (None, None) => patients::roster_from_records(&loaded.records).len(),
    };
    Ok(count)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = AnalyticsConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Summary { input } => {
            let loaded = load(&input, &config).await?;
            let active_patients = patient_count(&input, &loaded).await?;
            let now = input.now.unwrap_or_else(Utc::now);
            let snapshot =
                analytics::aggregate(&loaded.records, input.range, now, active_patients, &config);
            let summary = &snapshot.summary;

            println!("Analytics for the {}:", input.range.describe());
            println!("- Total scans: {}", summary.total_scans);
            println!("- Active patients: {}", summary.active_patients);
            println!(
                "- Avg confidence: {}%",
                summary.avg_confidence_percent.round() as i64
            );
            println!("- This month: {}", summary.scans_this_month);

            if snapshot.top_diseases.is_empty() {
                println!("No diagnoses found for this window.");
                return Ok(());
            }

            println!("Top diagnoses:");
            for disease in &snapshot.top_diseases {
                println!("{}. {} ({} cases)", disease.rank, disease.disease, disease.cases);
            }
        }
        Commands::Report { input, out } => {
            let loaded = load(&input, &config).await?;
            let active_patients = patient_count(&input, &loaded).await?;
            let now = input.now.unwrap_or_else(Utc::now);
            let snapshot =
                analytics::aggregate(&loaded.records, input.range, now, active_patients, &config);
            let view = dashboard::dashboard_view(&loaded.records, active_patients, now, &config);
            let report = report::build_report(&snapshot, &view);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { input, out } => {
            let loaded = load(&input, &config).await?;
            let active_patients = patient_count(&input, &loaded).await?;
            let now = input.now.unwrap_or_else(Utc::now);
            let snapshot =
                analytics::aggregate(&loaded.records, input.range, now, active_patients, &config);
            let json = serde_json::to_string_pretty(&snapshot)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Snapshot written to {}.", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Dashboard { input } => {
            let loaded = load(&input, &config).await?;
            let active_patients = patient_count(&input, &loaded).await?;
            let now = input.now.unwrap_or_else(Utc::now);
            let view = dashboard::dashboard_view(&loaded.records, active_patients, now, &config);

            println!("Total scans: {}", view.total_scans);
            println!("Today: {}", view.scans_today);
            println!("Patients: {}", view.patients);
            println!("Critical cases: {}", view.critical_cases);

            if view.recent.is_empty() {
                println!("No diagnoses recorded yet.");
                return Ok(());
            }

            println!("Recent diagnoses:");
            for row in &view.recent {
                let date = row
                    .date
                    .map_or_else(|| "unknown date".to_string(), |date| date.to_string());
                println!(
                    "- {} ({}) {}: {} {}% [{:?}]{}",
                    row.patient,
                    row.patient_id,
                    date,
                    row.disease,
                    row.confidence,
                    row.tier,
                    if row.critical { " critical" } else { "" }
                );
            }
        }
        Commands::Patients {
            input,
            search,
            gender,
        } => {
            let loaded = load(&input, &config).await?;
            let roster = patients::roster_from_records(&loaded.records);
            let shown = patients::filter_roster(&roster, &search, &gender);
            let stats = patients::roster_stats(&roster);

            println!("Total patients: {}", stats.total_patients);
            println!("Total scans: {}", stats.total_scans);
            println!("Avg scans/patient: {:.1}", stats.avg_scans_per_patient);

            if shown.is_empty() {
                println!("No patients found.");
                return Ok(());
            }

            for patient in &shown {
                println!(
                    "- {} ({}, {}) {} scans, latest {} on {}",
                    patient.name.as_deref().unwrap_or("Unknown Patient"),
                    patient.id.as_deref().unwrap_or("N/A"),
                    patient.gender.as_deref().unwrap_or("unknown gender"),
                    patient.total_scans,
                    patient.latest_diagnosis.as_deref().unwrap_or("Unknown"),
                    patient.last_visit.as_deref().unwrap_or("unknown date")
                );
            }
        }
        Commands::Patient { input, id } => {
            let loaded = load(&input, &config).await?;
            let history = patients::patient_history(&loaded.records, &id);

            if history.is_empty() {
                println!("No scans recorded for patient {id}.");
                return Ok(());
            }

            println!("Scans for patient {id}:");
            for record in &history {
                println!(
                    "- {}: {} at {}%",
                    record.timestamp.as_deref().unwrap_or("unknown date"),
                    record.disease_label(),
                    record.confidence_or_zero().round() as i64
                );
            }
        }
    }

    Ok(())
}
