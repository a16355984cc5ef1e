use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDateTime};
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod apply;
mod backfill;
mod config;
mod dates;
mod db;
mod error;
mod import;
#[cfg(test)]
mod memory;
mod models;
mod normalize;
mod occurrence;
mod report;
mod repo;
mod resolver;
mod source;
mod status;

use config::{EngineConfig, DEFAULT_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS};
use import::ImportBatch;

#[derive(Parser)]
#[command(name = "attendance-reconciler")]
#[command(
    about = "Backfills missing attendance and imports spreadsheet attendance",
    long_about = None
)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a small school dataset
    Seed,
    /// Mark past sessions, activities and meetings without attendance as absent
    Backfill {
        #[arg(
            long,
            default_value_t = DEFAULT_LOOKBACK_DAYS,
            value_parser = clap::value_parser!(i64).range(0..=MAX_LOOKBACK_DAYS)
        )]
        days: i64,
        /// Run clock override, "YYYY-MM-DD HH:MM[:SS]"
        #[arg(long)]
        now: Option<String>,
        #[arg(long)]
        dry_run: bool,
        /// Write a markdown run report
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Import teaching and student attendance exported as CSV
    #[command(group(
        ArgGroup::new("sources")
            .args(["teaching", "students"])
            .required(true)
            .multiple(true)
    ))]
    Import {
        #[arg(long)]
        teaching: Option<PathBuf>,
        #[arg(long)]
        students: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        skip_students: bool,
        /// Move linked rows onto their schedule's weekday
        #[arg(long)]
        snap_to_schedule: bool,
        /// Shortest name fragment the substring matcher accepts (0 = any)
        #[arg(long, default_value_t = 0)]
        min_substring_len: usize,
        #[arg(long)]
        now: Option<String>,
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn run_clock(now: Option<&str>) -> anyhow::Result<NaiveDateTime> {
    match now {
        Some(raw) => dates::parse_now(raw).context("invalid --now value"),
        None => Ok(Local::now().naive_local()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let pool = PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(&cli.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Backfill {
            days,
            now,
            dry_run,
            report: report_path,
        } => {
            let now = run_clock(now.as_deref())?;
            let config = EngineConfig {
                lookback_days: days,
                dry_run,
                ..EngineConfig::default()
            };
            let store = db::PgStore::new(pool);
            let outcome = backfill::run_backfill(&store, config.backfill_options(now))
                .await
                .context("backfill failed")?;

            let counts = &outcome.counts;
            println!(
                "Backfill {} ({} days before {}):",
                if outcome.committed { "committed" } else { "dry run" },
                days,
                now.format("%Y-%m-%d %H:%M")
            );
            for (label, tally) in [
                ("teaching sessions", counts.teaching),
                ("activities", counts.activities),
                ("meetings", counts.meetings),
            ] {
                println!(
                    "- {label}: {} created, {} already recorded, {} errors",
                    tally.created, tally.existing, tally.errors
                );
            }

            if let Some(path) = report_path {
                std::fs::write(&path, report::build_backfill_report(&outcome, days, now))?;
                println!("Report written to {}.", path.display());
            }
        }
        Commands::Import {
            teaching,
            students,
            dry_run,
            skip_students,
            snap_to_schedule,
            min_substring_len,
            now,
            report: report_path,
        } => {
            let now = run_clock(now.as_deref())?;
            let config = EngineConfig {
                min_substring_len,
                snap_to_schedule_day: snap_to_schedule,
                dry_run,
                skip_students,
                ..EngineConfig::default()
            };

            let mut batch = ImportBatch::default();
            if let Some(path) = &teaching {
                batch.teaching = source::teaching_rows_from_path(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
            }
            if let (Some(path), false) = (&students, skip_students) {
                batch.students = source::student_rows_from_path(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
            }

            let store = db::PgStore::new(pool);
            let outcome = import::run_import(&store, &batch, config.import_options())
                .await
                .context("import failed")?;

            let counts = &outcome.counts;
            println!(
                "Import {}:",
                if outcome.committed { "committed" } else { "dry run, nothing saved" }
            );
            println!(
                "- teaching sessions: {} imported, {} skipped, {} errors",
                counts.teaching.imported, counts.teaching.skipped, counts.teaching.errors
            );
            if !skip_students {
                println!(
                    "- students: {} imported, {} skipped, {} errors, {} unmatched",
                    counts.students.imported,
                    counts.students.skipped,
                    counts.students.errors,
                    counts.students.unmatched
                );
            }

            if let Some(path) = report_path {
                std::fs::write(
                    &path,
                    report::build_import_report(&outcome, now, skip_students),
                )?;
                println!("Report written to {}.", path.display());
            }
        }
    }

    Ok(())
}
