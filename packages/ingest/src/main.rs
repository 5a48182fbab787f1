#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for geographic hierarchy reconciliation.
//!
//! Uses `indicatif-log-bridge` (via [`geo_hierarchy_cli_utils::init_logger`])
//! so log lines and progress bars do not interleave.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use geo_hierarchy_cli_utils::IndicatifProgress;
use geo_hierarchy_database::{paths, units};
use geo_hierarchy_ingest::{
    DEFAULT_BATCH_SIZE, IngestOptions, RunSummary, registry, resolve_levels, run_levels,
};

#[derive(Parser)]
#[command(
    name = "geo_hierarchy_ingest",
    about = "Geographic hierarchy reconciliation tool"
)]
struct Cli {
    /// Path of the hierarchy store (overrides `GEO_HIERARCHY_DB`)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one level, or `all` levels in dependency order
    Ingest {
        /// Level name (e.g., "`subDistrict`") or "all"
        target: String,
        /// Directory holding one feature collection per level
        #[arg(long)]
        input_dir: Option<PathBuf>,
        /// Rows per write transaction
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Override every level's minimum success rate
        #[arg(long)]
        min_success_rate: Option<f64>,
        /// Replace a built-in level definition with a TOML file
        #[arg(long = "level-config")]
        level_configs: Vec<PathBuf>,
        /// Match and assign codes without writing
        #[arg(long)]
        dry_run: bool,
        /// Print each level summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List configured levels and their property fallbacks
    Levels,
    /// Create the store schema
    Migrate,
    /// Show active and total unit counts per level
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[allow(clippy::too_many_lines)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = geo_hierarchy_cli_utils::init_logger();
    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(paths::hierarchy_db_path);

    match cli.command {
        Commands::Migrate => {
            log::info!("Creating schema in {}...", db_path.display());
            geo_hierarchy_database::open(&db_path)?;
            log::info!("Schema ready.");
        }
        Commands::Levels => {
            println!("{:<18} {:<28} FALLBACK KEYS", "LEVEL", "FILE");
            println!("{}", "-".repeat(90));
            for def in registry::all_levels() {
                println!(
                    "{:<18} {:<28} code={} name_local={} name_foreign={} source_id={}",
                    def.level.as_ref(),
                    def.file_name,
                    def.fields.code.join("|"),
                    def.fields.name_local.join("|"),
                    def.fields.name_foreign.join("|"),
                    def.fields.source_id.join("|"),
                );
            }
        }
        Commands::Status { json } => {
            let conn = geo_hierarchy_database::open(&db_path)?;
            let counts = units::counts_by_level(&conn)?;
            if json {
                let rows: Vec<serde_json::Value> = counts
                    .iter()
                    .map(|(level, active, total)| {
                        serde_json::json!({"level": level, "active": active, "total": total})
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{:<18} {:>10} {:>10}", "LEVEL", "ACTIVE", "TOTAL");
                println!("{}", "-".repeat(40));
                for (level, active, total) in counts {
                    println!("{:<18} {active:>10} {total:>10}", level.as_ref());
                }
            }
        }
        Commands::Ingest {
            target,
            input_dir,
            batch_size,
            min_success_rate,
            level_configs,
            dry_run,
            json,
        } => {
            let mut defs = resolve_levels(&target)?;
            for path in &level_configs {
                let replacement =
                    registry::parse_level_definition(&std::fs::read_to_string(path)?)?;
                log::info!(
                    "Using {} definition from {}",
                    replacement.level,
                    path.display()
                );
                if let Some(slot) = defs.iter_mut().find(|d| d.level == replacement.level) {
                    *slot = replacement;
                }
            }

            let input_dir = input_dir.unwrap_or_else(paths::input_dir);
            let options = IngestOptions {
                batch_size: batch_size.max(1),
                min_success_rate,
                dry_run,
            };

            let conn = geo_hierarchy_database::open(&db_path)?;
            let start = Instant::now();

            let summaries = run_levels(
                &conn,
                &defs,
                &input_dir,
                &options,
                |level| IndicatifProgress::records_bar(&multi, &format!("Ingesting {level}")),
                |summary| print_summary(summary, json),
            )?;

            log::info!(
                "Ingested {} level(s) in {:.1}s",
                summaries.len(),
                start.elapsed().as_secs_f64()
            );
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary, json: bool) {
    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(text) => println!("{text}"),
            Err(e) => log::error!("Failed to serialize {} summary: {e}", summary.level),
        }
        return;
    }

    println!(
        "{:<18} processed={} intersection={} centroid={} nearest={} \
         invalid={} unmatched={} missing_key={} inserted={} updated={} \
         unchanged={} write_failed={} success_rate={:.3}",
        summary.level.as_ref(),
        summary.total_processed,
        summary.by_tier.intersection,
        summary.by_tier.centroid,
        summary.by_tier.nearest,
        summary.invalid_geometry,
        summary.unmatched,
        summary.missing_required_key,
        summary.inserted,
        summary.updated,
        summary.unchanged,
        summary.write_failed,
        summary.success_rate,
    );
}
