//! Feeguard Reconciliation CLI Tool
//!
//! Reconciles a store against an authoritative student sheet, and re-derives
//! batch display codes. Every command supports `--dry-run`.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use feeguard::reconcile::{rederive_batch_codes, CodeChange, StudentAction};
use feeguard::{
    AuthoritativeSnapshot, FeeCycleEngine, FeeguardConfig, InMemoryStore, ReconciliationDriver,
    ReconciliationReport, RunContext,
};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "feeguard-reconcile")]
#[command(about = "Fee ledger reconciliation tool for Feeguard")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (courses and engine settings)
    #[arg(long, default_value = feeguard::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Ledger store file
    #[arg(long, default_value = "feeguard-store.json")]
    store: PathBuf,

    /// Business date to reconcile as (YYYY-MM-DD, default: local today)
    #[arg(long)]
    today: Option<NaiveDate>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile students, batches and fee records against a CSV sheet
    Reconcile {
        /// Authoritative student sheet (CSV)
        #[arg(long)]
        input: PathBuf,

        /// Report format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Dry run - report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-derive display codes for every batch group
    RederiveCodes {
        /// Dry run - show code changes without writing
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();
    } else if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());
    let result = match &cli.command {
        Commands::Reconcile {
            input,
            format,
            dry_run,
        } => handle_reconcile(&cli, input, *format, *dry_run, today),
        Commands::RederiveCodes { dry_run } => handle_rederive(&cli.store, *dry_run),
    };

    match result {
        Ok(()) => {
            if !cli.quiet {
                println!("✅ Success");
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            process::exit(1);
        }
    }
}

fn handle_reconcile(
    cli: &Cli,
    input: &Path,
    format: OutputFormat,
    dry_run: bool,
    today: NaiveDate,
) -> Result<()> {
    let config = FeeguardConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    let table = config.course_table();
    let engine = FeeCycleEngine::new(&table).with_max_months(config.engine.max_generation_months);

    let store = InMemoryStore::open(&cli.store)?;
    let snapshot = AuthoritativeSnapshot::from_path(input)?;
    info!(
        "loaded {} row(s) from {} (checksum {})",
        snapshot.students.len(),
        input.display(),
        snapshot.checksum
    );

    let context = RunContext::resolve(&store, &config.engine, today, dry_run)?;
    let report = ReconciliationDriver::new(&store, engine, &context).run(&snapshot)?;

    if !dry_run {
        store
            .save(&cli.store)
            .with_context(|| format!("failed to save store to {}", cli.store.display()))?;
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }

    // per-student failures are in the report; only pre-run errors fail the process
    if report.tally.failed > 0 {
        warn!("{} student(s) failed to reconcile", report.tally.failed);
    }
    Ok(())
}

fn print_report(report: &ReconciliationReport) {
    let mode = if report.dry_run { "dry run" } else { "live" };
    println!("\n📋 Reconciliation Report ({mode}, {})\n", report.today);

    if !report.batches.is_empty() {
        println!("📦 Batches ({}):", report.batches.len());
        for batch in &report.batches {
            let start = batch
                .start_date
                .map_or_else(|| "no start".to_string(), |d| d.to_string());
            println!(
                "  {} {} <- {} ({}, {start})",
                batch.action.to_string().cyan(),
                batch.code,
                batch.source_code,
                batch.status
            );
            for change in &batch.changes {
                println!(
                    "      {}: {} -> {}",
                    change.field,
                    change.from.as_deref().unwrap_or("-"),
                    change.to.as_deref().unwrap_or("-")
                );
            }
        }
        println!();
    }

    println!("👥 Students ({}):", report.students.len());
    for student in &report.students {
        let action = match student.action {
            StudentAction::Failed => student.action.to_string().red(),
            StudentAction::Unchanged => student.action.to_string().normal(),
            _ => student.action.to_string().green(),
        };
        println!(
            "  line {:>4}  {action}  {}  [{}]",
            student.line,
            student.name,
            student.batch_code.as_deref().unwrap_or("no batch")
        );
        for change in &student.changes {
            println!(
                "      {}: {} -> {}",
                change.field,
                change.from.as_deref().unwrap_or("-"),
                change.to.as_deref().unwrap_or("-")
            );
        }
        if student.deleted > 0 || student.created > 0 {
            println!(
                "      fee records: {} removed, {} generated",
                student.deleted, student.created
            );
        }
        if !student.credit_deposited.is_zero() || !student.credit_applied.is_zero() {
            println!(
                "      credit: {} deposited, {} applied",
                student.credit_deposited, student.credit_applied
            );
        }
        for issue in &student.issues {
            println!("      {} {issue}", "⚠".yellow());
        }
        if let Some(error) = &student.error {
            println!("      {} {error}", "✗".red());
        }
    }

    println!("\n📈 Summary: {}", report.tally);
}

fn handle_rederive(store_path: &Path, dry_run: bool) -> Result<()> {
    let store = InMemoryStore::open(store_path)?;
    let changes = rederive_batch_codes(&store, dry_run)?;

    if changes.is_empty() {
        println!("All batch codes are already canonical");
        return Ok(());
    }

    let verb = if dry_run { "Would rename" } else { "Renamed" };
    println!("{verb} {} batch code(s):", changes.len());
    for CodeChange {
        from, to, status, start_date, ..
    } in &changes
    {
        let start = start_date.map_or_else(|| "no start".to_string(), |d| d.to_string());
        println!("  {from} -> {} ({status}, {start})", to.bold());
    }

    if !dry_run {
        store
            .save(store_path)
            .with_context(|| format!("failed to save store to {}", store_path.display()))?;
    }
    Ok(())
}
