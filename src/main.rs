use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use markcheck::batch::parse_names;
use markcheck::local_store::StoreColumns;
use markcheck::report;
use markcheck::sources::build_sources;
use markcheck::{
    BatchRunner, CheckerConfig, LocalKnowledgeStore, MatchVerdict, NiceClassSet,
    QueryOrchestrator, RateLimiter, RegionSet, Shutdown, VerdictStatus,
};

#[derive(Parser)]
#[command(author, version, about = "Check candidate names against trademark registries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check one or more names for clashing marks
    Check {
        /// Names to check; read from --file or stdin when omitted
        names: Vec<String>,

        /// File with one name per line
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Nice class to search in (repeatable)
        #[arg(short, long = "class", required = true)]
        classes: Vec<String>,

        /// Region to search in (repeatable)
        #[arg(short, long = "region", default_values = ["EU", "US"])]
        regions: Vec<String>,

        /// Registry to query, in order (repeatable); overrides MARKCHECK_SOURCES
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Known-names CSV; overrides MARKCHECK_LOCAL_DB
        #[arg(long)]
        local_db: Option<PathBuf>,

        /// Print verdicts as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    markcheck::logging::configure_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            names,
            file,
            classes,
            regions,
            sources,
            local_db,
            json,
        } => {
            let mut config = CheckerConfig::from_env();
            if !sources.is_empty() {
                config.source_order = sources;
            }
            if local_db.is_some() {
                config.local_db_path = local_db;
            }

            let names = collect_names(names, file.as_ref())?;
            let nice_classes = NiceClassSet::new(&classes).context("Invalid --class")?;
            let regions = RegionSet::new(&regions).context("Invalid --region")?;

            let succeeded = run_check(&config, &names, &nice_classes, &regions, json).await?;
            if !succeeded {
                process::exit(1);
            }
        }
    }

    Ok(())
}

fn collect_names(args: Vec<String>, file: Option<&PathBuf>) -> Result<Vec<String>> {
    let mut names = args;

    if let Some(path) = file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read names from {}", path.display()))?;
        names.extend(parse_names(&text));
    }

    if names.is_empty() {
        if io::stdin().is_terminal() {
            bail!("No names given; pass them as arguments, with --file, or on stdin");
        }
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read names from stdin")?;
        names = parse_names(&text);
    }

    Ok(names)
}

/// Returns false when the batch was rejected or every name failed.
async fn run_check(
    config: &CheckerConfig,
    names: &[String],
    nice_classes: &NiceClassSet,
    regions: &RegionSet,
    json: bool,
) -> Result<bool> {
    let (cancel_tx, shutdown) = Shutdown::channel();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_err() {
            error!("Failed to listen for ctrl-c");
            return;
        }
        info!("Shutdown requested, finishing the current name");
        let _ = cancel_tx.send(true);
    });

    let local_store = match &config.local_db_path {
        Some(path) => LocalKnowledgeStore::load(path, &StoreColumns::default()),
        None => LocalKnowledgeStore::empty(),
    }
    .with_region_matching(config.local_match_respects_region);

    let sources = build_sources(&config.source_order).context("Invalid source configuration")?;
    let limiter = Arc::new(RateLimiter::from_config(config, shutdown.clone()));
    let orchestrator = QueryOrchestrator::from_config(
        config,
        sources,
        Arc::new(local_store),
        limiter,
        shutdown,
    );
    let runner = BatchRunner::from_config(config, orchestrator);

    let report = match runner.run(names, nice_classes, regions).await {
        Ok(report) => report,
        Err(err) => {
            eprintln!("{} {}", "Batch rejected:".bright_red(), err);
            return Ok(false);
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize verdicts")?
        );
    } else {
        print_report(&report.verdicts);
    }

    if let Some(summary) = report.failure_summary() {
        eprintln!("{}", summary.bright_red());
        return Ok(false);
    }
    Ok(true)
}

fn print_report(verdicts: &[MatchVerdict]) {
    println!("\n{}", "═".repeat(80).bright_blue());
    print!("{}", report::summarize(verdicts));
    println!("{}", "═".repeat(80).bright_blue());

    for verdict in verdicts {
        let status = verdict.status.to_string();
        let colored_status = match verdict.status {
            VerdictStatus::NoMatch => status.bright_green(),
            VerdictStatus::ExactMatch | VerdictStatus::LocalMatch | VerdictStatus::Error => {
                status.bright_red()
            }
            VerdictStatus::SimilarMatch | VerdictStatus::NeedsReview => status.bright_yellow(),
        };
        println!("\n{} {}", "▶".bright_blue(), colored_status);
        print!("{}", report::detail(verdict));
        println!("{}", "─".repeat(80).dimmed());
    }
}
