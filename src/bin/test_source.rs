use anyhow::{Context, Result};
use colored::Colorize;
use std::env;
use std::process;

use markcheck::logging;
use markcheck::matching::{exact_matches, similar_matches};
use markcheck::sources::build_sources;
use markcheck::{NameValidator, NiceClassSet, RegionSet, SourceOutcome};

#[tokio::main]
async fn main() -> Result<()> {
    logging::configure_logging();

    let args: Vec<String> = env::args().collect();

    if args.len() < 3 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        return Ok(());
    }

    let source_id = &args[1];
    let name = &args[2];
    let classes: Vec<&str> = match args.get(3) {
        Some(list) => list.split(',').collect(),
        None => vec!["20"],
    };
    let regions: Vec<&str> = match args.get(4) {
        Some(list) => list.split(',').collect(),
        None => vec!["US"],
    };

    let candidate = match NameValidator::default().validate(name) {
        Ok(candidate) => candidate,
        Err(err) => {
            eprintln!("{} {}", "Invalid name:".bright_red(), err);
            process::exit(2);
        }
    };
    let nice_classes = NiceClassSet::new(&classes).context("Invalid class list")?;
    let regions = RegionSet::new(&regions).context("Invalid region list")?;

    let sources = build_sources(std::slice::from_ref(source_id))?;
    let source = &sources[0];

    println!("Querying {} for: {}", source.id(), candidate);
    let result = source.search(&candidate, &nice_classes, &regions).await;

    println!("\n{}", "═".repeat(100).bright_blue());
    println!(
        "{}  {}",
        "SOURCE DIAGNOSTICS".bright_blue(),
        source.id().bright_yellow()
    );
    println!("{}", "═".repeat(100).bright_blue());

    let status_str = format!("{:?}", result.outcome);
    let colored_status = match result.outcome {
        SourceOutcome::Ok => status_str.bright_green(),
        SourceOutcome::NoResults => status_str.bright_yellow(),
        SourceOutcome::Failed => status_str.bright_red(),
    };
    println!("{}: {}", "Outcome".bright_blue(), colored_status);
    println!("{}: {}", "Reported Total".bright_blue(), result.total_count);
    println!("{}: {}", "Marks Returned".bright_blue(), result.marks.len());

    if let Some(ref error) = result.error {
        println!("\n{}", "Error".bright_red());
        println!("{}", "─".repeat(80).dimmed());
        println!("{}", error.bright_red());
    }

    if !result.marks.is_empty() {
        println!("\n{}", "Marks".bright_green());
        println!("{}", "─".repeat(80).dimmed());

        // Keep the listing short
        let display_count = std::cmp::min(result.marks.len(), 20);
        for (i, mark) in result.marks.iter().take(display_count).enumerate() {
            println!("{}. {}", i + 1, mark.bright_white());
        }
        if result.marks.len() > 20 {
            println!("... and {} more marks", result.marks.len() - 20);
        }

        let exact = exact_matches(&candidate, &result.marks);
        let similar = similar_matches(&candidate, &result.marks);
        println!("\n{}: {:?}", "Exact Matches".bright_blue(), exact);
        println!("{}: {:?}", "Similar Matches".bright_blue(), similar);
    }

    println!("\n{}", "═".repeat(100).bright_blue());

    if result.is_failed() {
        eprintln!("Source test completed with errors");
        process::exit(1);
    }
    println!("Source test completed successfully");
    Ok(())
}

fn print_usage(program_name: &str) {
    println!(
        "Usage: {} <source> <name> [classes] [regions]",
        program_name
    );
    println!("\nArguments:");
    println!("  <source>     Registry id: tmdn or uspto");
    println!("  <name>       Single-word name to look up");
    println!("  [classes]    Comma-separated Nice classes (default: 20)");
    println!("  [regions]    Comma-separated regions (default: US)");
    println!("\nExamples:");
    println!("  {} uspto monica", program_name);
    println!("  {} tmdn nova 20,21 EU,GB", program_name);
}
