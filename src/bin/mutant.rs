//! mutant CLI — classify DNA grids against the local record store
//!
//! Commands:
//!   mutant classify — classify a grid (cached per distinct grid)
//!   mutant explain  — list the runs the scanner counts in a grid
//!   mutant show     — print a stored record
//!   mutant delete   — delete a stored record by content key
//!   mutant stats    — mutant / human counts and ratio
//!   mutant demo     — classify random grids and print stats

use chrono::NaiveDate;
use mutant_core::{Config, DateRange, DetectorError, Grid};
use rand::Rng;
use std::env;
use std::process;

fn print_usage() {
    println!(
        r#"
Mutant Detector — run scanning over NxN DNA grids with cached results

Usage: mutant <command> [options]

Commands:
  classify <row> <row> ...                 Classify a grid (rows of A/T/C/G)
  explain  <row> <row> ...                 Show the runs counted in a grid
  show     <content-key>                   Print a stored record
  delete   <content-key>                   Delete a stored record
  stats    [--from YYYY-MM-DD] [--to YYYY-MM-DD] [--json]
                                           Mutant/human counts and ratio
  demo     [count] [size]                  Classify random grids

Environment:
  MUTANT_BACKEND        memory | json | sqlite   (default sqlite)
  MUTANT_STORE_PATH     record store location
  MUTANT_MAX_DIMENSION  largest accepted N       (default 1000)
  MUTANT_RUN_COUNTING   maximal | overlapping    (default maximal)
  RUST_LOG              log filter               (default info)

Examples:
  mutant classify ATGCGA CAGTGC TTATGT AGAAGG CCCCTA TCACTG
  mutant stats --from 2025-01-01 --json
  mutant demo 100 8
"#
    );
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("  {}", e);
            process::exit(2);
        }
    };

    let result = match args[1].as_str() {
        "classify" => cmd_classify(&config, &args[2..]),
        "explain" => cmd_explain(&config, &args[2..]),
        "show" => cmd_show(&config, &args[2..]),
        "delete" => cmd_delete(&config, &args[2..]),
        "stats" => cmd_stats(&config, &args[2..]),
        "demo" => cmd_demo(&config, &args[2..]),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("  Error: {}", e);
        if e.is_transient() {
            eprintln!("  (the record store may be temporarily unavailable; retrying can help)");
        }
        process::exit(exit_code(&e));
    }
}

/// 2 for bad usage or configuration, 1 for everything else
fn exit_code(e: &DetectorError) -> i32 {
    match e {
        DetectorError::Config(_) => 2,
        _ => 1,
    }
}

fn required_key<'a>(args: &'a [String], command: &str) -> Result<&'a String, DetectorError> {
    args.first()
        .ok_or_else(|| DetectorError::Config(format!("usage: mutant {} <content-key>", command)))
}

fn cmd_classify(config: &Config, rows: &[String]) -> Result<(), DetectorError> {
    let grid = Grid::parse_with(rows, &config.grid_limits())?;
    let (store, _) = config.build()?;
    let record = store.classify_record(&grid)?;
    println!("\n  {}", record.label().to_uppercase());
    println!("  Key:     {}", record.content_key);
    println!("  Stored:  {}", record.created_at.to_rfc3339());
    Ok(())
}

fn cmd_explain(config: &Config, rows: &[String]) -> Result<(), DetectorError> {
    let grid = Grid::parse_with(rows, &config.grid_limits())?;
    let scanner = config.scanner();
    let runs = scanner.runs(&grid);

    println!("\n{}\n", grid);
    println!("  Counting: {:?}", scanner.counting());
    if runs.is_empty() {
        println!("  No runs of four");
    }
    for run in &runs {
        println!(
            "  {}{}{}{} at ({}, {}) {:?}",
            run.base, run.base, run.base, run.base, run.row, run.col, run.direction
        );
    }
    println!(
        "  Result: {} ({} run{})",
        if scanner.scan(&grid) { "MUTANT" } else { "HUMAN" },
        runs.len(),
        if runs.len() == 1 { "" } else { "s" }
    );
    Ok(())
}

fn cmd_show(config: &Config, args: &[String]) -> Result<(), DetectorError> {
    let key = required_key(args, "show")?;
    let (store, _) = config.build()?;
    let record = store
        .record(key)?
        .ok_or_else(|| DetectorError::NotFound(key.clone()))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn cmd_delete(config: &Config, args: &[String]) -> Result<(), DetectorError> {
    let key = required_key(args, "delete")?;
    let (store, _) = config.build()?;
    store.delete(key)?;
    println!("  Deleted {}", key);
    Ok(())
}

fn parse_date(flag: &str, value: Option<&String>) -> Result<NaiveDate, DetectorError> {
    let value = value.ok_or_else(|| DetectorError::Config(format!("{} needs a date", flag)))?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| DetectorError::Config(format!("{} '{}': {}", flag, value, e)))
}

fn cmd_stats(config: &Config, args: &[String]) -> Result<(), DetectorError> {
    let mut from = None;
    let mut to = None;
    let mut as_json = false;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--from" => from = Some(parse_date("--from", iter.next())?),
            "--to" => to = Some(parse_date("--to", iter.next())?),
            "--json" => as_json = true,
            other => return Err(DetectorError::Config(format!("unknown stats option '{}'", other))),
        }
    }

    let range = if from.is_some() || to.is_some() {
        Some(DateRange::from_dates(from, to))
    } else {
        None
    };

    let (_, aggregator) = config.build()?;
    let stats = aggregator.stats(range)?;

    if as_json {
        println!("{}", serde_json::to_string(&stats)?);
        return Ok(());
    }

    println!("\n  Mutant Detector Statistics");
    println!("  {}", "=".repeat(40));
    if let Some(from) = from {
        println!("  From:     {}", from);
    }
    if let Some(to) = to {
        println!("  To:       {}", to);
    }
    println!("  Mutants:  {}", stats.mutant_count);
    println!("  Humans:   {}", stats.human_count);
    println!("  Ratio:    {:.4}", stats.ratio);
    Ok(())
}

fn cmd_demo(config: &Config, args: &[String]) -> Result<(), DetectorError> {
    let count: usize = args.first().and_then(|s| s.parse().ok()).unwrap_or(20);
    let size: usize = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(6)
        .min(config.max_dimension);

    let (store, aggregator) = config.build()?;
    let mut rng = rand::thread_rng();

    println!("\n  Classifying {} random {}x{} grids...", count, size, size);
    let mut mutants = 0usize;
    for i in 0..count {
        let grid = Grid::random(size, &mut rng);
        if store.classify(&grid)? {
            mutants += 1;
        }
        // resubmit now and then to exercise the cache
        if rng.gen_bool(0.2) {
            store.classify(&grid)?;
        }
        if (i + 1) % 10 == 0 {
            println!("  {} / {} done", i + 1, count);
        }
    }

    println!("  {} mutant, {} human in this run", mutants, count - mutants);
    println!("  {}", store.summary()?);
    let stats = aggregator.stats(None)?;
    println!(
        "  Store totals: {} mutant / {} human, ratio {:.4}",
        stats.mutant_count, stats.human_count, stats.ratio
    );
    Ok(())
}
