//! CLI entrypoint for the buddy pool workload harness.

use std::path::PathBuf;

use buddypool_core::{MIN_K, PoolLogLevel};
use buddypool_harness::{
    LogEmitter, Scenario, WorkloadConfig, run_workload, run_workload_logged, validate_log_file,
};
use clap::{Parser, Subcommand};

/// Workload tooling for the buddy pool allocator.
#[derive(Debug, Parser)]
#[command(name = "buddypool-harness")]
#[command(about = "Workload and structured-log harness for the buddy pool allocator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one scenario (or all of them) and print a JSON report.
    Run {
        /// Scenario name, or `all`.
        #[arg(long, default_value = "all")]
        scenario: String,
        /// Pool order; the pool spans 2^order bytes.
        #[arg(long, default_value_t = MIN_K + 2)]
        pool_order: usize,
        /// Allocate and release calls per scenario.
        #[arg(long, default_value_t = 20_000)]
        ops: usize,
        #[arg(long, default_value_t = 0x5EED_B0DD)]
        seed: u64,
        /// Check pool invariants every N ops (0 disables).
        #[arg(long, default_value_t = 1_000)]
        verify_every: usize,
        /// Pool lifecycle-log threshold (off, error, warn, info, debug, trace).
        #[arg(long, default_value = "info")]
        pool_log: String,
        /// Structured JSONL log output path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Report output path (if omitted, prints to stdout).
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Validate a structured JSONL log file.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
    /// List available scenarios.
    Scenarios,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            scenario,
            pool_order,
            ops,
            seed,
            verify_every,
            pool_log,
            log,
            report,
        } => {
            let scenarios = if scenario.eq_ignore_ascii_case("all") {
                Scenario::all().to_vec()
            } else {
                vec![scenario.parse::<Scenario>()?]
            };

            let mut emitter = match &log {
                Some(path) => Some(LogEmitter::to_file(path, &format!("seed-{seed:x}"))?),
                None => None,
            };

            let mut reports = Vec::new();
            for scenario in scenarios {
                let config = WorkloadConfig {
                    scenario,
                    pool_order,
                    ops,
                    seed,
                    verify_every,
                    pool_log_level: PoolLogLevel::from_str_loose(&pool_log),
                };
                eprintln!("Running {scenario} (order {pool_order}, {ops} ops)");
                let result = match emitter.as_mut() {
                    Some(emitter) => run_workload_logged(&config, Some(emitter))?,
                    None => run_workload(&config)?,
                };
                eprintln!(
                    "  {} allocations, {} out-of-memory, peak utilization {}.{}%",
                    result.allocations,
                    result.out_of_memory,
                    result.peak_utilization_permille / 10,
                    result.peak_utilization_permille % 10,
                );
                reports.push(result);
            }

            let json = serde_json::to_string_pretty(&reports)?;
            match report {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    eprintln!("Wrote report to {}", path.display());
                }
                None => println!("{json}"),
            }
            if let (Some(path), Some(emitter)) = (log, emitter) {
                eprintln!(
                    "Wrote {} structured log line(s) to {}",
                    emitter.lines(),
                    path.display()
                );
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for error in &errors {
                eprintln!("{error}");
            }
            if !errors.is_empty() {
                return Err(format!(
                    "{} validation error(s) in {} line(s) of {}",
                    errors.len(),
                    lines,
                    log.display()
                )
                .into());
            }
            println!("{}: {lines} line(s) valid", log.display());
        }
        Command::Scenarios => {
            for scenario in Scenario::all() {
                println!("{:<18} {}", scenario.as_str(), scenario.description());
            }
        }
    }

    Ok(())
}
