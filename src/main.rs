//! CLI entry point for the rogue DPS simulator

use clap::{Parser, ValueEnum};
use rogue_sim_lib::{aggregate::run_and_aggregate, config::SimulationConfig};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "rogue-sim")]
#[command(version)]
#[command(about = "Discrete-event DPS simulator for melee rogue builds", long_about = None)]
struct Args {
    /// Path to the simulation configuration file (YAML or JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Override the configured trial count
    #[arg(short, long)]
    num_trials: Option<usize>,

    /// Override the configured master RNG seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Run trials across worker threads
    #[arg(short, long, default_value = "false")]
    parallel: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Show timing information
    #[arg(short, long, default_value = "false")]
    timing: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = match SimulationConfig::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    };
    if let Some(n) = args.num_trials {
        config.trials = n;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }

    let start = Instant::now();
    let summary = match run_and_aggregate(config, args.parallel) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    let elapsed = start.elapsed();

    match args.output {
        OutputFormat::Text => {
            println!("=== Rogue Simulation Results ===");
            println!(
                "Trials: {} completed, {} failed",
                summary.trials_completed, summary.trials_failed
            );
            if summary.cancelled {
                println!("(cancelled early; partial results)");
            }
            println!();
            println!(
                "Mean DPS: {:.1} ± {:.1} (std error {:.2})",
                summary.mean_dps, summary.std_dev_dps, summary.std_error_dps
            );
            println!("DPS Range: {:.1} - {:.1}", summary.min_dps, summary.max_dps);
            println!(
                "Mean Damage over {:.0}s: {:.0}",
                summary.encounter_duration, summary.mean_total_damage
            );
            println!();
            println!("--- Per-Ability Breakdown ---");
            for (ability, b) in &summary.breakdown {
                println!(
                    "{:<20} {:>8} casts  {:>6} crits  {:>6} missed  {:>12.0} dmg ({:>5.1}%)",
                    ability,
                    b.casts,
                    b.crits,
                    b.misses + b.dodges + b.parries,
                    b.total_damage,
                    b.damage_share * 100.0
                );
            }
            for failure in &summary.failures {
                eprintln!("failed trial: {failure}");
            }

            if args.timing {
                println!();
                println!("--- Performance ---");
                println!("Total time: {:.3}s", elapsed.as_secs_f64());
                println!(
                    "Per trial: {:.3}ms",
                    elapsed.as_secs_f64() * 1000.0 / summary.trials_completed.max(1) as f64
                );
            }
        }
        OutputFormat::Json => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing summary: {e}");
                std::process::exit(1);
            }
        },
    }
}
