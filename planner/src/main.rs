//! CLI entry point for the portfolio planner.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use nanofolio_planner::commands::{self, RunOptions};
use nanofolio_planner::config::Config;

#[derive(Parser)]
#[command(name = "planner")]
#[command(about = "Mean-variance portfolio planner: prices → weights → share order")]
#[command(version)]
struct Cli {
    /// Path to planner.toml
    #[arg(long, default_value = "planner.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Estimate, optimize and allocate a budget
    Run {
        /// Path to prices.json
        prices: PathBuf,

        /// Cash to allocate (overrides the config)
        #[arg(long)]
        budget: Option<f64>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        /// Comma-separated basket (default: every symbol in the file)
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
    },

    /// Per-symbol performance metrics and moving averages
    Metrics {
        /// Path to prices.json
        prices: PathBuf,

        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
    },

    /// Correlation matrix of returns
    Correlation {
        /// Path to prices.json
        prices: PathBuf,

        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    match cli.command {
        Command::Run {
            prices,
            budget,
            json,
            symbols,
        } => {
            let opts = RunOptions {
                budget,
                json,
                symbols,
            };
            if let Err(e) = commands::run(&config, &prices, &opts) {
                if e.is_pipeline_failure() {
                    eprintln!("\nPortfolio could not be built: {e}");
                    process::exit(2);
                }
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
        Command::Metrics { prices, symbols } => {
            if let Err(e) = commands::show_metrics(&config, &prices, &symbols) {
                eprintln!("Error: {e:#}");
                process::exit(1);
            }
        }
        Command::Correlation { prices, symbols } => {
            if let Err(e) = commands::show_correlation(&config, &prices, &symbols) {
                eprintln!("Error: {e:#}");
                process::exit(1);
            }
        }
    }
}
