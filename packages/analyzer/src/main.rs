//! danci-bkt-analyzer: BKT parameter analysis of learner progress exports.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use danci_bkt::{Fidelity, DEFAULT_SEED};
use danci_bkt_analyzer::commands::analyze::{self, AnalyzeOptions};
use danci_bkt_analyzer::commands::generate::{self, GenerateOptions};
use danci_bkt_analyzer::config::{Config, ConfigOverrides};
use danci_bkt_analyzer::logging::init_tracing;

#[derive(Parser)]
#[command(name = "danci-bkt-analyzer", version, about = "Offline BKT parameter estimation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit BKT parameters for every grammar point and word in the exports
    Analyze {
        /// Grammar point progress export
        #[arg(long)]
        grammar: Option<PathBuf>,

        /// Word progress export
        #[arg(long)]
        word: Option<PathBuf>,

        /// Directory the analysis reports are written to
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// JSON config file (camelCase keys)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Preset: baseline or high
        #[arg(long, value_parser = parse_fidelity)]
        fidelity: Option<Fidelity>,

        /// Run seed
        #[arg(long)]
        seed: Option<u64>,

        /// Worker threads (default: all cores)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Write synthetic progress exports for testing
    Generate {
        /// Output directory
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Generator seed
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// Size of the user pool
        #[arg(long, default_value = "20")]
        users: usize,
    },
}

fn parse_fidelity(s: &str) -> Result<Fidelity, String> {
    Fidelity::parse(s).ok_or_else(|| format!("unknown fidelity '{s}' (expected baseline or high)"))
}

fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level);

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Analyze {
            grammar,
            word,
            output_dir,
            config: config_file,
            fidelity,
            seed,
            workers,
        } => {
            let options = AnalyzeOptions {
                grammar,
                word,
                output_dir,
                config: config_file,
                workers,
                overrides: ConfigOverrides {
                    fidelity,
                    parameter_seed: seed,
                    ..Default::default()
                },
            };
            analyze::execute(&config, &options).map(|summary| {
                print!("{}", summary.summary);
                for report in &summary.reports {
                    println!("Report saved to {}", report.display());
                }
            })
        }
        Commands::Generate {
            output_dir,
            seed,
            users,
        } => generate::execute(&GenerateOptions {
            output_dir,
            seed,
            users,
        })
        .map(|summary| {
            println!(
                "Generated {} grammar and {} word records",
                summary.grammar_records, summary.word_records
            );
            for file in &summary.files {
                println!("  - {}", file.display());
            }
        }),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
