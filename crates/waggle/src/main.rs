//! Waggle launcher: hive recording supervision and the marker analysis
//! pipeline behind one binary.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

mod cli;
mod engines;

#[derive(Parser, Debug)]
#[command(name = "waggle", about = "Hive recording supervision and marker-tracking pipeline")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file path (default: ~/.config/waggle/config.json)
    #[arg(long, global = true, env = "WAGGLE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the recorder process
    Start {
        /// Recorder executable
        #[arg(long, env = "WAGGLE_RECORDER_BIN", default_value = "waggle-recorder")]
        recorder: PathBuf,
    },

    /// Stop the recorder and finalize staged segments
    Stop,

    /// Report recorder status (detects and recovers crashes)
    Status,

    /// Sweep the staging directory without touching the recorder
    Finalize,

    /// List pipeline-eligible videos and their artifact status
    Videos {
        /// Directory holding the source videos (default: <out_dir>/<camera>)
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Directory holding pipeline artifacts (default: <out_dir>)
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Table format the artifacts were saved in
        #[arg(long, default_value = "parquet")]
        save_filetype: String,
    },

    /// Run the analysis pipeline on one or more videos
    Run(cli::run::RunArgs),

    /// Show or initialize the acquisition config
    Config {
        #[command(subcommand)]
        action: cli::config::ConfigAction,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();

    if let Err(err) = waggle_logging::init_logging(waggle_logging::LogConfig {
        app_name: "waggle",
        verbose: args.verbose,
    }) {
        eprintln!("Failed to initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    match dispatch(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(args: Cli) -> Result<()> {
    let config_path = args
        .config
        .unwrap_or_else(waggle_config::default_config_path);

    match args.command {
        Commands::Start { recorder } => cli::acquisition::run_start(&config_path, &recorder),
        Commands::Stop => cli::acquisition::run_stop(&config_path),
        Commands::Status => cli::acquisition::run_status(&config_path),
        Commands::Finalize => cli::acquisition::run_finalize(&config_path),
        Commands::Videos {
            input_dir,
            results_dir,
            save_filetype,
        } => cli::videos::run(&config_path, input_dir, results_dir, &save_filetype),
        Commands::Run(run_args) => cli::run::run(&config_path, run_args),
        Commands::Config { action } => cli::config::run(&config_path, action),
    }
}
