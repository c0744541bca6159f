pub mod config;
pub mod process;
pub mod rules;
pub mod summary;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::start_daemon,
    utils::{
        dir::application_data_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Timesink", version, long_about = None)]
#[command(about = "Tracks where your time goes by watching the foreground app", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts the tracking daemon in the background")]
    Init {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(
        about = "Run the daemon directly in the current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Stop a running daemon")]
    Stop {},
    #[command(about = "Show how tracked time was spent over a date range")]
    Summary {
        #[command(flatten)]
        command: summary::SummaryCommand,
    },
    #[command(about = "Inspect and edit classification rules")]
    Rule {
        #[command(subcommand)]
        command: rules::RuleCommand,
    },
    #[command(about = "Inspect and edit tracker settings")]
    Config {
        #[command(subcommand)]
        command: config::ConfigCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, None, logging_level, args.log)?;

    match args.commands {
        Commands::Init { dir } => process::restart_daemon(dir),
        Commands::Stop {} => {
            let process_name = std::env::current_exe()?;
            process::kill_running_daemons(&process_name);
            Ok(())
        }
        Commands::Serve { dir } => {
            let dir = dir.map_or_else(application_data_path, Ok)?;
            start_daemon(dir).await
        }
        Commands::Summary { command } => summary::process_summary_command(command),
        Commands::Rule { command } => rules::process_rule_command(command),
        Commands::Config { command } => config::process_config_command(command),
    }
}
