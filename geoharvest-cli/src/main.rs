//! geoharvest CLI - Command-line interface
//!
//! This binary provides a command-line interface to the geoharvest library:
//! submitting requests, inspecting their derived state, and running them
//! either in the foreground or through the job daemon.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::submit::SubmitArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "geoharvest")]
#[command(version = geoharvest::VERSION)]
#[command(about = "Orchestrate satellite imagery retrieval requests", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration to ~/.geoharvest/config.ini
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Queue a new request for processing
    Submit {
        /// Human-readable request name
        name: String,

        /// Retrieval protocol (e.g. local, command)
        protocol: String,

        /// Directory where the request's outputs land
        destination: PathBuf,

        /// Retriever parameter as key=value (repeatable; values may be JSON)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Retriever parameters as a JSON object
        #[arg(long, value_name = "JSON")]
        params_json: Option<String>,

        /// Maximum constituents processed at once (0 = no limit)
        #[arg(long, default_value = "0")]
        concurrency: usize,
    },

    /// Show the derived state of one request, or of all requests
    Status {
        /// Request id (e.g. 7 or request-7)
        id: Option<String>,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Process one request in the foreground (resumes a failed request)
    Run {
        /// Request id (e.g. 7 or request-7)
        id: String,
    },

    /// Run the job daemon until interrupted
    Daemon,

    /// Remove process records left behind by dead processes
    Housekeep,

    /// Delete finished requests older than the retention window
    Purge {
        /// Retention window in days (default: [daemon] retention_days)
        #[arg(long)]
        days: Option<u32>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        e.exit();
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    // init must work before any config or store exists
    if let Commands::Init { force } = cli.command {
        return commands::init::run(force);
    }

    let runner = CliRunner::with_debug(cli.debug)?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Submit {
            name,
            protocol,
            destination,
            params,
            params_json,
            concurrency,
        } => commands::submit::run(
            &runner,
            SubmitArgs {
                name,
                protocol,
                destination,
                params,
                params_json,
                concurrency,
            },
        ),
        Commands::Status { id, json } => commands::status::run(&runner, id, json),
        Commands::Run { id } => commands::run::run(&runner, &id),
        Commands::Daemon => commands::daemon::run(&runner),
        Commands::Housekeep => commands::maintenance::housekeep(&runner),
        Commands::Purge { days } => commands::maintenance::purge(&runner, days),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_submit_arguments() {
        let cli = Cli::try_parse_from([
            "geoharvest",
            "submit",
            "scenes",
            "local",
            "/data/out",
            "--param",
            "mosaic=true",
            "--param",
            "label=north",
            "--concurrency",
            "3",
        ])
        .unwrap();

        match cli.command {
            Commands::Submit {
                name,
                protocol,
                destination,
                params,
                params_json,
                concurrency,
            } => {
                assert_eq!(name, "scenes");
                assert_eq!(protocol, "local");
                assert_eq!(destination, PathBuf::from("/data/out"));
                assert_eq!(params, vec!["mosaic=true", "label=north"]);
                assert!(params_json.is_none());
                assert_eq!(concurrency, 3);
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn test_global_debug_flag() {
        let cli = Cli::try_parse_from(["geoharvest", "status", "--debug", "7"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.command, Commands::Status { id: Some(ref id), json: false } if id == "7"));
    }
}
