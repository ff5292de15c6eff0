//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;
use geoharvest::config::ConfigFileError;
use geoharvest::daemon::DaemonError;
use geoharvest::processor::ProcessorError;
use geoharvest::store::StoreError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Invalid command-line argument
    InvalidArgument(String),
    /// State store could not be opened or queried
    Store(StoreError),
    /// A request could not be processed
    Processor(ProcessorError),
    /// The daemon refused to start
    Daemon(DaemonError),
    /// Failed to build the async runtime
    Runtime(std::io::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        match self {
            CliError::Processor(ProcessorError::UnknownProtocol(_)) => {
                eprintln!();
                eprintln!("Built-in protocols: local, command");
            }
            CliError::Processor(ProcessorError::RequestFailed { .. }) => {
                eprintln!();
                eprintln!("Completed constituents are kept. Run the request again to retry");
                eprintln!("only the failed ones: geoharvest run <id>");
            }
            CliError::Daemon(DaemonError::AlreadyRunning { pid }) => {
                eprintln!();
                eprintln!("Stop the running daemon first (kill {}), or point this", pid);
                eprintln!("instance at a different [store] path in config.ini.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Store(e) => write!(f, "State store error: {}", e),
            CliError::Processor(e) => write!(f, "{}", e),
            CliError::Daemon(e) => write!(f, "Daemon error: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Store(e) => Some(e),
            CliError::Processor(e) => Some(e),
            CliError::Daemon(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Store(e)
    }
}

impl From<ProcessorError> for CliError {
    fn from(e: ProcessorError) -> Self {
        CliError::Processor(e)
    }
}

impl From<DaemonError> for CliError {
    fn from(e: DaemonError) -> Self {
        CliError::Daemon(e)
    }
}
