//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`init`] - Write the default configuration file
//! - [`submit`] - Queue a new request
//! - [`status`] - Derived state of one or all requests
//! - [`run`] - Process (or resume) one request in the foreground
//! - [`daemon`] - Run the job daemon until interrupted
//! - [`maintenance`] - One-shot housekeeping and retention purge

pub mod common;
pub mod daemon;
pub mod init;
pub mod maintenance;
pub mod run;
pub mod status;
pub mod submit;
