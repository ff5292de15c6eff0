//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub daemon: DaemonSettings,
    pub distributor: DistributorSettings,
    pub store: StoreSettings,
    pub retrievers: RetrieverSettings,
    pub logging: LoggingSettings,
}

/// Job daemon scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    /// Global cap on requests running at once
    pub max_concurrent_requests: usize,
    /// Seconds between polls for pending requests
    pub poll_interval_secs: u64,
    /// Poll iterations between housekeeping sweeps (0 = startup only)
    pub housekeeping_every: u32,
    /// Days to keep finished requests (0 = forever)
    pub retention_days: u32,
}

/// Constituent distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributorSettings {
    /// Ceiling on constituents running at once per request (0 = no ceiling)
    pub max_running: usize,
}

/// State store location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// JSON state file
    pub path: PathBuf,
}

/// Settings handed to every retriever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieverSettings {
    /// Root for relative request destinations
    pub output_root: PathBuf,
    /// Maximum constituents per request (0 = unlimited)
    pub max_constituents: usize,
    /// Cap on concurrent external tool runs per request (0 = no cap)
    pub command_max_concurrency: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}
