//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `ConfigFile::default()`
//! implementation.

use super::settings::*;

/// Default global cap on running requests.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 4;

/// Default seconds between daemon polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default poll iterations between housekeeping sweeps (one minute at the
/// default poll interval).
pub const DEFAULT_HOUSEKEEPING_EVERY: u32 = 12;

/// Default retention in days. Finished requests are kept forever.
pub const DEFAULT_RETENTION_DAYS: u32 = 0;

/// Default per-request constituent ceiling. No ceiling.
pub const DEFAULT_MAX_RUNNING: usize = 0;

/// Default maximum constituents per request. Unlimited.
pub const DEFAULT_MAX_CONSTITUENTS: usize = 0;

/// Default cap on concurrent external tool runs. No cap.
pub const DEFAULT_COMMAND_MAX_CONCURRENCY: usize = 0;

/// File name of the JSON state store inside the config directory.
pub const DEFAULT_STORE_FILE: &str = "state.json";

/// File name of the log file inside the config directory.
pub const DEFAULT_LOG_FILE: &str = "geoharvest.log";

/// Directory name for request outputs inside the config directory.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

impl Default for ConfigFile {
    fn default() -> Self {
        let config_dir = super::file::config_directory();

        Self {
            daemon: DaemonSettings {
                max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
                poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
                housekeeping_every: DEFAULT_HOUSEKEEPING_EVERY,
                retention_days: DEFAULT_RETENTION_DAYS,
            },
            distributor: DistributorSettings {
                max_running: DEFAULT_MAX_RUNNING,
            },
            store: StoreSettings {
                path: config_dir.join(DEFAULT_STORE_FILE),
            },
            retrievers: RetrieverSettings {
                output_root: config_dir.join(DEFAULT_OUTPUT_DIR),
                max_constituents: DEFAULT_MAX_CONSTITUENTS,
                command_max_concurrency: DEFAULT_COMMAND_MAX_CONCURRENCY,
            },
            logging: LoggingSettings {
                file: config_dir.join(DEFAULT_LOG_FILE),
            },
        }
    }
}
