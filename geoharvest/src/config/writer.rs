//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! Produces the commented representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[daemon]
; Maximum number of requests processed at once (default: 4)
max_concurrent_requests = {}
; Seconds between polls for pending requests (default: 5)
poll_interval_secs = {}
; Poll iterations between housekeeping sweeps; 0 = only at startup (default: 12)
; Housekeeping removes process records of workers that are no longer running
housekeeping_every = {}
; Days to keep finished (COMPLETE or FAILED) requests; 0 = keep forever
retention_days = {}

[distributor]
; Ceiling on constituents processed at once within one request; 0 = no ceiling
; The effective value is also capped by the retriever and the request itself
max_running = {}

[store]
; JSON file holding requests, constituents and process records
path = {}

[retrievers]
; Root directory for request destinations given as relative paths
output_root = {}
; Maximum constituents a single request may decompose into; 0 = unlimited
max_constituents = {}
; Cap on concurrent external tool runs per request (command protocol); 0 = no cap
command_max_concurrency = {}

[logging]
; Log file path (default: ~/.geoharvest/geoharvest.log)
file = {}
"#,
        config.daemon.max_concurrent_requests,
        config.daemon.poll_interval_secs,
        config.daemon.housekeeping_every,
        config.daemon.retention_days,
        config.distributor.max_running,
        path_to_string(&config.store.path),
        path_to_string(&config.retrievers.output_root),
        config.retrievers.max_constituents,
        config.retrievers.command_max_concurrency,
        path_to_string(&config.logging.file),
    )
}

/// Renders a path, abbreviating the home directory as `~`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
