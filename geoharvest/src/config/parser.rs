//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module is the single place where INI key names are mapped to
//! struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [daemon] section
    if let Some(section) = ini.section(Some("daemon")) {
        if let Some(v) = number(section, "daemon", "max_concurrent_requests")? {
            config.daemon.max_concurrent_requests = positive(v, "daemon", "max_concurrent_requests")?;
        }
        if let Some(v) = number(section, "daemon", "poll_interval_secs")? {
            config.daemon.poll_interval_secs = positive(v, "daemon", "poll_interval_secs")?;
        }
        if let Some(v) = number(section, "daemon", "housekeeping_every")? {
            config.daemon.housekeeping_every = v;
        }
        if let Some(v) = number(section, "daemon", "retention_days")? {
            config.daemon.retention_days = v;
        }
    }

    // [distributor] section
    if let Some(section) = ini.section(Some("distributor")) {
        if let Some(v) = number(section, "distributor", "max_running")? {
            config.distributor.max_running = v;
        }
    }

    // [store] section
    if let Some(section) = ini.section(Some("store")) {
        if let Some(v) = path(section, "path") {
            config.store.path = v;
        }
    }

    // [retrievers] section
    if let Some(section) = ini.section(Some("retrievers")) {
        if let Some(v) = path(section, "output_root") {
            config.retrievers.output_root = v;
        }
        if let Some(v) = number(section, "retrievers", "max_constituents")? {
            config.retrievers.max_constituents = v;
        }
        if let Some(v) = number(section, "retrievers", "command_max_concurrency")? {
            config.retrievers.command_max_concurrency = v;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = path(section, "file") {
            config.logging.file = v;
        }
    }

    Ok(config)
}

/// Reads a non-negative integer.
fn number<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<T>, ConfigFileError> {
    let Some(raw) = section.get(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigFileError::InvalidValue {
            section: section_name.to_string(),
            key: key.to_string(),
            value: raw.to_string(),
            reason: "must be a non-negative integer".to_string(),
        })
}

fn positive<T: PartialEq + Default + ToString>(
    value: T,
    section: &str,
    key: &str,
) -> Result<T, ConfigFileError> {
    if value == T::default() {
        return Err(ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}

/// Reads a path, expanding `~/`. Empty values are ignored.
fn path(section: &Properties, key: &str) -> Option<PathBuf> {
    section
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(expand_tilde)
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
