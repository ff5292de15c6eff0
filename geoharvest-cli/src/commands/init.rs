//! Init command - write the default configuration file.

use geoharvest::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
///
/// An existing file is left untouched unless `force` is set.
pub fn run(force: bool) -> Result<(), CliError> {
    let path = config_file_path();

    if force {
        ConfigFile::default().save_to(&path)?;
        println!("Wrote default configuration: {}", path.display());
        return Ok(());
    }

    if ConfigFile::ensure_exists_at(&path)? {
        println!("Created configuration: {}", path.display());
    } else {
        println!("Configuration already exists: {}", path.display());
        println!("Use --force to overwrite it with defaults.");
    }
    Ok(())
}
