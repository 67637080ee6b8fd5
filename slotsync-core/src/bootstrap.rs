//! Configuration loading

use std::path::{Path, PathBuf};

use crate::{Config, Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SLOTSYNC_CONFIG_PATH";

/// Load, validate and normalize the configuration
///
/// Config file search order:
/// 1. `explicit` (from the command line)
/// 2. `SLOTSYNC_CONFIG_PATH` environment variable
/// 3. ./slotsync.toml (current working directory)
/// 4. Environment variables only
///
/// Runs before logging is initialised, so progress goes to stderr.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config_path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .or_else(|| {
            let cwd = Path::new("slotsync.toml");
            cwd.exists().then(|| cwd.to_path_buf())
        });

    let mut config = match config_path {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Configuration(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            eprintln!("Loading config from {}", path.display());
            Config::load(Some(&path))?
        }
        None => {
            eprintln!("No config file found, using environment variables");
            Config::from_env()?
        }
    };

    // Fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(Error::Configuration(format!(
            "validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        )));
    }

    config.absolutize_paths()?;

    Ok(config)
}
