// Configuration loader for the subtitle service
//
// This module handles loading configuration from the TOML configuration file
// and environment variables with appropriate precedence.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use toml::Value;

const CONFIG_FILE_PATH: &str = "subtitle_studio.conf";
const ENV_CONFIG_FILE: &str = "SUBTITLE_STUDIO_CONFIG";

/// Loads configuration from the TOML file and environment variables
///
/// The file path is taken from `SUBTITLE_STUDIO_CONFIG`, falling back to
/// `subtitle_studio.conf` in the working directory.
///
/// Configuration precedence (highest to lowest):
/// 1. Environment variables
/// 2. Configuration file values
/// 3. Default values (not handled here - application defaults)
///
/// # Returns
///
/// Returns true if the config file was successfully loaded, false otherwise
pub fn load_config() -> bool {
    let path = env::var(ENV_CONFIG_FILE).unwrap_or_else(|_| String::from(CONFIG_FILE_PATH));
    load_config_from(Path::new(&path))
}

/// Loads a flat TOML file into environment variables that are not already set
pub fn load_config_from(config_path: &Path) -> bool {
    if !config_path.exists() {
        debug!("Configuration file not found at: {}", config_path.display());
        return false;
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read configuration file: {}", e);
            return false;
        }
    };

    let config_map = match parse_flat_toml(&config_content) {
        Ok(map) => map,
        Err(e) => {
            warn!("Failed to parse configuration file: {}", e);
            return false;
        }
    };

    for (key, value) in config_map {
        // Only set if the environment variable doesn't already exist
        if env::var(&key).is_err() {
            debug!("Setting env var from config file: {} = {}", key, value);
            env::set_var(key, value);
        } else {
            debug!("Env var already exists, skipping: {}", key);
        }
    }

    info!("Configuration loaded from {}", config_path.display());
    true
}

/// Convert a flat TOML document into key/value strings
///
/// Arrays and tables are skipped with a warning.
fn parse_flat_toml(content: &str) -> Result<HashMap<String, String>, toml::de::Error> {
    let values: Value = content.parse()?;
    let mut config_map = HashMap::new();

    if let Value::Table(table) = values {
        for (key, value) in table {
            match value {
                Value::String(s) => {
                    config_map.insert(key, s);
                }
                Value::Integer(i) => {
                    config_map.insert(key, i.to_string());
                }
                Value::Float(f) => {
                    config_map.insert(key, f.to_string());
                }
                Value::Boolean(b) => {
                    config_map.insert(key, b.to_string());
                }
                _ => {
                    warn!("Skipping unsupported TOML value type for key: {}", key);
                }
            }
        }
    }

    Ok(config_map)
}
