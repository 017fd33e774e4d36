//! Loading [`RelayConfig`] from disk.

use std::path::Path;

use tracing::debug;

use crate::domain::config::{ConfigError, RelayConfig};

/// Reads and validates a TOML config file.
///
/// # Errors
///
/// - [`ConfigError::Io`] if the file cannot be read (including "not found";
///   an explicitly requested config file must exist).
/// - [`ConfigError::Parse`] / [`ConfigError::Invalid`] as for
///   [`RelayConfig::from_toml_str`].
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = RelayConfig::from_toml_str(&text)?;
    debug!("loaded config from {}", path.display());
    Ok(config)
}
