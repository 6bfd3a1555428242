//! Configuration loading and config file resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `CHW_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/chw/transitions.toml` on Linux)
//! 4. Built-in defaults (no file)
//!
//! An explicitly requested file (1 or 2) must exist. A missing file at the
//! platform location only produces a warning.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "CHW_CONFIG";

/// Transitions configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Locale for generated messages
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Place types eligible for reference-id matching, in order
    #[serde(default = "default_contact_types")]
    pub contact_types: Vec<ContactType>,

    /// Form definitions keyed by form code
    #[serde(default)]
    pub forms: HashMap<String, FormDefinition>,

    /// Message overrides: locale → key → text
    #[serde(default)]
    pub translations: HashMap<String, HashMap<String, String>>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            logging: LoggingConfig::default(),
            contact_types: default_contact_types(),
            forms: HashMap::new(),
            translations: HashMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Place type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactType {
    pub id: String,
    /// Types this place may be nested under
    #[serde(default)]
    pub parents: Vec<String>,
}

/// Form definition (only the fields transitions consult)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDefinition {
    /// Public forms accept submissions from unknown senders
    #[serde(default)]
    pub public_form: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_contact_types() -> Vec<ContactType> {
    let place = |id: &str, parent: Option<&str>| ContactType {
        id: id.to_string(),
        parents: parent.map(|p| vec![p.to_string()]).unwrap_or_default(),
    };
    vec![
        place("district_hospital", None),
        place("health_center", Some("district_hospital")),
        place("clinic", Some("health_center")),
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where the config file path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine,
    Environment,
    PlatformDefault,
}

/// Resolve the config file path following the priority order above
///
/// Returns `None` only when no platform config directory exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<(PathBuf, ConfigSource)> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some((path.to_path_buf(), ConfigSource::CommandLine));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some((PathBuf::from(path), ConfigSource::Environment));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().map(|path| (path, ConfigSource::PlatformDefault))
}

/// Platform config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chw").join("transitions.toml"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Resolve and load configuration, falling back to defaults when appropriate
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    // Priority 4: Built-in defaults
    let Some((path, source)) = resolve_config_path(cli_arg) else {
        warn!("No config directory available, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        if source == ConfigSource::PlatformDefault {
            warn!(
                "Config file not found at {}, using built-in defaults",
                path.display()
            );
            return Ok(TomlConfig::default());
        }
        return Err(Error::NotFound(format!(
            "Config file {} ({:?})",
            path.display(),
            source
        )));
    }

    let config = load_toml_config(&path)?;
    info!(
        path = %path.display(),
        contact_types = config.contact_types.len(),
        forms = config.forms.len(),
        "Configuration loaded"
    );
    Ok(config)
}

fn validate(config: &TomlConfig) -> Result<()> {
    if config.locale.trim().is_empty() {
        return Err(Error::Config("locale must not be empty".to_string()));
    }
    if let Some(blank) = config.contact_types.iter().find(|t| t.id.trim().is_empty()) {
        return Err(Error::Config(format!(
            "contact type with empty id (parents: {:?})",
            blank.parents
        )));
    }
    Ok(())
}
