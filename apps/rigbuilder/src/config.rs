//! # Settings
//!
//! Resolution order, lowest to highest priority:
//!
//! 1. Built-in defaults
//! 2. `settings.toml` (`--config`, or `<local modules>/settings.toml`)
//! 3. `RIGBUILDER_*` environment variables
//! 4. Command-line flags

use rigbuilder_core::{RigError, UpdateSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Settings file name inside the local module root.
pub const SETTINGS_FILE: &str = "settings.toml";

pub const ENV_SERVER_MODULES: &str = "RIGBUILDER_SERVER_MODULES";
pub const ENV_LOCAL_MODULES: &str = "RIGBUILDER_LOCAL_MODULES";
pub const ENV_LOG_FORMAT: &str = "RIGBUILDER_LOG_FORMAT";

// =============================================================================
// LOG FORMAT
// =============================================================================

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = RigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(RigError::Deserialization(format!(
                "unknown log format '{}' (expected text or json)",
                other
            ))),
        }
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// User settings of the command-line host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Shared, read-mostly module root.
    pub server_modules: PathBuf,
    /// The user's own module root.
    pub local_modules: PathBuf,
    /// Which UID cache `update` consults.
    pub update_source: UpdateSource,
    pub log_format: LogFormat,
    /// Command used to open module files for editing.
    pub editor: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_modules: default_server_modules(),
            local_modules: default_local_modules(),
            update_source: UpdateSource::All,
            log_format: LogFormat::Text,
            editor: None,
        }
    }
}

/// `~/rigBuilder/modules`, or a relative `rigBuilder/modules` without a home.
pub fn default_local_modules() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("rigBuilder").join("modules"))
        .unwrap_or_else(|| PathBuf::from("rigBuilder").join("modules"))
}

/// `<data dir>/rigBuilder/modules`, or a relative `modules` without one.
pub fn default_server_modules() -> PathBuf {
    dirs::data_dir()
        .map(|data| data.join("rigBuilder").join("modules"))
        .unwrap_or_else(|| PathBuf::from("modules"))
}

impl Settings {
    /// Parse settings from TOML text; missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, RigError> {
        toml::from_str(text).map_err(|e| RigError::Deserialization(format!("settings: {}", e)))
    }

    /// Read a settings file.
    pub fn from_file(path: &Path) -> Result<Self, RigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Load settings from `explicit`, or from `<local_root>/settings.toml`
    /// when it exists.
    ///
    /// An explicit file must exist; a missing default file yields defaults.
    pub fn load(explicit: Option<&Path>, local_root: &Path) -> Result<Self, RigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = local_root.join(SETTINGS_FILE);
                if path.is_file() {
                    tracing::debug!(path = %path.display(), "loading settings");
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply `RIGBUILDER_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), RigError> {
        if let Some(server) = lookup(ENV_SERVER_MODULES).filter(|v| !v.is_empty()) {
            self.server_modules = PathBuf::from(server);
        }
        if let Some(local) = lookup(ENV_LOCAL_MODULES).filter(|v| !v.is_empty()) {
            self.local_modules = PathBuf::from(local);
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT).filter(|v| !v.is_empty()) {
            self.log_format = format.parse()?;
        }
        Ok(())
    }

    /// Apply command-line overrides.
    pub fn apply_flags(
        &mut self,
        server_modules: Option<&Path>,
        local_modules: Option<&Path>,
        source: Option<UpdateSource>,
    ) {
        if let Some(server) = server_modules {
            self.server_modules = server.to_path_buf();
        }
        if let Some(local) = local_modules {
            self.local_modules = local.to_path_buf();
        }
        if let Some(source) = source {
            self.update_source = source;
        }
    }
}
