//! Unit tests for settings parsing and overrides.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use rigbuilder::config::{LogFormat, SETTINGS_FILE, Settings, default_local_modules};
use rigbuilder_core::UpdateSource;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =============================================================================
// DEFAULTS
// =============================================================================

#[test]
fn test_defaults() {
    let settings = Settings::default();
    assert_eq!(settings.update_source, UpdateSource::All);
    assert_eq!(settings.log_format, LogFormat::Text);
    assert_eq!(settings.local_modules, default_local_modules());
    assert!(settings.local_modules.ends_with("rigBuilder/modules"));
    assert!(settings.editor.is_none());
}

#[test]
fn test_empty_toml_is_default() {
    assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
}

// =============================================================================
// TOML PARSING
// =============================================================================

#[test]
fn test_full_toml() {
    let settings = Settings::from_toml(
        r#"
server_modules = "/studio/rigBuilder/modules"
local_modules = "/home/rigger/rigBuilder/modules"
update_source = "server"
log_format = "json"
editor = "code"
"#,
    )
    .unwrap();

    assert_eq!(
        settings.server_modules,
        PathBuf::from("/studio/rigBuilder/modules")
    );
    assert_eq!(
        settings.local_modules,
        PathBuf::from("/home/rigger/rigBuilder/modules")
    );
    assert_eq!(settings.update_source, UpdateSource::Server);
    assert_eq!(settings.log_format, LogFormat::Json);
    assert_eq!(settings.editor.as_deref(), Some("code"));
}

#[test]
fn test_invalid_update_source_is_rejected() {
    assert!(Settings::from_toml("update_source = \"cloud\"").is_err());
}

#[test]
fn test_malformed_toml_is_rejected() {
    assert!(Settings::from_toml("server_modules = ").is_err());
}

// =============================================================================
// LOADING
// =============================================================================

#[test]
fn test_load_missing_default_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::load(None, dir.path()).unwrap();
    assert_eq!(settings, Settings::default());
}

#[test]
fn test_load_default_file_from_local_root() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(SETTINGS_FILE), "editor = \"vim\"").unwrap();
    let settings = Settings::load(None, dir.path()).unwrap();
    assert_eq!(settings.editor.as_deref(), Some("vim"));
}

#[test]
fn test_explicit_file_wins_over_local_root() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(SETTINGS_FILE), "editor = \"vim\"").unwrap();
    let explicit = dir.path().join("other.toml");
    std::fs::write(&explicit, "editor = \"nano\"").unwrap();

    let settings = Settings::load(Some(&explicit), dir.path()).unwrap();
    assert_eq!(settings.editor.as_deref(), Some("nano"));
}

// =============================================================================
// OVERRIDES
// =============================================================================

#[test]
fn test_env_overrides() {
    let mut settings = Settings::default();
    settings
        .apply_env(|key| match key {
            "RIGBUILDER_SERVER_MODULES" => Some("/srv/modules".to_string()),
            "RIGBUILDER_LOCAL_MODULES" => Some("/home/me/modules".to_string()),
            "RIGBUILDER_LOG_FORMAT" => Some("json".to_string()),
            _ => None,
        })
        .unwrap();

    assert_eq!(settings.server_modules, Path::new("/srv/modules"));
    assert_eq!(settings.local_modules, Path::new("/home/me/modules"));
    assert_eq!(settings.log_format, LogFormat::Json);
}

#[test]
fn test_flag_overrides() {
    let mut settings = Settings::default();
    settings.apply_flags(
        Some(Path::new("/a")),
        None,
        Some(UpdateSource::Local),
    );
    assert_eq!(settings.server_modules, Path::new("/a"));
    assert_eq!(settings.local_modules, default_local_modules());
    assert_eq!(settings.update_source, UpdateSource::Local);
}
