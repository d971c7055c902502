//! Engine configuration via `covenant.toml`
//!
//! A registry is created from an [`EngineConfig`], either built in code or read
//! from a TOML file. Settings are read once when the registry is created.

use covenant_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "covenant.toml";

/// How to treat an override marker on a feature no ancestor declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideStrictness {
    /// Reject with `UnnecessaryOverride`
    #[default]
    Strict,
    /// Accept silently
    Lenient,
}

/// Engine configuration loaded from `covenant.toml`.
///
/// # Example
///
/// ```toml
/// # Contract enforcement on (default) or off for every type
/// checked = true
///
/// # "strict" (default) rejects override markers with nothing to override,
/// # "lenient" accepts them
/// override_strictness = "strict"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Global checked mode. When false, no dispatch table wraps anything and
    /// override verification is skipped.
    #[serde(default = "default_checked")]
    pub checked: bool,

    /// Treatment of unnecessary override markers.
    #[serde(default)]
    pub override_strictness: OverrideStrictness,
}

fn default_checked() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            checked: true,
            override_strictness: OverrideStrictness::Strict,
        }
    }
}

impl EngineConfig {
    /// Configuration with enforcement switched off.
    pub fn unchecked() -> Self {
        EngineConfig {
            checked: false,
            ..Self::default()
        }
    }

    /// Set global checked mode.
    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    /// Set override strictness.
    pub fn with_override_strictness(mut self, strictness: OverrideStrictness) -> Self {
        self.override_strictness = strictness;
        self
    }

    /// Default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Covenant engine configuration
#
# Contract enforcement: true (default) or false.
# false installs the original feature bodies with no wrapping and skips
# override verification.
checked = true

# Override markers on features that no ancestor declares:
# "strict" (default) = reject with an unnecessary-override error
# "lenient"          = accept
override_strictness = "strict"
"#
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_checked_and_strict() {
        let config = EngineConfig::default();
        assert!(config.checked);
        assert_eq!(config.override_strictness, OverrideStrictness::Strict);
    }

    #[test]
    fn test_default_toml_parses_correctly() {
        let config = EngineConfig::from_toml_str(EngineConfig::default_toml()).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());

        let config = EngineConfig::from_toml_str("checked = false").unwrap();
        assert!(!config.checked);
        assert_eq!(config.override_strictness, OverrideStrictness::Strict);
    }

    #[test]
    fn test_parse_lenient() {
        let config = EngineConfig::from_toml_str("override_strictness = \"lenient\"").unwrap();
        assert_eq!(config.override_strictness, OverrideStrictness::Lenient);
    }

    #[test]
    fn test_invalid_strictness_returns_error() {
        let result = EngineConfig::from_toml_str("override_strictness = \"sloppy\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        EngineConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());

        let config = EngineConfig::from_file(&path).unwrap();
        assert!(config.checked);
    }

    #[test]
    fn test_write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "checked = false\n").unwrap();
        EngineConfig::write_default_if_missing(&path).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert!(!config.checked);
    }

    #[test]
    fn test_write_to_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let config = EngineConfig::unchecked().with_override_strictness(OverrideStrictness::Lenient);
        config.write_to_file(&path).unwrap();

        assert_eq!(EngineConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let result = EngineConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
