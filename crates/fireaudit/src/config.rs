//! Configuration management for fireaudit.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "fireaudit";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "assessment.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `FIREAUDIT_`)
/// 2. TOML config file at `~/.config/fireaudit/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Report export configuration.
    pub export: ExportConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/fireaudit/assessment.db`
    pub database_path: Option<PathBuf>,
}

/// Report export configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory generated reports are written to.
    /// Defaults to the current directory.
    pub output_dir: Option<PathBuf>,
    /// Title printed on the cover page and text report.
    pub report_title: String,
    /// Values longer than this many characters are wrapped below their label.
    pub wrap_threshold: usize,
    /// Maximum characters per wrapped line.
    pub wrap_width: usize,
    /// Page margin in millimetres (applied uniformly).
    pub margin_mm: f32,
    /// Start every section heading on a fresh page.
    pub new_page_per_section: bool,
    /// Upper bound on generated pages. Set to 0 for unlimited.
    pub max_pages: usize,
    /// Bundle extracted images into the archive.
    pub include_images: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            report_title: "Fire Risk Assessment Report".to_string(),
            wrap_threshold: 40,
            wrap_width: 90,
            margin_mm: 20.0,
            new_page_per_section: false,
            max_pages: 500,
            include_images: true,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("FIREAUDIT_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let export = &self.export;

        if export.wrap_width == 0 {
            return Err(Error::ConfigValidation {
                message: "wrap_width must be greater than 0".to_string(),
            });
        }

        if export.wrap_threshold > export.wrap_width {
            return Err(Error::ConfigValidation {
                message: format!(
                    "wrap_threshold ({}) cannot be greater than wrap_width ({})",
                    export.wrap_threshold, export.wrap_width
                ),
            });
        }

        // A4 is 210mm wide; leave at least half the page for content.
        if !(0.0..=50.0).contains(&export.margin_mm) {
            return Err(Error::ConfigValidation {
                message: format!("margin_mm ({}) must be between 0 and 50", export.margin_mm),
            });
        }

        if export.report_title.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "report_title cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the export output directory, resolving defaults if not set.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.export
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the page limit, `None` when unlimited.
    #[must_use]
    pub fn max_pages(&self) -> Option<usize> {
        (self.export.max_pages > 0).then_some(self.export.max_pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.storage.database_path.is_none());
        assert!(config.export.include_images);
        assert!(!config.export.new_page_per_section);
        assert_eq!(config.export.wrap_threshold, 40);
    }

    #[test]
    fn test_default_export_config() {
        let export = ExportConfig::default();

        assert_eq!(export.report_title, "Fire Risk Assessment Report");
        assert_eq!(export.wrap_width, 90);
        assert!((export.margin_mm - 20.0).abs() < f32::EPSILON);
        assert_eq!(export.max_pages, 500);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_wrap_width() {
        let mut config = Config::default();
        config.export.wrap_width = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("wrap_width"));
    }

    #[test]
    fn test_validate_threshold_above_width() {
        let mut config = Config::default();
        config.export.wrap_threshold = 120;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("wrap_threshold"));
    }

    #[test]
    fn test_validate_margin_out_of_range() {
        let mut config = Config::default();
        config.export.margin_mm = 80.0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("margin_mm"));
    }

    #[test]
    fn test_validate_blank_title() {
        let mut config = Config::default();
        config.export.report_title = "   ".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        let path = config.database_path();

        assert!(path.to_string_lossy().contains("assessment.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_output_dir_default() {
        let config = Config::default();
        assert_eq!(config.output_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_max_pages_unlimited_when_zero() {
        let mut config = Config::default();
        config.export.max_pages = 0;
        assert!(config.max_pages().is_none());

        config.export.max_pages = 3;
        assert_eq!(config.max_pages(), Some(3));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("fireaudit"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[export]\nreport_title = \"Substation Survey\"\nnew_page_per_section = true\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.export.report_title, "Substation Survey");
        assert!(config.export.new_page_per_section);
        assert_eq!(config.export.wrap_threshold, 40);
    }

    #[test]
    fn test_export_config_deserialize() {
        let json = r#"{"wrap_threshold": 30, "include_images": false}"#;
        let export: ExportConfig = serde_json::from_str(json).unwrap();
        assert_eq!(export.wrap_threshold, 30);
        assert!(!export.include_images);
        assert_eq!(export.wrap_width, 90);
    }
}
