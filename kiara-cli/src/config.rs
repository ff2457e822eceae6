use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use kiara::orchestrator::{
    DEFAULT_ADD_ROW_ALT, DEFAULT_BASE_URL, DEFAULT_SAVE_BUTTON_ALT, DEFAULT_TIMESHEET_URL,
};
use kiara::Settings;

pub const CONFIG_FILE_NAME: &str = "kiara.yaml";
const DEFAULT_PROJECT: &str = "CS0126444 - Wonen Cloudzone - dedicated operationeel projectteam";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Config file '{0}' does not exist")]
    Missing(PathBuf),
}

/// Settings read from `kiara.yaml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub input_file: Option<PathBuf>,
    /// Project left expanded after the run.
    pub preferred_project: Option<String>,
    /// Project of rows whose Project column is empty.
    pub default_project: String,
    /// Projects listed under the "Algemene Taken" section.
    pub general_tasks: Vec<String>,
    pub auto_submit: bool,
    /// itsme phone number; without it no login is attempted.
    pub phone_number: Option<String>,
    pub cdp_url: String,
    /// Substring of the URL of the browser tab to attach to.
    pub tab_url_pattern: Option<String>,
    pub base_url: String,
    pub timesheet_url: String,
    pub add_row_alt: String,
    pub save_button_alt: String,
    pub timeout_ms: u64,
    pub auth_timeout_ms: u64,
    /// Keys the file did not set, filled in from the defaults.
    #[serde(skip)]
    pub defaulted: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            input_file: None,
            preferred_project: None,
            default_project: DEFAULT_PROJECT.to_string(),
            general_tasks: Vec::new(),
            auto_submit: false,
            phone_number: None,
            cdp_url: "http://localhost:9222".to_string(),
            tab_url_pattern: Some("kiara.vlaanderen.be".to_string()),
            base_url: DEFAULT_BASE_URL.to_string(),
            timesheet_url: DEFAULT_TIMESHEET_URL.to_string(),
            add_row_alt: DEFAULT_ADD_ROW_ALT.to_string(),
            save_button_alt: DEFAULT_SAVE_BUTTON_ALT.to_string(),
            timeout_ms: 30_000,
            auth_timeout_ms: 180_000,
            defaulted: Vec::new(),
        }
    }
}

impl Config {
    /// `~/.config/kiara/kiara.yaml` or the platform equivalent.
    pub fn user_config_file() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kiara").join(CONFIG_FILE_NAME))
    }

    /// The config file to use: `explicit`, else `./kiara.yaml`, else the user
    /// config file. An explicit path must exist; otherwise `None` when no
    /// file is found.
    pub fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::Missing(path.to_path_buf()));
            }
            return Ok(Some(path.to_path_buf()));
        }
        Ok(std::iter::once(PathBuf::from(CONFIG_FILE_NAME))
            .chain(Self::user_config_file())
            .find(|path| path.exists()))
    }

    /// Load `path`, or the defaults without a file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes to unit, not to a map.
        let document: Value = if content.trim().is_empty() {
            Value::Null
        } else {
            serde_yaml::from_str(content)?
        };
        let mut config: Config = if document.is_null() {
            Self::default()
        } else {
            serde_yaml::from_value(document.clone())?
        };

        let known = serde_yaml::to_value(Self::default())?;
        config.defaulted = match known.as_mapping() {
            Some(keys) => keys
                .keys()
                .filter_map(Value::as_str)
                .filter(|key| document.get(*key).is_none())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };
        Ok(config)
    }

    pub fn settings(&self) -> Settings {
        Settings {
            base_url: self.base_url.clone(),
            timesheet_url: self.timesheet_url.clone(),
            add_row_alt: self.add_row_alt.clone(),
            save_button_alt: self.save_button_alt.clone(),
            preferred_project: self.preferred_project.clone(),
            auto_submit: self.auto_submit,
            timeout: Duration::from_millis(self.timeout_ms),
            navigation_timeout: Duration::from_millis(self.timeout_ms),
            auth_timeout: Duration::from_millis(self.auth_timeout_ms),
            ..Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = Config::from_yaml("auto_submit: true\ngeneral_tasks: [Opleiding]\n").unwrap();

        assert!(config.auto_submit);
        assert_eq!(config.general_tasks, vec!["Opleiding".to_string()]);
        assert_eq!(config.cdp_url, "http://localhost:9222");
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.default_project, DEFAULT_PROJECT);
    }

    #[test]
    fn empty_file_is_the_default_config() {
        let config = Config::from_yaml("  \n").unwrap();

        assert_eq!(config.defaulted.len(), 15);
        assert_eq!(
            Config {
                defaulted: Vec::new(),
                ..config
            },
            Config::default()
        );
    }

    #[test]
    fn unset_keys_are_recorded() {
        let config = Config::from_yaml("auto_submit: true\nphone_number: null\n").unwrap();

        assert!(config.defaulted.contains(&"cdp_url".to_string()));
        assert!(config.defaulted.contains(&"timeout_ms".to_string()));
        assert!(!config.defaulted.contains(&"auto_submit".to_string()));
        assert!(!config.defaulted.contains(&"phone_number".to_string()));
    }

    #[test]
    fn loads_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "log_level: debug\npreferred_project: ACMDS\ntimeout_ms: 5000").unwrap();

        let path = Config::locate(Some(file.path())).unwrap();
        let config = Config::load(path.as_deref()).unwrap();
        assert_eq!(config.log_level, "debug");

        let settings = config.settings();
        assert_eq!(settings.preferred_project.as_deref(), Some("ACMDS"));
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(settings.timesheet_url, DEFAULT_TIMESHEET_URL);
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::locate(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn malformed_file_is_reported_with_its_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "auto_submit: [not, a, bool]").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}
