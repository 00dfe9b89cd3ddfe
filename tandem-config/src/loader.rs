//! Configuration loading and environment variable handling

use crate::error::{ConfigError, ConfigResult};
use crate::options::SupervisorOptions;
use crate::utils::parse_optional_seconds;
use crate::validation::Validatable;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Loads [`SupervisorOptions`] from YAML (or JSON) files and `TANDEM_*`
/// environment variables
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "TANDEM".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load options from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<SupervisorOptions> {
        let content = std::fs::read_to_string(path)?;
        let mut options: SupervisorOptions = if content.trim().is_empty() {
            SupervisorOptions::default()
        } else {
            serde_yaml::from_str(&content)?
        };

        self.apply_env_overrides(&mut options)?;
        options.validate()?;

        Ok(options)
    }

    /// Load options from environment variables only
    pub fn from_env(&self) -> ConfigResult<SupervisorOptions> {
        let mut options = SupervisorOptions::default();
        self.apply_env_overrides(&mut options)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<SupervisorOptions> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to options
    fn apply_env_overrides(&self, options: &mut SupervisorOptions) -> ConfigResult<()> {
        if let Ok(path) = self.get_env_var("EXECUTABLE_PATH") {
            options.executable_path = Some(PathBuf::from(path));
        }

        if let Ok(idle) = self.get_env_var("IDLE_TIMEOUT") {
            options.idle_timeout = parse_optional_seconds(&idle)
                .map_err(|e| ConfigError::EnvError(format!("Invalid IDLE_TIMEOUT: {}", e)))?;
        }

        if let Ok(read) = self.get_env_var("READ_TIMEOUT") {
            options.read_timeout = parse_optional_seconds(&read)
                .map_err(|e| ConfigError::EnvError(format!("Invalid READ_TIMEOUT: {}", e)))?;
        }

        if let Ok(stop) = self.get_env_var("STOP_TIMEOUT") {
            options.stop_timeout = parse_optional_seconds(&stop)
                .map_err(|e| ConfigError::EnvError(format!("Invalid STOP_TIMEOUT: {}", e)))?
                .unwrap_or(Duration::ZERO);
        }

        if let Ok(debug) = self.get_env_var("DEBUG") {
            options.debug = debug
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid DEBUG: {}", e)))?;
        }

        if let Ok(console) = self.get_env_var("LOG_NODE_CONSOLE") {
            options.log_node_console = console
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid LOG_NODE_CONSOLE: {}", e)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file_with_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "idle_timeout: 5\nread_timeout: ~\ndebug: true\nfoo: bar").unwrap();

        std::env::set_var("TANDEM_LOADER_FILE_STOP_TIMEOUT", "0.25");
        let options = ConfigLoader::with_prefix("TANDEM_LOADER_FILE")
            .from_file(file.path())
            .unwrap();
        std::env::remove_var("TANDEM_LOADER_FILE_STOP_TIMEOUT");

        assert_eq!(options.idle_timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.read_timeout, None);
        assert_eq!(options.stop_timeout, Duration::from_millis(250));
        assert!(options.debug);
        assert_eq!(options.extra_option("foo"), Some(&serde_json::json!("bar")));
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        std::env::set_var("TANDEM_LOADER_BAD_DEBUG", "perhaps");
        let result = ConfigLoader::with_prefix("TANDEM_LOADER_BAD").from_env();
        std::env::remove_var("TANDEM_LOADER_BAD_DEBUG");

        assert!(matches!(result, Err(ConfigError::EnvError(_))));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let options = ConfigLoader::with_prefix("TANDEM_LOADER_NONE")
            .load(None::<&Path>)
            .unwrap();
        assert_eq!(options, SupervisorOptions::default());
    }
}
