//! Layered configuration loading.

use std::env;
use std::fs;
use std::path::Path;

use harvest_core::Environment;
use harvest_telemetry::LogFormat;

use crate::{ConfigError, HarvestConfig, StageConfig};

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (or a preset)
/// 2. Configuration file or string (TOML or JSON)
/// 3. Environment variables (`PREFIX__SECTION__KEY`)
///
/// The result is validated by [`load`](Self::load).
///
/// # Example
///
/// ```no_run
/// use harvest_config::ConfigLoader;
///
/// # fn main() -> Result<(), harvest_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_dotenv()
///     .with_optional_file("harvest.toml")?
///     .with_env_prefix("HARVEST")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: HarvestConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new loader starting from [`HarvestConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HarvestConfig::default(),
            env_prefix: None,
        }
    }

    /// Start from the development preset.
    ///
    /// ```
    /// use harvest_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = HarvestConfig::development();
        self
    }

    /// Start from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = HarvestConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension (`.toml` or `.json`). The file
    /// replaces the current configuration; sections it omits take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed,
    /// or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        self.config = match extension.as_deref() {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration file format: {}",
                    path.display()
                )))
            }
        };

        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `"toml"` or `"json"` format.
    ///
    /// ```
    /// use harvest_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     environment = "development"
    ///
    ///     [[profile.stages]]
    ///     middleware = "OverrideMethod"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.profile.stages[0].middleware, "OverrideMethod");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is unknown.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// With prefix `HARVEST`:
    /// - `HARVEST__ENVIRONMENT=development`
    /// - `HARVEST__LOGGING__LEVEL=debug`
    /// - `HARVEST__PROFILE__STAGES=ErrorHandler,?Cors:5`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load variables from a `.env` file, if there is one.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        let _ = dotenvy::dotenv();
        self
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or validation
    /// fails.
    pub fn load(mut self) -> Result<HarvestConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> HarvestConfig {
        self.config
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let scope = format!("{prefix}__");
        let mut vars: Vec<(String, String)> =
            env::vars().filter(|(k, _)| k.starts_with(&scope)).collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let logging = &mut self.config.logging;

        match parts.as_slice() {
            ["ENVIRONMENT"] => {
                self.config.environment = value
                    .parse::<Environment>()
                    .map_err(|reason| ConfigError::env_parse_error(key, reason))?;
            }

            ["LOGGING", "ENABLED"] => logging.enabled = bool_var(key, value)?,
            ["LOGGING", "LEVEL"] => logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                logging.format = value
                    .parse::<LogFormat>()
                    .map_err(|reason| ConfigError::env_parse_error(key, reason))?;
            }
            ["LOGGING", "SPAN_EVENTS"] => logging.span_events = bool_var(key, value)?,
            ["LOGGING", "FILE_LINE_INFO"] => logging.file_line_info = bool_var(key, value)?,
            ["LOGGING", "THREAD_IDS"] => logging.thread_ids = bool_var(key, value)?,
            ["LOGGING", "INCLUDE_TARGET"] => logging.include_target = bool_var(key, value)?,

            ["PROFILE", "USE_DEFAULTS"] => {
                self.config.profile.use_defaults = bool_var(key, value)?;
            }
            ["PROFILE", "STAGES"] => {
                self.config.profile.stages = value
                    .split(',')
                    .map(str::trim)
                    .filter(|spec| !spec.is_empty())
                    .map(StageConfig::new)
                    .collect();
            }

            _ => {}
        }

        Ok(())
    }
}

fn bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::MiddlewareGroup;
    use std::io::Write;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, HarvestConfig::default());
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.environment.is_production());
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"environment": "testing", "profile": {"use_defaults": false}}"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.environment, Environment::Testing);
        assert!(!config.profile.use_defaults);
    }

    #[test]
    fn test_loader_rejects_unknown_format() {
        assert!(ConfigLoader::new().with_string("", "yaml").is_err());
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/harvest.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/harvest.toml")
            .unwrap()
            .load()
            .unwrap();
        assert!(config.profile.use_defaults);
    }

    #[test]
    fn test_loader_with_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            environment = "development"

            [logging]
            level = "warn"
            format = "compact"

            [[profile.stages]]
            middleware = "?Cors:5"
            group = "outbound"

            [profile.stages.parameters]
            allow = ["https://app.example.com"]
            "#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();

        assert!(config.environment.is_development());
        assert_eq!(config.logging.format, LogFormat::Compact);
        let stage = &config.profile.stages[0];
        assert_eq!(stage.type_name(), "Cors");
        assert_eq!(stage.group, Some(MiddlewareGroup::Outbound));
        assert_eq!(
            stage.parameters["allow"],
            serde_json::json!(["https://app.example.com"])
        );
    }

    #[test]
    fn test_loader_with_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"profile": {{"stages": [{{"middleware": "LastModified", "priority": 3}}]}}}}"#)
            .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.profile.stages[0].priority, Some(3));
    }

    #[test]
    fn test_loader_rejects_unknown_fields_in_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nhttp_addr = \"0.0.0.0:80\"").unwrap();

        assert!(matches!(
            ConfigLoader::new().with_file(file.path()),
            Err(ConfigError::TomlError(_))
        ));
    }

    #[test]
    fn test_loader_rejects_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(ConfigLoader::new().with_file(file.path()).is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_apply_env_var_environment() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__ENVIRONMENT", "dev", "TEST")
            .unwrap();
        assert!(loader.config.environment.is_development());
        assert!(loader
            .apply_env_var("TEST__ENVIRONMENT", "staging", "TEST")
            .is_err());
    }

    #[test]
    fn test_apply_env_var_logging() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__LOGGING__LEVEL", "debug", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__LOGGING__FORMAT", "pretty", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__LOGGING__THREAD_IDS", "yes", "TEST")
            .unwrap();
        assert_eq!(loader.config.logging.level, "debug");
        assert_eq!(loader.config.logging.format, LogFormat::Pretty);
        assert!(loader.config.logging.thread_ids);
    }

    #[test]
    fn test_apply_env_var_invalid_boolean() {
        let mut loader = ConfigLoader::new();
        let result = loader.apply_env_var("TEST__PROFILE__USE_DEFAULTS", "sometimes", "TEST");
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));
    }

    #[test]
    fn test_apply_env_var_stages() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__PROFILE__STAGES", "ErrorHandler, ?Cors:5,", "TEST")
            .unwrap();
        let names: Vec<&str> = loader
            .config
            .profile
            .stages
            .iter()
            .map(StageConfig::type_name)
            .collect();
        assert_eq!(names, ["ErrorHandler", "Cors"]);
        assert_eq!(loader.config.profile.stages[1].middleware, "?Cors:5");
    }

    #[test]
    fn test_apply_env_var_unknown_key_ignored() {
        let mut loader = ConfigLoader::new();
        assert!(loader
            .apply_env_var("TEST__SERVER__HTTP_ADDR", "0.0.0.0:80", "TEST")
            .is_ok());
    }
}
