//! Configuration types.
//!
//! [`HarvestConfig`] is the root. Every section rejects unknown fields and
//! falls back to its defaults when omitted.

use harvest_core::{Environment, MiddlewareGroup};
use harvest_telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::ConfigError;

/// Complete Harvest configuration.
///
/// # Example
///
/// ```
/// use harvest_config::HarvestConfig;
/// use harvest_core::Environment;
///
/// let config = HarvestConfig::default();
/// assert_eq!(config.environment, Environment::Production);
/// assert!(config.profile.use_defaults);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct HarvestConfig {
    /// Runtime environment, consulted by environment-sensitive stages.
    #[serde(default)]
    pub environment: Environment,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LogConfig,

    /// Middleware profile configuration.
    #[serde(default)]
    pub profile: ProfileConfig,
}

impl HarvestConfig {
    /// Development preset: development environment and pretty debug logs.
    #[must_use]
    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            logging: LogConfig::development(),
            profile: ProfileConfig::default(),
        }
    }

    /// Production preset: production environment and JSON logs.
    #[must_use]
    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            logging: LogConfig::production(),
            profile: ProfileConfig::default(),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `logging.level` is not a valid filter directive
    /// - a stage has an empty type name
    ///
    /// Returns `ConfigError::ValidationError` if two stages share a type name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.enabled {
            harvest_telemetry::create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }

        let mut seen = HashSet::new();
        for (index, stage) in self.profile.stages.iter().enumerate() {
            let type_name = stage.type_name();
            if type_name.is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("profile.stages[{index}].middleware"),
                    "type name must not be empty",
                ));
            }
            if !seen.insert(type_name) {
                return Err(ConfigError::validation_error(format!(
                    "stage '{type_name}' is declared more than once"
                )));
            }
        }

        Ok(())
    }
}

/// Which stages the dispatcher runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    /// Start from the stock profile before adding `stages`.
    #[serde(default = "default_use_defaults")]
    pub use_defaults: bool,

    /// Additional deferred stages, in declaration order.
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            use_defaults: default_use_defaults(),
            stages: Vec::new(),
        }
    }
}

fn default_use_defaults() -> bool {
    true
}

/// One deferred stage declaration.
///
/// ```toml
/// [[profile.stages]]
/// middleware = "?Cors:5"
/// group = "outbound"
///
/// [profile.stages.parameters]
/// allow = ["https://app.example.com"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// `[?]TypeName[:priority]`.
    pub middleware: String,

    /// Group override.
    #[serde(default)]
    pub group: Option<MiddlewareGroup>,

    /// Priority override, taking precedence over one in `middleware`.
    #[serde(default)]
    pub priority: Option<i32>,

    /// Skip the stage when it cannot be resolved.
    #[serde(default)]
    pub optional: bool,

    /// Constructor parameters passed to the resolver.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl StageConfig {
    /// Creates a required declaration with no overrides.
    pub fn new(middleware: impl Into<String>) -> Self {
        Self {
            middleware: middleware.into(),
            group: None,
            priority: None,
            optional: false,
            parameters: Map::new(),
        }
    }

    /// The type name with the optional marker and priority suffix removed.
    pub fn type_name(&self) -> &str {
        let spec = self.middleware.trim();
        let spec = spec.strip_prefix('?').unwrap_or(spec);
        spec.split_once(':').map_or(spec, |(name, _)| name).trim()
    }
}
