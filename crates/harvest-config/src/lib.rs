//! Typed configuration for Harvest.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Example
//!
//! ```no_run
//! use harvest_config::ConfigLoader;
//!
//! # fn main() -> Result<(), harvest_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_file("harvest.toml")?
//!     .with_env_prefix("HARVEST")
//!     .load()?;
//!
//! println!("running in {}", config.environment);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! environment = "production"
//!
//! [logging]
//! level = "info,harvest_middleware=debug"
//! format = "json"
//!
//! [profile]
//! use_defaults = true
//!
//! [[profile.stages]]
//! middleware = "OverrideMethod"
//! optional = true
//!
//! [[profile.stages]]
//! middleware = "DefaultHeaders"
//! priority = -50
//!
//! [profile.stages.parameters]
//! headers = { "x-powered-by" = "harvest" }
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `HARVEST__ENVIRONMENT=development`
//! - `HARVEST__LOGGING__FORMAT=compact`
//! - `HARVEST__PROFILE__USE_DEFAULTS=false`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;

pub use config::{HarvestConfig, ProfileConfig, StageConfig};
pub use error::ConfigError;
pub use harvest_telemetry::{LogConfig, LogFormat};
pub use loader::ConfigLoader;
