//! # Harvest
//!
//! **A configurable middleware dispatcher.**
//!
//! Harvest runs HTTP requests through an ordered profile of middleware
//! stages. Each stage may answer the request itself or hand it on with
//! [`Next::handle`](middleware::Next::handle); responses and errors travel
//! back through every stage that handed the request on.
//!
//! - **Grouped ordering** – stages sort by group, then priority
//! - **Deferred stages** – declare middleware by name, build on first use
//! - **Error unwinding** – outer stages see and may recover from inner errors
//! - **Built-in stages** – error pages, HTTPS, CORS, default headers, 304s
//!
//! ## Quick Start
//!
//! ```
//! use harvest::prelude::*;
//! use harvest::config::HarvestConfig;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let mut harvest = Harvest::new(HarvestConfig::development());
//! harvest.registry_mut().register("Hello", |_parameters| {
//!     let hello = FnMiddleware::new(|_request: Request, _next: Next| async {
//!         Ok::<_, HarvestError>(Response::text(http::StatusCode::OK, "hello"))
//!     });
//!     Ok(Arc::new(hello) as Arc<dyn Middleware>)
//! });
//!
//! let mut profile = harvest.profile();
//! profile.add_with("Hello", Some(MiddlewareGroup::Generator), None);
//!
//! let response = Dispatcher::new(profile)
//!     .handle(http::Request::new(Default::default()))
//!     .await
//!     .unwrap();
//! assert_eq!(response.status(), http::StatusCode::OK);
//! assert_eq!(response.headers()["x-frame-options"], "SAMEORIGIN");
//! # });
//! ```
//!
//! ## Architecture
//!
//! ```text
//! HarvestConfig ─→ Registry (built-ins + yours) ─→ Profile ─→ Dispatcher
//!                                                               │
//! Request → ErrorHandler → Inbound → Outbound → Generic → Generator
//! ```

#![doc(html_root_url = "https://docs.rs/harvest/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use harvest_config::{ConfigError, ConfigLoader, HarvestConfig, StageConfig};
use harvest_middleware::{stages, DeferredSpec, Dispatcher, Profile, Registry, Resolver};
use harvest_telemetry::TelemetryError;
use thiserror::Error;
use tracing::info;

// Re-export core types
pub use harvest_core as core;

// Re-export middleware types
pub use harvest_middleware as middleware;

// Re-export configuration types
pub use harvest_config as config;

// Re-export logging setup
pub use harvest_telemetry as telemetry;

/// Environment variable prefix read by [`Harvest::load`].
pub const ENV_PREFIX: &str = "HARVEST";

/// Configuration file read by [`Harvest::load`] when present.
pub const CONFIG_FILE: &str = "harvest.toml";

/// Errors raised while bootstrapping Harvest.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logging could not be initialized.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// Builds dispatchers from a [`HarvestConfig`].
///
/// The registry starts with every built-in stage configured for the
/// configured environment. Register application middleware with
/// [`registry_mut`](Self::registry_mut) before building profiles.
#[derive(Debug, Clone)]
pub struct Harvest {
    config: HarvestConfig,
    registry: Registry,
}

impl Harvest {
    /// Creates a builder for `config`.
    pub fn new(config: HarvestConfig) -> Self {
        let registry = Registry::with_builtins(config.environment);
        Self { config, registry }
    }

    /// Loads configuration from `.env`, an optional `harvest.toml` and
    /// `HARVEST__*` environment variables.
    pub fn load() -> Result<Self, Error> {
        let config = ConfigLoader::new()
            .with_dotenv()
            .with_optional_file(CONFIG_FILE)?
            .with_env_prefix(ENV_PREFIX)
            .load()?;
        Ok(Self::new(config))
    }

    /// The configuration in use.
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// The middleware registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The middleware registry, for registering application middleware.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Installs the global logging subscriber described by the config.
    pub fn init_logging(&self) -> Result<(), Error> {
        harvest_telemetry::init_logging(&self.config.logging)?;
        Ok(())
    }

    /// Builds the configured profile.
    ///
    /// Starts from the stock stages when `profile.use_defaults` is set, then
    /// adds every configured stage in order. A configured stage with the
    /// same name as a stock one replaces it.
    pub fn profile(&self) -> Profile {
        let registry = Arc::new(self.registry.clone());
        let mut profile = if self.config.profile.use_defaults {
            stages::default_profile(registry)
        } else {
            Profile::new().with_resolver(registry as Arc<dyn Resolver>)
        };

        for stage in &self.config.profile.stages {
            profile.add_with(deferred_spec(stage), stage.group, None);
        }

        profile
    }

    /// Builds a dispatcher over [`profile`](Self::profile).
    pub fn dispatcher(&self) -> Dispatcher {
        let dispatcher = Dispatcher::new(self.profile());
        info!(
            environment = %self.config.environment,
            stages = dispatcher.profile().len(),
            "dispatcher ready"
        );
        dispatcher
    }
}

fn deferred_spec(stage: &StageConfig) -> DeferredSpec {
    let mut spec = DeferredSpec::parse(&stage.middleware);
    if stage.optional {
        spec = spec.optional(true);
    }
    if let Some(priority) = stage.priority {
        spec = spec.with_priority(priority);
    }
    spec.with_parameters(stage.parameters.clone())
}

/// Prelude module for convenient imports.
///
/// ```
/// use harvest::prelude::*;
/// ```
pub mod prelude {
    pub use crate::Harvest;

    pub use harvest_core::{
        Environment, HarvestError, HarvestResult, MiddlewareGroup, Request, RequestExt, Response,
        ResponseExt,
    };

    pub use harvest_middleware::{
        Dispatcher, FnMiddleware, Middleware, Next, Profile, Registry, Stage,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::{Environment, MiddlewareGroup};

    #[test]
    fn test_registry_follows_environment() {
        let harvest = Harvest::new(HarvestConfig::development());
        assert!(harvest.registry().contains("OverrideMethod"));
        assert_eq!(harvest.config().environment, Environment::Development);
    }

    #[test]
    fn test_default_profile() {
        let harvest = Harvest::new(HarvestConfig::default());
        let profile = harvest.profile();
        assert_eq!(profile.len(), stages::DEFAULT_STAGES.len());
        assert!(stages::DEFAULT_STAGES.iter().all(|name| profile.has(*name)));
    }

    #[test]
    fn test_configured_stages_follow_defaults() {
        let mut config = HarvestConfig::default();
        let mut stage = StageConfig::new("?OverrideMethod:3");
        stage.group = Some(MiddlewareGroup::Generic);
        config.profile.stages.push(stage);

        let profile = Harvest::new(config).profile();
        let added = profile.get("OverrideMethod").unwrap();
        assert!(added.is_optional());
        assert_eq!(added.priority(), 3);
        assert_eq!(added.group(), MiddlewareGroup::Generic);
        assert_eq!(profile.len(), stages::DEFAULT_STAGES.len() + 1);
    }

    #[test]
    fn test_explicit_priority_wins() {
        let mut stage = StageConfig::new("Cors:5");
        stage.priority = Some(-20);
        assert_eq!(deferred_spec(&stage).priority(), Some(-20));

        let mut stage = StageConfig::new("Cors");
        stage.optional = true;
        assert!(deferred_spec(&stage).is_optional());
    }

    #[test]
    fn test_without_defaults() {
        let mut config = HarvestConfig::default();
        config.profile.use_defaults = false;
        config.profile.stages.push(StageConfig::new("LastModified"));

        let profile = Harvest::new(config).profile();
        assert_eq!(profile.names().collect::<Vec<_>>(), ["LastModified"]);
    }
}
