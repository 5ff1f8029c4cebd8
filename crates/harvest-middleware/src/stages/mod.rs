//! Built-in stages.
//!
//! | Stage | Group | Priority |
//! |---|---|---|
//! | [`ErrorHandler`] | ErrorHandler | -100 |
//! | [`OverrideMethod`] | Inbound | -10 |
//! | [`Https`] | Inbound | -1 |
//! | [`DefaultHeaders`] | Outbound | -9999 |
//! | [`Cors`] | Outbound | -1 |
//! | [`LastModified`] | Outbound | 0 |
//!
//! Each is registered in [`Registry::with_builtins`] under its type name and
//! can be built from deferred-stage parameters.

pub mod cors;
pub mod default_headers;
pub mod error_handler;
pub mod https;
pub mod last_modified;
pub mod override_method;

pub use cors::Cors;
pub use default_headers::DefaultHeaders;
pub use error_handler::{CaughtError, ErrorHandler};
pub use https::Https;
pub use last_modified::LastModified;
pub use override_method::OverrideMethod;

use crate::middleware::Middleware;
use crate::profile::Profile;
use crate::resolver::Registry;
use harvest_core::Environment;
use std::sync::Arc;

/// Stages of the stock profile, in declaration order.
pub const DEFAULT_STAGES: [&str; 5] = ["ErrorHandler", "Https", "DefaultHeaders", "LastModified", "Cors"];

pub(crate) fn register_builtins(registry: &mut Registry, environment: Environment) {
    registry
        .register("ErrorHandler", move |parameters| {
            ErrorHandler::from_parameters(parameters, environment)
                .map(|m| Arc::new(m) as Arc<dyn Middleware>)
        })
        .register("Https", move |parameters| {
            Https::from_parameters(parameters, environment).map(|m| Arc::new(m) as Arc<dyn Middleware>)
        })
        .register("OverrideMethod", move |parameters| {
            OverrideMethod::from_parameters(parameters, environment)
                .map(|m| Arc::new(m) as Arc<dyn Middleware>)
        })
        .register("Cors", move |parameters| {
            Cors::from_parameters(parameters, environment).map(|m| Arc::new(m) as Arc<dyn Middleware>)
        })
        .register_configurable::<DefaultHeaders>("DefaultHeaders")
        .register_default::<LastModified>("LastModified");
}

/// Builds the stock profile as deferred stages resolved by `registry`.
///
/// ```
/// use harvest_middleware::{stages, Registry};
/// use harvest_core::Environment;
/// use std::sync::Arc;
///
/// let profile = stages::default_profile(Arc::new(Registry::with_builtins(Environment::Production)));
/// let order: Vec<String> = profile
///     .to_ordered_list()
///     .iter()
///     .map(|stage| stage.name().to_string())
///     .collect();
/// assert_eq!(order, ["ErrorHandler", "Https", "DefaultHeaders", "Cors", "LastModified"]);
/// ```
pub fn default_profile(registry: Arc<Registry>) -> Profile {
    let mut profile = Profile::new().with_resolver(registry);
    profile.extend(DEFAULT_STAGES);
    profile
}
