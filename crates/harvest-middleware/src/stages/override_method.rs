//! Method override via query string, for exercising non-GET routes from a
//! browser address bar during development.

use crate::middleware::{BoxFuture, GroupProvider, Middleware, Next, PriorityProvider};
use crate::resolver::{parameters_into, Parameters};
use harvest_core::{Environment, HarvestError, HarvestResult, MiddlewareGroup, Request, RequestExt, Response};
use http::{Method, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Middleware replacing the request method with the `method` query
/// parameter when enabled.
#[derive(Debug, Clone, Copy)]
pub struct OverrideMethod {
    enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OverrideMethodConfig {
    enabled: Option<bool>,
}

impl OverrideMethod {
    /// Creates the middleware, explicitly enabled or disabled.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Enabled in development only.
    #[must_use]
    pub const fn for_environment(environment: Environment) -> Self {
        Self::new(environment.is_development())
    }

    /// Builds from parameters, falling back to the environment default.
    pub fn from_parameters(parameters: &Parameters, environment: Environment) -> HarvestResult<Self> {
        let config: OverrideMethodConfig = parameters_into("OverrideMethod", parameters)?;
        Ok(Self::new(
            config.enabled.unwrap_or_else(|| environment.is_development()),
        ))
    }

    /// Whether the override is applied.
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl PriorityProvider for OverrideMethod {
    fn priority(&self) -> i32 {
        -10
    }
}

impl GroupProvider for OverrideMethod {
    fn group(&self) -> MiddlewareGroup {
        MiddlewareGroup::Inbound
    }
}

impl Middleware for OverrideMethod {
    fn process<'a>(
        &'a self,
        mut request: Request,
        next: Next,
    ) -> BoxFuture<'a, HarvestResult<Response>> {
        Box::pin(async move {
            if self.enabled {
                if let Some(method) = request.query_param("method").filter(|m| !m.is_empty()) {
                    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                        .map_err(|_| {
                            HarvestError::http(
                                StatusCode::BAD_REQUEST,
                                format!("invalid override method: {method}"),
                            )
                        })?;
                    debug!(from = %request.method(), to = %method, "overriding request method");
                    *request.method_mut() = method;
                }
            }

            next.handle(request).await
        })
    }

    fn as_priority_provider(&self) -> Option<&dyn PriorityProvider> {
        Some(self)
    }

    fn as_group_provider(&self) -> Option<&dyn GroupProvider> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_defaults() {
        assert!(OverrideMethod::for_environment(Environment::Development).is_enabled());
        assert!(!OverrideMethod::for_environment(Environment::Production).is_enabled());
    }

    #[test]
    fn test_parameters() {
        let parameters = serde_json::json!({ "enabled": true });
        let middleware =
            OverrideMethod::from_parameters(parameters.as_object().unwrap(), Environment::Production)
                .unwrap();
        assert!(middleware.is_enabled());
        assert_eq!(middleware.priority(), -10);
    }
}
