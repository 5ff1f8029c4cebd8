//! CORS (Cross-Origin Resource Sharing) response headers.
//!
//! After the rest of the chain has produced a response, this middleware
//! echoes the request's `Origin` back in `Access-Control-Allow-Origin` when
//! that origin is allowed, and fills in a default
//! `Access-Control-Allow-Headers`. Headers already set downstream are left
//! alone.
//!
//! ## Origin policy
//!
//! | Allow list | Environment | Result |
//! |---|---|---|
//! | empty | development | any origin (`*` when the request has none) |
//! | empty | other | no header |
//! | contains `*` | any | any non-empty origin |
//! | explicit origins | any | exact matches only |
//!
//! ## Example
//!
//! ```
//! use harvest_middleware::stages::Cors;
//! use harvest_core::Environment;
//!
//! let cors = Cors::new(Environment::Production)
//!     .allow_origin("https://app.example.com")
//!     .allow_origin("https://admin.example.com");
//! assert!(cors.is_allowed("https://app.example.com"));
//! assert!(!cors.is_allowed("https://evil.example.com"));
//! ```

use crate::middleware::{BoxFuture, GroupProvider, Middleware, Next, PriorityProvider};
use crate::resolver::{parameters_into, Parameters};
use harvest_core::{
    Environment, HarvestError, HarvestResult, MiddlewareGroup, Request, RequestExt, Response,
};
use http::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN,
};
use serde::Deserialize;

/// `Access-Control-Allow-Headers` value used when none is configured.
pub const DEFAULT_ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With";

/// Middleware adding CORS headers to responses.
#[derive(Debug, Clone)]
pub struct Cors {
    allow: Vec<String>,
    allow_headers: HeaderValue,
    development: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CorsConfig {
    allow: Vec<String>,
    allow_headers: Option<String>,
}

impl Cors {
    /// Creates the middleware with an empty allow list.
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            allow: Vec::new(),
            allow_headers: HeaderValue::from_static(DEFAULT_ALLOW_HEADERS),
            development: environment.is_development(),
        }
    }

    /// Builds from parameters: `allow` (list of origins) and
    /// `allow_headers`.
    pub fn from_parameters(parameters: &Parameters, environment: Environment) -> HarvestResult<Self> {
        let config: CorsConfig = parameters_into("Cors", parameters)?;
        let mut cors = Self::new(environment).allow_origins(config.allow);
        if let Some(headers) = config.allow_headers {
            cors = cors
                .allow_headers(&headers)
                .map_err(|e| HarvestError::resolution("Cors", e.to_string()))?;
        }
        Ok(cors)
    }

    /// Allows an origin. `*` allows every origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allow.push(origin.into());
        self
    }

    /// Allows several origins.
    #[must_use]
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow.extend(origins.into_iter().map(Into::into));
        self
    }

    /// Allows every origin.
    #[must_use]
    pub fn allow_any_origin(self) -> Self {
        self.allow_origin("*")
    }

    /// Replaces the default `Access-Control-Allow-Headers` value.
    pub fn allow_headers(mut self, headers: &str) -> HarvestResult<Self> {
        self.allow_headers = HeaderValue::try_from(headers)
            .map_err(|e| HarvestError::internal_with_source("invalid allow-headers value", e))?;
        Ok(self)
    }

    /// Returns `true` if `origin` is on the allow list.
    pub fn is_allowed(&self, origin: &str) -> bool {
        !origin.is_empty() && self.allow.iter().any(|allowed| allowed == "*" || allowed == origin)
    }

    /// The `Access-Control-Allow-Origin` value for a request origin, if any.
    fn allow_origin_value(&self, origin: Option<&str>) -> Option<HeaderValue> {
        let origin = origin.unwrap_or_default();

        if self.allow.is_empty() {
            if !self.development {
                return None;
            }
            if origin.is_empty() {
                return Some(HeaderValue::from_static("*"));
            }
        } else if !self.is_allowed(origin) {
            return None;
        }

        HeaderValue::try_from(origin).ok()
    }
}

impl PriorityProvider for Cors {
    fn priority(&self) -> i32 {
        -1
    }
}

impl GroupProvider for Cors {
    fn group(&self) -> MiddlewareGroup {
        MiddlewareGroup::Outbound
    }
}

impl Middleware for Cors {
    fn process<'a>(
        &'a self,
        request: Request,
        next: Next,
    ) -> BoxFuture<'a, HarvestResult<Response>> {
        Box::pin(async move {
            let origin = request.header_str(ORIGIN).map(str::to_owned);
            let mut response = next.handle(request).await?;
            let headers = response.headers_mut();

            if !headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN) {
                if let Some(value) = self.allow_origin_value(origin.as_deref()) {
                    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
                }
            }
            if !headers.contains_key(ACCESS_CONTROL_ALLOW_HEADERS) {
                headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
            }

            Ok(response)
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
    fn test_empty_list_production_allows_nothing() {
        let cors = Cors::new(Environment::Production);
        assert_eq!(cors.allow_origin_value(Some("https://a.test")), None);
    }

    #[test]
    fn test_empty_list_development_allows_everything() {
        let cors = Cors::new(Environment::Development);
        assert_eq!(
            cors.allow_origin_value(Some("https://a.test")).unwrap(),
            "https://a.test"
        );
        assert_eq!(cors.allow_origin_value(None).unwrap(), "*");
    }

    #[test]
    fn test_allow_list() {
        let cors = Cors::new(Environment::Production).allow_origin("https://a.test");
        assert!(cors.allow_origin_value(Some("https://a.test")).is_some());
        assert!(cors.allow_origin_value(Some("https://b.test")).is_none());
        assert!(cors.allow_origin_value(None).is_none());
    }

    #[test]
    fn test_wildcard_echoes_origin() {
        let cors = Cors::new(Environment::Production).allow_any_origin();
        assert_eq!(
            cors.allow_origin_value(Some("https://b.test")).unwrap(),
            "https://b.test"
        );
        assert!(cors.allow_origin_value(None).is_none());
    }

    #[test]
    fn test_from_parameters() {
        let parameters = serde_json::json!({
            "allow": ["https://a.test"],
            "allow_headers": "Content-Type"
        });
        let cors = Cors::from_parameters(parameters.as_object().unwrap(), Environment::Production)
            .unwrap();
        assert!(cors.is_allowed("https://a.test"));
        assert_eq!(cors.allow_headers, "Content-Type");
    }
}
