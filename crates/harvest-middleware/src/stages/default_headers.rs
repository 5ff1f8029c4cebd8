//! Default response headers.
//!
//! Adds a fixed set of security headers to every response that does not
//! already carry them:
//!
//! | Header | Default |
//! |---|---|
//! | `X-Frame-Options` | `SAMEORIGIN` |
//! | `X-Content-Type-Options` | `nosniff` |
//! | `Referrer-Policy` | `no-referrer-when-downgrade` |
//!
//! Header names are case-insensitive, so `x-frame-options` replaces the
//! default `X-Frame-Options` value.

use crate::middleware::{BoxFuture, GroupProvider, Middleware, Next, PriorityProvider};
use crate::resolver::{parameters_into, FromParameters, Parameters};
use harvest_core::{HarvestError, HarvestResult, MiddlewareGroup, Request, Response};
use http::header::{HeaderName, HeaderValue};
use indexmap::IndexMap;
use serde::Deserialize;

/// Middleware that fills in missing security headers.
#[derive(Debug, Clone)]
pub struct DefaultHeaders {
    headers: IndexMap<HeaderName, HeaderValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DefaultHeadersConfig {
    headers: IndexMap<String, String>,
    remove: Vec<String>,
}

impl DefaultHeaders {
    /// Creates the middleware with the stock header set.
    #[must_use]
    pub fn new() -> Self {
        let headers = [
            ("x-frame-options", "SAMEORIGIN"),
            ("x-content-type-options", "nosniff"),
            ("referrer-policy", "no-referrer-when-downgrade"),
        ]
        .into_iter()
        .map(|(name, value)| {
            (
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            )
        })
        .collect();

        Self { headers }
    }

    /// Sets or replaces a default header.
    pub fn set_header(&mut self, name: &str, value: &str) -> HarvestResult<&mut Self> {
        let name = HeaderName::try_from(name)
            .map_err(|e| HarvestError::internal_with_source(format!("invalid header name: {name}"), e))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| HarvestError::internal_with_source("invalid header value", e))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Stops adding a default header.
    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        if let Ok(name) = HeaderName::try_from(name) {
            self.headers.shift_remove(&name);
        }
        self
    }

    /// The headers that will be added, in order.
    pub fn headers(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter()
    }
}

impl Default for DefaultHeaders {
    fn default() -> Self {
        Self::new()
    }
}

impl FromParameters for DefaultHeaders {
    fn from_parameters(parameters: &Parameters) -> HarvestResult<Self> {
        let config: DefaultHeadersConfig = parameters_into("DefaultHeaders", parameters)?;
        let mut middleware = Self::new();
        for (name, value) in &config.headers {
            middleware
                .set_header(name, value)
                .map_err(|e| HarvestError::resolution("DefaultHeaders", e.to_string()))?;
        }
        for name in &config.remove {
            middleware.remove_header(name);
        }
        Ok(middleware)
    }
}

impl PriorityProvider for DefaultHeaders {
    fn priority(&self) -> i32 {
        -9999
    }
}

impl GroupProvider for DefaultHeaders {
    fn group(&self) -> MiddlewareGroup {
        MiddlewareGroup::Outbound
    }
}

impl Middleware for DefaultHeaders {
    fn process<'a>(
        &'a self,
        request: Request,
        next: Next,
    ) -> BoxFuture<'a, HarvestResult<Response>> {
        Box::pin(async move {
            let mut response = next.handle(request).await?;
            let headers = response.headers_mut();
            for (name, value) in &self.headers {
                if !headers.contains_key(name) {
                    headers.insert(name.clone(), value.clone());
                }
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
    fn test_stock_headers() {
        let middleware = DefaultHeaders::new();
        let names: Vec<&str> = middleware.headers().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            ["x-frame-options", "x-content-type-options", "referrer-policy"]
        );
        assert_eq!(middleware.priority(), -9999);
        assert_eq!(GroupProvider::group(&middleware), MiddlewareGroup::Outbound);
    }

    #[test]
    fn test_from_parameters_overrides_and_removes() {
        let parameters = serde_json::json!({
            "headers": { "X-Frame-Options": "DENY", "Permissions-Policy": "camera=()" },
            "remove": ["Referrer-Policy"]
        });
        let parameters = parameters.as_object().unwrap();
        let middleware = DefaultHeaders::from_parameters(parameters).unwrap();

        let headers: Vec<(String, String)> = middleware
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap().to_string()))
            .collect();
        assert_eq!(
            headers,
            [
                ("x-frame-options".to_string(), "DENY".to_string()),
                ("x-content-type-options".to_string(), "nosniff".to_string()),
                ("permissions-policy".to_string(), "camera=()".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_header_is_resolution_error() {
        let parameters = serde_json::json!({ "headers": { "bad name": "x" } });
        let error = DefaultHeaders::from_parameters(parameters.as_object().unwrap()).unwrap_err();
        assert_eq!(error.category(), harvest_core::ErrorCategory::Resolution);
    }
}
