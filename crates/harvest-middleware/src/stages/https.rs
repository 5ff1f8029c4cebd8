//! HTTPS enforcement.
//!
//! When enforcing, plain-HTTP requests are answered with a permanent
//! redirect to the same URL over https, and every response that does pass
//! through gets a `Strict-Transport-Security` header. Enforcement defaults
//! to on in production and off elsewhere.

use crate::middleware::{BoxFuture, GroupProvider, Middleware, Next, PriorityProvider};
use crate::resolver::{parameters_into, Parameters};
use harvest_core::{Environment, HarvestResult, MiddlewareGroup, Request, RequestExt, Response, ResponseExt};
use http::header::{HeaderValue, HOST, STRICT_TRANSPORT_SECURITY};
use http::uri::Scheme;
use http::StatusCode;
use serde::Deserialize;
use tracing::debug;

/// HSTS policy applied to responses.
pub const HSTS_POLICY: &str = "max-age=31536000; includeSubDomains";

/// Middleware redirecting to https and adding HSTS.
#[derive(Debug, Clone, Copy)]
pub struct Https {
    enforce: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HttpsConfig {
    enforce: Option<bool>,
}

impl Https {
    /// Creates the middleware with enforcement explicitly on or off.
    #[must_use]
    pub const fn new(enforce: bool) -> Self {
        Self { enforce }
    }

    /// Enforces in production only.
    #[must_use]
    pub const fn for_environment(environment: Environment) -> Self {
        Self::new(environment.is_production())
    }

    /// Builds from parameters, falling back to the environment default.
    pub fn from_parameters(parameters: &Parameters, environment: Environment) -> HarvestResult<Self> {
        let config: HttpsConfig = parameters_into("Https", parameters)?;
        Ok(Self::new(
            config.enforce.unwrap_or_else(|| environment.is_production()),
        ))
    }

    /// Whether requests are redirected and HSTS is sent.
    pub const fn is_enforcing(&self) -> bool {
        self.enforce
    }

    /// The https form of the request URL, without any explicit port.
    fn secure_location(request: &Request) -> String {
        let host = request
            .header_str(HOST)
            .or_else(|| request.uri().host())
            .unwrap_or("localhost");
        let host = host.rsplit_once(':').map_or(host, |(name, port)| {
            if port.chars().all(|c| c.is_ascii_digit()) {
                name
            } else {
                host
            }
        });
        let path = request
            .uri()
            .path_and_query()
            .map_or("/", |path| path.as_str());

        format!("https://{host}{path}")
    }
}

impl PriorityProvider for Https {
    fn priority(&self) -> i32 {
        -1
    }
}

impl GroupProvider for Https {
    fn group(&self) -> MiddlewareGroup {
        MiddlewareGroup::Inbound
    }
}

impl Middleware for Https {
    fn process<'a>(
        &'a self,
        request: Request,
        next: Next,
    ) -> BoxFuture<'a, HarvestResult<Response>> {
        Box::pin(async move {
            if !self.enforce {
                return next.handle(request).await;
            }

            if request.uri().scheme() != Some(&Scheme::HTTPS) {
                let location = Self::secure_location(&request);
                debug!(location = %location, "redirecting to https");
                return Response::redirect(StatusCode::PERMANENT_REDIRECT, &location);
            }

            let mut response = next.handle(request).await?;
            response
                .headers_mut()
                .insert(STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS_POLICY));
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
    use bytes::Bytes;
    use http_body_util::Full;

    fn request(uri: &str, host: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(host) = host {
            builder = builder.header(HOST, host);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    #[test]
    fn test_environment_defaults() {
        assert!(Https::for_environment(Environment::Production).is_enforcing());
        assert!(!Https::for_environment(Environment::Development).is_enforcing());
        assert!(!Https::for_environment(Environment::Testing).is_enforcing());
    }

    #[test]
    fn test_parameters_override_environment() {
        let parameters = serde_json::json!({ "enforce": true });
        let https =
            Https::from_parameters(parameters.as_object().unwrap(), Environment::Development).unwrap();
        assert!(https.is_enforcing());

        let https = Https::from_parameters(&Parameters::new(), Environment::Production).unwrap();
        assert!(https.is_enforcing());
    }

    #[test]
    fn test_secure_location_drops_port() {
        let request = request("/a/b?x=1", Some("example.com:8080"));
        assert_eq!(Https::secure_location(&request), "https://example.com/a/b?x=1");
    }

    #[test]
    fn test_secure_location_from_absolute_uri() {
        let request = request("http://example.org/path", None);
        assert_eq!(Https::secure_location(&request), "https://example.org/path");
    }
}
