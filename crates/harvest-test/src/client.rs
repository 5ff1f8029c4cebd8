//! In-memory client over a [`Dispatcher`].

use crate::error::TestError;
use crate::request::{TestRequest, TestRequestBuilder};
use crate::response::TestResponse;
use harvest_core::{MiddlewareGroup, Request, Response, ResponseExt};
use harvest_middleware::{Dispatcher, Profile, Stage};
use http::{Method, StatusCode};

/// Sends requests through a dispatcher without any network.
///
/// # Example
///
/// ```
/// use harvest_test::TestClient;
/// use http::StatusCode;
///
/// # tokio_test::block_on(async {
/// let client = TestClient::fixed_response(StatusCode::OK, "pong");
/// let response = client.get("/ping").send().await;
/// response.assert_status(StatusCode::OK).assert_body_eq("pong");
/// # });
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct TestClient {
    dispatcher: Dispatcher,
    default_headers: Vec<(String, String)>,
}

impl TestClient {
    /// Creates a client over an existing dispatcher.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            default_headers: Vec::new(),
        }
    }

    /// Creates a client over a dispatcher for `profile`.
    pub fn from_profile(profile: Profile) -> Self {
        Self::new(Dispatcher::new(profile))
    }

    /// Creates a client whose profile only holds a generator answering
    /// every request with `status` and `body`.
    pub fn fixed_response(status: StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        let mut profile = Profile::new();
        profile.add(
            Stage::closure(move |_request: Request, _next| {
                let response = Response::text(status, body.clone());
                async move { Ok(response) }
            })
            .with_group(MiddlewareGroup::Generator),
        );
        Self::from_profile(profile)
    }

    /// Adds a header sent with every request.
    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// The dispatcher requests are sent through.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::get(uri))
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::post(uri))
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::put(uri))
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::delete(uri))
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequestBuilder::new(method, uri))
    }

    /// Dispatches a built request.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Dispatch`] when the dispatcher fails instead of
    /// responding.
    pub async fn dispatch(&self, request: TestRequest) -> Result<TestResponse, TestError> {
        let response = self.dispatcher.handle(request.into_http_request()).await?;
        TestResponse::from_http(response).await
    }
}

/// A request builder bound to a [`TestClient`].
#[must_use]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl<'a> TestClientRequest<'a> {
    fn new(client: &'a TestClient, builder: TestRequestBuilder) -> Self {
        let builder = client
            .default_headers
            .iter()
            .fold(builder, |builder, (name, value)| builder.header(name, value));
        Self { client, builder }
    }

    /// Sets a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets the `Host` header.
    pub fn host(mut self, host: impl AsRef<str>) -> Self {
        self.builder = self.builder.host(host);
        self
    }

    /// Sets the `Origin` header.
    pub fn origin(mut self, origin: impl AsRef<str>) -> Self {
        self.builder = self.builder.origin(origin);
        self
    }

    /// Sets the `Accept` header.
    pub fn accept(mut self, accept: impl AsRef<str>) -> Self {
        self.builder = self.builder.accept(accept);
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Sets a JSON body.
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Sends the request and returns the response.
    ///
    /// # Panics
    ///
    /// Panics if the request is invalid or the dispatcher fails. Use
    /// [`try_send`](Self::try_send) to inspect dispatcher errors.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("request failed: {e}"),
        }
    }

    /// Sends the request and returns a Result.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        self.client.dispatch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::{Environment, HarvestError, RequestExt};
    use harvest_middleware::{Next, Registry};
    use std::sync::Arc;

    fn echo_method() -> Stage {
        Stage::closure(|request: Request, _next: Next| async move {
            let origin = request.header_str("x-client").unwrap_or("none").to_string();
            Ok(Response::text(
                StatusCode::OK,
                format!("{} {}", request.method(), origin),
            ))
        })
        .with_group(MiddlewareGroup::Generator)
    }

    #[tokio::test]
    async fn test_fixed_response() {
        let client = TestClient::fixed_response(StatusCode::CREATED, "created");
        client
            .post("/items")
            .send()
            .await
            .assert_status(StatusCode::CREATED)
            .assert_body_eq("created");
    }

    #[tokio::test]
    async fn test_default_headers() {
        let mut profile = Profile::new();
        profile.add(echo_method());
        let client = TestClient::from_profile(profile).with_default_header("x-client", "suite");

        client.delete("/x").send().await.assert_body_eq("DELETE suite");
        client
            .request(Method::PATCH, "/x")
            .header("x-client", "override")
            .send()
            .await
            .assert_body_eq("PATCH override");
    }

    #[tokio::test]
    async fn test_dispatch_error_surfaces() {
        let client = TestClient::from_profile(Profile::new());
        let err = client.get("/").try_send().await.unwrap_err();
        assert!(matches!(err, TestError::Dispatch(HarvestError::Setup { .. })));
    }

    #[tokio::test]
    async fn test_routing_exhaustion_surfaces() {
        let mut profile = Profile::new();
        profile.add_fn(|request, next: Next| async move { next.handle(request).await });
        let client = TestClient::from_profile(profile);

        let err = client.get("/missing").try_send().await.unwrap_err();
        match err {
            TestError::Dispatch(e) => assert!(e.is_not_found()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_with_builtin_stages() {
        let registry = Arc::new(Registry::with_builtins(Environment::Development));
        let mut profile = Profile::new().with_resolver(registry);
        profile.add("Cors").add(echo_method());

        TestClient::from_profile(profile)
            .get("/")
            .origin("https://app.test")
            .send()
            .await
            .assert_status(StatusCode::OK)
            .assert_header("access-control-allow-origin", "https://app.test");
    }
}
