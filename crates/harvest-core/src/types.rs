//! HTTP request and response types used throughout Harvest.

use crate::error::{HarvestError, HarvestResult};
use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;

/// The HTTP request type flowing through a dispatcher.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type produced by a dispatcher.
///
/// This is a standard `http::Response` with a `Full<Bytes>` body.
pub type Response = http::Response<Full<Bytes>>;

/// Helpers for building responses.
pub trait ResponseExt: Sized {
    /// Creates a response with no body.
    fn empty(status: StatusCode) -> Self;

    /// Creates a `text/plain` response.
    fn text(status: StatusCode, body: impl Into<String>) -> Self;

    /// Creates a `text/html` response.
    fn html(status: StatusCode, body: impl Into<String>) -> Self;

    /// Creates an `application/json` response from a serializable value.
    fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> HarvestResult<Self>;

    /// Creates a redirect response to `location`.
    fn redirect(status: StatusCode, location: &str) -> HarvestResult<Self>;

    /// Creates an error response with the given status code and message.
    fn error(status: StatusCode, message: &str) -> Self;

    /// Creates a JSON error response.
    fn json_error(status: StatusCode, code: &str, message: &str) -> Self;
}

fn with_body(status: StatusCode, content_type: &'static str, body: Bytes) -> Response {
    let mut response = http::Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

impl ResponseExt for Response {
    fn empty(status: StatusCode) -> Self {
        let mut response = http::Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }

    fn text(status: StatusCode, body: impl Into<String>) -> Self {
        with_body(status, "text/plain; charset=utf-8", Bytes::from(body.into()))
    }

    fn html(status: StatusCode, body: impl Into<String>) -> Self {
        with_body(status, "text/html; charset=utf-8", Bytes::from(body.into()))
    }

    fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> HarvestResult<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| HarvestError::internal_with_source("failed to encode JSON body", e))?;
        Ok(with_body(status, "application/json", Bytes::from(body)))
    }

    fn redirect(status: StatusCode, location: &str) -> HarvestResult<Self> {
        let location = HeaderValue::try_from(location).map_err(|e| {
            HarvestError::internal_with_source(format!("invalid redirect location: {location}"), e)
        })?;
        let mut response = Self::empty(status);
        response.headers_mut().insert(header::LOCATION, location);
        Ok(response)
    }

    fn error(status: StatusCode, message: &str) -> Self {
        Self::text(status, message)
    }

    fn json_error(status: StatusCode, code: &str, message: &str) -> Self {
        let body = serde_json::json!({
            "error": {
                "code": code,
                "message": message
            }
        });

        with_body(status, "application/json", Bytes::from(body.to_string()))
    }
}

/// Helpers for reading and deriving requests.
pub trait RequestExt {
    /// Returns an independent copy of this request.
    ///
    /// Method, URI, version, headers, extensions and body are all cloned, so
    /// a stage can keep the original around while forwarding the copy.
    fn duplicate(&self) -> Self;

    /// Returns a header value as a string, if present and valid UTF-8.
    fn header_str(&self, name: impl header::AsHeaderName) -> Option<&str>;

    /// Returns the first value of a query-string parameter, undecoded.
    fn query_param(&self, name: &str) -> Option<&str>;
}

impl RequestExt for Request {
    fn duplicate(&self) -> Self {
        let mut request = http::Request::new(self.body().clone());
        *request.method_mut() = self.method().clone();
        *request.uri_mut() = self.uri().clone();
        *request.version_mut() = self.version();
        *request.headers_mut() = self.headers().clone();
        *request.extensions_mut() = self.extensions().clone();
        request
    }

    fn header_str(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers().get(name).and_then(|value| value.to_str().ok())
    }

    fn query_param(&self, name: &str) -> Option<&str> {
        self.uri().query()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then_some(value)
        })
    }
}
