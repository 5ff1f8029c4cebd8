//! Error recovery.
//!
//! Wraps the whole chain. When anything downstream fails, the error is
//! logged and the request is dispatched again to `/error/<status>` with a
//! [`CaughtError`] extension attached, so an ordinary downstream stage can
//! render an error page. If that second dispatch fails too, a last-resort
//! 500 response is produced here.

use crate::middleware::{BoxFuture, GroupProvider, Middleware, Next, PriorityProvider};
use crate::resolver::{parameters_into, Parameters};
use harvest_core::{
    Environment, ErrorCategory, HarvestError, HarvestResult, MiddlewareGroup, Request,
    RequestExt, Response, ResponseExt,
};
use http::header::{HeaderValue, ACCEPT, ACCESS_CONTROL_ALLOW_ORIGIN};
use http::uri::{PathAndQuery, Uri};
use http::StatusCode;
use serde::Deserialize;
use tracing::error;

/// The error that sent a request to the error route.
///
/// Inserted into the request extensions of the re-dispatched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaughtError {
    status: StatusCode,
    category: ErrorCategory,
    message: String,
}

impl CaughtError {
    /// Captures the reportable parts of `error`.
    pub fn from_error(error: &HarvestError) -> Self {
        Self {
            status: error.status_code(),
            category: error.category(),
            message: error.to_string(),
        }
    }

    /// The HTTP status the error maps to.
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// The error category.
    pub const fn category(&self) -> ErrorCategory {
        self.category
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Middleware catching downstream errors and routing them to an error page.
#[derive(Debug, Clone, Copy)]
pub struct ErrorHandler {
    expose_details: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorHandlerConfig {
    expose_details: Option<bool>,
}

impl ErrorHandler {
    /// Creates the handler. `expose_details` puts error messages in the
    /// last-resort response.
    #[must_use]
    pub const fn new(expose_details: bool) -> Self {
        Self { expose_details }
    }

    /// Exposes details in development only.
    #[must_use]
    pub const fn for_environment(environment: Environment) -> Self {
        Self::new(environment.is_development())
    }

    /// Builds from parameters, falling back to the environment default.
    pub fn from_parameters(parameters: &Parameters, environment: Environment) -> HarvestResult<Self> {
        let config: ErrorHandlerConfig = parameters_into("ErrorHandler", parameters)?;
        Ok(Self::new(
            config
                .expose_details
                .unwrap_or_else(|| environment.is_development()),
        ))
    }

    /// Builds the request sent to the error route.
    fn error_request(original: &Request, caught: &HarvestError) -> HarvestResult<Request> {
        let status = caught.status_code();
        let mut request = original.duplicate();
        *request.uri_mut() = error_uri(original.uri(), status)?;
        request
            .extensions_mut()
            .insert(CaughtError::from_error(caught));
        Ok(request)
    }

    /// Last-resort response when the error route failed as well.
    ///
    /// A not-found failure only means no error page exists, so the initial
    /// error is reported instead.
    fn catastrophe(&self, initial: &HarvestError, failure: &HarvestError, request: &Request) -> Response {
        let reported = if failure.is_not_found() { initial } else { failure };

        if request.header_str(ACCEPT) == Some("application/json") {
            let message = if self.expose_details {
                reported.to_string()
            } else {
                "Internal Server Error".to_string()
            };
            let body = serde_json::json!({ "error": message });
            let mut response = Response::json(StatusCode::INTERNAL_SERVER_ERROR, &body)
                .unwrap_or_else(|_| Response::empty(StatusCode::INTERNAL_SERVER_ERROR));
            response
                .headers_mut()
                .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            return response;
        }

        let mut body = format!(
            "500 Internal Server Error\n\n\
             An unexpected error occurred while processing your request.\n\n\
             Request: {}",
            request.uri().path()
        );
        if self.expose_details {
            body.push_str(&format!(
                "\n\nInitial error: {initial}\n\nError handler failure: {failure}"
            ));
        }
        Response::text(StatusCode::INTERNAL_SERVER_ERROR, body)
    }
}

fn error_uri(uri: &Uri, status: StatusCode) -> HarvestResult<Uri> {
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::from_maybe_shared(format!(
        "/error/{}",
        status.as_u16()
    ))
    .map_err(|e| HarvestError::internal_with_source("invalid error route", e))?);
    Uri::from_parts(parts).map_err(|e| HarvestError::internal_with_source("invalid error route", e))
}

impl PriorityProvider for ErrorHandler {
    fn priority(&self) -> i32 {
        -100
    }
}

impl GroupProvider for ErrorHandler {
    fn group(&self) -> MiddlewareGroup {
        MiddlewareGroup::ErrorHandler
    }
}

impl Middleware for ErrorHandler {
    fn process<'a>(
        &'a self,
        request: Request,
        next: Next,
    ) -> BoxFuture<'a, HarvestResult<Response>> {
        Box::pin(async move {
            let original = request.duplicate();
            let caught = match next.handle(request).await {
                Ok(response) => return Ok(response),
                Err(caught) => caught,
            };

            error!(
                error = %caught,
                category = ?caught.category(),
                status = caught.status_code().as_u16(),
                path = original.uri().path(),
                "request failed, dispatching error route"
            );

            let outcome = match Self::error_request(&original, &caught) {
                Ok(error_request) => next.handle(error_request).await,
                Err(failure) => Err(failure),
            };

            match outcome {
                Ok(response) => Ok(response),
                Err(failure) => {
                    error!(
                        error = %failure,
                        initial = %caught,
                        "error route failed"
                    );
                    Ok(self.catastrophe(&caught, &failure, &original))
                }
            }
        })
    }

    fn as_priority_provider(&self) -> Option<&dyn PriorityProvider> {
        Some(self)
    }

    fn as_group_provider(&self) -> Option<&dyn GroupProvider> {
        Some(self)
    }
}
