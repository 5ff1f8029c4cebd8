//! Conditional GET handling.
//!
//! Turns a successful `GET` into `304 Not Modified` when the client's cached
//! copy is still current, judged by either validator:
//!
//! - `If-Modified-Since` at or after the response's `Last-Modified`
//! - `If-None-Match` equal to the response's `ETag`

use crate::middleware::{BoxFuture, GroupProvider, Middleware, Next, PriorityProvider};
use chrono::{DateTime, FixedOffset};
use harvest_core::{HarvestResult, MiddlewareGroup, Request, RequestExt, Response};
use http::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use http::{Method, StatusCode};

/// Middleware answering conditional `GET` requests with `304`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastModified;

impl LastModified {
    /// Creates the middleware.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn is_unmodified(request: &Request, response: &Response) -> bool {
        is_unmodified_since(request, response) || is_etag_unmodified(request, response)
    }
}

fn header<'a>(headers: &'a http::HeaderMap, name: &http::HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

fn parse_http_date(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(value.trim()).ok()
}

fn is_unmodified_since(request: &Request, response: &Response) -> bool {
    let Some(last_modified) = header(response.headers(), &LAST_MODIFIED) else {
        return false;
    };
    let Some(since) = request
        .header_str(IF_MODIFIED_SINCE)
        .and_then(|value| value.split(';').next())
        .filter(|value| !value.trim().is_empty())
    else {
        return false;
    };

    match (parse_http_date(last_modified), parse_http_date(since)) {
        (Some(last_modified), Some(since)) => last_modified.timestamp() <= since.timestamp(),
        _ => false,
    }
}

fn is_etag_unmodified(request: &Request, response: &Response) -> bool {
    match (
        header(response.headers(), &ETAG),
        header(request.headers(), &IF_NONE_MATCH),
    ) {
        (Some(etag), Some(if_none_match)) => etag == if_none_match,
        _ => false,
    }
}

impl PriorityProvider for LastModified {
    fn priority(&self) -> i32 {
        0
    }
}

impl GroupProvider for LastModified {
    fn group(&self) -> MiddlewareGroup {
        MiddlewareGroup::Outbound
    }
}

impl Middleware for LastModified {
    fn process<'a>(
        &'a self,
        request: Request,
        next: Next,
    ) -> BoxFuture<'a, HarvestResult<Response>> {
        Box::pin(async move {
            let conditional = request.method() == Method::GET;
            let probe = conditional.then(|| request.duplicate());
            let mut response = next.handle(request).await?;

            if let Some(request) = probe {
                if response.status() == StatusCode::OK && Self::is_unmodified(&request, &response) {
                    *response.status_mut() = StatusCode::NOT_MODIFIED;
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
