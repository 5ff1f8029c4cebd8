//! # Harvest Test
//!
//! In-memory testing for Harvest dispatchers. Requests go through the full
//! stage stack with no sockets involved.
//!
//! - [`TestClient`] wraps a [`Dispatcher`](harvest_middleware::Dispatcher)
//! - [`TestRequest`] builds requests fluently
//! - [`TestResponse`] collects the body and offers assertions
//!
//! ## Example
//!
//! ```
//! use harvest_core::{Environment, MiddlewareGroup, Response, ResponseExt};
//! use harvest_middleware::{stages, Registry, Stage};
//! use harvest_test::TestClient;
//! use http::StatusCode;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(Registry::with_builtins(Environment::Production));
//! let mut profile = stages::default_profile(registry);
//! profile.add(
//!     Stage::closure(|_request, _next| async { Ok(Response::text(StatusCode::OK, "hi")) })
//!         .with_group(MiddlewareGroup::Generator),
//! );
//!
//! TestClient::from_profile(profile)
//!     .get("https://example.com/")
//!     .send()
//!     .await
//!     .assert_status(StatusCode::OK)
//!     .assert_header("x-content-type-options", "nosniff");
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/harvest-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::{TestRequest, TestRequestBuilder};
pub use response::TestResponse;
