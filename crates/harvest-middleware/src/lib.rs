//! # Harvest Middleware
//!
//! Stages, profiles and the suspendable dispatcher.
//!
//! A [`Profile`] is a named set of [`Stage`]s. The [`Dispatcher`] sorts the
//! profile by group, then priority, and runs each request through it as a
//! single logical call stack:
//!
//! ```text
//! Request → ErrorHandler → Https → DefaultHeaders → Cors → … → NotFound
//!                                                          ↓
//! Response ← ErrorHandler ← Https ← DefaultHeaders ← Cors ←┘
//! ```
//!
//! Each stage runs until it calls [`Next::handle`], at which point it is
//! parked and the request moves on. Responses and errors travel back through
//! the parked stages innermost first. An error is offered to every parked
//! stage until one recovers.
//!
//! ## Groups
//!
//! | Group | Typical stages |
//! |-------|----------------|
//! | ErrorHandler | error pages, last-resort responses |
//! | Inbound | request rewriting (method override, https) |
//! | Outbound | response decoration (headers, CORS, 304s) |
//! | Generic | everything without a declared group |
//! | Generator | routers and other response producers |
//!
//! ## Example
//!
//! ```
//! use harvest_middleware::{Dispatcher, Next, Profile, Registry};
//! use harvest_core::{Environment, MiddlewareGroup, Response, ResponseExt};
//! use http::StatusCode;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(Registry::with_builtins(Environment::Development));
//! let mut profile = Profile::new().with_resolver(registry);
//! profile.add("ErrorHandler").add("DefaultHeaders");
//! profile.add_with(
//!     harvest_middleware::Stage::closure(|_request, _next: Next| async {
//!         Ok(Response::text(StatusCode::OK, "hello"))
//!     }),
//!     Some(MiddlewareGroup::Generator),
//!     None,
//! );
//!
//! let dispatcher = Dispatcher::new(profile);
//! let request = http::Request::new(http_body_util::Full::new(bytes::Bytes::new()));
//! let response = dispatcher.handle(request).await.unwrap();
//! assert_eq!(response.status(), StatusCode::OK);
//! assert_eq!(response.headers()["x-frame-options"], "SAMEORIGIN");
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/harvest-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod dispatcher;
pub mod middleware;
pub mod profile;
pub mod resolver;
pub mod stage;
pub mod stages;
mod task;

pub use dispatcher::Dispatcher;
pub use middleware::{BoxFuture, Delegate, FnMiddleware, GroupProvider, Middleware, Next, PriorityProvider};
pub use profile::{Profile, ProfileEntry, StageKey};
pub use resolver::{parameters_into, FromParameters, Parameters, Registry, Resolver};
pub use stage::{DeferredSpec, Stage, DEFAULT_PRIORITY};
