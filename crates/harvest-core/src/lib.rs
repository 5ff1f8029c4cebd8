//! # Harvest Core
//!
//! Core types shared by every Harvest crate.
//!
//! - [`Request`] / [`Response`] - the HTTP values flowing through a dispatcher
//! - [`RequestExt`] / [`ResponseExt`] - helpers for deriving requests and building responses
//! - [`MiddlewareGroup`] - coarse ordering bucket for stages
//! - [`Environment`] - runtime mode consulted by environment-sensitive stages
//! - [`HarvestError`] - the error taxonomy of the dispatcher and its stages

#![doc(html_root_url = "https://docs.rs/harvest-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod environment;
mod error;
mod group;
pub mod types;

pub use environment::Environment;
pub use error::{ErrorCategory, ErrorDetail, ErrorEnvelope, HarvestError, HarvestResult};
pub use group::MiddlewareGroup;
pub use types::{Request, RequestExt, Response, ResponseExt};
