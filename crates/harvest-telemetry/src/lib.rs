//! # Harvest Telemetry
//!
//! Logging setup for Harvest applications.
//!
//! Every Harvest crate logs through [`tracing`]. This crate installs the
//! subscriber that turns those events into output:
//!
//! - **JSON** for production log shipping
//! - **Pretty** multi-line output for local development
//! - **Compact** single-line output for tests and CI
//!
//! Filtering uses `tracing-subscriber`'s `EnvFilter` directive syntax, so
//! `"info,harvest_middleware=trace"` turns on per-stage dispatch tracing
//! while keeping everything else at `info`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use harvest_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(stages = 5, "profile loaded");
//! # Ok::<(), harvest_telemetry::TelemetryError>(())
//! ```

#![doc(html_root_url = "https://docs.rs/harvest-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
