// SPDX-License-Identifier: MIT
//! Observability plumbing for Rust services: `tracing` + OpenTelemetry setup,
//! OTLP log shipping, a console log stream, and the human-readable duration
//! and size parsing used to configure them from the environment.
//!
//! * [`units`] – [`parse_duration`] (`"1h30m"` → `5400` seconds) and
//!   [`parse_size`] (`"10MB"` → `10485760` bytes), memoized.
//! * [`env`] – typed readers for duration, size, flag and string variables.
//! * [`stream`] – [`stream::LogStream`], the console sink context.
//! * [`shipper`] – [`shipper::LogShipper`], the OTLP log client.
//! * [`telemetry`] – [`telemetry::TelemetryConfig`], [`telemetry::init_telemetry`]
//!   and [`telemetry::TelemetryHandle`].
//!
//! # Quick Start
//! ```no_run
//! use logship::telemetry::{init_telemetry, TelemetryConfig};
//! fn main() -> anyhow::Result<()> {
//!     let handle = init_telemetry(TelemetryConfig::from_env()?)?;
//!     // business logic
//!     handle.shutdown()?;
//!     Ok(())
//! }
//! ```
pub mod env;
pub mod error;
pub mod shipper;
pub mod stream;
pub mod telemetry;
pub mod units;

pub use error::{ConfigError, Rule, ValidationError};
pub use units::{parse_duration, parse_size};
