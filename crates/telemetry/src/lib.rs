#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Strata Telemetry
//!
//! Lightweight metric types (counter, histogram) and a registry to create
//! and retrieve them, with optional label pairs for per-scope and
//! per-domain series. Values are stored in-memory with atomics; exporters
//! scrape the registry out-of-band.

pub mod metrics;

pub use metrics::{Counter, Histogram, MetricsRegistry};
