//! Core building blocks for the `detcal` calibration toolkit.
//!
//! This crate contains:
//! - uniformly binned 1-D/2-D histograms with per-element projections
//!   ([`Hist1`], [`Hist2`]),
//! - the physics and detector constants shared by all calibration modules,
//! - the `key: value` configuration reader ([`ConfigMap`]),
//! - the versioned parameter persistence contract ([`ParameterStore`]) with
//!   in-memory and JSON-file backends,
//! - the histogram aggregation contract ([`HistogramAggregator`]) summing
//!   per-run histograms over run sets,
//! - deterministic synthetic-histogram builders for tests.

/// Histogram aggregation over run sets.
pub mod aggregate;
/// Configuration file reader.
pub mod config;
/// Physics and detector constants.
pub mod constants;
/// Shared error type.
pub mod error;
/// Uniformly binned histograms.
pub mod hist;
/// Parameter persistence backends.
pub mod store;
/// Deterministic synthetic histograms for tests.
pub mod synthetic;

pub use aggregate::{DirAggregator, HistogramAggregator, MemoryAggregator};
pub use config::ConfigMap;
pub use error::CalibError;
pub use hist::{Hist1, Hist2};
pub use store::{JsonStore, MemoryStore, ParameterStore};

/// Scalar type used throughout the toolkit (currently `f64`).
pub type Real = f64;
