//! Peak fitting for the `detcal` calibration toolkit.
//!
//! A calibration module describes the peak it expects with a [`PeakModel`]
//! (Gaussian plus optional polynomial background), seeds it, optionally bounds
//! individual parameters, and hands the sliced spectrum to a [`PeakFitter`].
//! The default backend, [`LmPeakFitter`], runs Levenberg-Marquardt with
//! analytic Jacobians; bounded parameters are handled with a smooth tanh
//! reparameterization so the solver itself stays unconstrained.

/// Nonlinear fit backend and outcome types.
pub mod engine;
/// Peak model definitions.
pub mod model;

pub use engine::{FitData, FitOutcome, FittedPeak, LmPeakFitter, PeakFitter};
pub use model::{Bounds, PeakModel};
