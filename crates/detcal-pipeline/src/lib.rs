//! Per-element calibration driver and strategies.
//!
//! Every calibration task shares one mechanism: iterate the detector elements,
//! fit a physics-motivated peak model to each element's spectrum, let an
//! operator override the extracted position, compute a new calibration value,
//! and commit the accumulated arrays to the parameter store. The
//! [`CalibrationModule`] driver owns that state machine; the physics-specific
//! choices (which histograms, which model, which value formula) live behind
//! the [`CalibStrategy`] trait, selected through the tagged [`StrategyKind`]
//! factory.

/// The generic per-element calibration driver.
pub mod module;
/// One-shot pass runner used by the CLI.
pub mod runner;
/// Strategy trait and factory.
pub mod strategy;
/// Concrete calibration strategies.
pub mod strategies;

pub use module::{CalibrationModule, Collaborators, ModuleSpec, OverviewTrack, Phase};
pub use runner::run_pass;
pub use strategy::{CalibStrategy, Calculation, OldSource, ParamSetDecl, StrategyInit, StrategyKind};
