//! Physics constants and detector geometry limits.
//!
//! The two pi0 windows are intentionally distinct: the fit window restricts
//! where the peak model is evaluated, while the wider acceptance window decides
//! whether a fitted position is physical at all. They are kept as separate
//! constants and must not be unified.

use crate::Real;

/// Neutral pion mass in MeV.
pub const PI0_MASS: Real = 134.9766;
/// Eta meson mass in MeV.
pub const ETA_MASS: Real = 547.853;

/// Number of CB (Crystal Ball) NaI crystals.
pub const MAX_CB: usize = 720;
/// Number of TAPS BaF2 crystals.
pub const MAX_TAPS: usize = 438;
/// Number of PID scintillator elements.
pub const MAX_PID: usize = 24;
/// Number of Veto elements in front of TAPS.
pub const MAX_VETO: usize = 438;
/// Number of tagger channels.
pub const MAX_TAGGER: usize = 352;

/// Fit range of the pi0 invariant-mass peak in MeV.
pub const PI0_FIT_WINDOW: (Real, Real) = (100.0, 170.0);
/// Acceptance window for a fitted pi0 position in MeV; results outside are
/// reset to [`PI0_MASS`].
pub const PI0_SANE_WINDOW: (Real, Real) = (80.0, 200.0);

/// Fit range of the eta invariant-mass peak in MeV.
pub const ETA_FIT_WINDOW: (Real, Real) = (450.0, 650.0);
/// Window used to seed the eta peak position from the empirical maximum.
pub const ETA_SEED_WINDOW: (Real, Real) = (500.0, 600.0);
/// Acceptance window for a fitted eta position in MeV; results outside are
/// reset to [`ETA_MASS`].
pub const ETA_SANE_WINDOW: (Real, Real) = (450.0, 650.0);

/// Relative half-width of the parameter bounds applied when refitting around
/// a previously accepted position.
pub const REFIT_BOUND_FRACTION: Real = 0.03;
