//! Concrete calibration strategies.
//!
//! Each submodule implements [`crate::CalibStrategy`] for one physical
//! quantity. The simple single-peak strategies (pedestal, time, energy, phi)
//! share the projection/seed/fit shape; the quadratic energy correction
//! combines two peaks into a closed-form two-parameter solution.

pub mod energy;
pub mod pedestal;
pub mod phi;
pub mod quad_energy;
pub mod time;

pub use energy::EnergyStrategy;
pub use pedestal::PedestalStrategy;
pub use phi::{ElementGeometry, PhiStrategy, UniformGeometry};
pub use quad_energy::QuadEnergyStrategy;
pub use time::TimeStrategy;

use detcal_core::{constants::REFIT_BOUND_FRACTION, Hist1, Real};

/// Strict mean bounds for refitting: ±3% around the accepted position.
pub(crate) fn refit_mean_bounds(seed: Real) -> (Real, Real) {
    let delta = REFIT_BOUND_FRACTION * seed.abs();
    (seed - delta, seed + delta)
}

/// Estimate a linear background through the bin contents at `pos - left` and
/// `pos + right`; returns `(intercept, slope)`.
pub(crate) fn linear_background(hist: &Hist1, pos: Real, left: Real, right: Real) -> (Real, Real) {
    let sample = |x: Real| hist.bin_of(x).map_or(0.0, |i| hist.counts[i]);
    let (x1, x2) = (pos - left, pos + right);
    let (y1, y2) = (sample(x1), sample(x2));
    if x2 == x1 {
        return (y1, 0.0);
    }
    let slope = (y2 - y1) / (x2 - x1);
    (y1 - slope * x1, slope)
}

/// Largest bin content of a histogram, 0 for an empty one.
pub(crate) fn max_content(hist: &Hist1) -> Real {
    hist.counts.iter().cloned().fold(0.0, Real::max)
}
