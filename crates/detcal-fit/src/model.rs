//! Peak models: Gaussian plus optional polynomial background.
//!
//! The parameter vector layout is `[amp, mean, sigma, c0, c1, ...]` with the
//! polynomial coefficients in ascending order. Models are never persisted;
//! every fit attempt rebuilds one from the strategy's seeding rules.

use detcal_core::Real;

/// Per-parameter bound intervals; `None` leaves a parameter unconstrained.
pub type Bounds = Vec<Option<(Real, Real)>>;

/// Gaussian peak with an optional polynomial background of the given degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakModel {
    /// Degree of the additive polynomial background, `None` for a pure Gaussian.
    pub background: Option<usize>,
}

impl PeakModel {
    /// Pure Gaussian.
    pub fn gaussian() -> Self {
        Self { background: None }
    }

    /// Gaussian plus polynomial background of degree `degree`.
    pub fn with_background(degree: usize) -> Self {
        Self {
            background: Some(degree),
        }
    }

    /// Functional form name, e.g. `"gaus"` or `"gaus+pol2"`.
    pub fn name(&self) -> String {
        match self.background {
            None => "gaus".to_string(),
            Some(d) => format!("gaus+pol{d}"),
        }
    }

    /// Number of parameters: 3 for the Gaussian plus one per coefficient.
    pub fn param_count(&self) -> usize {
        3 + self.background.map_or(0, |d| d + 1)
    }

    /// Evaluate the model at `x`.
    ///
    /// `params.len()` must equal [`PeakModel::param_count`].
    pub fn eval(&self, x: Real, params: &[Real]) -> Real {
        debug_assert_eq!(params.len(), self.param_count());
        let (amp, mean, sigma) = (params[0], params[1], params[2]);
        let sigma = safe_sigma(sigma);
        let z = (x - mean) / sigma;
        let mut value = amp * (-0.5 * z * z).exp();
        let mut pow = 1.0;
        for &c in &params[3..] {
            value += c * pow;
            pow *= x;
        }
        value
    }

    /// Partial derivatives of the model at `x` with respect to every parameter.
    pub fn gradient(&self, x: Real, params: &[Real], out: &mut [Real]) {
        debug_assert_eq!(out.len(), self.param_count());
        let (amp, mean, sigma) = (params[0], params[1], params[2]);
        let sigma = safe_sigma(sigma);
        let z = (x - mean) / sigma;
        let g = (-0.5 * z * z).exp();
        out[0] = g;
        out[1] = amp * g * z / sigma;
        out[2] = amp * g * z * z / sigma;
        let mut pow = 1.0;
        for slot in out.iter_mut().skip(3) {
            *slot = pow;
            pow *= x;
        }
    }
}

/// Keep the Gaussian width away from zero; the sign is irrelevant since the
/// model only uses `sigma` squared (and odd powers cancel in the gradient).
fn safe_sigma(sigma: Real) -> Real {
    if sigma.abs() < 1e-12 {
        1e-12
    } else {
        sigma
    }
}
