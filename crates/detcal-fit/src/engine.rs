//! Bounded Levenberg-Marquardt peak fitting.
//!
//! The solver minimizes `model(x_k) - y_k` over the bins of a sliced spectrum.
//! Bounds are enforced by reparameterizing each bounded parameter as
//! `p = mid + half * tanh(t)` and chaining the derivative into the Jacobian,
//! so the underlying solver remains unconstrained. A fit that does not
//! converge is retried from its last parameters up to a fixed attempt budget
//! before it is reported as failed.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};

use detcal_core::{Hist1, Real};

use crate::model::{Bounds, PeakModel};

/// Bin centers and contents extracted from a histogram range.
#[derive(Debug, Clone)]
pub struct FitData {
    /// Bin centers.
    pub xs: Vec<Real>,
    /// Bin contents.
    pub ys: Vec<Real>,
}

impl FitData {
    /// Extract the bins of `hist` whose centers lie in `[lo, hi]`.
    pub fn from_hist(hist: &Hist1, lo: Real, hi: Real) -> Self {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for i in 0..hist.n_bins() {
            let x = hist.bin_center(i);
            if x >= lo && x <= hi {
                xs.push(x);
                ys.push(hist.counts[i]);
            }
        }
        Self { xs, ys }
    }

    /// Number of data points.
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    /// Whether the range contained no bins.
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }
}

/// Result of a converged fit.
#[derive(Debug, Clone)]
pub struct FittedPeak {
    /// Fitted parameter vector in model layout.
    pub params: Vec<Real>,
    /// Final sum of squared residuals.
    pub cost: Real,
    /// Function evaluations spent by the solver.
    pub iterations: usize,
}

/// Outcome of a fit attempt.
///
/// Callers check for empty spectra before fitting; `Failed` therefore always
/// means the solver exhausted its attempt budget without converging.
#[derive(Debug, Clone)]
pub enum FitOutcome {
    /// The solver converged.
    Fitted(FittedPeak),
    /// The solver did not converge within the attempt budget.
    Failed,
}

impl FitOutcome {
    /// The fitted peak, if the fit converged.
    pub fn fitted(&self) -> Option<&FittedPeak> {
        match self {
            FitOutcome::Fitted(peak) => Some(peak),
            FitOutcome::Failed => None,
        }
    }
}

/// Black-box nonlinear peak fitter.
pub trait PeakFitter {
    /// Fit `model` to `data`, starting from `seed`, honoring `bounds`.
    fn fit(&self, data: &FitData, model: &PeakModel, seed: &[Real], bounds: &Bounds) -> FitOutcome;
}

/// Per-parameter mapping between solver space and model space.
#[derive(Debug, Clone, Copy)]
enum ParamMap {
    Free,
    Interval { mid: Real, half: Real },
}

impl ParamMap {
    fn forward(&self, t: Real) -> Real {
        match *self {
            ParamMap::Free => t,
            ParamMap::Interval { mid, half } => mid + half * t.tanh(),
        }
    }

    fn inverse(&self, p: Real) -> Real {
        match *self {
            ParamMap::Free => p,
            ParamMap::Interval { mid, half } => {
                let u = ((p - mid) / half).clamp(-1.0 + 1e-9, 1.0 - 1e-9);
                u.atanh()
            }
        }
    }

    fn derivative(&self, t: Real) -> Real {
        match *self {
            ParamMap::Free => 1.0,
            ParamMap::Interval { half, .. } => {
                let th = t.tanh();
                half * (1.0 - th * th)
            }
        }
    }
}

fn build_maps(bounds: &Bounds, n_params: usize) -> Vec<ParamMap> {
    (0..n_params)
        .map(|i| match bounds.get(i).copied().flatten() {
            Some((lo, hi)) if hi > lo => ParamMap::Interval {
                mid: 0.5 * (lo + hi),
                half: 0.5 * (hi - lo),
            },
            _ => ParamMap::Free,
        })
        .collect()
}

struct PeakProblem<'a> {
    data: &'a FitData,
    model: &'a PeakModel,
    maps: &'a [ParamMap],
    t: DVector<Real>,
}

impl<'a> PeakProblem<'a> {
    fn model_params(&self) -> Vec<Real> {
        self.maps
            .iter()
            .zip(self.t.iter())
            .map(|(map, &t)| map.forward(t))
            .collect()
    }
}

impl<'a> LeastSquaresProblem<Real, Dyn, Dyn> for PeakProblem<'a> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.t.clone_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.t.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        let params = self.model_params();
        Some(DVector::from_iterator(
            self.data.len(),
            self.data
                .xs
                .iter()
                .zip(&self.data.ys)
                .map(|(&x, &y)| self.model.eval(x, &params) - y),
        ))
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        let params = self.model_params();
        let n = self.model.param_count();
        let mut jac = DMatrix::zeros(self.data.len(), n);
        let mut grad = vec![0.0; n];
        for (row, &x) in self.data.xs.iter().enumerate() {
            self.model.gradient(x, &params, &mut grad);
            for col in 0..n {
                jac[(row, col)] = grad[col] * self.maps[col].derivative(self.t[col]);
            }
        }
        Some(jac)
    }
}

/// Levenberg-Marquardt peak fitter with a bounded retry budget.
#[derive(Debug, Clone)]
pub struct LmPeakFitter {
    /// Relative tolerance on the cost reduction.
    pub ftol: Real,
    /// Gradient orthogonality tolerance.
    pub gtol: Real,
    /// Solver patience (function-evaluation cap per attempt).
    pub max_iters: usize,
    /// Attempts before a fit is declared failed.
    pub attempts: usize,
}

impl Default for LmPeakFitter {
    fn default() -> Self {
        Self {
            ftol: 1e-10,
            gtol: 1e-10,
            max_iters: 200,
            attempts: 10,
        }
    }
}

impl PeakFitter for LmPeakFitter {
    fn fit(&self, data: &FitData, model: &PeakModel, seed: &[Real], bounds: &Bounds) -> FitOutcome {
        if data.len() < model.param_count() {
            return FitOutcome::Failed;
        }
        let maps = build_maps(bounds, model.param_count());
        let mut t = DVector::from_iterator(
            seed.len(),
            maps.iter().zip(seed).map(|(map, &p)| map.inverse(p)),
        );

        for attempt in 0..self.attempts.max(1) {
            let lm = LevenbergMarquardt::new()
                .with_ftol(self.ftol)
                .with_xtol(self.ftol)
                .with_gtol(self.gtol)
                .with_patience(self.max_iters.max(1));

            let problem = PeakProblem {
                data,
                model,
                maps: &maps,
                t: t.clone(),
            };
            let (problem, report) = lm.minimize(problem);

            if report.termination.was_successful() {
                return FitOutcome::Fitted(FittedPeak {
                    params: problem.model_params(),
                    cost: report.objective_function,
                    iterations: report.number_of_evaluations,
                });
            }

            debug!(
                "{} fit attempt {} did not converge ({:?})",
                model.name(),
                attempt + 1,
                report.termination
            );
            // continue from wherever the solver stopped
            t = problem.params();
        }
        FitOutcome::Failed
    }
}
