//! Quadratic energy correction from the pi0 and eta mass peaks.
//!
//! Two independent peak measurements per element (pi0 and eta two-photon
//! invariant mass) plus the mean reconstructed photon energies of the two
//! samples fix a per-element linear correction `E' = par0 + par1 * E` through
//! a closed-form 2x2 system:
//!
//! ```text
//! meanRatio = etaMeanE / pi0MeanE
//! pi0Ratio  = PI0_MASS / pi0Pos
//! etaRatio  = ETA_MASS / etaPos
//! par0 = (etaRatio - meanRatio * pi0Ratio) / (1 - meanRatio)
//! par1 = (pi0Ratio - par0) / pi0MeanE
//! ```
//!
//! A degenerate system (`meanRatio` near 1) makes the division blow up; the
//! element then falls back to the identity correction `par0 = 1, par1 = 0`.

use detcal_core::{
    constants::{
        ETA_FIT_WINDOW, ETA_MASS, ETA_SANE_WINDOW, ETA_SEED_WINDOW, PI0_FIT_WINDOW, PI0_MASS,
        PI0_SANE_WINDOW,
    },
    CalibError, Hist2, Real,
};
use detcal_fit::{Bounds, FitData, PeakFitter, PeakModel};

use crate::strategy::{
    CalibStrategy, Calculation, OldSource, ParamSetDecl, StrategyContext, StrategyInit,
};

use super::refit_mean_bounds;

/// Indicator layout of this strategy.
const IND_PI0_POS: usize = 0;
const IND_ETA_POS: usize = 1;
const IND_PI0_MEAN_E: usize = 2;
const IND_ETA_MEAN_E: usize = 3;

/// Solve the closed-form system; `None` when the result is non-finite.
pub fn solve_correction(
    pi0_pos: Real,
    eta_pos: Real,
    pi0_mean_e: Real,
    eta_mean_e: Real,
) -> Option<(Real, Real)> {
    let mean_ratio = eta_mean_e / pi0_mean_e;
    let pi0_ratio = PI0_MASS / pi0_pos;
    let eta_ratio = ETA_MASS / eta_pos;
    let par0 = (eta_ratio - mean_ratio * pi0_ratio) / (1.0 - mean_ratio);
    let par1 = (pi0_ratio - par0) / pi0_mean_e;
    (par0.is_finite() && par1.is_finite()).then_some((par0, par1))
}

/// Quadratic energy correction (CB or TAPS, selected by the store keys).
pub struct QuadEnergyStrategy {
    name: String,
    par0_key: String,
    par1_key: String,
    im: Option<Hist2>,
    mean_pi0: Option<Hist2>,
    mean_eta: Option<Hist2>,
}

impl QuadEnergyStrategy {
    /// Create a quadratic energy strategy with its config prefix and the
    /// detector-specific par0/par1 store keys.
    pub fn new(name: &str, par0_key: &str, par1_key: &str) -> Self {
        Self {
            name: name.to_string(),
            par0_key: par0_key.to_string(),
            par1_key: par1_key.to_string(),
            im: None,
            mean_pi0: None,
            mean_eta: None,
        }
    }

    fn fit_peak(
        &self,
        data: &FitData,
        model: &PeakModel,
        fitter: &dyn PeakFitter,
        amp: Real,
        pos_seed: Real,
        sigma_seed: Real,
        sigma_bounds: (Real, Real),
        pos_half_window: Real,
        refit: bool,
    ) -> Option<Real> {
        let mean_bounds = if refit {
            refit_mean_bounds(pos_seed)
        } else {
            (pos_seed - pos_half_window, pos_seed + pos_half_window)
        };
        let mut seed = vec![amp, pos_seed, sigma_seed];
        let mut bounds: Bounds = vec![
            Some((0.1 * amp, 1.5 * amp)),
            Some(mean_bounds),
            Some(sigma_bounds),
        ];
        for _ in 0..model.param_count() - 3 {
            seed.push(0.0);
            bounds.push(None);
        }
        let outcome = fitter.fit(data, model, &seed, &bounds);
        outcome.fitted().map(|peak| peak.params[1])
    }
}

impl CalibStrategy for QuadEnergyStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &StrategyContext) -> Result<StrategyInit, CalibError> {
        let get = |key: &str| -> Result<Hist2, CalibError> {
            let name = ctx.config.require(key)?;
            ctx.aggregator
                .histogram2(name, &ctx.spec.data_tag, &ctx.spec.run_sets)
                .ok_or_else(|| CalibError::HistogramMissing {
                    name: name.to_string(),
                })
        };
        self.im = Some(get(&format!("{}.Histo.Fit.Name", self.name))?);
        self.mean_pi0 = Some(get(&format!("{}.Histo.MeanE.Pi0.Name", self.name))?);
        self.mean_eta = Some(get(&format!("{}.Histo.MeanE.Eta.Name", self.name))?);

        Ok(StrategyInit {
            params: vec![
                ParamSetDecl {
                    key: self.par0_key.clone(),
                    old: OldSource::StoreOr(1.0),
                },
                ParamSetDecl {
                    key: self.par1_key.clone(),
                    old: OldSource::StoreOr(0.0),
                },
            ],
            overview: vec![
                "#pi^{0} peak position [MeV]".to_string(),
                "#eta peak position [MeV]".to_string(),
            ],
            indicators: vec!["pi0", "eta", "pi0_mean_e", "eta_mean_e"],
        })
    }

    fn fit_element(
        &mut self,
        elem: usize,
        fitter: &dyn PeakFitter,
        prev: Option<&[Real]>,
        refit: bool,
    ) -> Option<Vec<Real>> {
        let im = self.im.as_ref()?.projection(elem)?;
        if im.entries() == 0.0 {
            return None;
        }
        let mean_e_pi0 = self.mean_pi0.as_ref()?.projection(elem)?.mean();
        let mean_e_eta = self.mean_eta.as_ref()?.projection(elem)?.mean();

        // seed the pi0 at the nominal mass, the eta at the empirical maximum
        let mut pi0_seed = PI0_MASS;
        let mut eta_seed = im
            .max_center_in(ETA_SEED_WINDOW.0, ETA_SEED_WINDOW.1)
            .unwrap_or(ETA_MASS);
        if refit {
            if let Some(prev) = prev {
                pi0_seed = prev[IND_PI0_POS];
                eta_seed = prev[IND_ETA_POS];
            }
        }

        let pi0_data = FitData::from_hist(&im, PI0_FIT_WINDOW.0, PI0_FIT_WINDOW.1);
        let eta_data = FitData::from_hist(&im, ETA_FIT_WINDOW.0, ETA_FIT_WINDOW.1);
        let window_max = |d: &FitData| d.ys.iter().cloned().fold(0.0, Real::max);

        let mut pi0_pos = self.fit_peak(
            &pi0_data,
            &PeakModel::with_background(2),
            fitter,
            window_max(&pi0_data),
            pi0_seed,
            10.0,
            (2.0, 40.0),
            15.0,
            refit,
        )?;
        let mut eta_pos = self.fit_peak(
            &eta_data,
            &PeakModel::with_background(3),
            fitter,
            window_max(&eta_data),
            eta_seed,
            15.0,
            (1.0, 50.0),
            30.0,
            refit,
        )?;

        // only accept physical positions outside refit mode
        if !refit {
            if pi0_pos < PI0_SANE_WINDOW.0 || pi0_pos > PI0_SANE_WINDOW.1 {
                pi0_pos = PI0_MASS;
            }
            if eta_pos < ETA_SANE_WINDOW.0 || eta_pos > ETA_SANE_WINDOW.1 {
                eta_pos = ETA_MASS;
            }
        }

        Some(vec![pi0_pos, eta_pos, mean_e_pi0, mean_e_eta])
    }

    fn calculate_element(
        &self,
        _elem: usize,
        positions: Option<&[Real]>,
        _old: &[Real],
    ) -> Calculation {
        let Some(p) = positions else {
            return Calculation {
                values: vec![1.0, 0.0],
                overview: Vec::new(),
                annotation: Some("no correction"),
                detail: "no fit".to_string(),
            };
        };
        let (pi0_pos, eta_pos) = (p[IND_PI0_POS], p[IND_ETA_POS]);
        let (pi0_mean_e, eta_mean_e) = (p[IND_PI0_MEAN_E], p[IND_ETA_MEAN_E]);

        let detail_for = |par0: Real, par1: Real| {
            format!(
                "Pi0 Pos.: {pi0_pos:6.2}    Pi0 ME: {pi0_mean_e:6.2}    \
                 Eta Pos.: {eta_pos:6.2}    Eta ME: {eta_mean_e:6.2}    \
                 Par0: {par0:12.8}    Par1: {par1:e}"
            )
        };

        match solve_correction(pi0_pos, eta_pos, pi0_mean_e, eta_mean_e) {
            Some((par0, par1)) => Calculation {
                values: vec![par0, par1],
                overview: vec![(0, pi0_pos), (1, eta_pos)],
                annotation: None,
                detail: detail_for(par0, par1),
            },
            None => Calculation {
                values: vec![1.0, 0.0],
                overview: vec![(0, pi0_pos), (1, eta_pos)],
                annotation: Some("no correction"),
                detail: detail_for(1.0, 0.0),
            },
        }
    }
}
