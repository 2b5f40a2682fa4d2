//! Pedestal calibration: baseline ADC offset of a channel with no signal.
//!
//! Each element's spectrum shows one narrow pedestal peak; the fitted Gaussian
//! mean replaces the stored pedestal value directly.

use detcal_core::{CalibError, Hist2, Real};
use detcal_fit::{Bounds, FitData, PeakFitter, PeakModel};

use crate::strategy::{
    CalibStrategy, Calculation, OldSource, ParamSetDecl, StrategyContext, StrategyInit,
};

use super::{max_content, refit_mean_bounds};

/// Half-width of the fit window around the pedestal seed, in ADC channels.
const FIT_HALF_WINDOW: Real = 20.0;

/// Pedestal position calibration.
pub struct PedestalStrategy {
    name: String,
    param_key: String,
    histo: Option<Hist2>,
}

impl PedestalStrategy {
    /// Create a pedestal strategy with its config prefix and store key.
    pub fn new(name: &str, param_key: &str) -> Self {
        Self {
            name: name.to_string(),
            param_key: param_key.to_string(),
            histo: None,
        }
    }
}

impl CalibStrategy for PedestalStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &StrategyContext) -> Result<StrategyInit, CalibError> {
        let histo_name = ctx.config.require(&format!("{}.Histo.Fit.Name", self.name))?;
        self.histo = Some(
            ctx.aggregator
                .histogram2(histo_name, &ctx.spec.data_tag, &ctx.spec.run_sets)
                .ok_or_else(|| CalibError::HistogramMissing {
                    name: histo_name.to_string(),
                })?,
        );
        Ok(StrategyInit {
            params: vec![ParamSetDecl {
                key: self.param_key.clone(),
                old: OldSource::Store,
            }],
            overview: vec!["Pedestal position [channel]".to_string()],
            indicators: vec!["pedestal"],
        })
    }

    fn fit_element(
        &mut self,
        elem: usize,
        fitter: &dyn PeakFitter,
        prev: Option<&[Real]>,
        refit: bool,
    ) -> Option<Vec<Real>> {
        let proj = self.histo.as_ref()?.projection(elem)?;
        if proj.entries() == 0.0 {
            return None;
        }

        let mut seed_pos = proj.max_center_in(proj.lo, proj.hi)?;
        let mut mean_bounds = (seed_pos - FIT_HALF_WINDOW, seed_pos + FIT_HALF_WINDOW);
        if refit {
            if let Some(prev) = prev {
                seed_pos = prev[0];
                mean_bounds = refit_mean_bounds(seed_pos);
            }
        }

        let data = FitData::from_hist(&proj, seed_pos - FIT_HALF_WINDOW, seed_pos + FIT_HALF_WINDOW);
        let model = PeakModel::gaussian();
        let seed = [max_content(&proj), seed_pos, 5.0];
        let bounds: Bounds = vec![None, Some(mean_bounds), Some((0.5, 50.0))];

        let outcome = fitter.fit(&data, &model, &seed, &bounds);
        let peak = outcome.fitted()?;
        Some(vec![peak.params[1]])
    }

    fn calculate_element(
        &self,
        _elem: usize,
        positions: Option<&[Real]>,
        old: &[Real],
    ) -> Calculation {
        match positions {
            Some(p) if p[0].is_finite() => Calculation {
                values: vec![p[0]],
                overview: vec![(0, p[0])],
                annotation: None,
                detail: format!("Ped: {:9.4}    old: {:9.4}    new: {:9.4}", p[0], old[0], p[0]),
            },
            _ => Calculation {
                values: vec![old[0]],
                overview: Vec::new(),
                annotation: Some("unchanged"),
                detail: format!(
                    "Ped:      -      old: {:9.4}    new: {:9.4}",
                    old[0], old[0]
                ),
            },
        }
    }
}
