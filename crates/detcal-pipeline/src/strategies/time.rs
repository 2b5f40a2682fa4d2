//! Time offset calibration.
//!
//! The per-element time spectrum peaks at the current misalignment; the new
//! TDC offset shifts that peak to zero, converted through the channel's TDC
//! gain which is read from the parameter store at init.

use detcal_core::{CalibError, Hist2, Real};
use detcal_fit::{Bounds, FitData, PeakFitter, PeakModel};

use crate::strategy::{
    CalibStrategy, Calculation, OldSource, ParamSetDecl, StrategyContext, StrategyInit,
};

use super::{max_content, refit_mean_bounds};

/// Half-width of the fit window around the time peak, in ns.
const FIT_HALF_WINDOW: Real = 15.0;

/// TDC offset calibration.
pub struct TimeStrategy {
    name: String,
    offset_key: String,
    gain_key: String,
    histo: Option<Hist2>,
    gains: Vec<Real>,
}

impl TimeStrategy {
    /// Create a time strategy with its config prefix, offset key, and gain key.
    pub fn new(name: &str, offset_key: &str, gain_key: &str) -> Self {
        Self {
            name: name.to_string(),
            offset_key: offset_key.to_string(),
            gain_key: gain_key.to_string(),
            histo: None,
            gains: Vec::new(),
        }
    }
}

impl CalibStrategy for TimeStrategy {
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

        // per-channel TDC gain, needed by the offset formula
        let first_set = ctx.spec.run_sets.first().copied().unwrap_or(0);
        self.gains = ctx.store.read(
            &self.gain_key,
            &ctx.spec.calibration,
            first_set,
            ctx.spec.n_elem,
        )?;

        Ok(StrategyInit {
            params: vec![ParamSetDecl {
                key: self.offset_key.clone(),
                old: OldSource::Store,
            }],
            overview: vec!["Time position [ns]".to_string()],
            indicators: vec!["time"],
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
        let seed = [max_content(&proj), seed_pos, 1.0];
        let bounds: Bounds = vec![None, Some(mean_bounds), Some((0.1, 50.0))];

        let outcome = fitter.fit(&data, &model, &seed, &bounds);
        let peak = outcome.fitted()?;
        Some(vec![peak.params[1]])
    }

    fn calculate_element(
        &self,
        elem: usize,
        positions: Option<&[Real]>,
        old: &[Real],
    ) -> Calculation {
        if let Some(p) = positions {
            let mean = p[0];
            let gain = self.gains.get(elem).copied().unwrap_or(0.0);
            let new = old[0] + mean / gain;
            if new.is_finite() {
                return Calculation {
                    values: vec![new],
                    overview: vec![(0, mean)],
                    annotation: None,
                    detail: format!(
                        "Time: {mean:8.3}    old offset: {:12.8}    new offset: {new:12.8}",
                        old[0]
                    ),
                };
            }
        }
        Calculation {
            values: vec![old[0]],
            overview: Vec::new(),
            annotation: Some("unchanged"),
            detail: format!(
                "Time:     -       old offset: {:12.8}    new offset: {:12.8}",
                old[0], old[0]
            ),
        }
    }
}
