//! CB energy gain calibration from the pi0 invariant-mass peak.
//!
//! The two-photon invariant-mass spectrum of each crystal is fitted with a
//! Gaussian over a linear background; the gain is rescaled so the fitted peak
//! lands on the nominal pi0 mass.

use detcal_core::{
    constants::{PI0_MASS, PI0_SANE_WINDOW},
    CalibError, Hist2, Real,
};
use detcal_fit::{Bounds, FitData, PeakFitter, PeakModel};

use crate::strategy::{
    CalibStrategy, Calculation, OldSource, ParamSetDecl, StrategyContext, StrategyInit,
};

use super::{linear_background, max_content, refit_mean_bounds};

/// Window for the empirical peak seed; seeds outside snap to the nominal mass.
const SEED_WINDOW: (Real, Real) = (100.0, 160.0);
/// Fit range around the seed: `(seed - 70, seed + 50)` MeV.
const RANGE_BELOW: Real = 70.0;
const RANGE_ABOVE: Real = 50.0;

/// CB energy gain calibration.
pub struct EnergyStrategy {
    name: String,
    param_key: String,
    histo: Option<Hist2>,
}

impl EnergyStrategy {
    /// Create an energy strategy with its config prefix and store key.
    pub fn new(name: &str, param_key: &str) -> Self {
        Self {
            name: name.to_string(),
            param_key: param_key.to_string(),
            histo: None,
        }
    }
}

impl CalibStrategy for EnergyStrategy {
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
            overview: vec!["2#gamma invariant mass [MeV]".to_string()],
            indicators: vec!["pi0"],
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

        // empirical peak estimate, snapped to the nominal mass when unphysical
        let mut seed_pos = proj.max_center_in(proj.lo, proj.hi)?;
        if seed_pos < SEED_WINDOW.0 || seed_pos > SEED_WINDOW.1 {
            seed_pos = PI0_MASS;
        }
        let mut mean_bounds = None;
        if refit {
            if let Some(prev) = prev {
                seed_pos = prev[0];
                mean_bounds = Some(refit_mean_bounds(seed_pos));
            }
        }

        let (bg0, bg1) = linear_background(&proj, seed_pos, 50.0, 50.0);
        let data = FitData::from_hist(&proj, seed_pos - RANGE_BELOW, seed_pos + RANGE_ABOVE);
        let model = PeakModel::with_background(1);
        let seed = [max_content(&proj), seed_pos, 9.0, bg0, bg1];
        let bounds: Bounds = vec![None, mean_bounds, Some((5.0, 150.0)), None, None];

        let outcome = fitter.fit(&data, &model, &seed, &bounds);
        let mut pos = outcome.fitted()?.params[1];

        // check if the mass is in the normal range
        if !refit && (pos < PI0_SANE_WINDOW.0 || pos > PI0_SANE_WINDOW.1) {
            pos = PI0_MASS;
        }
        Some(vec![pos])
    }

    fn calculate_element(
        &self,
        _elem: usize,
        positions: Option<&[Real]>,
        old: &[Real],
    ) -> Calculation {
        if let Some(p) = positions {
            let pos = p[0];
            let new = old[0] * (PI0_MASS / pos);
            if new.is_finite() && new >= 0.0 {
                return Calculation {
                    values: vec![new],
                    overview: vec![(0, pos)],
                    annotation: None,
                    detail: format!(
                        "Pi0: {pos:12.8}    old gain: {:12.8}    new gain: {new:12.8}",
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
                "Pi0:      -         old gain: {:12.8}    new gain: {:12.8}",
                old[0], old[0]
            ),
        }
    }
}
