//! PID azimuthal angle calibration.
//!
//! The per-element hit-position spectrum lives on a channel-position axis;
//! an external geometry table maps positions to azimuthal angles before the
//! generic Gaussian fit runs. The fitted angle replaces the stored phi offset.

use detcal_core::{CalibError, Hist2, Real};
use detcal_fit::{Bounds, FitData, PeakFitter, PeakModel};

use crate::strategy::{
    CalibStrategy, Calculation, OldSource, ParamSetDecl, StrategyContext, StrategyInit,
};

use super::{max_content, refit_mean_bounds};

/// Half-width of the fit window around the angle seed, in degrees.
const FIT_HALF_WINDOW: Real = 30.0;

/// Pure position-to-angle mapping supplied by the detector geometry.
pub trait ElementGeometry {
    /// Azimuthal angle in degrees for a channel-position coordinate.
    fn to_angle(&self, pos: Real) -> Real;
    /// Angle axis `(lo, hi, n_bins)` of the remapped spectrum.
    fn angle_axis(&self) -> (Real, Real, usize);
}

/// Evenly spaced elements: `angle = offset + step * pos`.
#[derive(Debug, Clone)]
pub struct UniformGeometry {
    /// Angle of position zero.
    pub offset: Real,
    /// Degrees per position unit.
    pub step: Real,
}

impl UniformGeometry {
    /// Geometry of the 24-element PID barrel, 15 degrees per element.
    pub fn pid() -> Self {
        Self {
            offset: -180.0,
            step: 15.0,
        }
    }
}

impl ElementGeometry for UniformGeometry {
    fn to_angle(&self, pos: Real) -> Real {
        self.offset + self.step * pos
    }

    fn angle_axis(&self) -> (Real, Real, usize) {
        (-180.0, 180.0, 360)
    }
}

/// PID phi offset calibration.
pub struct PhiStrategy {
    name: String,
    param_key: String,
    geometry: Box<dyn ElementGeometry>,
    histo: Option<Hist2>,
}

impl PhiStrategy {
    /// Create a phi strategy with the default PID barrel geometry.
    pub fn new(name: &str, param_key: &str) -> Self {
        Self::with_geometry(name, param_key, Box::new(UniformGeometry::pid()))
    }

    /// Create a phi strategy with an explicit geometry table.
    pub fn with_geometry(
        name: &str,
        param_key: &str,
        geometry: Box<dyn ElementGeometry>,
    ) -> Self {
        Self {
            name: name.to_string(),
            param_key: param_key.to_string(),
            geometry,
            histo: None,
        }
    }
}

impl CalibStrategy for PhiStrategy {
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
            overview: vec!["#phi position [deg]".to_string()],
            indicators: vec!["phi"],
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

        // position -> angle remapping before the generic fit
        let (lo, hi, n_bins) = self.geometry.angle_axis();
        let mapped = proj.remap(lo, hi, n_bins, |x| self.geometry.to_angle(x));

        let mut seed_pos = mapped.max_center_in(lo, hi)?;
        let mut mean_bounds = (seed_pos - FIT_HALF_WINDOW, seed_pos + FIT_HALF_WINDOW);
        if refit {
            if let Some(prev) = prev {
                seed_pos = prev[0];
                mean_bounds = refit_mean_bounds(seed_pos);
            }
        }

        let data = FitData::from_hist(&mapped, seed_pos - FIT_HALF_WINDOW, seed_pos + FIT_HALF_WINDOW);
        let model = PeakModel::gaussian();
        let seed = [max_content(&mapped), seed_pos, 10.0];
        let bounds: Bounds = vec![None, Some(mean_bounds), Some((1.0, 90.0))];

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
                detail: format!(
                    "Phi: {:8.3}    old: {:8.3}    new: {:8.3}",
                    p[0], old[0], p[0]
                ),
            },
            _ => Calculation {
                values: vec![old[0]],
                overview: Vec::new(),
                annotation: Some("unchanged"),
                detail: format!("Phi:     -      old: {:8.3}    new: {:8.3}", old[0], old[0]),
            },
        }
    }
}
