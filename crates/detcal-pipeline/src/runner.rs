//! One-shot calibration pass.
//!
//! Glues the driver phases together for batch use: initialize, fit and
//! calculate every element, commit the new arrays. Interactive front ends
//! drive [`CalibrationModule`](crate::CalibrationModule) directly instead so
//! they can override positions between fit and calculate.

use anyhow::{Context, Result};
use detcal_core::{ConfigMap, HistogramAggregator, ParameterStore, Real};
use detcal_fit::LmPeakFitter;
use log::info;

use crate::module::{CalibrationModule, Collaborators, ModuleSpec};
use crate::strategy::StrategyKind;

/// Outcome of a completed pass over all elements.
#[derive(Debug, Clone)]
pub struct PassReport {
    /// One line per element, in element order.
    pub summaries: Vec<String>,
    /// Number of elements whose fit produced usable positions.
    pub n_fitted: usize,
    /// Parameter store keys that were written.
    pub written_keys: Vec<String>,
    /// New value arrays, parallel to `written_keys`.
    pub new_values: Vec<Vec<Real>>,
}

/// Run one full calibration pass and commit the result.
///
/// Elements whose fit fails still get a calculated value (the strategy's
/// fallback), so a pass over a sparsely populated detector completes and
/// writes a full array.
pub fn run_pass(
    kind: StrategyKind,
    spec: ModuleSpec,
    config: &ConfigMap,
    aggregator: &dyn HistogramAggregator,
    store: &mut dyn ParameterStore,
) -> Result<PassReport> {
    let title = spec.title.clone();
    let n_elem = spec.n_elem;

    let mut module = CalibrationModule::new(
        spec,
        kind.build(),
        Box::new(LmPeakFitter::default()),
    );
    module
        .init(&Collaborators {
            config,
            aggregator,
            store,
        })
        .with_context(|| format!("initializing {title}"))?;

    let mut n_fitted = 0;
    for elem in 0..n_elem {
        if module.fit(elem)? {
            n_fitted += 1;
        }
        module.calculate(elem)?;
    }
    info!("{title}: fitted {n_fitted}/{n_elem} element(s)");

    module
        .write_values(store)
        .with_context(|| format!("writing {title}"))?;

    let written_keys: Vec<String> = module
        .param_keys()
        .iter()
        .map(|k| k.to_string())
        .collect();
    let new_values = (0..written_keys.len())
        .filter_map(|set| module.new_values(set).map(<[Real]>::to_vec))
        .collect();

    Ok(PassReport {
        summaries: module.summaries().to_vec(),
        n_fitted,
        written_keys,
        new_values,
    })
}
