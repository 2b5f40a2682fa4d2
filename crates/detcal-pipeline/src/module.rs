//! The generic per-element calibration driver.
//!
//! [`CalibrationModule`] executes one calibration pass:
//! `init` → per element `{fit, adjust_indicator*, calculate}` → `write_values`.
//! The driver owns the old/new value arrays, the per-element fit state with
//! effective (possibly operator-adjusted) indicator positions, the overview
//! series, and the summary lines; the injected [`CalibStrategy`] decides what
//! gets fitted and how values are computed.
//!
//! Phases: `Created → Ready → Written`. Refitting an element any number of
//! times before its `calculate` is allowed; after `write_values` the module
//! only accepts further (idempotent) `write_values` calls.

use detcal_core::{CalibError, Real};
use detcal_fit::PeakFitter;
use log::info;

use crate::strategy::{CalibStrategy, OldSource, StrategyContext};

pub use crate::strategy::StrategyInit;

/// Identity and scope of one calibration module instance.
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    /// Calibration identifier selecting the parameter-store namespace.
    pub calibration: String,
    /// Human-readable title.
    pub title: String,
    /// Data-type tag of the analysis pass that produced the histograms.
    pub data_tag: String,
    /// Number of detector elements.
    pub n_elem: usize,
    /// Run sets of this calibration epoch; outputs are written per run set.
    pub run_sets: Vec<u32>,
    /// Refit mode: re-running over previously fitted elements with
    /// tightened bounds around the prior answer.
    pub refit: bool,
}

/// Collaborator handles injected at init time.
pub struct Collaborators<'a> {
    /// Per-module configuration.
    pub config: &'a detcal_core::ConfigMap,
    /// Accumulated-histogram source.
    pub aggregator: &'a dyn detcal_core::HistogramAggregator,
    /// Parameter store, read side.
    pub store: &'a dyn detcal_core::ParameterStore,
}

/// Driver phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, not initialized.
    Created,
    /// Initialized; the element loop may run.
    Ready,
    /// Values committed; only further `write_values` calls are accepted.
    Written,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Created => "Created",
            Phase::Ready => "Ready",
            Phase::Written => "Written",
        }
    }
}

/// One parameter array maintained by the driver.
#[derive(Debug, Clone)]
struct ParamSet {
    key: String,
    old: Vec<Real>,
    new: Vec<Real>,
}

/// Per-element fit state.
#[derive(Debug, Clone, Default)]
struct ElementState {
    /// Effective indicator positions; `None` until a successful fit.
    positions: Option<Vec<Real>>,
    /// An operator repositioned an indicator after the last fit.
    overridden: bool,
    calculated: bool,
}

/// One overview series accumulated across the element loop.
#[derive(Debug, Clone)]
pub struct OverviewTrack {
    /// Human-readable label.
    pub label: String,
    /// Appended `(element, value)` points in loop order.
    pub points: Vec<(usize, Real)>,
}

/// Generic per-element calibration state machine.
pub struct CalibrationModule {
    spec: ModuleSpec,
    strategy: Box<dyn CalibStrategy>,
    fitter: Box<dyn PeakFitter>,
    phase: Phase,
    params: Vec<ParamSet>,
    elements: Vec<ElementState>,
    overview: Vec<OverviewTrack>,
    indicators: Vec<&'static str>,
    summaries: Vec<String>,
}

impl CalibrationModule {
    /// Create an uninitialized module.
    pub fn new(
        spec: ModuleSpec,
        strategy: Box<dyn CalibStrategy>,
        fitter: Box<dyn PeakFitter>,
    ) -> Self {
        Self {
            spec,
            strategy,
            fitter,
            phase: Phase::Created,
            params: Vec::new(),
            elements: Vec::new(),
            overview: Vec::new(),
            indicators: Vec::new(),
            summaries: Vec::new(),
        }
    }

    fn check_phase(&self, op: &'static str, expected: Phase) -> Result<(), CalibError> {
        if self.phase != expected {
            return Err(CalibError::Phase {
                op,
                phase: self.phase.name(),
            });
        }
        Ok(())
    }

    fn check_elem(&self, elem: usize) -> Result<(), CalibError> {
        if elem >= self.spec.n_elem {
            return Err(CalibError::OutOfRange {
                elem,
                n_elem: self.spec.n_elem,
            });
        }
        Ok(())
    }

    /// Initialize the module: strategy setup, old-value loading, state reset.
    ///
    /// Any failure (missing configuration key, missing histogram, unreadable
    /// required parameters) is fatal for the pass; nothing has been written.
    pub fn init(&mut self, collab: &Collaborators) -> Result<(), CalibError> {
        self.check_phase("init", Phase::Created)?;

        let ctx = StrategyContext {
            config: collab.config,
            aggregator: collab.aggregator,
            store: collab.store,
            spec: &self.spec,
        };
        let decl = self.strategy.init(&ctx)?;

        let n = self.spec.n_elem;
        let first_set = self.spec.run_sets.first().copied().unwrap_or(0);
        let mut params = Vec::with_capacity(decl.params.len());
        for p in &decl.params {
            let old = match p.old {
                OldSource::Store => {
                    collab
                        .store
                        .read(&p.key, &self.spec.calibration, first_set, n)?
                }
                OldSource::StoreOr(default) => {
                    match collab.store.read(&p.key, &self.spec.calibration, first_set, n) {
                        Ok(values) => values,
                        Err(CalibError::ParamsMissing { .. }) => vec![default; n],
                        Err(err) => return Err(err),
                    }
                }
            };
            params.push(ParamSet {
                key: p.key.clone(),
                new: old.clone(),
                old,
            });
        }

        self.params = params;
        self.elements = vec![ElementState::default(); n];
        self.overview = decl
            .overview
            .into_iter()
            .map(|label| OverviewTrack {
                label,
                points: Vec::new(),
            })
            .collect();
        self.indicators = decl.indicators;
        self.summaries.clear();
        self.phase = Phase::Ready;
        info!(
            "{}: initialized for {} elements, run sets {:?}",
            self.spec.title, n, self.spec.run_sets
        );
        Ok(())
    }

    /// Fit element `elem`.
    ///
    /// Returns `Ok(true)` when a fit produced indicator positions, `Ok(false)`
    /// on insufficient statistics or a non-converging fit (the element stays
    /// at "no fit" and `calculate` will take the fallback path).
    pub fn fit(&mut self, elem: usize) -> Result<bool, CalibError> {
        self.check_phase("fit", Phase::Ready)?;
        self.check_elem(elem)?;

        let prev = self.elements[elem].positions.clone();
        let positions = self.strategy.fit_element(
            elem,
            self.fitter.as_ref(),
            prev.as_deref(),
            self.spec.refit,
        );

        let state = &mut self.elements[elem];
        match positions {
            Some(positions) => {
                state.positions = Some(positions);
                state.overridden = false;
                Ok(true)
            }
            None => {
                state.positions = None;
                state.overridden = false;
                Ok(false)
            }
        }
    }

    /// Operator override: reposition indicator `indicator` of element `elem`.
    ///
    /// Does not re-run the fitter; the new position becomes the effective peak
    /// position for the next `calculate`. Rejected when the element has no fit
    /// state.
    pub fn adjust_indicator(
        &mut self,
        elem: usize,
        indicator: usize,
        position: Real,
    ) -> Result<(), CalibError> {
        self.check_phase("adjust_indicator", Phase::Ready)?;
        self.check_elem(elem)?;

        let state = &mut self.elements[elem];
        let Some(positions) = state.positions.as_mut() else {
            return Err(CalibError::NoFitState { elem });
        };
        let slot = positions
            .get_mut(indicator)
            .ok_or(CalibError::OutOfRange {
                elem: indicator,
                n_elem: self.indicators.len(),
            })?;
        *slot = position;
        state.overridden = true;
        Ok(())
    }

    /// Effective position of one indicator, for display.
    pub fn effective_position(&self, elem: usize, indicator: usize) -> Option<Real> {
        self.elements
            .get(elem)?
            .positions
            .as_ref()?
            .get(indicator)
            .copied()
    }

    /// Compute the new value(s) of element `elem` and append its summary line.
    ///
    /// Never fails on physics grounds: with no fit state or a degenerate
    /// result the strategy falls back to the old value or its identity
    /// default, and the summary line carries the corresponding annotation.
    pub fn calculate(&mut self, elem: usize) -> Result<&str, CalibError> {
        self.check_phase("calculate", Phase::Ready)?;
        self.check_elem(elem)?;

        let old: Vec<Real> = self.params.iter().map(|p| p.old[elem]).collect();
        let positions = self.elements[elem].positions.clone();
        let calc = self
            .strategy
            .calculate_element(elem, positions.as_deref(), &old);

        debug_assert_eq!(calc.values.len(), self.params.len());
        for (set, value) in self.params.iter_mut().zip(&calc.values) {
            set.new[elem] = *value;
        }
        for (track, value) in calc.overview {
            if let Some(track) = self.overview.get_mut(track) {
                track.points.push((elem, value));
            }
        }
        self.elements[elem].calculated = true;

        let mut line = format!("Element: {elem:03}    {}", calc.detail);
        if let Some(marker) = calc.annotation {
            line.push_str("    -> ");
            line.push_str(marker);
        }
        info!("{line}");
        self.summaries.push(line);
        Ok(self.summaries.last().map(String::as_str).unwrap_or(""))
    }

    /// Commit every parameter array to the store, for every run set.
    ///
    /// Requires `calculate` to have run for all elements. The first call
    /// transitions the module to its terminal phase; repeated calls re-write
    /// identical arrays and are allowed (the driver does not mutate values
    /// here).
    pub fn write_values(
        &mut self,
        store: &mut dyn detcal_core::ParameterStore,
    ) -> Result<(), CalibError> {
        if self.phase == Phase::Created {
            return Err(CalibError::Phase {
                op: "write_values",
                phase: self.phase.name(),
            });
        }
        if self.elements.iter().any(|e| !e.calculated) {
            return Err(CalibError::Phase {
                op: "write_values (not all elements calculated)",
                phase: self.phase.name(),
            });
        }

        for &run_set in &self.spec.run_sets {
            for set in &self.params {
                store.write(&set.key, &self.spec.calibration, run_set, &set.new)?;
            }
        }
        self.phase = Phase::Written;
        info!(
            "{}: wrote {} parameter set(s) for {} run set(s)",
            self.spec.title,
            self.params.len(),
            self.spec.run_sets.len()
        );
        Ok(())
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Module identity.
    pub fn spec(&self) -> &ModuleSpec {
        &self.spec
    }

    /// Whether element `elem` currently has fit state.
    pub fn has_fit(&self, elem: usize) -> bool {
        self.elements
            .get(elem)
            .is_some_and(|e| e.positions.is_some())
    }

    /// Whether element `elem` was manually overridden since its last fit.
    pub fn is_overridden(&self, elem: usize) -> bool {
        self.elements.get(elem).is_some_and(|e| e.overridden)
    }

    /// Summary lines accumulated so far, one per `calculate` call.
    pub fn summaries(&self) -> &[String] {
        &self.summaries
    }

    /// Overview series accumulated across the element loop.
    pub fn overview(&self) -> &[OverviewTrack] {
        &self.overview
    }

    /// New values of parameter set `set`.
    pub fn new_values(&self, set: usize) -> Option<&[Real]> {
        self.params.get(set).map(|p| p.new.as_slice())
    }

    /// Old values of parameter set `set`.
    pub fn old_values(&self, set: usize) -> Option<&[Real]> {
        self.params.get(set).map(|p| p.old.as_slice())
    }

    /// Store keys of the parameter sets, in declaration order.
    pub fn param_keys(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.key.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{CalibStrategy, Calculation, ParamSetDecl, StrategyInit};
    use detcal_core::{ConfigMap, MemoryAggregator, MemoryStore, ParameterStore};
    use detcal_fit::{Bounds, FitData, FitOutcome, PeakModel};

    /// Fitter stub; the stub strategy below never calls it.
    struct NoFitter;

    impl PeakFitter for NoFitter {
        fn fit(
            &self,
            _data: &FitData,
            _model: &PeakModel,
            _seed: &[Real],
            _bounds: &Bounds,
        ) -> FitOutcome {
            FitOutcome::Failed
        }
    }

    /// Strategy stub: elements listed in `peaks` "fit" at the given position,
    /// the new value is the position itself, fallback is the old value.
    struct StubStrategy {
        peaks: Vec<Option<Real>>,
    }

    impl CalibStrategy for StubStrategy {
        fn name(&self) -> &str {
            "stub"
        }

        fn init(&mut self, _ctx: &StrategyContext) -> Result<StrategyInit, CalibError> {
            Ok(StrategyInit {
                params: vec![ParamSetDecl {
                    key: "Data.Stub".to_string(),
                    old: OldSource::Store,
                }],
                overview: vec!["Peak position".to_string()],
                indicators: vec!["peak"],
            })
        }

        fn fit_element(
            &mut self,
            elem: usize,
            _fitter: &dyn PeakFitter,
            prev: Option<&[Real]>,
            refit: bool,
        ) -> Option<Vec<Real>> {
            if refit {
                if let Some(prev) = prev {
                    return Some(prev.to_vec());
                }
            }
            self.peaks.get(elem).copied().flatten().map(|p| vec![p])
        }

        fn calculate_element(
            &self,
            _elem: usize,
            positions: Option<&[Real]>,
            old: &[Real],
        ) -> Calculation {
            match positions {
                Some(p) => Calculation {
                    values: vec![p[0]],
                    overview: vec![(0, p[0])],
                    annotation: None,
                    detail: format!("pos: {:.2}", p[0]),
                },
                None => Calculation {
                    values: vec![old[0]],
                    overview: Vec::new(),
                    annotation: Some("unchanged"),
                    detail: format!("old: {:.2}", old[0]),
                },
            }
        }
    }

    fn test_module(peaks: Vec<Option<Real>>, refit: bool) -> (CalibrationModule, MemoryStore) {
        let n = peaks.len();
        let spec = ModuleSpec {
            calibration: "LH2_2024".to_string(),
            title: "stub calibration".to_string(),
            data_tag: "Pi0".to_string(),
            n_elem: n,
            run_sets: vec![0, 1],
            refit,
        };
        let mut store = MemoryStore::new();
        store
            .write("Data.Stub", "LH2_2024", 0, &vec![100.0; n])
            .unwrap();
        let module = CalibrationModule::new(
            spec,
            Box::new(StubStrategy { peaks }),
            Box::new(NoFitter),
        );
        (module, store)
    }

    fn init_module(module: &mut CalibrationModule, store: &MemoryStore) {
        let config = ConfigMap::default();
        let aggregator = MemoryAggregator::new();
        module
            .init(&Collaborators {
                config: &config,
                aggregator: &aggregator,
                store,
            })
            .unwrap();
    }

    #[test]
    fn operations_require_init() {
        let (mut module, mut store) = test_module(vec![Some(1.0)], false);
        assert!(matches!(module.fit(0), Err(CalibError::Phase { .. })));
        assert!(matches!(module.calculate(0), Err(CalibError::Phase { .. })));
        assert!(matches!(
            module.write_values(&mut store),
            Err(CalibError::Phase { .. })
        ));
    }

    #[test]
    fn calculate_without_fit_takes_fallback() {
        // ordering property: calculate on a fresh element must deterministically
        // yield the unchanged old value, never undefined fit state
        let (mut module, store) = test_module(vec![Some(135.0), Some(140.0)], false);
        init_module(&mut module, &store);

        let line = module.calculate(0).unwrap().to_string();
        assert!(line.contains("-> unchanged"));
        assert_eq!(module.new_values(0).unwrap()[0], 100.0);
    }

    #[test]
    fn fit_then_calculate_uses_the_fit() {
        let (mut module, store) = test_module(vec![Some(135.0)], false);
        init_module(&mut module, &store);

        assert!(module.fit(0).unwrap());
        let line = module.calculate(0).unwrap().to_string();
        assert!(!line.contains("unchanged"));
        assert_eq!(module.new_values(0).unwrap()[0], 135.0);
        assert_eq!(module.overview()[0].points, vec![(0, 135.0)]);
    }

    #[test]
    fn adjust_indicator_overrides_the_position() {
        let (mut module, store) = test_module(vec![Some(135.0)], false);
        init_module(&mut module, &store);

        module.fit(0).unwrap();
        module.adjust_indicator(0, 0, 137.5).unwrap();
        assert!(module.is_overridden(0));
        assert_eq!(module.effective_position(0, 0), Some(137.5));

        module.calculate(0).unwrap();
        assert_eq!(module.new_values(0).unwrap()[0], 137.5);
    }

    #[test]
    fn adjust_without_fit_state_is_rejected() {
        let (mut module, store) = test_module(vec![None], false);
        init_module(&mut module, &store);

        assert!(matches!(
            module.adjust_indicator(0, 0, 1.0),
            Err(CalibError::NoFitState { elem: 0 })
        ));

        let (mut module, store) = test_module(vec![Some(1.0)], false);
        init_module(&mut module, &store);
        module.fit(0).unwrap();
        assert!(matches!(
            module.adjust_indicator(0, 5, 1.0),
            Err(CalibError::OutOfRange { .. })
        ));
    }

    #[test]
    fn refit_clears_the_override_flag() {
        let (mut module, store) = test_module(vec![Some(135.0)], true);
        init_module(&mut module, &store);

        module.fit(0).unwrap();
        module.adjust_indicator(0, 0, 150.0).unwrap();
        // refit seeds from the adjusted position (stub echoes prev)
        module.fit(0).unwrap();
        assert!(!module.is_overridden(0));
        assert_eq!(module.effective_position(0, 0), Some(150.0));
    }

    #[test]
    fn write_requires_all_elements_calculated() {
        let (mut module, store) = test_module(vec![Some(1.0), Some(2.0)], false);
        init_module(&mut module, &store);
        let mut out = MemoryStore::new();

        module.fit(0).unwrap();
        module.calculate(0).unwrap();
        assert!(module.write_values(&mut out).is_err());

        module.fit(1).unwrap();
        module.calculate(1).unwrap();
        module.write_values(&mut out).unwrap();
        assert_eq!(module.phase(), Phase::Written);
    }

    #[test]
    fn write_is_idempotent_and_terminal() {
        let (mut module, store) = test_module(vec![Some(42.0)], false);
        init_module(&mut module, &store);
        module.fit(0).unwrap();
        module.calculate(0).unwrap();

        let mut out = MemoryStore::new();
        module.write_values(&mut out).unwrap();
        let first: Vec<Vec<Real>> = vec![
            out.read("Data.Stub", "LH2_2024", 0, 1).unwrap(),
            out.read("Data.Stub", "LH2_2024", 1, 1).unwrap(),
        ];

        // second write produces identical arrays
        module.write_values(&mut out).unwrap();
        assert_eq!(out.read("Data.Stub", "LH2_2024", 0, 1).unwrap(), first[0]);
        assert_eq!(out.read("Data.Stub", "LH2_2024", 1, 1).unwrap(), first[1]);

        // but the element loop is over
        assert!(matches!(module.fit(0), Err(CalibError::Phase { .. })));
        assert!(matches!(module.calculate(0), Err(CalibError::Phase { .. })));
        assert!(matches!(
            module.adjust_indicator(0, 0, 1.0),
            Err(CalibError::Phase { .. })
        ));
    }

    #[test]
    fn every_run_set_gets_its_own_output() {
        let (mut module, store) = test_module(vec![Some(7.0)], false);
        init_module(&mut module, &store);
        module.fit(0).unwrap();
        module.calculate(0).unwrap();

        let mut out = MemoryStore::new();
        module.write_values(&mut out).unwrap();
        assert_eq!(out.read("Data.Stub", "LH2_2024", 0, 1).unwrap(), vec![7.0]);
        assert_eq!(out.read("Data.Stub", "LH2_2024", 1, 1).unwrap(), vec![7.0]);
    }

    #[test]
    fn out_of_range_element_is_rejected() {
        let (mut module, store) = test_module(vec![Some(1.0)], false);
        init_module(&mut module, &store);
        assert!(matches!(
            module.fit(3),
            Err(CalibError::OutOfRange { elem: 3, n_elem: 1 })
        ));
    }
}
