//! Strategy trait and the tagged factory selecting a concrete calibration.
//!
//! A strategy supplies the physics of one calibration quantity: the histogram
//! names it expects in the configuration, the parameter-store keys it reads
//! and writes, the peak model and seeding rules for the per-element fit, and
//! the formula turning an accepted peak position into a new calibration value.
//! The driver never inspects what the positions mean; only the strategy does.

use std::str::FromStr;

use detcal_core::{CalibError, ConfigMap, HistogramAggregator, ParameterStore, Real};
use detcal_fit::PeakFitter;

use crate::module::ModuleSpec;
use crate::strategies::{
    EnergyStrategy, PedestalStrategy, PhiStrategy, QuadEnergyStrategy, TimeStrategy,
};

/// Where a parameter set's old values come from at init.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OldSource {
    /// Read from the parameter store; absence is fatal.
    Store,
    /// Read from the parameter store; absence fills the array with the value.
    StoreOr(Real),
}

/// One parameter array the module maintains and eventually writes.
#[derive(Debug, Clone)]
pub struct ParamSetDecl {
    /// Store key, e.g. `Data.CB.Energy.Quad.Par0`.
    pub key: String,
    /// Old-value source.
    pub old: OldSource,
}

/// Everything a strategy declares during `init`.
pub struct StrategyInit {
    /// Parameter sets the driver loads, fills, and writes.
    pub params: Vec<ParamSetDecl>,
    /// Labels of the overview tracks accumulated across the element loop.
    pub overview: Vec<String>,
    /// Names of the per-element indicators an operator may adjust.
    pub indicators: Vec<&'static str>,
}

/// Collaborator handles available to a strategy during `init`.
pub struct StrategyContext<'a> {
    /// Per-module configuration.
    pub config: &'a ConfigMap,
    /// Accumulated-histogram source.
    pub aggregator: &'a dyn HistogramAggregator,
    /// Parameter store (read side; used for auxiliary constants like gains).
    pub store: &'a dyn ParameterStore,
    /// Module identity and run sets.
    pub spec: &'a ModuleSpec,
}

/// Outcome of one element's value calculation.
pub struct Calculation {
    /// New value for every parameter set, in declaration order. Always finite.
    pub values: Vec<Real>,
    /// Overview entries to append: `(track index, value)`.
    pub overview: Vec<(usize, Real)>,
    /// `"unchanged"` / `"no correction"` marker, set on any fallback.
    pub annotation: Option<&'static str>,
    /// Strategy-formatted inputs/outputs for the summary line.
    pub detail: String,
}

/// Physics hooks of one calibration quantity.
pub trait CalibStrategy {
    /// Stable identifier, also the configuration key prefix.
    fn name(&self) -> &str;

    /// Load configuration, histograms, and auxiliary parameters.
    ///
    /// Any error here is fatal; the calibration pass aborts before any write.
    fn init(&mut self, ctx: &StrategyContext) -> Result<StrategyInit, CalibError>;

    /// Fit the peak model(s) of element `elem`.
    ///
    /// `prev` holds the element's previously accepted indicator positions and
    /// seeds the model in refit mode. Returns the indicator positions on
    /// success, `None` on insufficient statistics or a non-converging fit.
    fn fit_element(
        &mut self,
        elem: usize,
        fitter: &dyn PeakFitter,
        prev: Option<&[Real]>,
        refit: bool,
    ) -> Option<Vec<Real>>;

    /// Compute the element's new value(s) from the effective positions.
    ///
    /// `positions` is `None` when no fit state exists; `old` holds the
    /// element's old value per parameter set. Never fails: every path yields
    /// finite values, falling back to the old value or the strategy default.
    fn calculate_element(
        &self,
        elem: usize,
        positions: Option<&[Real]>,
        old: &[Real],
    ) -> Calculation;
}

/// Tagged selection of a concrete calibration strategy.
///
/// The tag encodes which parameter-store keys the module reads and writes;
/// there is no runtime type inspection anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Pedestal position of an ADC channel (TAPS long-gate by default).
    Pedestal,
    /// Time offset of a TDC channel.
    Time,
    /// CB energy gain from the pi0 invariant-mass peak.
    Energy,
    /// Quadratic energy correction for CB.
    QuadEnergyCb,
    /// Quadratic energy correction for TAPS.
    QuadEnergyTaps,
    /// PID azimuthal angle offset.
    Phi,
}

impl StrategyKind {
    /// All selectable kinds.
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::Pedestal,
        StrategyKind::Time,
        StrategyKind::Energy,
        StrategyKind::QuadEnergyCb,
        StrategyKind::QuadEnergyTaps,
        StrategyKind::Phi,
    ];

    /// Stable lowercase tag used on the command line.
    pub fn tag(&self) -> &'static str {
        match self {
            StrategyKind::Pedestal => "pedestal",
            StrategyKind::Time => "time",
            StrategyKind::Energy => "energy",
            StrategyKind::QuadEnergyCb => "quad-cb",
            StrategyKind::QuadEnergyTaps => "quad-taps",
            StrategyKind::Phi => "phi",
        }
    }

    /// Build the strategy with its canonical configuration prefix and keys.
    pub fn build(&self) -> Box<dyn CalibStrategy> {
        match self {
            StrategyKind::Pedestal => Box::new(PedestalStrategy::new(
                "TAPS.Ped.LG",
                "Data.TAPS.Ped.LG.E0",
            )),
            StrategyKind::Time => Box::new(TimeStrategy::new(
                "TAPS.Time",
                "Data.TAPS.T0",
                "Data.TAPS.T1",
            )),
            StrategyKind::Energy => {
                Box::new(EnergyStrategy::new("CB.Energy", "Data.CB.Energy.E1"))
            }
            StrategyKind::QuadEnergyCb => Box::new(QuadEnergyStrategy::new(
                "CB.Energy.Quad",
                "Data.CB.Energy.Quad.Par0",
                "Data.CB.Energy.Quad.Par1",
            )),
            StrategyKind::QuadEnergyTaps => Box::new(QuadEnergyStrategy::new(
                "TAPS.Energy.Quad",
                "Data.TAPS.Energy.Quad.Par0",
                "Data.TAPS.Energy.Quad.Par1",
            )),
            StrategyKind::Phi => Box::new(PhiStrategy::new("PID.Phi", "Data.PID.Phi")),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| format!("unknown strategy '{s}'"))
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
