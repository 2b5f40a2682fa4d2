//! Integration tests for full calibration passes.
//!
//! These tests drive the module through its complete phase sequence on
//! synthetic spectra and check the written parameter arrays.

use detcal_core::{
    constants::{ETA_MASS, PI0_MASS},
    synthetic::peak_hist2,
    ConfigMap, MemoryAggregator, MemoryStore, ParameterStore, Real,
};
use detcal_fit::LmPeakFitter;
use detcal_pipeline::{CalibrationModule, Collaborators, ModuleSpec, Phase, StrategyKind};

fn energy_setup(peak_pos: Real) -> (ConfigMap, MemoryAggregator, MemoryStore) {
    let mut config = ConfigMap::default();
    config.set("CB.Energy.Histo.Fit.Name", "cb_im");

    // four elements, only element 2 has a usable peak
    let mut aggregator = MemoryAggregator::new();
    aggregator.add_run_set(7, &[1000]);
    aggregator.add_histogram(
        "cb_im",
        "CB",
        1000,
        peak_hist2(0.0, 300.0, 300, 4, &[(2, 800.0, peak_pos, 9.0)]),
    );

    let mut store = MemoryStore::new();
    store
        .write("Data.CB.Energy.E1", "beam", 7, &[100.0, 100.0, 100.0, 100.0])
        .unwrap();
    (config, aggregator, store)
}

fn energy_module() -> CalibrationModule {
    CalibrationModule::new(
        ModuleSpec {
            calibration: "beam".to_string(),
            title: "CB energy calibration".to_string(),
            data_tag: "CB".to_string(),
            n_elem: 4,
            run_sets: vec![7],
            refit: false,
        },
        StrategyKind::Energy.build(),
        Box::new(LmPeakFitter::default()),
    )
}

#[test]
fn sparse_detector_pass_only_touches_the_fitted_element() {
    let (config, aggregator, mut store) = energy_setup(PI0_MASS);
    let mut module = energy_module();
    module
        .init(&Collaborators {
            config: &config,
            aggregator: &aggregator,
            store: &store,
        })
        .unwrap();

    for elem in 0..4 {
        module.fit(elem).unwrap();
        module.calculate(elem).unwrap();
    }
    module.write_values(&mut store).unwrap();
    assert_eq!(module.phase(), Phase::Written);

    let vals = store.read("Data.CB.Energy.E1", "beam", 7, 4).unwrap();
    for (elem, v) in vals.iter().enumerate() {
        if elem == 2 {
            // peak sits at the reference mass, so the gain barely moves
            assert!((v - 100.0).abs() < 0.5, "element 2 gain {v}");
        } else {
            assert_eq!(*v, 100.0, "element {elem} must keep its old gain");
        }
    }

    let changed: Vec<&String> = module
        .summaries()
        .iter()
        .filter(|l| !l.contains("unchanged"))
        .collect();
    assert_eq!(changed.len(), 1);
    assert!(changed[0].starts_with("Element: 002"));
}

#[test]
fn repeated_write_produces_identical_arrays() {
    let (config, aggregator, mut store) = energy_setup(140.0);
    let mut module = energy_module();
    module
        .init(&Collaborators {
            config: &config,
            aggregator: &aggregator,
            store: &store,
        })
        .unwrap();

    for elem in 0..4 {
        module.fit(elem).unwrap();
        module.calculate(elem).unwrap();
    }
    module.write_values(&mut store).unwrap();
    let first = store.read("Data.CB.Energy.E1", "beam", 7, 4).unwrap();

    module.write_values(&mut store).unwrap();
    let second = store.read("Data.CB.Energy.E1", "beam", 7, 4).unwrap();
    assert_eq!(first, second);
}

#[test]
fn manual_override_feeds_the_calculation() {
    let (config, aggregator, store) = energy_setup(PI0_MASS);
    let mut module = energy_module();
    module
        .init(&Collaborators {
            config: &config,
            aggregator: &aggregator,
            store: &store,
        })
        .unwrap();

    assert!(module.fit(2).unwrap());
    // operator drags the indicator to half the reference mass
    module.adjust_indicator(2, 0, PI0_MASS / 2.0).unwrap();
    module.calculate(2).unwrap();

    let new = module.new_values(0).unwrap()[2];
    assert!((new - 200.0).abs() < 1e-9, "doubled gain, got {new}");
}

#[test]
fn quadratic_pass_writes_both_parameter_sets() {
    let mut config = ConfigMap::default();
    config.set("CB.Energy.Quad.Histo.Fit.Name", "cb_im");
    config.set("CB.Energy.Quad.Histo.MeanE.Pi0.Name", "cb_mean_pi0");
    config.set("CB.Energy.Quad.Histo.MeanE.Eta.Name", "cb_mean_eta");

    let mut aggregator = MemoryAggregator::new();
    aggregator.add_run_set(3, &[500]);
    aggregator.add_histogram(
        "cb_im",
        "CB",
        500,
        peak_hist2(
            0.0,
            700.0,
            700,
            1,
            &[(0, 900.0, PI0_MASS, 10.0), (0, 250.0, ETA_MASS, 16.0)],
        ),
    );
    // photon mean-energy spectra: narrow spikes give exact projection means
    aggregator.add_histogram(
        "cb_mean_pi0",
        "CB",
        500,
        peak_hist2(0.0, 1000.0, 1000, 1, &[(0, 100.0, 300.0, 0.2)]),
    );
    aggregator.add_histogram(
        "cb_mean_eta",
        "CB",
        500,
        peak_hist2(0.0, 1000.0, 1000, 1, &[(0, 100.0, 600.0, 0.2)]),
    );

    let mut store = MemoryStore::new();
    let mut module = CalibrationModule::new(
        ModuleSpec {
            calibration: "beam".to_string(),
            title: "CB quadratic energy correction".to_string(),
            data_tag: "CB".to_string(),
            n_elem: 1,
            run_sets: vec![3],
            refit: false,
        },
        StrategyKind::QuadEnergyCb.build(),
        Box::new(LmPeakFitter::default()),
    );
    module
        .init(&Collaborators {
            config: &config,
            aggregator: &aggregator,
            store: &store,
        })
        .unwrap();

    assert!(module.fit(0).unwrap());
    module.calculate(0).unwrap();
    module.write_values(&mut store).unwrap();

    let par0 = store.read("Data.CB.Energy.Quad.Par0", "beam", 3, 1).unwrap();
    let par1 = store.read("Data.CB.Energy.Quad.Par1", "beam", 3, 1).unwrap();
    // peaks already sit at the reference masses, so the correction is close
    // to the identity
    assert!((par0[0] - 1.0).abs() < 0.05, "par0 {}", par0[0]);
    assert!(par1[0].abs() < 2e-4, "par1 {}", par1[0]);
    // corrected positions: pi0 at 300 MeV and eta at 600 MeV mean energy
    let pi0 = PI0_MASS * (par0[0] + par1[0] * 300.0);
    let eta = ETA_MASS * (par0[0] + par1[0] * 600.0);
    assert!((pi0 - PI0_MASS).abs() < 1.5, "corrected pi0 {pi0}");
    assert!((eta - ETA_MASS).abs() < 4.0, "corrected eta {eta}");
}
