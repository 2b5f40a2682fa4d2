use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use detcal_core::{ConfigMap, DirAggregator, JsonStore};
use detcal_pipeline::{run_pass, ModuleSpec, StrategyKind};

/// Batch runner for detector calibration passes.
#[derive(Debug, Parser)]
#[command(author, version, about = "Detector calibration pass runner")]
struct Args {
    /// Calibration type to run (pedestal, time, energy, quad-cb, quad-taps, phi).
    #[arg(long)]
    strategy: StrategyKind,

    /// Path to the key-value configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Root directory of the per-run histogram files.
    #[arg(long)]
    data: PathBuf,

    /// Path to the JSON parameter store.
    #[arg(long)]
    store: PathBuf,

    /// Calibration identifier the parameters belong to.
    #[arg(long)]
    calibration: String,

    /// Run set(s) to calibrate. Repeat for multiple sets; histograms are
    /// summed over all of them and the result is written to each.
    #[arg(long = "run-set", required = true)]
    run_sets: Vec<u32>,

    /// Number of detector elements.
    #[arg(long)]
    elements: usize,

    /// Seed fits from the previously stored positions instead of the
    /// spectrum maxima.
    #[arg(long)]
    refit: bool,
}

fn run_from_files(args: &Args) -> Result<Vec<String>> {
    let config = ConfigMap::from_file(&args.config)
        .with_context(|| format!("reading configuration {}", args.config.display()))?;
    let aggregator = DirAggregator::new(&args.data);
    let mut store = JsonStore::load(&args.store)
        .with_context(|| format!("loading parameter store {}", args.store.display()))?;

    let spec = ModuleSpec {
        calibration: args.calibration.clone(),
        title: format!("{} calibration", args.strategy),
        data_tag: data_tag_for(args.strategy).to_string(),
        n_elem: args.elements,
        run_sets: args.run_sets.clone(),
        refit: args.refit,
    };

    let report = run_pass(args.strategy, spec, &config, &aggregator, &mut store)?;
    store
        .save(&args.store)
        .with_context(|| format!("saving parameter store {}", args.store.display()))?;

    let mut lines = report.summaries;
    lines.push(format!(
        "fitted {} element(s), wrote {} to {}",
        report.n_fitted,
        report.written_keys.join(", "),
        args.store.display()
    ));
    Ok(lines)
}

/// Subdirectory of the run files each calibration reads its histograms from.
fn data_tag_for(kind: StrategyKind) -> &'static str {
    match kind {
        StrategyKind::Pedestal => "TAPS",
        StrategyKind::Time => "TAPS",
        StrategyKind::Energy => "CB",
        StrategyKind::QuadEnergyCb => "CB",
        StrategyKind::QuadEnergyTaps => "TAPS",
        StrategyKind::Phi => "PID",
    }
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    for line in run_from_files(&args)? {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use detcal_core::{
        constants::PI0_MASS, synthetic::peak_hist2, Hist2, ParameterStore, Real,
    };
    use std::{collections::BTreeMap, fs, path::Path};
    use tempfile::TempDir;

    fn write_run(dir: &Path, run: u32, tag: &str, name: &str, hist: &Hist2) {
        let run_dir = dir.join(run.to_string());
        fs::create_dir_all(&run_dir).unwrap();
        let mut map = BTreeMap::new();
        map.insert(name.to_string(), hist);
        serde_json::to_writer_pretty(
            fs::File::create(run_dir.join(format!("{tag}.json"))).unwrap(),
            &map,
        )
        .unwrap();
    }

    #[test]
    fn energy_pass_from_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        let config_path = root.join("detcal.cfg");
        fs::write(&config_path, "CB.Energy.Histo.Fit.Name: cb_im\n").unwrap();

        let data_root = root.join("data");
        fs::create_dir_all(&data_root).unwrap();
        fs::write(data_root.join("4.runs"), "[100]").unwrap();
        write_run(
            &data_root,
            100,
            "CB",
            "cb_im",
            &peak_hist2(0.0, 300.0, 300, 2, &[(0, 500.0, PI0_MASS, 9.0)]),
        );

        let store_path = root.join("params.json");
        let mut store = JsonStore::new();
        store
            .write("Data.CB.Energy.E1", "2026.1", 4, &[0.01, 0.02])
            .unwrap();
        store.save(&store_path).unwrap();

        let args = Args {
            strategy: StrategyKind::Energy,
            config: config_path,
            data: data_root,
            store: store_path.clone(),
            calibration: "2026.1".to_string(),
            run_sets: vec![4],
            elements: 2,
            refit: false,
        };

        let lines = run_from_files(&args).unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("unchanged"));

        let saved = JsonStore::load(&store_path).unwrap();
        let vals: Vec<Real> = saved.read("Data.CB.Energy.E1", "2026.1", 4, 2).unwrap();
        assert!((vals[0] - 0.01).abs() < 1e-4);
        assert_eq!(vals[1], 0.02);
    }
}
