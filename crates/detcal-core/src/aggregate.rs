//! Histogram aggregation across run sets.
//!
//! A calibration epoch spans one or more run sets, each a list of run numbers.
//! The aggregator merges the per-run histograms of every run of every listed
//! run set into one accumulated [`Hist2`], keyed by histogram name and the
//! data-type tag of the analysis pass that produced the files.

use std::{collections::BTreeMap, fs, path::PathBuf};

use log::warn;

use crate::{CalibError, Hist2};

/// Source of accumulated histograms for a list of run sets.
pub trait HistogramAggregator {
    /// Run numbers belonging to run set `run_set`.
    fn runs(&self, run_set: u32) -> Vec<u32>;

    /// Histogram of one run, if the run produced it.
    fn run_histogram(&self, name: &str, data_tag: &str, run: u32) -> Option<Hist2>;

    /// Sum `name` over all runs of all listed run sets.
    ///
    /// Returns `None` when no run provides the histogram. Contributions with
    /// a different shape than the first one found are skipped with a warning.
    fn histogram2(&self, name: &str, data_tag: &str, run_sets: &[u32]) -> Option<Hist2> {
        let mut sum: Option<Hist2> = None;
        for &set in run_sets {
            for run in self.runs(set) {
                let Some(h) = self.run_histogram(name, data_tag, run) else {
                    continue;
                };
                match &mut sum {
                    None => sum = Some(h),
                    Some(acc) => {
                        if let Err(err) = acc.add(&h) {
                            warn!("skipping histogram '{name}' of run {run}: {err}");
                        }
                    }
                }
            }
        }
        sum
    }
}

/// In-memory aggregator for tests and programmatic setups.
#[derive(Debug, Clone, Default)]
pub struct MemoryAggregator {
    run_sets: BTreeMap<u32, Vec<u32>>,
    histograms: BTreeMap<(String, String, u32), Hist2>,
}

impl MemoryAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the runs of a run set.
    pub fn add_run_set(&mut self, run_set: u32, runs: &[u32]) {
        self.run_sets.insert(run_set, runs.to_vec());
    }

    /// Register the histogram one run produced.
    pub fn add_histogram(&mut self, name: &str, data_tag: &str, run: u32, hist: Hist2) {
        self.histograms
            .insert((name.to_string(), data_tag.to_string(), run), hist);
    }
}

impl HistogramAggregator for MemoryAggregator {
    fn runs(&self, run_set: u32) -> Vec<u32> {
        self.run_sets.get(&run_set).cloned().unwrap_or_default()
    }

    fn run_histogram(&self, name: &str, data_tag: &str, run: u32) -> Option<Hist2> {
        self.histograms
            .get(&(name.to_string(), data_tag.to_string(), run))
            .cloned()
    }
}

/// Directory-backed aggregator.
///
/// Layout: `<root>/<run_set>.runs` is a JSON array of run numbers and
/// `<root>/<run>/<data_tag>.json` maps histogram names to [`Hist2`] payloads.
#[derive(Debug, Clone)]
pub struct DirAggregator {
    root: PathBuf,
}

impl DirAggregator {
    /// Aggregate histogram files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_file(&self, run: u32, data_tag: &str) -> Result<BTreeMap<String, Hist2>, CalibError> {
        let path = self.root.join(run.to_string()).join(format!("{data_tag}.json"));
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl HistogramAggregator for DirAggregator {
    fn runs(&self, run_set: u32) -> Vec<u32> {
        let path = self.root.join(format!("{run_set}.runs"));
        let Ok(text) = fs::read_to_string(&path) else {
            return Vec::new();
        };
        serde_json::from_str(&text).unwrap_or_default()
    }

    fn run_histogram(&self, name: &str, data_tag: &str, run: u32) -> Option<Hist2> {
        let mut map = match self.read_file(run, data_tag) {
            Ok(map) => map,
            Err(_) => return None,
        };
        map.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_entry_hist(n_bins: usize, elem: usize, x: f64, w: f64) -> Hist2 {
        let mut h = Hist2::new(0.0, 10.0, n_bins, 4);
        h.fill(elem, x, w);
        h
    }

    #[test]
    fn sums_over_runs_and_sets() {
        let mut agg = MemoryAggregator::new();
        agg.add_run_set(0, &[100, 101]);
        agg.add_run_set(1, &[200]);
        agg.add_histogram("im", "Pi0", 100, one_entry_hist(10, 0, 1.0, 1.0));
        agg.add_histogram("im", "Pi0", 101, one_entry_hist(10, 0, 1.0, 2.0));
        agg.add_histogram("im", "Pi0", 200, one_entry_hist(10, 1, 5.0, 4.0));

        let sum = agg.histogram2("im", "Pi0", &[0, 1]).unwrap();
        assert_eq!(sum.projection(0).unwrap().entries(), 3.0);
        assert_eq!(sum.projection(1).unwrap().entries(), 4.0);
    }

    #[test]
    fn missing_everywhere_is_none() {
        let mut agg = MemoryAggregator::new();
        agg.add_run_set(0, &[100]);
        assert!(agg.histogram2("im", "Pi0", &[0]).is_none());
    }

    #[test]
    fn data_tags_are_distinct() {
        let mut agg = MemoryAggregator::new();
        agg.add_run_set(0, &[100]);
        agg.add_histogram("im", "Pi0", 100, one_entry_hist(10, 0, 1.0, 1.0));
        assert!(agg.histogram2("im", "Eta", &[0]).is_none());
    }

    #[test]
    fn mismatched_shape_is_skipped() {
        let mut agg = MemoryAggregator::new();
        agg.add_run_set(0, &[100, 101]);
        agg.add_histogram("im", "Pi0", 100, one_entry_hist(10, 0, 1.0, 1.0));
        agg.add_histogram("im", "Pi0", 101, one_entry_hist(20, 0, 1.0, 7.0));

        let sum = agg.histogram2("im", "Pi0", &[0]).unwrap();
        // the incompatible second run must not contribute
        assert_eq!(sum.projection(0).unwrap().entries(), 1.0);
    }

    #[test]
    fn dir_aggregator_reads_layout() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("3.runs"), "[500, 501]").unwrap();
        for run in [500u32, 501] {
            let run_dir = dir.path().join(run.to_string());
            fs::create_dir(&run_dir).unwrap();
            let mut map = BTreeMap::new();
            map.insert("im".to_string(), one_entry_hist(10, 2, 4.0, 1.5));
            fs::write(
                run_dir.join("Pi0.json"),
                serde_json::to_string(&map).unwrap(),
            )
            .unwrap();
        }

        let agg = DirAggregator::new(dir.path());
        assert_eq!(agg.runs(3), vec![500, 501]);
        let sum = agg.histogram2("im", "Pi0", &[3]).unwrap();
        assert_eq!(sum.projection(2).unwrap().entries(), 3.0);
        assert!(agg.histogram2("other", "Pi0", &[3]).is_none());
    }
}
