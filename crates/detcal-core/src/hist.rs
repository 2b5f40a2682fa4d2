//! Uniformly binned histograms.
//!
//! [`Hist1`] is a plain 1-D histogram over a uniform axis; [`Hist2`] stacks one
//! such axis per detector element so that a calibration module can slice out a
//! per-element spectrum with [`Hist2::projection`]. Bin contents are weights
//! (`f64`), matching what the upstream analysis writes out per run.

use serde::{Deserialize, Serialize};

use crate::{CalibError, Real};

/// 1-D histogram with uniform binning over `[lo, hi)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist1 {
    /// Lower edge of the axis.
    pub lo: Real,
    /// Upper edge of the axis.
    pub hi: Real,
    /// Bin contents, `counts.len()` bins.
    pub counts: Vec<Real>,
}

impl Hist1 {
    /// Create an empty histogram with `n_bins` bins over `[lo, hi)`.
    pub fn new(lo: Real, hi: Real, n_bins: usize) -> Self {
        Self {
            lo,
            hi,
            counts: vec![0.0; n_bins],
        }
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.counts.len()
    }

    /// Width of one bin.
    pub fn bin_width(&self) -> Real {
        (self.hi - self.lo) / self.n_bins() as Real
    }

    /// Center of bin `i`.
    pub fn bin_center(&self, i: usize) -> Real {
        self.lo + (i as Real + 0.5) * self.bin_width()
    }

    /// Index of the bin containing `x`, if inside the axis.
    pub fn bin_of(&self, x: Real) -> Option<usize> {
        if x < self.lo || x >= self.hi {
            return None;
        }
        let i = ((x - self.lo) / self.bin_width()) as usize;
        Some(i.min(self.n_bins() - 1))
    }

    /// Add weight `w` at position `x`; entries outside the axis are dropped.
    pub fn fill(&mut self, x: Real, w: Real) {
        if let Some(i) = self.bin_of(x) {
            self.counts[i] += w;
        }
    }

    /// Total content of the histogram.
    pub fn entries(&self) -> Real {
        self.counts.iter().sum()
    }

    /// Content-weighted mean of the bin centers, 0 for an empty histogram.
    pub fn mean(&self) -> Real {
        let total = self.entries();
        if total == 0.0 {
            return 0.0;
        }
        let sum: Real = self
            .counts
            .iter()
            .enumerate()
            .map(|(i, c)| c * self.bin_center(i))
            .sum();
        sum / total
    }

    /// Center of the maximum bin inside the window `[lo, hi]`.
    ///
    /// Returns `None` when the window contains no bins or only empty bins.
    pub fn max_center_in(&self, lo: Real, hi: Real) -> Option<Real> {
        let mut best: Option<(usize, Real)> = None;
        for (i, &c) in self.counts.iter().enumerate() {
            let x = self.bin_center(i);
            if x < lo || x > hi || c <= 0.0 {
                continue;
            }
            if best.map_or(true, |(_, bc)| c > bc) {
                best = Some((i, c));
            }
        }
        best.map(|(i, _)| self.bin_center(i))
    }

    /// Merge another histogram into this one.
    pub fn add(&mut self, other: &Hist1) -> Result<(), CalibError> {
        if self.n_bins() != other.n_bins() || self.lo != other.lo || self.hi != other.hi {
            return Err(CalibError::HistogramShape {
                expected: (self.n_bins(), self.lo, self.hi),
                found: (other.n_bins(), other.lo, other.hi),
            });
        }
        for (c, o) in self.counts.iter_mut().zip(&other.counts) {
            *c += o;
        }
        Ok(())
    }

    /// Rebin onto a new axis while transforming every bin position with `map`.
    ///
    /// Each source bin's content lands in the target bin containing the mapped
    /// bin center. Used to turn a channel-position spectrum into an angle
    /// spectrum before fitting.
    pub fn remap<F>(&self, lo: Real, hi: Real, n_bins: usize, map: F) -> Hist1
    where
        F: Fn(Real) -> Real,
    {
        let mut out = Hist1::new(lo, hi, n_bins);
        for (i, &c) in self.counts.iter().enumerate() {
            if c != 0.0 {
                out.fill(map(self.bin_center(i)), c);
            }
        }
        out
    }
}

/// 2-D histogram: one uniform x axis shared by one row per detector element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist2 {
    /// Lower edge of the x axis.
    pub lo: Real,
    /// Upper edge of the x axis.
    pub hi: Real,
    /// Per-element rows of bin contents; all rows share the same binning.
    pub rows: Vec<Vec<Real>>,
}

impl Hist2 {
    /// Create an empty histogram with `n_elem` rows of `n_bins` bins.
    pub fn new(lo: Real, hi: Real, n_bins: usize, n_elem: usize) -> Self {
        Self {
            lo,
            hi,
            rows: vec![vec![0.0; n_bins]; n_elem],
        }
    }

    /// Number of element rows.
    pub fn n_elem(&self) -> usize {
        self.rows.len()
    }

    /// Number of bins on the x axis.
    pub fn n_bins(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Add weight `w` at position `x` for element `elem`.
    pub fn fill(&mut self, elem: usize, x: Real, w: Real) {
        if elem >= self.n_elem() {
            return;
        }
        let mut axis = Hist1 {
            lo: self.lo,
            hi: self.hi,
            counts: std::mem::take(&mut self.rows[elem]),
        };
        axis.fill(x, w);
        self.rows[elem] = axis.counts;
    }

    /// Extract the spectrum of one element as a [`Hist1`].
    pub fn projection(&self, elem: usize) -> Option<Hist1> {
        self.rows.get(elem).map(|row| Hist1 {
            lo: self.lo,
            hi: self.hi,
            counts: row.clone(),
        })
    }

    /// Merge another histogram into this one.
    pub fn add(&mut self, other: &Hist2) -> Result<(), CalibError> {
        if self.n_elem() != other.n_elem()
            || self.n_bins() != other.n_bins()
            || self.lo != other.lo
            || self.hi != other.hi
        {
            return Err(CalibError::HistogramShape {
                expected: (self.n_bins(), self.lo, self.hi),
                found: (other.n_bins(), other.lo, other.hi),
            });
        }
        for (row, other_row) in self.rows.iter_mut().zip(&other.rows) {
            for (c, o) in row.iter_mut().zip(other_row) {
                *c += o;
            }
        }
        Ok(())
    }
}
