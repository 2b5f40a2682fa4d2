//! Deterministic synthetic histograms.
//!
//! The builders here evaluate analytic peak shapes into bin contents instead
//! of sampling, so fit and pipeline tests get exact, reproducible spectra.

use crate::{Hist1, Hist2, Real};

/// Gaussian value at `x`.
pub fn gaussian(x: Real, amp: Real, mean: Real, sigma: Real) -> Real {
    let z = (x - mean) / sigma;
    amp * (-0.5 * z * z).exp()
}

/// 1-D histogram with a Gaussian peak evaluated at every bin center.
pub fn gaussian_hist1(
    lo: Real,
    hi: Real,
    n_bins: usize,
    amp: Real,
    mean: Real,
    sigma: Real,
) -> Hist1 {
    gaussian_hist1_with_background(lo, hi, n_bins, amp, mean, sigma, &[])
}

/// Like [`gaussian_hist1`] with an additive polynomial background
/// `coeffs[0] + coeffs[1] x + ...` clipped at zero.
pub fn gaussian_hist1_with_background(
    lo: Real,
    hi: Real,
    n_bins: usize,
    amp: Real,
    mean: Real,
    sigma: Real,
    coeffs: &[Real],
) -> Hist1 {
    let mut h = Hist1::new(lo, hi, n_bins);
    for i in 0..n_bins {
        let x = h.bin_center(i);
        let mut background = 0.0;
        let mut pow = 1.0;
        for &c in coeffs {
            background += c * pow;
            pow *= x;
        }
        h.counts[i] = (gaussian(x, amp, mean, sigma) + background).max(0.0);
    }
    h
}

/// 2-D histogram with Gaussian peaks in the listed element rows.
///
/// `peaks` lists `(elem, amp, mean, sigma)`; peaks sharing an element add up,
/// rows not listed stay empty.
pub fn peak_hist2(
    lo: Real,
    hi: Real,
    n_bins: usize,
    n_elem: usize,
    peaks: &[(usize, Real, Real, Real)],
) -> Hist2 {
    let mut h = Hist2::new(lo, hi, n_bins, n_elem);
    for &(elem, amp, mean, sigma) in peaks {
        if elem >= n_elem {
            continue;
        }
        let row = gaussian_hist1(lo, hi, n_bins, amp, mean, sigma);
        for (c, p) in h.rows[elem].iter_mut().zip(&row.counts) {
            *c += p;
        }
    }
    h
}

/// 2-D histogram whose listed element rows hold a single filled bin at `x`,
/// giving the row an exact mean of the containing bin center.
pub fn delta_hist2(lo: Real, hi: Real, n_bins: usize, n_elem: usize, fills: &[(usize, Real, Real)]) -> Hist2 {
    let mut h = Hist2::new(lo, hi, n_bins, n_elem);
    for &(elem, x, w) in fills {
        h.fill(elem, x, w);
    }
    h
}
