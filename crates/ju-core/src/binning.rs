//! Bin-edge schemes shared by every histogram axis.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Ordered, strictly increasing bin edges (length = n_bins + 1).
///
/// Construction validates the edges once; every other component can rely on
/// `n_bins() >= 1` and finite, increasing edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Binning {
    edges: Vec<f64>,
}

impl Binning {
    /// Build a binning from explicit edges.
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::MalformedBinning(format!(
                "need at least 2 edges, got {}",
                edges.len()
            )));
        }
        if let Some(i) = edges.iter().position(|e| !e.is_finite()) {
            return Err(Error::MalformedBinning(format!("edge {i} is not finite")));
        }
        for (i, w) in edges.windows(2).enumerate() {
            if w[1] <= w[0] {
                return Err(Error::MalformedBinning(format!(
                    "edges not strictly increasing at {i}: {} >= {}",
                    w[0], w[1]
                )));
            }
        }
        Ok(Self { edges })
    }

    /// `n` equal-width bins over `[lo, hi)`.
    pub fn uniform(n: usize, lo: f64, hi: f64) -> Result<Self> {
        if n == 0 {
            return Err(Error::MalformedBinning("uniform binning with 0 bins".into()));
        }
        let width = (hi - lo) / n as f64;
        let mut edges: Vec<f64> = (0..n).map(|i| lo + width * i as f64).collect();
        edges.push(hi);
        Self::new(edges)
    }

    /// Edges `lo, lo + step, ...` up to and including `hi` (within rounding).
    pub fn stepped(lo: f64, hi: f64, step: f64) -> Result<Self> {
        if !(step > 0.0) {
            return Err(Error::MalformedBinning(format!("non-positive step {step}")));
        }
        let n = ((hi - lo) / step).round();
        if !(n >= 1.0) {
            return Err(Error::MalformedBinning(format!("empty range [{lo}, {hi}]")));
        }
        Self::uniform(n as usize, lo, lo + n * step)
    }

    /// Bin edges.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Lower edge of the first bin.
    pub fn low(&self) -> f64 {
        self.edges[0]
    }

    /// Upper edge of the last bin.
    pub fn high(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Lower edge of bin `i`.
    pub fn bin_low(&self, i: usize) -> f64 {
        self.edges[i]
    }

    /// Upper edge of bin `i`.
    pub fn bin_high(&self, i: usize) -> f64 {
        self.edges[i + 1]
    }

    /// Centre of bin `i`.
    pub fn center(&self, i: usize) -> f64 {
        0.5 * (self.edges[i] + self.edges[i + 1])
    }

    /// Width of bin `i`.
    pub fn width(&self, i: usize) -> f64 {
        self.edges[i + 1] - self.edges[i]
    }

    /// Bin index for `x` in `[low, high)`; `None` for under/overflow and NaN.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if !(x >= self.low() && x < self.high()) {
            return None;
        }
        // First edge strictly greater than x, minus one.
        let upper = self.edges.partition_point(|&e| e <= x);
        Some(upper - 1)
    }

    /// Same edges (within a relative tolerance of 1e-12).
    pub fn is_compatible(&self, other: &Binning) -> bool {
        self.edges.len() == other.edges.len()
            && self
                .edges
                .iter()
                .zip(&other.edges)
                .all(|(a, b)| (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0))
    }

    /// Error unless `other` has the same edges.
    pub fn ensure_compatible(&self, other: &Binning, context: &str) -> Result<()> {
        if self.is_compatible(other) {
            Ok(())
        } else {
            Err(Error::MalformedBinning(format!(
                "{context}: incompatible binnings ({} bins over [{}, {}) vs {} bins over [{}, {}))",
                self.n_bins(),
                self.low(),
                self.high(),
                other.n_bins(),
                other.low(),
                other.high()
            )))
        }
    }
}

impl TryFrom<Vec<f64>> for Binning {
    type Error = Error;

    fn try_from(edges: Vec<f64>) -> Result<Self> {
        Binning::new(edges)
    }
}

impl From<Binning> for Vec<f64> {
    fn from(b: Binning) -> Self {
        b.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_edges() {
        assert!(matches!(Binning::new(vec![]), Err(Error::MalformedBinning(_))));
        assert!(matches!(Binning::new(vec![1.0]), Err(Error::MalformedBinning(_))));
        assert!(matches!(Binning::new(vec![0.0, 1.0, 1.0]), Err(Error::MalformedBinning(_))));
        assert!(matches!(Binning::new(vec![0.0, f64::NAN]), Err(Error::MalformedBinning(_))));
    }

    #[test]
    fn test_find_bin_half_open() {
        let b = Binning::new(vec![0.0, 10.0, 30.0, 60.0]).unwrap();
        assert_eq!(b.find_bin(-0.1), None);
        assert_eq!(b.find_bin(0.0), Some(0));
        assert_eq!(b.find_bin(10.0), Some(1));
        assert_eq!(b.find_bin(59.999), Some(2));
        assert_eq!(b.find_bin(60.0), None);
        assert_eq!(b.find_bin(f64::NAN), None);
    }

    #[test]
    fn test_stepped_includes_upper_edge() {
        let b = Binning::stepped(0.0, 400.0, 20.0).unwrap();
        assert_eq!(b.n_bins(), 20);
        assert_eq!(b.high(), 400.0);
        assert_eq!(b.width(3), 20.0);
    }

    #[test]
    fn test_serde_validates() {
        let ok: Binning = serde_json::from_str("[0.0, 1.0, 2.5]").unwrap();
        assert_eq!(ok.n_bins(), 2);
        assert!(serde_json::from_str::<Binning>("[2.0, 1.0]").is_err());
    }
}
