//! Generator pT-hard outlier rejection.

use ju_core::OutlierPredicate;
use serde::{Deserialize, Serialize};

/// pT-hard bin edges (GeV/c) of the jet-jet productions; bin `b` covers
/// `[edges[b], edges[b + 1])`.
pub const PT_HARD_BIN_EDGES: [f64; 22] = [
    0.0, 5.0, 7.0, 9.0, 12.0, 16.0, 21.0, 28.0, 36.0, 45.0, 57.0, 70.0, 85.0, 99.0, 115.0, 132.0,
    150.0, 169.0, 190.0, 212.0, 235.0, 1000.0,
];

/// Default multiple of the pT-hard upper edge above which a jet is an outlier.
pub const DEFAULT_OUTLIER_FACTOR: f64 = 1.5;

/// Rejects jets with particle-level pT above `factor` times the upper edge of
/// the pT-hard bin they were generated in.
///
/// Jets carrying an unknown bin index (negative or beyond the table) are kept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PtHardOutlierCut {
    factor: f64,
}

impl PtHardOutlierCut {
    /// Cut at `factor` × pT-hard upper edge.
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }

    /// Multiplicative factor.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Particle-level pT limit for `pt_hard_bin`, if the bin is known.
    pub fn limit(&self, pt_hard_bin: i32) -> Option<f64> {
        let b = usize::try_from(pt_hard_bin).ok()?;
        PT_HARD_BIN_EDGES.get(b + 1).map(|upper| self.factor * upper)
    }
}

impl Default for PtHardOutlierCut {
    fn default() -> Self {
        Self::new(DEFAULT_OUTLIER_FACTOR)
    }
}

impl OutlierPredicate for PtHardOutlierCut {
    fn is_outlier(&self, truth: f64, pt_hard_bin: i32) -> bool {
        self.limit(pt_hard_bin).is_some_and(|limit| truth > limit)
    }
}
