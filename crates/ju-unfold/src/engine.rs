//! The unfolding engine seam and the back-folding consistency check.

use ju_core::{DivideMode, Hist1D, Result};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::response::ResponseModel;

/// Output of one engine call.
#[derive(Debug, Clone)]
pub struct Unfolded {
    /// Unfolded spectrum on the true axis, with variances.
    pub spectrum: Hist1D,
    /// Discrepancy / singular-value vector, if the method provides one.
    pub discrepancy: Option<Hist1D>,
}

/// Inverts a detector response for one regularization strength.
///
/// Failing to converge or hitting a singular system must be reported as
/// [`ju_core::Error::EngineFailure`]; the scan skips that strength and goes on.
pub trait UnfoldingEngine: Send + Sync {
    /// Short method name for logs.
    fn name(&self) -> &str;

    /// Unfold `measured` through `response` at `strength`.
    fn unfold(&self, response: &ResponseModel, measured: &Hist1D, strength: usize)
    -> Result<Unfolded>;
}

/// Back-folded spectrum compared with the spectrum that was unfolded.
#[derive(Debug, Clone)]
pub struct BackfoldCheck {
    /// `R · unfolded` on the measured axis.
    pub backfolded: Hist1D,
    /// `backfolded / measured`.
    pub ratio: Hist1D,
    /// χ² over bins valid in both spectra with non-zero total variance.
    pub chi2: f64,
    /// Number of bins entering χ².
    pub ndf: usize,
    /// χ² survival probability (NaN without degrees of freedom).
    pub p_value: f64,
}

impl BackfoldCheck {
    /// χ² / ndf (NaN without degrees of freedom).
    pub fn chi2_ndf(&self) -> f64 {
        if self.ndf > 0 { self.chi2 / self.ndf as f64 } else { f64::NAN }
    }
}

/// Fold `unfolded` back through `response` and compare it with `measured`.
///
/// Only a diagnostic; nothing is fed back into the unfolding.
pub fn backfold(
    response: &ResponseModel,
    unfolded: &Hist1D,
    measured: &Hist1D,
    name: &str,
    ratio_name: &str,
) -> Result<BackfoldCheck> {
    let backfolded = response.fold(unfolded, name)?;
    let mut ratio = Hist1D::ratio(&backfolded, measured, DivideMode::Independent, ratio_name, "")?;

    let mut chi2 = 0.0;
    let mut ndf = 0usize;
    for i in 0..measured.n_bins() {
        if !(backfolded.is_valid_bin(i) && measured.is_valid_bin(i)) {
            continue;
        }
        let var = backfolded.variance(i) + measured.variance(i);
        if var <= 0.0 {
            continue;
        }
        let d = backfolded.content(i) - measured.content(i);
        chi2 += d * d / var;
        ndf += 1;
    }
    let p_value = if ndf > 0 {
        ChiSquared::new(ndf as f64).map(|dist| dist.sf(chi2)).unwrap_or(f64::NAN)
    } else {
        f64::NAN
    };
    let title = format!("chi2/ndf = {:.3} / {ndf}, p = {:.3}", chi2, p_value);
    ratio.set_name_title(ratio_name, title);
    Ok(BackfoldCheck { backfolded, ratio, chi2, ndf, p_value })
}
