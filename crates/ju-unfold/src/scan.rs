//! Regularization scan: unfold, back-fold and normalize for every strength.

use ju_core::{DivideMode, Error, Hist1D, Result};
use ju_store::StoredObject;
use rayon::prelude::*;
use serde::Serialize;

use crate::engine::{BackfoldCheck, UnfoldingEngine, backfold};
use crate::response::ResponseModel;

/// Scalar normalization of the production unfolded spectrum to a
/// differential cross section, followed by bin-width normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpectrumNormalization {
    scale: f64,
}

impl SpectrumNormalization {
    /// `cross_section × vertex_efficiency / acceptance` with the fiducial
    /// EMCAL acceptance `(Δφ − 2R)(Δη − 2R) / 2π` of jets of radius `radius`.
    pub fn emcal(
        radius: f64,
        cross_section: f64,
        vertex_efficiency: f64,
        phi: f64,
        eta: f64,
    ) -> Result<Self> {
        let acceptance = (phi - 2.0 * radius) * (eta - 2.0 * radius) / (2.0 * std::f64::consts::PI);
        if !(acceptance.is_finite() && acceptance > 0.0) {
            return Err(Error::InvalidNormalization {
                what: format!("EMCAL acceptance for R = {radius}"),
                value: acceptance,
            });
        }
        Self::new(cross_section * vertex_efficiency / acceptance)
    }

    /// Plain scale factor.
    pub fn new(scale: f64) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::InvalidNormalization { what: "spectrum scale".into(), value: scale });
        }
        Ok(Self { scale })
    }

    /// Scale factor.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Normalized copy of `h` named `name`.
    pub fn apply(&self, h: &Hist1D, name: &str) -> Hist1D {
        let mut out = h.renamed(name, "normalized unfolded spectrum");
        out.scale(self.scale);
        out.normalize_bin_width();
        out
    }
}

/// Everything the scan reads; never mutated while it runs.
#[derive(Debug, Clone, Copy)]
pub struct ScanInputs<'a> {
    /// Production response.
    pub response: &'a ResponseModel,
    /// Spectrum to unfold (combined raw data spectrum).
    pub measured: &'a Hist1D,
    /// Closure response, built from the independent closure bucket.
    pub closure_response: &'a ResponseModel,
    /// Smeared spectrum of the closure bucket.
    pub closure_measured: &'a Hist1D,
    /// True spectrum of the closure bucket.
    pub closure_truth: &'a Hist1D,
    /// Normalization of the production result, if any.
    pub normalization: Option<SpectrumNormalization>,
}

/// All outputs of one regularization strength.
#[derive(Debug, Clone)]
pub struct UnfoldingResult {
    /// Regularization strength.
    pub strength: usize,
    /// `unfoldedReg<r>`.
    pub unfolded: Hist1D,
    /// `normalizedReg<r>`.
    pub normalized: Option<Hist1D>,
    /// `backfolded_reg<r>` and its ratio to the measured spectrum.
    pub backfold: BackfoldCheck,
    /// `unfoldedClosureReg<r>`.
    pub closure_unfolded: Hist1D,
    /// `backfoldedClosure_reg<r>` and its ratio to the closure smeared spectrum.
    pub closure_backfold: BackfoldCheck,
    /// `closureRatio_reg<r>`: closure unfolded / closure truth.
    pub closure_ratio: Hist1D,
    /// `dvectorReg<r>`.
    pub discrepancy: Option<Hist1D>,
    /// `dvectorClosureReg<r>`.
    pub closure_discrepancy: Option<Hist1D>,
    /// Additional pipeline-specific objects for this strength.
    pub extras: Vec<StoredObject>,
}

impl UnfoldingResult {
    /// Objects to persist, in output order.
    pub fn objects(&self) -> Vec<StoredObject> {
        let mut out: Vec<StoredObject> = vec![self.unfolded.clone().into()];
        if let Some(n) = &self.normalized {
            out.push(n.clone().into());
        }
        out.push(self.backfold.backfolded.clone().into());
        out.push(self.backfold.ratio.clone().into());
        out.push(self.closure_unfolded.clone().into());
        out.push(self.closure_backfold.backfolded.clone().into());
        out.push(self.closure_backfold.ratio.clone().into());
        out.push(self.closure_ratio.clone().into());
        out.extend(self.discrepancy.iter().cloned().map(StoredObject::from));
        out.extend(self.closure_discrepancy.iter().cloned().map(StoredObject::from));
        out.extend(self.extras.iter().cloned());
        out
    }

    /// Back-fold quality figures.
    pub fn summary(&self) -> StrengthSummary {
        StrengthSummary {
            strength: self.strength,
            chi2_ndf: self.backfold.chi2_ndf(),
            p_value: self.backfold.p_value,
            closure_chi2_ndf: self.closure_backfold.chi2_ndf(),
            closure_p_value: self.closure_backfold.p_value,
        }
    }
}

/// Back-fold χ²/ndf and p-values of one strength.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StrengthSummary {
    /// Regularization strength.
    pub strength: usize,
    /// Production back-fold χ²/ndf.
    pub chi2_ndf: f64,
    /// Production back-fold p-value.
    pub p_value: f64,
    /// Closure back-fold χ²/ndf.
    pub closure_chi2_ndf: f64,
    /// Closure back-fold p-value.
    pub closure_p_value: f64,
}

/// A strength the engine could not handle.
#[derive(Debug, Clone, Serialize)]
pub struct FailedStrength {
    /// Regularization strength.
    pub strength: usize,
    /// Engine message.
    pub reason: String,
}

/// Scan output, ordered by strength.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Completed strengths.
    pub results: Vec<UnfoldingResult>,
    /// Skipped strengths.
    pub failed: Vec<FailedStrength>,
}

enum Attempt {
    Done(Box<UnfoldingResult>),
    Failed(FailedStrength),
}

/// Runs an [`UnfoldingEngine`] over a list of regularization strengths.
pub struct RegularizationScan<'e> {
    engine: &'e dyn UnfoldingEngine,
    strengths: Vec<usize>,
    threads: usize,
}

impl<'e> RegularizationScan<'e> {
    /// Scan `strengths` sequentially.
    pub fn new(engine: &'e dyn UnfoldingEngine, strengths: Vec<usize>) -> Self {
        Self { engine, strengths, threads: 1 }
    }

    /// Worker threads (0 = rayon global pool).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Strengths to scan for a measured axis of `n_measured` bins:
    /// `1 ..= n_measured − 1`, capped at `cap`.
    pub fn strengths_for(n_measured: usize, cap: Option<usize>) -> Vec<usize> {
        let max = n_measured.saturating_sub(1);
        let max = cap.map_or(max, |c| c.min(max));
        (1..=max).collect()
    }

    /// Strengths this scan visits.
    pub fn strengths(&self) -> &[usize] {
        &self.strengths
    }

    /// Run every strength. Engine failures skip the strength; any other
    /// error aborts the scan.
    pub fn run(&self, inputs: &ScanInputs<'_>) -> Result<ScanOutcome> {
        tracing::info!(
            engine = self.engine.name(),
            strengths = self.strengths.len(),
            threads = self.threads,
            "starting regularization scan"
        );
        let run_all = || -> Result<Vec<Attempt>> {
            self.strengths.par_iter().map(|&r| self.attempt(inputs, r)).collect()
        };
        let attempts = if self.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .build()
                .map_err(|e| Error::Validation(format!("failed to create thread pool: {e}")))?;
            pool.install(run_all)?
        } else {
            run_all()?
        };

        let mut outcome = ScanOutcome::default();
        for a in attempts {
            match a {
                Attempt::Done(r) => outcome.results.push(*r),
                Attempt::Failed(f) => outcome.failed.push(f),
            }
        }
        tracing::info!(
            completed = outcome.results.len(),
            failed = outcome.failed.len(),
            "regularization scan done"
        );
        Ok(outcome)
    }

    fn attempt(&self, inputs: &ScanInputs<'_>, strength: usize) -> Result<Attempt> {
        match self.unfold_strength(inputs, strength) {
            Ok(r) => Ok(Attempt::Done(Box::new(r))),
            Err(e) if e.is_engine_failure() => {
                tracing::warn!(strength, error = %e, "skipping regularization strength");
                Ok(Attempt::Failed(FailedStrength { strength, reason: e.to_string() }))
            }
            Err(e) => Err(e),
        }
    }

    fn unfold_strength(&self, inputs: &ScanInputs<'_>, r: usize) -> Result<UnfoldingResult> {
        let prod = self.engine.unfold(inputs.response, inputs.measured, r)?;
        let closure = self.engine.unfold(inputs.closure_response, inputs.closure_measured, r)?;

        let unfolded = prod.spectrum.renamed(format!("unfoldedReg{r}"), format!("Unfolded, reg {r}"));
        let closure_unfolded = closure
            .spectrum
            .renamed(format!("unfoldedClosureReg{r}"), format!("Unfolded closure, reg {r}"));

        let backfold_check = backfold(
            inputs.response,
            &unfolded,
            inputs.measured,
            &format!("backfolded_reg{r}"),
            &format!("backfoldRatio_reg{r}"),
        )?;
        let closure_backfold = backfold(
            inputs.closure_response,
            &closure_unfolded,
            inputs.closure_measured,
            &format!("backfoldedClosure_reg{r}"),
            &format!("backfoldRatioClosure_reg{r}"),
        )?;
        let closure_ratio = Hist1D::ratio(
            &closure_unfolded,
            inputs.closure_truth,
            DivideMode::Independent,
            format!("closureRatio_reg{r}"),
            format!("closure unfolded / truth, reg {r}"),
        )?;
        let normalized = inputs.normalization.map(|n| n.apply(&unfolded, &format!("normalizedReg{r}")));
        let discrepancy = prod.discrepancy.map(|d| d.renamed(format!("dvectorReg{r}"), d.title()));
        let closure_discrepancy = closure
            .discrepancy
            .map(|d| d.renamed(format!("dvectorClosureReg{r}"), d.title()));

        tracing::debug!(strength = r, chi2_ndf = backfold_check.chi2_ndf(), "strength done");
        Ok(UnfoldingResult {
            strength: r,
            unfolded,
            normalized,
            backfold: backfold_check,
            closure_unfolded,
            closure_backfold,
            closure_ratio,
            discrepancy,
            closure_discrepancy,
            extras: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Unfolded;
    use approx::assert_relative_eq;
    use ju_core::{Binning, Hist2D};

    /// Returns the prior unchanged; fails on selected strengths.
    struct PriorEngine {
        fail_at: Vec<usize>,
        fatal_at: Option<usize>,
    }

    impl UnfoldingEngine for PriorEngine {
        fn name(&self) -> &str {
            "prior"
        }

        fn unfold(&self, response: &ResponseModel, _: &Hist1D, strength: usize) -> Result<Unfolded> {
            if self.fail_at.contains(&strength) {
                return Err(Error::EngineFailure(format!("k={strength} singular")));
            }
            if self.fatal_at == Some(strength) {
                return Err(Error::Validation("broken".into()));
            }
            Ok(Unfolded { spectrum: response.prior().clone(), discrepancy: None })
        }
    }

    fn diagonal(n: usize) -> (ResponseModel, Hist1D) {
        let b = Binning::uniform(n, 0.0, 10.0 * n as f64).unwrap();
        let mut m = Hist2D::new("responseMatrix", "", b.clone(), b.clone());
        for i in 0..n {
            m.set_bin(i, i, 10.0, 10.0);
        }
        let prior = Hist1D::from_parts("htrueFull", "", b.clone(), vec![10.0; n], vec![10.0; n]).unwrap();
        let measured = Hist1D::from_parts("hraw", "", b, vec![10.0; n], vec![10.0; n]).unwrap();
        (ResponseModel::new(m, prior).unwrap(), measured)
    }

    #[test]
    fn test_strength_range() {
        assert_eq!(RegularizationScan::strengths_for(6, None), vec![1, 2, 3, 4, 5]);
        assert_eq!(RegularizationScan::strengths_for(6, Some(3)), vec![1, 2, 3]);
        assert!(RegularizationScan::strengths_for(1, None).is_empty());
    }

    #[test]
    fn test_engine_failures_are_skipped_in_order() {
        let (r, measured) = diagonal(6);
        let inputs = ScanInputs {
            response: &r,
            measured: &measured,
            closure_response: &r,
            closure_measured: &measured,
            closure_truth: r.prior(),
            normalization: Some(SpectrumNormalization::new(2.0).unwrap()),
        };
        let engine = PriorEngine { fail_at: vec![3], fatal_at: None };
        let out = RegularizationScan::new(&engine, vec![1, 2, 3, 4, 5])
            .with_threads(3)
            .run(&inputs)
            .unwrap();
        let done: Vec<usize> = out.results.iter().map(|r| r.strength).collect();
        assert_eq!(done, vec![1, 2, 4, 5]);
        assert_eq!(out.failed.len(), 1);
        assert_eq!(out.failed[0].strength, 3);

        let r4 = &out.results[2];
        assert_eq!(r4.unfolded.name(), "unfoldedReg4");
        assert_eq!(r4.backfold.backfolded.name(), "backfolded_reg4");
        assert_eq!(r4.closure_backfold.backfolded.name(), "backfoldedClosure_reg4");
        // 10 × 2 / width 10
        assert_relative_eq!(r4.normalized.as_ref().unwrap().content(0), 2.0, max_relative = 1e-12);
        assert_relative_eq!(r4.closure_ratio.content(0), 1.0, max_relative = 1e-12);
        assert_relative_eq!(r4.backfold.ratio.content(0), 1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_other_errors_abort() {
        let (r, measured) = diagonal(4);
        let inputs = ScanInputs {
            response: &r,
            measured: &measured,
            closure_response: &r,
            closure_measured: &measured,
            closure_truth: r.prior(),
            normalization: None,
        };
        let engine = PriorEngine { fail_at: vec![], fatal_at: Some(2) };
        let err = RegularizationScan::new(&engine, vec![1, 2, 3]).run(&inputs).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_emcal_acceptance() {
        let n = SpectrumNormalization::emcal(0.2, 57.8, 0.8228, 1.88, 1.4).unwrap();
        let acc = (1.88 - 0.4) * (1.4 - 0.4) / (2.0 * std::f64::consts::PI);
        assert_relative_eq!(n.scale(), 57.8 * 0.8228 / acc, max_relative = 1e-12);
        let too_large = SpectrumNormalization::emcal(0.8, 57.8, 0.8228, 1.88, 1.4);
        assert!(matches!(too_large, Err(Error::InvalidNormalization { .. })));
    }
}
