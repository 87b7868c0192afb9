//! Per-trigger spectra: normalization and stitching into one raw spectrum.

use std::collections::BTreeMap;

use ju_core::{Binning, DivideMode, Error, Hist1D, Result};
use serde::{Deserialize, Serialize};

/// Which luminosity-equivalent value a trigger spectrum is divided by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationSource {
    /// Number of analysed events (`hEventCounter`).
    EventCount,
    /// Luminosity of the CENT trigger cluster.
    LumiCent,
    /// Luminosity of the CENTNOTRD trigger cluster (CENT × correction).
    LumiCentNotrd,
}

/// A raw spectrum tagged with its trigger and normalization state.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSpectrum {
    trigger: String,
    hist: Hist1D,
    normalization: Option<f64>,
}

impl TriggerSpectrum {
    /// Not yet normalized spectrum of `trigger`.
    pub fn new(trigger: impl Into<String>, hist: Hist1D) -> Self {
        Self { trigger: trigger.into(), hist, normalization: None }
    }

    /// Trigger identifier.
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    /// Spectrum.
    pub fn hist(&self) -> &Hist1D {
        &self.hist
    }

    /// Spectrum, mutable (efficiency correction).
    pub fn hist_mut(&mut self) -> &mut Hist1D {
        &mut self.hist
    }

    /// Consume into the histogram.
    pub fn into_hist(self) -> Hist1D {
        self.hist
    }

    /// Value the spectrum was divided by, once normalized.
    pub fn normalization(&self) -> Option<f64> {
        self.normalization
    }

    /// Whether [`TriggerSpectrum::normalize`] has been applied.
    pub fn is_normalized(&self) -> bool {
        self.normalization.is_some()
    }

    /// Divide by the integrated luminosity-equivalent `value`.
    pub fn normalize(&mut self, value: f64) -> Result<()> {
        if !(value.is_finite() && value > 0.0) {
            return Err(Error::InvalidNormalization {
                what: format!("trigger {}", self.trigger),
                value,
            });
        }
        if let Some(previous) = self.normalization {
            return Err(Error::Validation(format!(
                "trigger {} already normalized by {previous}",
                self.trigger
            )));
        }
        self.hist.scale(1.0 / value);
        self.normalization = Some(value);
        Ok(())
    }
}

/// One kinematic region of the stitched spectrum: bins whose centre is at or
/// above `min_center` (up to the next segment) are taken from `trigger`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchSegment {
    /// Trigger providing the region.
    pub trigger: String,
    /// Lowest bin centre of the region.
    pub min_center: f64,
}

/// Hard-boundary stitching of normalized trigger spectra.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchPlan {
    segments: Vec<StitchSegment>,
}

impl StitchPlan {
    /// Plan from segments with strictly increasing `min_center`. The first
    /// segment also covers every bin below its threshold.
    pub fn new(segments: Vec<StitchSegment>) -> Result<Self> {
        if segments.is_empty() {
            return Err(Error::Validation("stitch plan without segments".into()));
        }
        for w in segments.windows(2) {
            if !(w[1].min_center > w[0].min_center) {
                return Err(Error::Validation(format!(
                    "stitch thresholds not increasing: {} ({}) then {} ({})",
                    w[0].min_center, w[0].trigger, w[1].min_center, w[1].trigger
                )));
            }
        }
        Ok(Self { segments })
    }

    /// `low` below `threshold`, `high` at and above.
    pub fn two_trigger(low: &str, high: &str, threshold: f64) -> Result<Self> {
        Self::new(vec![
            StitchSegment { trigger: low.to_string(), min_center: f64::NEG_INFINITY },
            StitchSegment { trigger: high.to_string(), min_center: threshold },
        ])
    }

    /// Every bin from `trigger`.
    pub fn single(trigger: &str) -> Result<Self> {
        Self::new(vec![StitchSegment {
            trigger: trigger.to_string(),
            min_center: f64::NEG_INFINITY,
        }])
    }

    /// Segments in increasing threshold order.
    pub fn segments(&self) -> &[StitchSegment] {
        &self.segments
    }

    /// Trigger providing a bin centred at `center`.
    pub fn trigger_for(&self, center: f64) -> &str {
        self.segments
            .iter()
            .rev()
            .find(|s| center >= s.min_center)
            .unwrap_or(&self.segments[0])
            .trigger
            .as_str()
    }

    /// Stitch normalized spectra into `hraw`.
    ///
    /// Content and variance of each bin are copied from the selected trigger;
    /// no interpolation across the boundary.
    pub fn combine(
        &self,
        spectra: &BTreeMap<String, TriggerSpectrum>,
        name: &str,
        title: &str,
    ) -> Result<TriggerSpectrum> {
        let mut used: Vec<&TriggerSpectrum> = Vec::with_capacity(self.segments.len());
        for seg in &self.segments {
            let spec = spectra.get(&seg.trigger).ok_or_else(|| {
                Error::NotFound(format!("spectrum for trigger {} to stitch", seg.trigger))
            })?;
            if !spec.is_normalized() {
                return Err(Error::Validation(format!(
                    "trigger {} must be normalized before stitching",
                    seg.trigger
                )));
            }
            used.push(spec);
        }
        let base = used[0].hist();
        for spec in &used[1..] {
            base.binning()
                .ensure_compatible(spec.hist().binning(), &format!("stitch {}", spec.trigger()))?;
        }

        let binning: &Binning = base.binning();
        let mut hraw = base.renamed(name, title);
        for i in 0..binning.n_bins() {
            let trg = self.trigger_for(binning.center(i));
            let src = spectra[trg].hist();
            hraw.set_bin(i, src.content(i), src.variance(i));
        }
        let mut out = TriggerSpectrum::new("combined", hraw);
        out.normalization = Some(1.0);
        Ok(out)
    }
}

/// Ratio of a triggered spectrum to the reference spectrum.
pub fn trigger_ratio(triggered: &Hist1D, reference: &Hist1D, name: &str) -> Result<Hist1D> {
    Hist1D::ratio(triggered, reference, DivideMode::Independent, name, "")
}

/// One-bin histogram `norm<TRG>` holding the event count of `trigger`.
pub fn norm_hist(trigger: &str, event_count: f64) -> Result<Hist1D> {
    let mut h = Hist1D::new(
        format!("norm{trigger}"),
        format!("event count trigger {trigger}"),
        Binning::uniform(1, 0.5, 1.5)?,
    );
    h.set_bin(0, event_count, 0.0);
    Ok(h)
}
