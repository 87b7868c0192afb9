//! Run configuration for the correction chain and the Mg unfolding.
//!
//! Every constant of the analysis is a named, overridable value with a
//! serde default, so a partial JSON/YAML file only needs to list what changes.

use std::collections::BTreeMap;

use ju_core::{Binning, Error, Result};
use serde::{Deserialize, Serialize};

use crate::outlier::{DEFAULT_OUTLIER_FACTOR, PtHardOutlierCut};
use crate::triggers::{NormalizationSource, StitchPlan, StitchSegment};

/// Configuration of [`crate::chain::correction_chain_1d`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// Triggers to combine (the reference trigger must be listed).
    #[serde(default = "default_triggers")]
    pub triggers: Vec<String>,

    /// Minimum-bias trigger used as efficiency reference and for the
    /// low-pT region of the stitched spectrum.
    #[serde(default = "default_reference")]
    pub reference_trigger: String,

    /// Triggers whose data spectra are filled with the downscale weight.
    #[serde(default = "default_downscaled")]
    pub downscaled_triggers: Vec<String>,

    /// Luminosity-equivalent normalization per trigger; triggers not listed
    /// are normalized by their event count.
    #[serde(default = "default_normalization")]
    pub normalization: BTreeMap<String, NormalizationSource>,

    /// Bin centre (GeV/c) from which on the first triggered spectrum replaces
    /// the reference one. Ignored when `stitch_segments` is set.
    #[serde(default = "default_stitch_threshold")]
    pub stitch_threshold: f64,

    /// Explicit stitching segments (overrides `stitch_threshold`).
    #[serde(default)]
    pub stitch_segments: Vec<StitchSegment>,

    /// Fraction of simulated jets routed to the closure-test sample.
    #[serde(default = "default_closure_fraction")]
    pub closure_fraction: f64,

    /// Seed of the closure split; drawn from entropy (and logged) if absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Outlier cut factor for simulated jets; no rejection if absent.
    #[serde(default = "default_outlier_factor")]
    pub outlier_factor: Option<f64>,

    /// Visible cross section (mb).
    #[serde(default = "default_cross_section")]
    pub cross_section: f64,

    /// Vertex-finding efficiency.
    #[serde(default = "default_vertex_efficiency")]
    pub vertex_efficiency: f64,

    /// EMCAL acceptance in azimuth (rad).
    #[serde(default = "default_emcal_phi")]
    pub emcal_phi: f64,

    /// EMCAL acceptance in pseudorapidity.
    #[serde(default = "default_emcal_eta")]
    pub emcal_eta: f64,

    /// Fit range of the CENTNOTRD spectrum-ratio fallback.
    #[serde(default = "default_fit_range")]
    pub centnotrd_fit_range: [f64; 2],

    /// Detector-level jet pT bin edges.
    #[serde(default = "default_detector_binning")]
    pub detector_binning: Vec<f64>,

    /// Particle-level jet pT bin edges.
    #[serde(default = "default_true_binning")]
    pub true_binning: Vec<f64>,

    /// Highest regularization strength scanned (all by default).
    #[serde(default)]
    pub max_regularization: Option<usize>,

    /// Worker threads of the regularization scan (0 = auto, 1 = sequential).
    #[serde(default = "default_threads")]
    pub threads: usize,
}

fn default_triggers() -> Vec<String> {
    vec!["INT7".into(), "EJ1".into()]
}

fn default_reference() -> String {
    "INT7".into()
}

fn default_downscaled() -> Vec<String> {
    vec!["EJ2".into()]
}

fn default_normalization() -> BTreeMap<String, NormalizationSource> {
    BTreeMap::from([
        ("EJ1".to_string(), NormalizationSource::LumiCentNotrd),
        ("EJ2".to_string(), NormalizationSource::LumiCent),
    ])
}

fn default_stitch_threshold() -> f64 {
    70.0
}

fn default_closure_fraction() -> f64 {
    0.2
}

fn default_outlier_factor() -> Option<f64> {
    Some(DEFAULT_OUTLIER_FACTOR)
}

fn default_cross_section() -> f64 {
    57.8
}

fn default_vertex_efficiency() -> f64 {
    0.8228
}

fn default_emcal_phi() -> f64 {
    1.88
}

fn default_emcal_eta() -> f64 {
    1.4
}

fn default_fit_range() -> [f64; 2] {
    [20.0, 200.0]
}

fn default_detector_binning() -> Vec<f64> {
    vec![
        20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0, 110.0, 120.0,
        140.0, 160.0, 180.0, 200.0, 240.0,
    ]
}

fn default_true_binning() -> Vec<f64> {
    vec![
        0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0, 120.0, 140.0, 160.0,
        180.0, 200.0, 240.0, 280.0, 320.0, 400.0,
    ]
}

fn default_threads() -> usize {
    1
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            triggers: default_triggers(),
            reference_trigger: default_reference(),
            downscaled_triggers: default_downscaled(),
            normalization: default_normalization(),
            stitch_threshold: default_stitch_threshold(),
            stitch_segments: Vec::new(),
            closure_fraction: default_closure_fraction(),
            seed: None,
            outlier_factor: default_outlier_factor(),
            cross_section: default_cross_section(),
            vertex_efficiency: default_vertex_efficiency(),
            emcal_phi: default_emcal_phi(),
            emcal_eta: default_emcal_eta(),
            centnotrd_fit_range: default_fit_range(),
            detector_binning: default_detector_binning(),
            true_binning: default_true_binning(),
            max_regularization: None,
            threads: default_threads(),
        }
    }
}

impl ChainConfig {
    /// Check cross-field consistency once before any input is read.
    pub fn validate(&self) -> Result<()> {
        if !self.triggers.iter().any(|t| t == &self.reference_trigger) {
            return Err(Error::Validation(format!(
                "reference trigger {} not in trigger list {:?}",
                self.reference_trigger, self.triggers
            )));
        }
        validate_fraction(self.closure_fraction)?;
        let [lo, hi] = self.centnotrd_fit_range;
        if !(lo < hi) {
            return Err(Error::Validation(format!("empty CENTNOTRD fit range [{lo}, {hi}]")));
        }
        self.detector_binning()?;
        self.true_binning()?;
        let plan = self.stitch_plan()?;
        for seg in plan.segments() {
            if !self.triggers.contains(&seg.trigger) {
                return Err(Error::Validation(format!(
                    "stitch segment uses trigger {} not in trigger list",
                    seg.trigger
                )));
            }
        }
        Ok(())
    }

    /// Triggers other than the reference, in configured order.
    pub fn triggered(&self) -> impl Iterator<Item = &str> {
        self.triggers.iter().map(String::as_str).filter(|t| *t != self.reference_trigger)
    }

    /// Normalization source of `trigger`.
    pub fn normalization_for(&self, trigger: &str) -> NormalizationSource {
        self.normalization.get(trigger).copied().unwrap_or(NormalizationSource::EventCount)
    }

    /// Whether `trigger` is filled with the downscale weight.
    pub fn is_downscaled(&self, trigger: &str) -> bool {
        self.downscaled_triggers.iter().any(|t| t == trigger)
    }

    /// Detector-level binning.
    pub fn detector_binning(&self) -> Result<Binning> {
        Binning::new(self.detector_binning.clone())
    }

    /// Particle-level binning.
    pub fn true_binning(&self) -> Result<Binning> {
        Binning::new(self.true_binning.clone())
    }

    /// Outlier predicate for simulated jets.
    pub fn outlier_cut(&self) -> Option<PtHardOutlierCut> {
        self.outlier_factor.map(PtHardOutlierCut::new)
    }

    /// Stitching plan: explicit segments, or reference below the threshold and
    /// the first triggered spectrum above it.
    pub fn stitch_plan(&self) -> Result<StitchPlan> {
        if !self.stitch_segments.is_empty() {
            return StitchPlan::new(self.stitch_segments.clone());
        }
        match self.triggered().next() {
            Some(high) => StitchPlan::two_trigger(&self.reference_trigger, high, self.stitch_threshold),
            None => StitchPlan::single(&self.reference_trigger),
        }
    }
}

/// Configuration of [`crate::mg::unfolding_mg`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MgConfig {
    /// Fraction of simulated jets routed to the closure-test sample.
    #[serde(default = "default_closure_fraction")]
    pub closure_fraction: f64,

    /// Seed of the closure split; drawn from entropy (and logged) if absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Outlier cut factor for simulated jets; no rejection if absent.
    #[serde(default)]
    pub outlier_factor: Option<f64>,

    /// Groomed-mass bin edges (both levels).
    #[serde(default = "default_mg_binning")]
    pub mg_binning: Vec<f64>,

    /// Particle-level jet pT bin edges.
    #[serde(default = "default_mg_true_pt")]
    pub true_pt_binning: Vec<f64>,

    /// Detector-level jet pT bin edges; chosen from the trigger named in the
    /// data file name if absent.
    #[serde(default)]
    pub detector_pt_binning: Option<Vec<f64>>,

    /// Highest regularization strength scanned.
    #[serde(default = "default_mg_max_regularization")]
    pub max_regularization: Option<usize>,

    /// Worker threads of the regularization scan (0 = auto, 1 = sequential).
    #[serde(default = "default_threads")]
    pub threads: usize,
}

fn default_mg_binning() -> Vec<f64> {
    stepped_edges(0.0, 50.0, 0.5)
}

fn default_mg_true_pt() -> Vec<f64> {
    stepped_edges(0.0, 400.0, 20.0)
}

fn default_mg_max_regularization() -> Option<usize> {
    Some(10)
}

fn stepped_edges(lo: f64, hi: f64, step: f64) -> Vec<f64> {
    let n = ((hi - lo) / step).round() as usize;
    (0..=n).map(|i| lo + step * i as f64).collect()
}

impl Default for MgConfig {
    fn default() -> Self {
        Self {
            closure_fraction: default_closure_fraction(),
            seed: None,
            outlier_factor: None,
            mg_binning: default_mg_binning(),
            true_pt_binning: default_mg_true_pt(),
            detector_pt_binning: None,
            max_regularization: default_mg_max_regularization(),
            threads: default_threads(),
        }
    }
}

impl MgConfig {
    /// Check the configuration once before any input is read.
    pub fn validate(&self) -> Result<()> {
        validate_fraction(self.closure_fraction)?;
        Binning::new(self.mg_binning.clone())?;
        Binning::new(self.true_pt_binning.clone())?;
        if let Some(edges) = &self.detector_pt_binning {
            Binning::new(edges.clone())?;
        }
        Ok(())
    }

    /// Outlier predicate for simulated jets.
    pub fn outlier_cut(&self) -> Option<PtHardOutlierCut> {
        self.outlier_factor.map(PtHardOutlierCut::new)
    }
}

fn validate_fraction(f: f64) -> Result<()> {
    if (0.0..=1.0).contains(&f) {
        Ok(())
    } else {
        Err(Error::Validation(format!("closure fraction {f} outside [0, 1]")))
    }
}
