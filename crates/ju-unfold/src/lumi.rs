//! Luminosity bookkeeping and the CENTNOTRD cluster correction.
//!
//! The EJ1 trigger was recorded with the CENTNOTRD cluster, whose luminosity
//! is not monitored. It is obtained from the CENT luminosity times a
//! correction factor, measured either from the trigger cluster counter or,
//! for older outputs without the counter, from the ratio of jet spectra.
//! The two methods are kept separate; which one was used is logged.

use ju_core::{Binning, DivideMode, Error, EventSource, Hist1D, Result};
use ju_store::Group;
use serde::Serialize;

/// Luminosity monitor histogram.
pub const LUMI_MONITOR: &str = "hLumiMonitor";
/// Event counter histogram.
pub const EVENT_COUNTER: &str = "hEventCounter";
/// Trigger cluster counter histogram.
pub const CLUSTER_COUNTER: &str = "hTriggerClusterCounter";

/// Luminosity of the CENT cluster: bin labelled `CENT` of `hLumiMonitor`.
pub fn lumi_cent(group: &Group<'_>) -> Result<f64> {
    let h = group.hist1d(LUMI_MONITOR)?;
    let bin = h.find_label("CENT").ok_or_else(|| {
        Error::NotFound(format!("bin CENT of {}/{LUMI_MONITOR}", group.path()))
    })?;
    positive("luminosity CENT", h.content(bin))
}

/// Number of analysed events: first bin of `hEventCounter`.
pub fn event_count(group: &Group<'_>) -> Result<f64> {
    let h = group.hist1d(EVENT_COUNTER)?;
    positive(&format!("event count in {}", group.path()), h.content(0))
}

fn positive(what: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidNormalization { what: what.to_string(), value })
    }
}

/// How the CENTNOTRD correction was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMethod {
    /// `(c(0) + c(2)) / c(0)` of the trigger cluster counter.
    ClusterCounter,
    /// Constant fit to the CENTNOTRD / CENT jet spectrum ratio.
    SpectrumRatio,
}

/// CENTNOTRD correction factor and the histograms it was derived from.
#[derive(Debug, Clone)]
pub struct CentNotrdCorrection {
    /// Multiplicative factor from CENT to CENTNOTRD luminosity.
    pub factor: f64,
    /// Method used.
    pub method: CorrectionMethod,
    /// `speccentnotrd`, `speccent` and `CENTNOTRDCorrection` for the
    /// spectrum-ratio method; empty otherwise.
    pub histograms: Vec<Hist1D>,
}

/// Correction from the trigger cluster counter; `None` if the counter is not
/// stored in `group`.
///
/// Counter bin at x = 0 counts CENT and CENTNOTRD clusters, bin at x = 2 only
/// CENTNOTRD ones.
pub fn cluster_counter_correction(group: &Group<'_>) -> Result<Option<f64>> {
    let Ok(obj) = group.get(CLUSTER_COUNTER) else {
        return Ok(None);
    };
    let h = obj.as_hist1d()?;
    let count_at = |x: f64| {
        h.find_bin(x).map(|b| h.content(b)).ok_or_else(|| {
            Error::Validation(format!("{CLUSTER_COUNTER} has no bin at x = {x}"))
        })
    };
    let both = positive("CENT cluster counter", count_at(0.0)?)?;
    let only_centnotrd = count_at(2.0)?;
    Ok(Some((both + only_centnotrd) / both))
}

/// Correction from the jet spectra of the EJ1 tree: all jets over jets whose
/// cluster is CENT (`TriggerClusterIndex < 1`), fitted by a constant in
/// `fit_range`.
pub fn spectrum_ratio_correction(
    events: &dyn EventSource,
    binning: &Binning,
    fit_range: [f64; 2],
) -> Result<CentNotrdCorrection> {
    let mut centnotrd = Hist1D::new("speccentnotrd", "Spectrum centnotrd", binning.clone());
    let mut cent = Hist1D::new("speccent", "Spectrum cent", binning.clone());
    for ev in events.events() {
        centnotrd.fill(ev.measured);
        if ev.trigger_cluster.is_some_and(|c| c < 1) {
            cent.fill(ev.measured);
        }
    }
    let correction = Hist1D::ratio(
        &centnotrd,
        &cent,
        DivideMode::Binomial,
        "CENTNOTRDCorrection",
        "Correction for the unmeasured CENTNOTRD Luminosity",
    )?;
    let factor = constant_fit(&correction, fit_range)?;
    Ok(CentNotrdCorrection {
        factor,
        method: CorrectionMethod::SpectrumRatio,
        histograms: vec![centnotrd, cent, correction],
    })
}

/// Least-squares constant over the valid bins whose centre lies in
/// `[lo, hi]`: the inverse-variance weighted mean. Bins with zero variance
/// carry no weight.
pub fn constant_fit(h: &Hist1D, [lo, hi]: [f64; 2]) -> Result<f64> {
    let (mut sw, mut swx) = (0.0, 0.0);
    for i in 0..h.n_bins() {
        let c = h.binning().center(i);
        if c < lo || c > hi || !h.is_valid_bin(i) || h.variance(i) <= 0.0 {
            continue;
        }
        let w = 1.0 / h.variance(i);
        sw += w;
        swx += w * h.content(i);
    }
    if sw > 0.0 {
        Ok(swx / sw)
    } else {
        Err(Error::InvalidNormalization {
            what: format!("constant fit of {} in [{lo}, {hi}]", h.name()),
            value: f64::NAN,
        })
    }
}

/// Integrated luminosities written as the `luminosities` histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Luminosities {
    /// Event count of the minimum-bias trigger.
    pub trigger_weight: f64,
    /// CENT luminosity.
    pub lumi_cent: f64,
    /// CENTNOTRD luminosity.
    pub lumi_centnotrd: f64,
}

impl Luminosities {
    /// `lumi_centnotrd = lumi_cent × factor`.
    pub fn new(trigger_weight: f64, lumi_cent: f64, factor: f64) -> Result<Self> {
        let lumi_centnotrd = positive("luminosity CENTNOTRD", lumi_cent * factor)?;
        Ok(Self { trigger_weight, lumi_cent, lumi_centnotrd })
    }

    /// Three labelled bins `INT7`, `CENT`, `CENTNOTRD`.
    pub fn to_hist(&self) -> Result<Hist1D> {
        let mut h = Hist1D::new("luminosities", "Luminosities", Binning::uniform(3, 0.0, 3.0)?)
            .with_labels(vec!["INT7".into(), "CENT".into(), "CENTNOTRD".into()])?;
        h.set_bin(0, self.trigger_weight, 0.0);
        h.set_bin(1, self.lumi_cent, 0.0);
        h.set_bin(2, self.lumi_centnotrd, 0.0);
        Ok(h)
    }
}
