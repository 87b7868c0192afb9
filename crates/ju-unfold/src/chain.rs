//! The 1D jet-pT correction chain.
//!
//! Reads per-trigger data and simulation trees, normalizes and
//! efficiency-corrects the trigger spectra, stitches them into `hraw`,
//! builds the response with its closure split, scans the regularization
//! strength and writes everything into one result store.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ju_core::{Binning, Error, Hist1D, OutlierPredicate, Result};
use ju_store::{EventSchema, Events, Group, Store, StoredObject};
use serde::Serialize;

use crate::config::ChainConfig;
use crate::efficiency::{apply_efficiency, trigger_efficiency};
use crate::engine::UnfoldingEngine;
use crate::layout::DataLayout;
use crate::lumi::{
    CentNotrdCorrection, CorrectionMethod, Luminosities, cluster_counter_correction, event_count,
    lumi_cent, spectrum_ratio_correction,
};
use crate::packager::ResultPackage;
use crate::response::{PtAxes, ResponseBuilder, SplitStats};
use crate::scan::{FailedStrength, RegularizationScan, ScanInputs, SpectrumNormalization, StrengthSummary};
use crate::spectrum::{WeightMode, fill_spectrum, load_tree, read_tree_spectrum};
use crate::triggers::{NormalizationSource, TriggerSpectrum, norm_hist, trigger_ratio};

/// Parameters of one chain invocation.
#[derive(Debug, Clone)]
pub struct ChainRun {
    /// Jet radius.
    pub radius: f64,
    /// Jet pT cut of the analysis task (part of every input name).
    pub pt_cut: u32,
    /// Directory containing `data/` and `mc/`.
    pub data_dir: PathBuf,
    /// Directory receiving the result store.
    pub output_dir: PathBuf,
}

/// What a chain run did.
#[derive(Debug, Clone, Serialize)]
pub struct ChainSummary {
    /// Result store.
    pub output: PathBuf,
    /// Jet radius.
    pub radius: f64,
    /// Jet pT cut.
    pub pt_cut: u32,
    /// Seed of the closure split.
    pub seed: u64,
    /// Luminosities, if any trigger is luminosity-normalized.
    pub luminosities: Option<Luminosities>,
    /// CENTNOTRD correction method, if one was needed.
    pub centnotrd_method: Option<CorrectionMethod>,
    /// Closure split bookkeeping.
    pub split: SplitStats,
    /// Completed strengths with their back-fold figures.
    pub completed: Vec<StrengthSummary>,
    /// Skipped strengths.
    pub failed: Vec<FailedStrength>,
}

/// Run the correction chain for one radius.
pub fn correction_chain_1d(
    run: &ChainRun,
    config: &ChainConfig,
    engine: &dyn UnfoldingEngine,
) -> Result<ChainSummary> {
    config.validate()?;
    let layout = DataLayout::new(&run.data_dir, run.radius, run.pt_cut)?;
    let tag = layout.tag().to_string();
    let det = config.detector_binning()?;
    let truth = config.true_binning()?;
    let outlier = config.outlier_cut();
    let outlier: Option<&dyn OutlierPredicate> = outlier.as_ref().map(|o| o as &dyn OutlierPredicate);
    tracing::info!(
        radius = run.radius,
        pt_cut = run.pt_cut,
        data_dir = %run.data_dir.display(),
        "starting 1D correction chain"
    );

    let norms = Normalizations::read(&layout, config, &det)?;

    let mut spectra: BTreeMap<String, TriggerSpectrum> = BTreeMap::new();
    let mut mc: BTreeMap<String, Hist1D> = BTreeMap::new();
    let mut response_events: Option<Events> = None;
    for trg in &config.triggers {
        let reference = *trg == config.reference_trigger;
        let mode =
            if config.is_downscaled(trg) { WeightMode::Downscale } else { WeightMode::Unweighted };
        let data_name = format!("dataspec_R{tag}_{trg}");
        let hist = read_tree_spectrum(&layout.data_tree(trg, reference), &det, mode, None, &data_name)?;
        let mut spectrum = TriggerSpectrum::new(trg.as_str(), hist);
        let value = norms.value_for(trg, config.normalization_for(trg))?;
        spectrum.normalize(value)?;
        tracing::info!(trigger = %trg, normalization = value, "trigger spectrum normalized");
        spectra.insert(trg.clone(), spectrum);

        let mc_events = load_tree(&layout.mc_tree(trg), &WeightMode::Generator.schema(true))?;
        let mc_spectrum = fill_spectrum(&mc_events, &det, &format!("mcspec_R{tag}_{trg}"), outlier);
        mc.insert(trg.clone(), mc_spectrum);
        if reference {
            response_events = Some(mc_events);
        }
    }
    let missing_reference =
        || Error::NotFound(format!("spectra of reference trigger {}", config.reference_trigger));
    let mc_reference = mc.get(&config.reference_trigger).ok_or_else(missing_reference)?;

    let mut efficiencies = Vec::new();
    for trg in config.triggered() {
        let mc_trg = mc.get(trg).ok_or_else(|| Error::NotFound(format!("simulation of {trg}")))?;
        let eff = trigger_efficiency(mc_trg, mc_reference, &format!("Efficiency_R{tag}_{trg}"))?;
        if let Some(s) = spectra.get_mut(trg) {
            apply_efficiency(s, &eff)?;
        }
        efficiencies.push(eff);
    }

    let reference_spectrum = spectra.get(&config.reference_trigger).ok_or_else(missing_reference)?;
    let mut ratios = Vec::new();
    for trg in config.triggered() {
        if let Some(s) = spectra.get(trg) {
            ratios.push(trigger_ratio(s.hist(), reference_spectrum.hist(), &format!("{trg}overMB_R{tag}"))?);
        }
    }

    let hraw = config.stitch_plan()?.combine(&spectra, "hraw", "combined raw spectrum")?.into_hist();

    let response_events = response_events.ok_or_else(missing_reference)?;
    let axes = PtAxes::new(det.clone(), truth);
    let set = ResponseBuilder::new(&axes, config.closure_fraction)?
        .with_seed(config.seed)
        .with_outlier(outlier)
        .build(&response_events)?;

    let normalization = SpectrumNormalization::emcal(
        run.radius,
        config.cross_section,
        config.vertex_efficiency,
        config.emcal_phi,
        config.emcal_eta,
    )?;
    let inputs = ScanInputs {
        response: &set.response,
        measured: &hraw,
        closure_response: &set.response_closure,
        closure_measured: &set.hsmeared_closure,
        closure_truth: &set.htrue_full_closure,
        normalization: Some(normalization),
    };
    let strengths = RegularizationScan::strengths_for(det.n_bins(), config.max_regularization);
    let outcome = RegularizationScan::new(engine, strengths).with_threads(config.threads).run(&inputs)?;

    // raw level
    let luminosities = norms.luminosities()?;
    let mut raw_level: Vec<StoredObject> = vec![hraw.clone().into()];
    if let Some(l) = &luminosities {
        raw_level.push(l.to_hist()?.into());
    }
    for s in spectra.values() {
        let mut h = s.hist().clone();
        h.normalize_bin_width();
        raw_level.push(h.into());
    }
    for h in mc.values() {
        let mut h = h.clone();
        h.normalize_bin_width();
        raw_level.push(h.into());
    }
    raw_level.extend(efficiencies.into_iter().map(StoredObject::from));
    for (trg, count) in &norms.counts {
        raw_level.push(norm_hist(trg, *count)?.into());
    }
    raw_level.extend(ratios.into_iter().map(StoredObject::from));
    if let Some(c) = &norms.centnotrd {
        raw_level.extend(c.histograms.iter().cloned().map(StoredObject::from));
    }

    let mut detector_response = set.histograms();
    detector_response.push(hraw.into());
    detector_response.push(set.response.purity("purity")?.into());
    detector_response.push(set.response.stability("stability")?.into());

    let completed: Vec<StrengthSummary> = outcome.results.iter().map(|r| r.summary()).collect();
    let package = ResultPackage { raw_level, detector_response, regularizations: outcome.results };
    let output = run.output_dir.join(layout.output_name());
    package.save(&output)?;

    Ok(ChainSummary {
        output,
        radius: run.radius,
        pt_cut: run.pt_cut,
        seed: set.seed,
        luminosities,
        centnotrd_method: norms.centnotrd.as_ref().map(|c| c.method),
        split: set.stats,
        completed,
        failed: outcome.failed,
    })
}

/// Event counts and luminosities the trigger spectra are divided by.
struct Normalizations {
    counts: BTreeMap<String, f64>,
    reference_count: f64,
    lumi_cent: Option<f64>,
    centnotrd: Option<CentNotrdCorrection>,
}

impl Normalizations {
    fn read(layout: &DataLayout, config: &ChainConfig, det: &Binning) -> Result<Self> {
        let sources: Vec<(&str, NormalizationSource)> =
            config.triggers.iter().map(|t| (t.as_str(), config.normalization_for(t))).collect();

        // every trigger carries an event counter, whatever it is normalized by
        let counts_store = Store::open(layout.counts_file())?;
        let counts_root = counts_store.root();
        let mut counts = BTreeMap::new();
        for trg in &config.triggers {
            let n = event_count(&counts_root.cd(&layout.counter_group(trg))?)?;
            counts.insert(trg.clone(), n);
        }
        let reference_count = counts.get(&config.reference_trigger).copied().ok_or_else(|| {
            Error::NotFound(format!("event count of {}", config.reference_trigger))
        })?;

        let needs = |s: NormalizationSource| sources.iter().any(|(_, src)| *src == s);
        let (lumi_cent, centnotrd) =
            if needs(NormalizationSource::LumiCent) || needs(NormalizationSource::LumiCentNotrd) {
                let store = Store::open(layout.lumi_file())?;
                let root = store.root();
                let lumi = lumi_cent(&root.cd(&layout.lumi_group())?)?;
                let correction = if needs(NormalizationSource::LumiCentNotrd) {
                    Some(centnotrd_correction(layout, &root, config, det)?)
                } else {
                    None
                };
                (Some(lumi), correction)
            } else {
                (None, None)
            };
        Ok(Self { counts, reference_count, lumi_cent, centnotrd })
    }

    fn value_for(&self, trigger: &str, source: NormalizationSource) -> Result<f64> {
        let missing = |what: &str| Error::NotFound(format!("{what} for trigger {trigger}"));
        match source {
            NormalizationSource::EventCount => {
                self.counts.get(trigger).copied().ok_or_else(|| missing("event count"))
            }
            NormalizationSource::LumiCent => self.lumi_cent.ok_or_else(|| missing("CENT luminosity")),
            NormalizationSource::LumiCentNotrd => match (self.lumi_cent, &self.centnotrd) {
                (Some(lumi), Some(c)) => Ok(lumi * c.factor),
                _ => Err(missing("CENTNOTRD luminosity")),
            },
        }
    }

    fn luminosities(&self) -> Result<Option<Luminosities>> {
        match (self.lumi_cent, &self.centnotrd) {
            (Some(lumi), Some(c)) => Luminosities::new(self.reference_count, lumi, c.factor).map(Some),
            (Some(lumi), None) => Luminosities::new(self.reference_count, lumi, 1.0).map(Some),
            _ => Ok(None),
        }
    }
}

fn centnotrd_correction(
    layout: &DataLayout,
    root: &Group<'_>,
    config: &ChainConfig,
    det: &Binning,
) -> Result<CentNotrdCorrection> {
    let group = root.cd(&layout.cluster_group())?;
    if let Some(factor) = cluster_counter_correction(&group)? {
        tracing::info!(factor, method = "cluster counter", "CENTNOTRD correction");
        return Ok(CentNotrdCorrection {
            factor,
            method: CorrectionMethod::ClusterCounter,
            histograms: Vec::new(),
        });
    }
    tracing::warn!(group = group.path(), "no trigger cluster counter, fitting the spectrum ratio");
    let events = load_tree(&layout.centnotrd_tree(), &EventSchema::data().with_trigger_cluster())?;
    let correction = spectrum_ratio_correction(&events, det, config.centnotrd_fit_range)?;
    tracing::info!(factor = correction.factor, method = "spectrum ratio", "CENTNOTRD correction");
    Ok(correction)
}
