//! Groomed-mass (Mg) unfolding in bins of jet pT.
//!
//! The (Mg × pT) spectrum of one trigger is unfolded as a flattened 1D
//! spectrum, see [`crate::flat2d`]. No luminosity normalization is applied.

use std::path::{Path, PathBuf};

use ju_core::{Binning, Error, Hist2D, OutlierPredicate, Result};
use ju_store::{EventSchema, StoredObject, columns};
use serde::Serialize;

use crate::config::MgConfig;
use crate::engine::UnfoldingEngine;
use crate::flat2d::{FlatAxes, FlatBinning2D};
use crate::packager::ResultPackage;
use crate::response::{ResponseBuilder, SplitStats};
use crate::scan::{FailedStrength, RegularizationScan, ScanInputs, StrengthSummary};
use crate::spectrum::load_tree;

/// Parameters of one Mg run.
#[derive(Debug, Clone)]
pub struct MgRun {
    /// Data tree store; its name selects the trigger.
    pub data_file: PathBuf,
    /// Simulation tree store.
    pub mc_file: PathBuf,
    /// Directory receiving the result store.
    pub output_dir: PathBuf,
}

/// What an Mg run did.
#[derive(Debug, Clone, Serialize)]
pub struct MgSummary {
    /// Result store.
    pub output: PathBuf,
    /// Trigger of the data sample.
    pub trigger: String,
    /// Seed of the closure split.
    pub seed: u64,
    /// Closure split bookkeeping.
    pub split: SplitStats,
    /// Completed strengths with their back-fold figures.
    pub completed: Vec<StrengthSummary>,
    /// Skipped strengths.
    pub failed: Vec<FailedStrength>,
}

/// Detector-level pT edges used for a trigger.
pub fn detector_pt_edges(trigger: &str) -> Result<Vec<f64>> {
    let edges = match trigger {
        "INT7" => vec![20.0, 30.0, 40.0, 50.0, 60.0, 80.0, 100.0, 120.0],
        "EJ2" => vec![60.0, 70.0, 80.0, 100.0, 120.0, 140.0, 160.0],
        "EJ1" => vec![
            80.0, 90.0, 100.0, 110.0, 120.0, 140.0, 160.0, 180.0, 200.0, 220.0, 240.0, 260.0,
        ],
        other => {
            return Err(Error::Validation(format!("no detector pT binning for trigger {other}")));
        }
    };
    Ok(edges)
}

/// Trigger named in a data file name (`INT7`, `EJ1` or `EJ2`).
pub fn trigger_from_file_name(path: &Path) -> Result<String> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    ["INT7", "EJ1", "EJ2"]
        .into_iter()
        .find(|t| name.contains(t))
        .map(str::to_string)
        .ok_or_else(|| Error::Validation(format!("cannot tell the trigger of {}", path.display())))
}

/// Run the Mg unfolding.
pub fn unfolding_mg(
    run: &MgRun,
    config: &MgConfig,
    engine: &dyn UnfoldingEngine,
) -> Result<MgSummary> {
    config.validate()?;
    let trigger = trigger_from_file_name(&run.data_file)?;
    let det_pt = match &config.detector_pt_binning {
        Some(edges) => Binning::new(edges.clone())?,
        None => Binning::new(detector_pt_edges(&trigger)?)?,
    };
    let mg = Binning::new(config.mg_binning.clone())?;
    let true_pt = Binning::new(config.true_pt_binning.clone())?;
    let measured_grid = FlatBinning2D::new(mg.clone(), det_pt.clone())?;
    let truth_grid = FlatBinning2D::new(mg.clone(), true_pt)?;
    tracing::info!(
        data = %run.data_file.display(),
        mc = %run.mc_file.display(),
        trigger = %trigger,
        measured_bins = measured_grid.n_bins(),
        true_bins = truth_grid.n_bins(),
        "starting Mg unfolding"
    );

    let data = load_tree(
        &run.data_file,
        &EventSchema::data().with_observable(columns::MG_MEASURED, None),
    )?;
    let mut hraw2d = Hist2D::new("hraw2D", "raw Mg vs pT", mg.clone(), det_pt.clone());
    for ev in data.records() {
        if let Some(obs) = ev.observable
            && det_pt.find_bin(ev.measured).is_some()
        {
            hraw2d.fill_weighted(obs.measured, ev.measured, ev.weight);
        }
    }
    let hraw = measured_grid.flatten(&hraw2d, "hraw")?;

    let sim = load_tree(
        &run.mc_file,
        &EventSchema::simulation()
            .with_observable(columns::MG_MEASURED, Some(columns::MG_TRUE.to_string())),
    )?;
    let axes = FlatAxes::new(measured_grid.clone(), truth_grid.clone());
    let outlier = config.outlier_cut();
    let set = ResponseBuilder::new(&axes, config.closure_fraction)?
        .with_seed(config.seed)
        .with_outlier(outlier.as_ref().map(|o| o as &dyn OutlierPredicate))
        .build(&sim)?;

    let inputs = ScanInputs {
        response: &set.response,
        measured: &hraw,
        closure_response: &set.response_closure,
        closure_measured: &set.hsmeared_closure,
        closure_truth: &set.htrue_full_closure,
        normalization: None,
    };
    let strengths = RegularizationScan::strengths_for(measured_grid.n_bins(), config.max_regularization);
    let mut outcome =
        RegularizationScan::new(engine, strengths).with_threads(config.threads).run(&inputs)?;
    for r in &mut outcome.results {
        let k = r.strength;
        let unfolded = truth_grid.unflatten(&r.unfolded, &format!("unfolded2DReg{k}"), "Mg vs pT")?;
        let closure = truth_grid.unflatten(
            &r.closure_unfolded,
            &format!("unfoldedClosure2DReg{k}"),
            "Mg vs pT (closure)",
        )?;
        r.extras.push(unfolded.into());
        r.extras.push(closure.into());
    }

    let raw_level: Vec<StoredObject> = vec![hraw2d.into(), hraw.into()];
    let mut detector_response = set.histograms();
    detector_response.push(truth_grid.unflatten(&set.htrue_full, "htrueFull2D", "true Mg vs pT")?.into());
    detector_response.push(
        measured_grid.unflatten(&set.hsmeared, "hsmeared2D", "det Mg vs pT")?.into(),
    );
    detector_response.push(set.response.purity("purity")?.into());
    detector_response.push(set.response.stability("stability")?.into());

    let completed: Vec<StrengthSummary> = outcome.results.iter().map(|r| r.summary()).collect();
    let package = ResultPackage { raw_level, detector_response, regularizations: outcome.results };
    let stem = run.data_file.file_stem().and_then(|s| s.to_str()).unwrap_or("data");
    let output = run.output_dir.join(format!("unfoldedMg_{stem}.json"));
    package.save(&output)?;

    Ok(MgSummary {
        output,
        trigger,
        seed: set.seed,
        split: set.stats,
        completed,
        failed: outcome.failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_binning() {
        let ej1 = detector_pt_edges("EJ1").unwrap();
        assert_eq!(ej1.len(), 12);
        assert_eq!(&ej1[4..6], &[120.0, 140.0]);
        assert_eq!(ej1.last(), Some(&260.0));
        Binning::new(ej1).unwrap();
        assert_eq!(detector_pt_edges("INT7").unwrap()[0], 20.0);
        assert!(detector_pt_edges("EG1").is_err());
    }

    #[test]
    fn test_trigger_from_file_name() {
        let p = Path::new("/data/JetSubstructureTree_FullJets_R02_EJ2_pt20.json");
        assert_eq!(trigger_from_file_name(p).unwrap(), "EJ2");
        assert!(trigger_from_file_name(Path::new("/data/tree.json")).is_err());
    }
}
