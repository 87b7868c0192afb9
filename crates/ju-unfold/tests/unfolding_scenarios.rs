//! Unfolding scenarios on synthetic responses.
//!
//! - flat truth smeared by a Gaussian kernel, recovered at strength 3
//! - analytic Gaussian response: back-folding reproduces the measured spectrum
//! - scans with failing strengths and the persisted group layout

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use approx::assert_relative_eq;
use ju_core::{Binning, Error, EventRecord, Hist1D, Hist2D, Result};
use ju_store::Store;
use ju_unfold::{
    PtAxes, RegularizationScan, ResponseBuilder, ResponseModel, ResultPackage, ScanInputs,
    SpectrumNormalization, SvdUnfolding, Unfolded, UnfoldingEngine, backfold,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use statrs::distribution::{ContinuousCDF, Normal as GaussCdf};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn tmp_path(filename: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("jetunfold_scan_{}_{}_{}", std::process::id(), nanos, filename));
    p
}

/// 500 jets per 10 GeV bin over [0, 200), smeared by N(0, 8).
fn flat_events(seed: u64) -> Vec<EventRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let smear = Normal::new(0.0, 8.0).unwrap();
    let mut events = Vec::with_capacity(10_000);
    for j in 0..20 {
        for k in 0..500 {
            let truth = 10.0 * j as f64 + 10.0 * (k as f64 + 0.5) / 500.0;
            events.push(EventRecord::simulated(truth + smear.sample(&mut rng), truth, 1.0, 5));
        }
    }
    events
}

/// Response with `P(i | j)` from a Gaussian of width `sigma` around the true
/// bin centre, and a flat prior of `prior` jets per bin.
fn gaussian_response(b: &Binning, sigma: f64, prior: f64) -> ResponseModel {
    let g = GaussCdf::new(0.0, sigma).unwrap();
    let n = b.n_bins();
    let mut m = Hist2D::new("responseMatrix", "", b.clone(), b.clone());
    for j in 0..n {
        let c = b.center(j);
        for i in 0..n {
            let p = g.cdf(b.bin_high(i) - c) - g.cdf(b.bin_low(i) - c);
            m.set_bin(i, j, p * prior, p * prior);
        }
    }
    let p = Hist1D::from_parts("htrueFull", "", b.clone(), vec![prior; n], vec![prior; n]).unwrap();
    ResponseModel::new(m, p).unwrap()
}

/// Returns the prior, failing on chosen strengths.
struct ScriptedEngine {
    fail_at: Vec<usize>,
}

impl UnfoldingEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn unfold(&self, response: &ResponseModel, _: &Hist1D, strength: usize) -> Result<Unfolded> {
        if self.fail_at.contains(&strength) {
            return Err(Error::EngineFailure(format!("no convergence at {strength}")));
        }
        Ok(Unfolded { spectrum: response.prior().clone(), discrepancy: None })
    }
}

fn diagonal(n: usize) -> (ResponseModel, Hist1D) {
    let b = Binning::uniform(n, 0.0, 10.0 * n as f64).unwrap();
    let mut m = Hist2D::new("responseMatrix", "", b.clone(), b.clone());
    for i in 0..n {
        m.set_bin(i, i, 40.0, 40.0);
    }
    let prior = Hist1D::from_parts("htrueFull", "", b.clone(), vec![50.0; n], vec![50.0; n]).unwrap();
    let measured = Hist1D::from_parts("hraw", "", b, vec![40.0; n], vec![40.0; n]).unwrap();
    (ResponseModel::new(m, prior).unwrap(), measured)
}

fn scan_and_save(engine: &dyn UnfoldingEngine, strengths: Vec<usize>, file: &str) -> PathBuf {
    let (r, measured) = diagonal(14);
    let inputs = ScanInputs {
        response: &r,
        measured: &measured,
        closure_response: &r,
        closure_measured: &measured,
        closure_truth: r.prior(),
        normalization: Some(SpectrumNormalization::new(1.0).unwrap()),
    };
    let outcome = RegularizationScan::new(engine, strengths).with_threads(2).run(&inputs).unwrap();
    let package = ResultPackage {
        raw_level: vec![measured.clone().into()],
        detector_response: vec![r.matrix().clone().into()],
        regularizations: outcome.results,
    };
    let path = tmp_path(file);
    package.save(&path).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn flat_truth_is_recovered_at_strength_three() {
    let b = Binning::uniform(20, 0.0, 200.0).unwrap();
    let events = flat_events(17);
    let axes = PtAxes::new(b.clone(), b.clone());
    let set = ResponseBuilder::new(&axes, 0.0).unwrap().with_seed(Some(1)).build(&events).unwrap();
    assert_eq!(set.stats.n_events, 10_000);

    let out = SvdUnfolding::new().unfold(&set.response, &set.hsmeared, 3).unwrap();
    for j in 0..20 {
        let x = out.spectrum.content(j);
        assert!((x - 500.0).abs() < 0.05 * 500.0, "bin {j}: {x}");
        assert!(out.spectrum.variance(j) >= 0.0);
    }

    let norm = SpectrumNormalization::new(3.0).unwrap().apply(&out.spectrum, "normalizedReg3");
    for j in 0..20 {
        assert!(norm.content(j) >= 0.0);
        assert!(norm.variance(j) >= 0.0);
        assert_relative_eq!(norm.content(j), out.spectrum.content(j) * 0.3, max_relative = 1e-12);
    }
}

#[test]
fn gaussian_response_backfolds_onto_measured() {
    let b = Binning::uniform(30, 0.0, 300.0).unwrap();
    let r = gaussian_response(&b, 10.0, 1000.0);
    let truth_vals: Vec<f64> = (0..30).map(|j| 1.0e4 * (-b.center(j) / 100.0).exp()).collect();
    let truth = Hist1D::from_parts("truth", "", b.clone(), truth_vals.clone(), truth_vals).unwrap();
    let mut measured = r.fold(&truth, "hraw").unwrap();
    for i in 0..measured.n_bins() {
        let c = measured.content(i);
        measured.set_bin(i, c, c);
    }

    let out = SvdUnfolding::new().unfold(&r, &measured, 29).unwrap();
    let check = backfold(&r, &out.spectrum, &measured, "backfolded_reg29", "ratio").unwrap();
    for i in 0..30 {
        assert_relative_eq!(check.ratio.content(i), 1.0, max_relative = 0.02);
    }
    assert_eq!(check.ndf, 30);
    assert!(check.p_value.is_finite());
}

#[test]
fn closure_split_is_a_partition() {
    let b = Binning::uniform(20, 0.0, 200.0).unwrap();
    let window = Binning::uniform(10, 50.0, 150.0).unwrap();
    let events = flat_events(3);
    let axes = PtAxes::new(window, b);
    let builder = ResponseBuilder::new(&axes, 0.2).unwrap().with_seed(Some(42));
    let set = builder.build(&events).unwrap();
    let s = set.stats;
    assert_eq!(s.n_closure + s.n_response, s.n_events - s.n_outliers);
    assert!(set.partition_residual() < 1e-12);
    let frac = s.n_closure as f64 / s.n_events as f64;
    assert!((frac - 0.2).abs() < 0.02, "closure fraction {frac}");

    let again = builder.build(&events).unwrap();
    assert_eq!(again.hsmeared_closure, set.hsmeared_closure);
    assert_eq!(again.response_closure.matrix(), set.response_closure.matrix());
}

#[test]
fn failing_strength_leaves_four_complete_groups() {
    let engine = ScriptedEngine { fail_at: vec![3] };
    let path = scan_and_save(&engine, vec![1, 2, 3, 4, 5], "fail3.json");
    let store = Store::open(&path).unwrap();
    let root = store.root();
    let regs: Vec<&str> =
        root.group_names().into_iter().filter(|g| g.starts_with("regularization")).collect();
    assert_eq!(regs, vec!["regularization01", "regularization02", "regularization04", "regularization05"]);
    for (key, r) in regs.iter().zip([1, 2, 4, 5]) {
        let g = root.cd(key).unwrap();
        for name in [
            format!("unfoldedReg{r}"),
            format!("normalizedReg{r}"),
            format!("backfolded_reg{r}"),
            format!("unfoldedClosureReg{r}"),
            format!("backfoldedClosure_reg{r}"),
        ] {
            g.hist1d(&name).unwrap();
        }
    }
    assert!(root.cd("rawlevel").unwrap().hist1d("hraw").is_ok());
    assert!(root.cd("detectorresponse").unwrap().hist2d("responseMatrix").is_ok());
    std::fs::remove_file(&path).ok();
}

#[test]
fn regularization_groups_list_in_numeric_order() {
    let engine = ScriptedEngine { fail_at: vec![] };
    let path = scan_and_save(&engine, (1..=12).collect(), "order.json");
    let store = Store::open(&path).unwrap();
    let regs: Vec<String> = store
        .root()
        .group_names()
        .into_iter()
        .filter(|g| g.starts_with("regularization"))
        .map(str::to_string)
        .collect();
    assert_eq!(regs.len(), 12);
    let pos = |k: &str| regs.iter().position(|g| g == k).unwrap();
    assert!(pos("regularization02") < pos("regularization10"));
    for (i, g) in regs.iter().enumerate() {
        let r: usize = g.trim_start_matches("regularization").parse().unwrap();
        assert_eq!(r, i + 1);
    }
    std::fs::remove_file(&path).ok();
}
