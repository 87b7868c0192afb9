//! End-to-end runs of the 1D correction chain on a synthetic input tree.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use approx::assert_relative_eq;
use ju_core::{Binning, Error, Hist1D};
use ju_store::{EventTable, Store, columns};
use ju_unfold::{
    ChainConfig, ChainRun, CorrectionMethod, SvdUnfolding, correction_chain_1d, regularization_key,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Normal};

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("jetunfold_chain_{}_{}_{}", std::process::id(), nanos, name));
    p
}

fn save_table(path: &Path, table: EventTable) {
    let mut store = Store::create(path);
    store.root_mut().write(table).unwrap();
    store.save().unwrap();
}

/// How the CENTNOTRD information is provided.
#[derive(Clone, Copy, PartialEq)]
enum ClusterInfo {
    Counter,
    TreeOnly,
    Missing,
}

/// Writes `data/` and `mc/` for R = 0.2, pT cut 20.
fn write_inputs(base: &Path, cluster: ClusterInfo) {
    write_inputs_with(base, cluster, true);
}

fn write_inputs_with(base: &Path, cluster: ClusterInfo, ej1_counter: bool) {
    let mut rng = StdRng::seed_from_u64(2024);

    // luminosity monitor and cluster counter
    let mut lumi = Store::create(base.join("data/merged_17/AnalysisResults_split.json"));
    {
        let mut root = lumi.root_mut();
        let mut monitor =
            Hist1D::new("hLumiMonitor", "", Binning::uniform(2, 0.0, 2.0).unwrap())
                .with_labels(vec!["INT7".into(), "CENT".into()])
                .unwrap();
        monitor.set_bin(1, 100.0, 0.0);
        root.mkdir("JetSubstructure_FullJets_R02_INT7_pt20").unwrap().write(monitor).unwrap();
        if cluster != ClusterInfo::Missing {
            let mut g = root.mkdir("JetSubstructure_FullJets_R02_EJ1_pt20").unwrap();
            if cluster == ClusterInfo::Counter {
                let mut counter = Hist1D::new(
                    "hTriggerClusterCounter",
                    "",
                    Binning::uniform(3, -0.5, 2.5).unwrap(),
                );
                counter.set_bin(0, 1000.0, 1000.0);
                counter.set_bin(2, 200.0, 200.0);
                g.write(counter).unwrap();
            }
        }
    }
    lumi.save().unwrap();

    let mut counts = Store::create(base.join("data/merged_1617/AnalysisResults_split.json"));
    {
        let counter = |n: f64| {
            let mut h = Hist1D::new("hEventCounter", "", Binning::uniform(1, 0.5, 1.5).unwrap());
            h.set_bin(0, n, n);
            h
        };
        let mut root = counts.root_mut();
        root.mkdir("JetSubstructure_FullJets_R02_INT7_pt20").unwrap().write(counter(5.0e4)).unwrap();
        if ej1_counter {
            root.mkdir("JetSubstructure_FullJets_R02_EJ1_pt20").unwrap().write(counter(8.0e3)).unwrap();
        }
    }
    counts.save().unwrap();

    // data: minimum bias falls steeply, EJ1 starts at the trigger threshold
    let mb_shape = Exp::new(1.0 / 30.0).unwrap();
    let ej_shape = Exp::new(1.0 / 40.0).unwrap();
    let mb: Vec<f64> = (0..4000).map(|_| 20.0 + mb_shape.sample(&mut rng)).collect();
    let ej: Vec<f64> = (0..4000).map(|_| 60.0 + ej_shape.sample(&mut rng)).collect();
    let clusters: Vec<i32> = (0..ej.len()).map(|i| if i % 6 == 0 { 2 } else { 0 }).collect();
    save_table(
        &base.join("data/merged_1617/JetSubstructureTree_FullJets_R02_INT7_pt20.json"),
        EventTable::new("JetSubstructureTree_FullJets_R02_INT7").with_f64(columns::PT_REC, mb),
    );
    save_table(
        &base.join("data/merged_17/JetSubstructureTree_FullJets_R02_EJ1_pt20.json"),
        EventTable::new("JetSubstructureTree_FullJets_R02_EJ1")
            .with_f64(columns::PT_REC, ej)
            .with_i32(columns::TRIGGER_CLUSTER_INDEX, clusters),
    );

    // simulation: EJ1 keeps 90% of the jets above 60 GeV/c
    let smear = Normal::new(0.0, 5.0).unwrap();
    let (mut rec, mut sim, mut weight, mut hard) = (vec![], vec![], vec![], Vec::<i32>::new());
    let mut ej1 = (vec![], vec![], vec![], Vec::<i32>::new());
    for _ in 0..20_000 {
        let t = rng.random_range(15.0..220.0);
        let m = 0.9 * t + smear.sample(&mut rng);
        let w = (-t / 50.0_f64).exp();
        rec.push(m);
        sim.push(t);
        weight.push(w);
        hard.push(5);
        if m > 60.0 && rng.random::<f64>() < 0.9 {
            ej1.0.push(m);
            ej1.1.push(t);
            ej1.2.push(w);
            ej1.3.push(5);
        }
    }
    let mc_table = |name: &str, rec: Vec<f64>, sim: Vec<f64>, weight: Vec<f64>, hard: Vec<i32>| {
        EventTable::new(name)
            .with_f64(columns::PT_REC, rec)
            .with_f64(columns::PT_SIM, sim)
            .with_f64(columns::PYTHIA_WEIGHT, weight)
            .with_i32(columns::PT_HARD_BIN, hard)
    };
    save_table(
        &base.join("mc/merged_calo/JetSubstructureTree_FullJets_R02_INT7_pt20_merged.json"),
        mc_table("JetSubstructureTree_FullJets_R02_INT7", rec, sim, weight, hard),
    );
    save_table(
        &base.join("mc/merged_calo/JetSubstructureTree_FullJets_R02_EJ1_pt20_merged.json"),
        mc_table("JetSubstructureTree_FullJets_R02_EJ1", ej1.0, ej1.1, ej1.2, ej1.3),
    );
}

fn config() -> ChainConfig {
    ChainConfig {
        detector_binning: (0..=18).map(|i| 20.0 + 10.0 * i as f64).collect(),
        true_binning: (0..=12).map(|i| 20.0 * i as f64).collect(),
        seed: Some(7),
        outlier_factor: None,
        max_regularization: Some(8),
        threads: 2,
        ..ChainConfig::default()
    }
}

fn run(base: &Path) -> ChainRun {
    ChainRun { radius: 0.2, pt_cut: 20, data_dir: base.to_path_buf(), output_dir: base.join("out") }
}

#[test]
fn chain_writes_complete_namespace() {
    let base = tmp_dir("counter");
    write_inputs(&base, ClusterInfo::Counter);
    let summary = correction_chain_1d(&run(&base), &config(), &SvdUnfolding::new()).unwrap();

    assert_eq!(summary.output, base.join("out/corrected1DSVD_R02_pt20.json"));
    assert_eq!(summary.centnotrd_method, Some(CorrectionMethod::ClusterCounter));
    let lumis = summary.luminosities.unwrap();
    assert_eq!(lumis.trigger_weight, 5.0e4);
    assert_relative_eq!(lumis.lumi_centnotrd, 120.0, max_relative = 1e-12);
    assert_eq!(summary.seed, 7);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.completed.len(), 8);

    let store = Store::open(&summary.output).unwrap();
    let root = store.root();
    let raw = root.cd("rawlevel").unwrap();
    let hraw = raw.hist1d("hraw").unwrap();
    assert_eq!(hraw.n_bins(), 18);
    let lumi_hist = raw.hist1d("luminosities").unwrap();
    assert_eq!(lumi_hist.n_bins(), 3);
    assert_eq!(lumi_hist.contents(), &[5.0e4, 100.0, lumi_hist.content(2)]);
    assert_relative_eq!(lumi_hist.content(2), 120.0, max_relative = 1e-12);
    for name in ["Efficiency_R02_EJ1", "EJ1overMB_R02", "dataspec_R02_EJ1", "mcspec_R02_INT7"] {
        raw.hist1d(name).unwrap();
    }
    assert_eq!(raw.hist1d("normINT7").unwrap().content(0), 5.0e4);
    assert_eq!(raw.hist1d("normEJ1").unwrap().content(0), 8.0e3);
    for s in ["dataspec_R02_INT7", "dataspec_R02_EJ1"] {
        let h = raw.hist1d(s).unwrap();
        for i in 0..h.n_bins() {
            if h.is_valid_bin(i) {
                assert!(h.content(i) >= 0.0 && h.variance(i) >= 0.0, "{s} bin {i}");
            }
        }
    }
    assert!(raw.hist1d("CENTNOTRDCorrection").is_err());

    let det = root.cd("detectorresponse").unwrap();
    for name in ["htrueFull", "htrueFullClosure", "hsmeared", "hsmearedClosure", "effKine", "purity", "stability"] {
        det.hist1d(name).unwrap();
    }
    det.hist2d("responseMatrix").unwrap();
    det.hist2d("responseMatrixClosure").unwrap();

    for r in 1..=8 {
        let g = root.cd(&regularization_key(r, 8)).unwrap();
        let normalized = g.hist1d(&format!("normalizedReg{r}")).unwrap();
        assert_eq!(normalized.n_bins(), 12);
        g.hist1d(&format!("dvectorReg{r}")).unwrap();
        g.hist1d(&format!("closureRatio_reg{r}")).unwrap();
    }
    std::fs::remove_dir_all(&base).ok();
}

#[test]
fn missing_counter_falls_back_to_spectrum_ratio() {
    let base = tmp_dir("fallback");
    write_inputs(&base, ClusterInfo::TreeOnly);
    let summary = correction_chain_1d(&run(&base), &config(), &SvdUnfolding::new()).unwrap();
    assert_eq!(summary.centnotrd_method, Some(CorrectionMethod::SpectrumRatio));
    let lumis = summary.luminosities.unwrap();
    let factor = lumis.lumi_centnotrd / lumis.lumi_cent;
    assert!(factor > 1.1 && factor < 1.3, "factor {factor}");

    let store = Store::open(&summary.output).unwrap();
    let raw = store.root().cd("rawlevel").unwrap();
    for name in ["speccentnotrd", "speccent", "CENTNOTRDCorrection"] {
        raw.hist1d(name).unwrap();
    }
    std::fs::remove_dir_all(&base).ok();
}

#[test]
fn missing_cluster_group_is_fatal() {
    let base = tmp_dir("missing");
    write_inputs(&base, ClusterInfo::Missing);
    let err = correction_chain_1d(&run(&base), &config(), &SvdUnfolding::new()).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
    assert!(!base.join("out/corrected1DSVD_R02_pt20.json").exists());
    std::fs::remove_dir_all(&base).ok();
}

#[test]
fn missing_event_counter_of_triggered_sample_is_fatal() {
    let base = tmp_dir("no_ej1_counter");
    write_inputs_with(&base, ClusterInfo::Counter, false);
    let err = correction_chain_1d(&run(&base), &config(), &SvdUnfolding::new()).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
    assert!(!base.join("out/corrected1DSVD_R02_pt20.json").exists());
    std::fs::remove_dir_all(&base).ok();
}

#[test]
fn missing_input_directory_is_not_found() {
    let base = tmp_dir("empty");
    let err = correction_chain_1d(&run(&base), &config(), &SvdUnfolding::new()).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
}
