//! Detector response from simulation, with an independent closure-test split.
//!
//! One pass over the simulated jets fills the production and the closure
//! response models. Each jet is assigned once, by a uniform draw, to either
//! the closure bucket (its detector level becomes the closure test spectrum)
//! or the response bucket (it enters the closure response matrix), so the
//! closure response never sees the jets it is tested on.

use ju_core::{
    Binning, DivideMode, Error, EventRecord, EventSource, Hist1D, Hist2D, OutlierPredicate, Result,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Measured-axis acceptance `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TruncationWindow {
    /// Inclusive lower limit.
    pub min: f64,
    /// Exclusive upper limit.
    pub max: f64,
}

impl TruncationWindow {
    /// Window `[min, max)`.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !(min < max) {
            return Err(Error::MalformedBinning(format!(
                "empty truncation window [{min}, {max})"
            )));
        }
        Ok(Self { min, max })
    }

    /// Window spanning `binning`.
    pub fn of(binning: &Binning) -> Self {
        Self { min: binning.low(), max: binning.high() }
    }

    /// `min <= x < max`.
    pub fn contains(&self, x: f64) -> bool {
        x >= self.min && x < self.max
    }
}

/// Maps a simulated jet onto the measured and true axes of a response.
pub trait ResponseAxes: Sync {
    /// Measured-axis binning.
    fn measured_binning(&self) -> &Binning;

    /// True-axis binning.
    fn truth_binning(&self) -> &Binning;

    /// Measured-axis coordinate, `None` outside the truncation window.
    fn measured(&self, event: &EventRecord) -> Option<f64>;

    /// True-axis coordinate, `None` if the jet cannot be placed on the axis.
    fn truth(&self, event: &EventRecord) -> Option<f64>;
}

/// Jet pT on both axes, truncated on the measured one.
#[derive(Debug, Clone)]
pub struct PtAxes {
    measured: Binning,
    truth: Binning,
    window: TruncationWindow,
}

impl PtAxes {
    /// Axes truncated to the measured binning.
    pub fn new(measured: Binning, truth: Binning) -> Self {
        let window = TruncationWindow::of(&measured);
        Self { measured, truth, window }
    }

    /// Override the truncation window.
    pub fn with_window(mut self, window: TruncationWindow) -> Self {
        self.window = window;
        self
    }
}

impl ResponseAxes for PtAxes {
    fn measured_binning(&self) -> &Binning {
        &self.measured
    }

    fn truth_binning(&self) -> &Binning {
        &self.truth
    }

    fn measured(&self, event: &EventRecord) -> Option<f64> {
        self.window.contains(event.measured).then_some(event.measured)
    }

    fn truth(&self, event: &EventRecord) -> Option<f64> {
        Some(event.truth)
    }
}

/// A response matrix (measured × true) with the true spectrum it was
/// normalized against (including jets lost by the truncation).
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseModel {
    matrix: Hist2D,
    prior: Hist1D,
}

impl ResponseModel {
    /// Pair a matrix with its prior; the prior must share the true axis.
    pub fn new(matrix: Hist2D, prior: Hist1D) -> Result<Self> {
        matrix
            .y_binning()
            .ensure_compatible(prior.binning(), &format!("response {} prior", matrix.name()))?;
        Ok(Self { matrix, prior })
    }

    /// Response matrix (x = measured, y = true).
    pub fn matrix(&self) -> &Hist2D {
        &self.matrix
    }

    /// Full true spectrum.
    pub fn prior(&self) -> &Hist1D {
        &self.prior
    }

    /// Measured-axis binning.
    pub fn measured_binning(&self) -> &Binning {
        self.matrix.x_binning()
    }

    /// True-axis binning.
    pub fn truth_binning(&self) -> &Binning {
        self.matrix.y_binning()
    }

    /// Probability that a jet in true bin `j` is measured in bin `i`
    /// (0 for an empty prior bin).
    pub fn probability(&self, i: usize, j: usize) -> f64 {
        let p = self.prior.content(j);
        if p > 0.0 { self.matrix.content(i, j) / p } else { 0.0 }
    }

    /// Fold a true spectrum through the response, diagonal variances.
    pub fn fold(&self, truth: &Hist1D, name: &str) -> Result<Hist1D> {
        self.truth_binning()
            .ensure_compatible(truth.binning(), &format!("fold {}", truth.name()))?;
        let (nm, nt) = (self.matrix.nx(), self.matrix.ny());
        let mut contents = vec![0.0; nm];
        let mut variances = vec![0.0; nm];
        for j in 0..nt {
            let (x, vx) = (truth.content(j), truth.variance(j));
            for i in 0..nm {
                let r = self.probability(i, j);
                if r == 0.0 {
                    continue;
                }
                contents[i] += r * x;
                variances[i] += r * r * vx;
            }
        }
        let binning = self.measured_binning().clone();
        Hist1D::from_parts(name, "folded", binning, contents, variances)
    }

    /// Per measured bin: fraction of its jets whose true value lies in the
    /// true bin containing the measured bin centre.
    pub fn purity(&self, name: &str) -> Result<Hist1D> {
        let (nm, nt) = (self.matrix.nx(), self.matrix.ny());
        let mut h = Hist1D::new(name, "purity", self.measured_binning().clone());
        for i in 0..nm {
            let row: f64 = (0..nt).map(|j| self.matrix.content(i, j)).sum();
            let diag = self
                .truth_binning()
                .find_bin(self.measured_binning().center(i))
                .map_or(0.0, |j| self.matrix.content(i, j));
            let (c, v) = binomial_fraction(diag, row);
            h.set_bin(i, c, v);
        }
        Ok(h)
    }

    /// Per true bin: fraction of its in-window jets measured in the measured
    /// bin containing the true bin centre.
    pub fn stability(&self, name: &str) -> Result<Hist1D> {
        let (nm, nt) = (self.matrix.nx(), self.matrix.ny());
        let mut h = Hist1D::new(name, "stability", self.truth_binning().clone());
        for j in 0..nt {
            let col: f64 = (0..nm).map(|i| self.matrix.content(i, j)).sum();
            let diag = self
                .measured_binning()
                .find_bin(self.truth_binning().center(j))
                .map_or(0.0, |i| self.matrix.content(i, j));
            let (c, v) = binomial_fraction(diag, col);
            h.set_bin(j, c, v);
        }
        Ok(h)
    }
}

fn binomial_fraction(k: f64, n: f64) -> (f64, f64) {
    if n > 0.0 {
        let p = k / n;
        (p, (p * (1.0 - p) / n).max(0.0))
    } else {
        (f64::NAN, f64::NAN)
    }
}

/// Weighted bookkeeping of the closure split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SplitStats {
    /// Jets read.
    pub n_events: usize,
    /// Jets rejected as outliers.
    pub n_outliers: usize,
    /// Kept jets in the closure bucket.
    pub n_closure: usize,
    /// Kept jets in the response bucket.
    pub n_response: usize,
    /// Kept jets inside the truncation window.
    pub n_in_window: usize,
    /// Weight of all kept jets.
    pub weight_full: f64,
    /// Weight of kept jets in the closure bucket.
    pub weight_closure: f64,
    /// Weight of kept jets inside the window.
    pub weight_window: f64,
    /// Weight of in-window jets in the closure bucket.
    pub weight_window_closure: f64,
}

/// Everything the response pass produces.
#[derive(Debug, Clone)]
pub struct ResponseSet {
    /// Non-truncated true spectrum (`htrueFull`).
    pub htrue_full: Hist1D,
    /// Non-truncated true spectrum of the closure bucket (`htrueFullClosure`).
    pub htrue_full_closure: Hist1D,
    /// Non-truncated true spectrum of the response bucket (`hpriorsClosure`).
    pub hpriors_closure: Hist1D,
    /// Truncated true spectrum (`htrue`).
    pub htrue: Hist1D,
    /// Truncated true spectrum of the closure bucket (`htrueClosure`).
    pub htrue_closure: Hist1D,
    /// Truncated detector-level spectrum (`hsmeared`).
    pub hsmeared: Hist1D,
    /// Closure test spectrum (`hsmearedClosure`).
    pub hsmeared_closure: Hist1D,
    /// Production response (`responseMatrix` with prior `htrueFull`).
    pub response: ResponseModel,
    /// Closure response (`responseMatrixClosure` with prior `hpriorsClosure`).
    pub response_closure: ResponseModel,
    /// `htrue / htrueFull`, binomial.
    pub eff_kine: Hist1D,
    /// `htrueClosure / htrueFullClosure`, binomial.
    pub eff_kine_closure: Hist1D,
    /// Split bookkeeping.
    pub stats: SplitStats,
    /// Seed of the split.
    pub seed: u64,
}

impl ResponseSet {
    /// Histograms of the detector-response group, in output order.
    pub fn histograms(&self) -> Vec<ju_store::StoredObject> {
        vec![
            self.htrue_full.clone().into(),
            self.htrue_full_closure.clone().into(),
            self.htrue.clone().into(),
            self.htrue_closure.clone().into(),
            self.hpriors_closure.clone().into(),
            self.hsmeared.clone().into(),
            self.hsmeared_closure.clone().into(),
            self.response.matrix().clone().into(),
            self.response_closure.matrix().clone().into(),
            self.eff_kine.clone().into(),
            self.eff_kine_closure.clone().into(),
        ]
    }

    /// Largest relative violation of the two partition identities:
    /// `w(responseMatrixClosure) + w(hsmearedClosure) = w(window)` and
    /// `w(hpriorsClosure) + w(htrueFullClosure) = w(htrueFull)`.
    pub fn partition_residual(&self) -> f64 {
        let rel = |a: f64, b: f64| if b != 0.0 { ((a - b) / b).abs() } else { a.abs() };
        let window = rel(
            self.response_closure.matrix().integral() + self.hsmeared_closure.integral(),
            self.response.matrix().integral(),
        );
        let full = rel(
            self.hpriors_closure.integral() + self.htrue_full_closure.integral(),
            self.htrue_full.integral(),
        );
        window.max(full)
    }
}

/// Builds [`ResponseSet`]s from simulated jets.
pub struct ResponseBuilder<'a> {
    axes: &'a dyn ResponseAxes,
    closure_fraction: f64,
    seed: Option<u64>,
    outlier: Option<&'a dyn OutlierPredicate>,
}

impl<'a> ResponseBuilder<'a> {
    /// Builder over `axes` with the given closure fraction.
    pub fn new(axes: &'a dyn ResponseAxes, closure_fraction: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&closure_fraction) {
            return Err(Error::Validation(format!(
                "closure fraction {closure_fraction} outside [0, 1]"
            )));
        }
        Ok(Self { axes, closure_fraction, seed: None, outlier: None })
    }

    /// Fix the split seed (entropy-seeded otherwise).
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Reject simulated outliers.
    pub fn with_outlier(mut self, outlier: Option<&'a dyn OutlierPredicate>) -> Self {
        self.outlier = outlier;
        self
    }

    /// Single pass over `source`.
    pub fn build(&self, source: &dyn EventSource) -> Result<ResponseSet> {
        let seed = match self.seed {
            Some(s) => s,
            None => {
                let s: u64 = rand::random();
                tracing::info!(seed = s, "closure split seeded from entropy");
                s
            }
        };
        let mut rng = StdRng::seed_from_u64(seed);

        let mb = self.axes.measured_binning();
        let tb = self.axes.truth_binning();
        let t1 = |name: &str, title: &str| Hist1D::new(name, title, tb.clone());
        let m1 = |name: &str, title: &str| Hist1D::new(name, title, mb.clone());
        let mut htrue_full = t1("htrueFull", "non-truncated true spectrum");
        let mut htrue_full_closure =
            t1("htrueFullClosure", "non-truncated true spectrum (for closure test)");
        let mut hpriors_closure = t1(
            "hpriorsClosure",
            "non-truncated true spectrum (for closure test, same jets as response matrix)",
        );
        let mut htrue = t1("htrue", "true spectrum");
        let mut htrue_closure = t1("htrueClosure", "true spectrum (for closure test)");
        let mut hsmeared = m1("hsmeared", "det mc");
        let mut hsmeared_closure = m1("hsmearedClosure", "det mc (for closure test)");
        let mut matrix = Hist2D::new("responseMatrix", "response matrix", mb.clone(), tb.clone());
        let mut matrix_closure = Hist2D::new(
            "responseMatrixClosure",
            "response matrix (for closure test)",
            mb.clone(),
            tb.clone(),
        );

        let mut stats = SplitStats::default();
        for ev in source.events() {
            stats.n_events += 1;
            if let Some(pred) = self.outlier
                && pred.is_outlier(ev.truth, ev.pt_hard_bin)
            {
                stats.n_outliers += 1;
                continue;
            }
            let w = ev.weight;
            let closure = rng.random::<f64>() < self.closure_fraction;
            let truth = self.axes.truth(&ev);

            stats.weight_full += w;
            if closure {
                stats.n_closure += 1;
                stats.weight_closure += w;
            } else {
                stats.n_response += 1;
            }
            if let Some(t) = truth {
                htrue_full.fill_weighted(t, w);
                if closure {
                    htrue_full_closure.fill_weighted(t, w);
                } else {
                    hpriors_closure.fill_weighted(t, w);
                }
            }

            let Some(m) = self.axes.measured(&ev) else {
                continue;
            };
            stats.n_in_window += 1;
            stats.weight_window += w;
            hsmeared.fill_weighted(m, w);
            if closure {
                stats.weight_window_closure += w;
                hsmeared_closure.fill_weighted(m, w);
            }
            if let Some(t) = truth {
                htrue.fill_weighted(t, w);
                matrix.fill_weighted(m, t, w);
                if closure {
                    htrue_closure.fill_weighted(t, w);
                } else {
                    matrix_closure.fill_weighted(m, t, w);
                }
            }
        }
        tracing::info!(
            source = source.label(),
            events = stats.n_events,
            outliers = stats.n_outliers,
            closure = stats.n_closure,
            in_window = stats.n_in_window,
            "response pass done"
        );

        let eff_kine = Hist1D::ratio(
            &htrue,
            &htrue_full,
            DivideMode::Binomial,
            "effKine",
            "kinematic efficiency",
        )?;
        let eff_kine_closure = Hist1D::ratio(
            &htrue_closure,
            &htrue_full_closure,
            DivideMode::Binomial,
            "effKineClosure",
            "kinematic efficiency (for closure test)",
        )?;
        let response = ResponseModel::new(matrix, htrue_full.clone())?;
        let response_closure = ResponseModel::new(matrix_closure, hpriors_closure.clone())?;

        Ok(ResponseSet {
            htrue_full,
            htrue_full_closure,
            hpriors_closure,
            htrue,
            htrue_closure,
            hsmeared,
            hsmeared_closure,
            response,
            response_closure,
            eff_kine,
            eff_kine_closure,
            stats,
            seed,
        })
    }
}
