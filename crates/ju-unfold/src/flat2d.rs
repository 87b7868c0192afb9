//! Two-dimensional spectra mapped onto one global bin axis.
//!
//! The unfolding engine works on 1D spectra; an (observable × pT) spectrum is
//! unfolded by numbering its bins `iy * nx + ix` (the [`Hist2D`] layout) and
//! filling each jet at the centre of its global bin.

use ju_core::{Binning, EventRecord, Hist1D, Hist2D, Result};

use crate::response::{ResponseAxes, TruncationWindow};

/// Global numbering of an `x × y` grid.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatBinning2D {
    x: Binning,
    y: Binning,
    index: Binning,
}

impl FlatBinning2D {
    /// Grid over `x` (fast index) and `y`.
    pub fn new(x: Binning, y: Binning) -> Result<Self> {
        let n = x.n_bins() * y.n_bins();
        let index = Binning::uniform(n, 0.0, n as f64)?;
        Ok(Self { x, y, index })
    }

    /// Fast axis.
    pub fn x(&self) -> &Binning {
        &self.x
    }

    /// Slow axis.
    pub fn y(&self) -> &Binning {
        &self.y
    }

    /// Unit-width binning of the global index, `[0, n)`.
    pub fn index_binning(&self) -> &Binning {
        &self.index
    }

    /// Number of global bins.
    pub fn n_bins(&self) -> usize {
        self.index.n_bins()
    }

    /// Global index of `(x, y)`, `None` outside the grid.
    pub fn global(&self, x: f64, y: f64) -> Option<usize> {
        let ix = self.x.find_bin(x)?;
        let iy = self.y.find_bin(y)?;
        Some(iy * self.x.n_bins() + ix)
    }

    /// Fill coordinate on the global axis (bin centre).
    pub fn coordinate(&self, x: f64, y: f64) -> Option<f64> {
        self.global(x, y).map(|g| g as f64 + 0.5)
    }

    /// 2D histogram → global-index 1D histogram.
    pub fn flatten(&self, h: &Hist2D, name: &str) -> Result<Hist1D> {
        self.ensure_grid(h)?;
        Hist1D::from_parts(
            name,
            h.title(),
            self.index.clone(),
            h.contents().to_vec(),
            h.variances().to_vec(),
        )
    }

    /// Global-index 1D histogram → 2D histogram on this grid.
    pub fn unflatten(&self, h: &Hist1D, name: &str, title: &str) -> Result<Hist2D> {
        self.index.ensure_compatible(h.binning(), &format!("unflatten {}", h.name()))?;
        Hist2D::from_parts(
            name,
            title,
            self.x.clone(),
            self.y.clone(),
            h.contents().to_vec(),
            h.variances().to_vec(),
        )
    }

    fn ensure_grid(&self, h: &Hist2D) -> Result<()> {
        let ctx = format!("flatten {}", h.name());
        self.x.ensure_compatible(h.x_binning(), &ctx)?;
        self.y.ensure_compatible(h.y_binning(), &ctx)
    }
}

/// Response axes of an observable-vs-pT unfolding: the detector-level grid is
/// truncated in jet pT.
#[derive(Debug, Clone)]
pub struct FlatAxes {
    measured: FlatBinning2D,
    truth: FlatBinning2D,
    window: TruncationWindow,
}

impl FlatAxes {
    /// Observable on x, jet pT on y of both grids; pT window = measured pT range.
    pub fn new(measured: FlatBinning2D, truth: FlatBinning2D) -> Self {
        let window = TruncationWindow::of(measured.y());
        Self { measured, truth, window }
    }

    /// Detector-level grid.
    pub fn measured_grid(&self) -> &FlatBinning2D {
        &self.measured
    }

    /// Particle-level grid.
    pub fn truth_grid(&self) -> &FlatBinning2D {
        &self.truth
    }

    /// pT window.
    pub fn window(&self) -> TruncationWindow {
        self.window
    }
}

impl ResponseAxes for FlatAxes {
    fn measured_binning(&self) -> &Binning {
        self.measured.index_binning()
    }

    fn truth_binning(&self) -> &Binning {
        self.truth.index_binning()
    }

    fn measured(&self, event: &EventRecord) -> Option<f64> {
        let obs = event.observable?;
        if !self.window.contains(event.measured) {
            return None;
        }
        self.measured.coordinate(obs.measured, event.measured)
    }

    fn truth(&self, event: &EventRecord) -> Option<f64> {
        let obs = event.observable?;
        self.truth.coordinate(obs.truth, event.truth)
    }
}
