//! Two-dimensional histograms (response matrices, observable-vs-pT spectra).

use serde::{Deserialize, Serialize};

use crate::binning::Binning;
use crate::histogram::Hist1D;
use crate::{Error, Result};

/// A 2D histogram stored row-major in y: index = `iy * nx + ix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Hist2DRepr")]
pub struct Hist2D {
    name: String,
    #[serde(default)]
    title: String,
    x: Binning,
    y: Binning,
    #[serde(with = "crate::serde_nan")]
    contents: Vec<f64>,
    #[serde(with = "crate::serde_nan")]
    variances: Vec<f64>,
    #[serde(default)]
    entries: f64,
}

#[derive(Deserialize)]
struct Hist2DRepr {
    name: String,
    #[serde(default)]
    title: String,
    x: Binning,
    y: Binning,
    #[serde(with = "crate::serde_nan")]
    contents: Vec<f64>,
    #[serde(with = "crate::serde_nan")]
    variances: Vec<f64>,
    #[serde(default)]
    entries: f64,
}

impl TryFrom<Hist2DRepr> for Hist2D {
    type Error = Error;

    fn try_from(r: Hist2DRepr) -> Result<Self> {
        let mut h = Hist2D::from_parts(r.name, r.title, r.x, r.y, r.contents, r.variances)?;
        h.entries = r.entries;
        Ok(h)
    }
}

impl Hist2D {
    /// Empty histogram over `x × y`.
    pub fn new(name: impl Into<String>, title: impl Into<String>, x: Binning, y: Binning) -> Self {
        let n = x.n_bins() * y.n_bins();
        Self {
            name: name.into(),
            title: title.into(),
            x,
            y,
            contents: vec![0.0; n],
            variances: vec![0.0; n],
            entries: 0.0,
        }
    }

    /// Histogram from explicit row-major contents and variances.
    pub fn from_parts(
        name: impl Into<String>,
        title: impl Into<String>,
        x: Binning,
        y: Binning,
        contents: Vec<f64>,
        variances: Vec<f64>,
    ) -> Result<Self> {
        let n = x.n_bins() * y.n_bins();
        if contents.len() != n || variances.len() != n {
            return Err(Error::Validation(format!(
                "2D contents/variances length ({}, {}) != {}",
                contents.len(),
                variances.len(),
                n
            )));
        }
        if let Some(i) = variances.iter().position(|&v| v < 0.0) {
            return Err(Error::Validation(format!("negative variance at global bin {i}")));
        }
        let mut h = Self::new(name, title, x, y);
        h.entries = contents.iter().filter(|c| c.is_finite()).sum();
        h.contents = contents;
        h.variances = variances;
        Ok(h)
    }

    /// Histogram name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Histogram title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Rename in place.
    pub fn set_name_title(&mut self, name: impl Into<String>, title: impl Into<String>) {
        self.name = name.into();
        self.title = title.into();
    }

    /// X-axis binning.
    pub fn x_binning(&self) -> &Binning {
        &self.x
    }

    /// Y-axis binning.
    pub fn y_binning(&self) -> &Binning {
        &self.y
    }

    /// Number of x bins.
    pub fn nx(&self) -> usize {
        self.x.n_bins()
    }

    /// Number of y bins.
    pub fn ny(&self) -> usize {
        self.y.n_bins()
    }

    /// Row-major contents.
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Row-major variances.
    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    /// Number of fill calls.
    pub fn entries(&self) -> f64 {
        self.entries
    }

    #[inline]
    fn index(&self, ix: usize, iy: usize) -> usize {
        iy * self.x.n_bins() + ix
    }

    /// Content of bin `(ix, iy)`.
    pub fn content(&self, ix: usize, iy: usize) -> f64 {
        self.contents[self.index(ix, iy)]
    }

    /// Variance of bin `(ix, iy)`.
    pub fn variance(&self, ix: usize, iy: usize) -> f64 {
        self.variances[self.index(ix, iy)]
    }

    /// Overwrite bin `(ix, iy)`.
    pub fn set_bin(&mut self, ix: usize, iy: usize, content: f64, variance: f64) {
        let i = self.index(ix, iy);
        self.contents[i] = content;
        self.variances[i] = variance;
    }

    /// Add one weighted entry; out-of-range entries only count towards `entries`.
    pub fn fill_weighted(&mut self, x: f64, y: f64, w: f64) {
        self.entries += 1.0;
        if let (Some(ix), Some(iy)) = (self.x.find_bin(x), self.y.find_bin(y)) {
            let i = self.index(ix, iy);
            self.contents[i] += w;
            self.variances[i] += w * w;
        }
    }

    /// Sum of finite in-range contents.
    pub fn integral(&self) -> f64 {
        self.contents.iter().filter(|c| c.is_finite()).sum()
    }

    /// Project onto the x axis (sum over y).
    pub fn project_x(&self, name: impl Into<String>) -> Hist1D {
        let mut c = vec![0.0; self.nx()];
        let mut v = vec![0.0; self.nx()];
        for iy in 0..self.ny() {
            for ix in 0..self.nx() {
                let i = self.index(ix, iy);
                c[ix] += self.contents[i];
                v[ix] += self.variances[i];
            }
        }
        projected(name, self.x.clone(), c, v)
    }

    /// Project onto the y axis (sum over x).
    pub fn project_y(&self, name: impl Into<String>) -> Hist1D {
        let mut c = vec![0.0; self.ny()];
        let mut v = vec![0.0; self.ny()];
        for iy in 0..self.ny() {
            for ix in 0..self.nx() {
                let i = self.index(ix, iy);
                c[iy] += self.contents[i];
                v[iy] += self.variances[i];
            }
        }
        projected(name, self.y.clone(), c, v)
    }
}

fn projected(name: impl Into<String>, binning: Binning, c: Vec<f64>, v: Vec<f64>) -> Hist1D {
    Hist1D::from_raw(name.into(), binning, c, v)
}
