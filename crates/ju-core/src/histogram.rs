//! One-dimensional binned spectra with per-bin variances.

use serde::{Deserialize, Serialize};

use crate::binning::Binning;
use crate::{Error, Result};

/// Error propagation used by [`Hist1D::divide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivideMode {
    /// Numerator and denominator are independent samples.
    Independent,
    /// Numerator is a subset of the denominator's sampling population
    /// (efficiencies, acceptances).
    Binomial,
}

/// A 1D histogram: bin edges, contents and sum-of-weights-squared variances.
///
/// Bins whose value cannot be defined (division by an empty bin) hold NaN in
/// both content and variance; see [`Hist1D::is_valid_bin`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Hist1DRepr")]
pub struct Hist1D {
    name: String,
    #[serde(default)]
    title: String,
    binning: Binning,
    #[serde(with = "crate::serde_nan")]
    contents: Vec<f64>,
    #[serde(with = "crate::serde_nan")]
    variances: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    labels: Option<Vec<String>>,
    #[serde(default)]
    entries: f64,
    #[serde(default)]
    underflow: f64,
    #[serde(default)]
    overflow: f64,
}

/// Persisted form of [`Hist1D`], validated through [`Hist1D::from_parts`].
#[derive(Deserialize)]
struct Hist1DRepr {
    name: String,
    #[serde(default)]
    title: String,
    binning: Binning,
    #[serde(with = "crate::serde_nan")]
    contents: Vec<f64>,
    #[serde(with = "crate::serde_nan")]
    variances: Vec<f64>,
    #[serde(default)]
    labels: Option<Vec<String>>,
    #[serde(default)]
    entries: f64,
    #[serde(default)]
    underflow: f64,
    #[serde(default)]
    overflow: f64,
}

impl TryFrom<Hist1DRepr> for Hist1D {
    type Error = Error;

    fn try_from(r: Hist1DRepr) -> Result<Self> {
        let mut h = Hist1D::from_parts(r.name, r.title, r.binning, r.contents, r.variances)?;
        if let Some(labels) = r.labels {
            h = h.with_labels(labels)?;
        }
        h.entries = r.entries;
        h.underflow = r.underflow;
        h.overflow = r.overflow;
        Ok(h)
    }
}

impl Hist1D {
    /// Empty histogram over `binning`.
    pub fn new(name: impl Into<String>, title: impl Into<String>, binning: Binning) -> Self {
        let n = binning.n_bins();
        Self {
            name: name.into(),
            title: title.into(),
            binning,
            contents: vec![0.0; n],
            variances: vec![0.0; n],
            labels: None,
            entries: 0.0,
            underflow: 0.0,
            overflow: 0.0,
        }
    }

    /// Histogram from explicit contents and variances.
    pub fn from_parts(
        name: impl Into<String>,
        title: impl Into<String>,
        binning: Binning,
        contents: Vec<f64>,
        variances: Vec<f64>,
    ) -> Result<Self> {
        let n = binning.n_bins();
        if contents.len() != n || variances.len() != n {
            return Err(Error::Validation(format!(
                "contents/variances length ({}, {}) != n_bins {}",
                contents.len(),
                variances.len(),
                n
            )));
        }
        if let Some(i) = variances.iter().position(|&v| v < 0.0) {
            return Err(Error::Validation(format!("negative variance in bin {i}")));
        }
        let mut h = Self::new(name, title, binning);
        h.entries = contents.iter().filter(|c| c.is_finite()).sum();
        h.contents = contents;
        h.variances = variances;
        Ok(h)
    }

    /// Lengths are guaranteed by the caller.
    pub(crate) fn from_raw(name: String, binning: Binning, contents: Vec<f64>, variances: Vec<f64>) -> Self {
        debug_assert_eq!(contents.len(), binning.n_bins());
        let entries = contents.iter().filter(|c| c.is_finite()).sum();
        Self {
            name,
            title: String::new(),
            binning,
            contents,
            variances,
            labels: None,
            entries,
            underflow: 0.0,
            overflow: 0.0,
        }
    }

    /// Attach alphanumeric bin labels (one per bin).
    pub fn with_labels(mut self, labels: Vec<String>) -> Result<Self> {
        if labels.len() != self.n_bins() {
            return Err(Error::Validation(format!(
                "{} labels for {} bins",
                labels.len(),
                self.n_bins()
            )));
        }
        self.labels = Some(labels);
        Ok(self)
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

    /// Copy under a new name and title.
    pub fn renamed(&self, name: impl Into<String>, title: impl Into<String>) -> Self {
        let mut h = self.clone();
        h.set_name_title(name, title);
        h
    }

    /// Axis binning.
    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.binning.n_bins()
    }

    /// Bin contents.
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Bin variances.
    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    /// Bin labels, if any.
    pub fn labels(&self) -> Option<&[String]> {
        self.labels.as_deref()
    }

    /// Number of fill calls (or summed contents for histograms built from parts).
    pub fn entries(&self) -> f64 {
        self.entries
    }

    /// Sum of weights below the first edge.
    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    /// Sum of weights at or above the last edge.
    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    /// Content of bin `i`.
    pub fn content(&self, i: usize) -> f64 {
        self.contents[i]
    }

    /// Variance of bin `i`.
    pub fn variance(&self, i: usize) -> f64 {
        self.variances[i]
    }

    /// Standard error of bin `i`.
    pub fn error(&self, i: usize) -> f64 {
        self.variances[i].sqrt()
    }

    /// Both content and variance are finite.
    pub fn is_valid_bin(&self, i: usize) -> bool {
        self.contents[i].is_finite() && self.variances[i].is_finite()
    }

    /// Indices of bins holding an invalid marker.
    pub fn invalid_bins(&self) -> Vec<usize> {
        (0..self.n_bins()).filter(|&i| !self.is_valid_bin(i)).collect()
    }

    /// Bin index for `x`.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        self.binning.find_bin(x)
    }

    /// Bin index carrying `label`.
    pub fn find_label(&self, label: &str) -> Option<usize> {
        self.labels.as_ref()?.iter().position(|l| l == label)
    }

    /// Overwrite bin `i`.
    pub fn set_bin(&mut self, i: usize, content: f64, variance: f64) {
        self.contents[i] = content;
        self.variances[i] = variance;
    }

    /// Add one unit-weight entry.
    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    /// Add one weighted entry at `x`.
    pub fn fill_weighted(&mut self, x: f64, w: f64) {
        self.entries += 1.0;
        match self.binning.find_bin(x) {
            Some(i) => {
                self.contents[i] += w;
                self.variances[i] += w * w;
            }
            None if x < self.binning.low() => self.underflow += w,
            None => self.overflow += w,
        }
    }

    /// Sum of finite in-range contents.
    pub fn integral(&self) -> f64 {
        self.contents.iter().filter(|c| c.is_finite()).sum()
    }

    /// Multiply contents by `factor` (variances by `factor²`).
    pub fn scale(&mut self, factor: f64) {
        let f2 = factor * factor;
        for (c, v) in self.contents.iter_mut().zip(self.variances.iter_mut()) {
            *c *= factor;
            *v *= f2;
        }
        self.underflow *= factor;
        self.overflow *= factor;
    }

    /// Divide content and error of every bin by the bin width.
    pub fn normalize_bin_width(&mut self) {
        for i in 0..self.n_bins() {
            let w = self.binning.width(i);
            self.contents[i] /= w;
            self.variances[i] /= w * w;
        }
    }

    /// Bin-wise division by `other` in place.
    ///
    /// A bin with a zero (or invalid) denominator becomes NaN.
    pub fn divide(&mut self, other: &Hist1D, mode: DivideMode) -> Result<()> {
        self.binning.ensure_compatible(
            &other.binning,
            &format!("divide '{}' by '{}'", self.name, other.name),
        )?;
        for i in 0..self.n_bins() {
            let (c, v) = divide_bin(
                self.contents[i],
                self.variances[i],
                other.contents[i],
                other.variances[i],
                mode,
            );
            self.contents[i] = c;
            self.variances[i] = v;
        }
        Ok(())
    }

    /// Bin-wise product with `other` in place (independent errors).
    pub fn multiply(&mut self, other: &Hist1D) -> Result<()> {
        self.binning.ensure_compatible(
            &other.binning,
            &format!("multiply '{}' by '{}'", self.name, other.name),
        )?;
        for i in 0..self.n_bins() {
            let (a, b) = (self.contents[i], other.contents[i]);
            self.variances[i] = self.variances[i] * b * b + other.variances[i] * a * a;
            self.contents[i] = a * b;
        }
        Ok(())
    }

    /// `num / den` as a new histogram named `name`.
    pub fn ratio(
        num: &Hist1D,
        den: &Hist1D,
        mode: DivideMode,
        name: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Hist1D> {
        let mut out = num.renamed(name, title);
        out.divide(den, mode)?;
        Ok(out)
    }
}

fn divide_bin(a: f64, va: f64, b: f64, vb: f64, mode: DivideMode) -> (f64, f64) {
    if b == 0.0 || !b.is_finite() || !a.is_finite() {
        return (f64::NAN, f64::NAN);
    }
    let b2 = b * b;
    match mode {
        DivideMode::Independent => (a / b, (va * b2 + vb * a * a) / (b2 * b2)),
        DivideMode::Binomial => {
            let e = a / b;
            (e, ((1.0 - 2.0 * e) * va + e * e * vb).abs() / b2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn edges() -> Binning {
        Binning::new(vec![0.0, 10.0, 20.0, 40.0]).unwrap()
    }

    #[test]
    fn test_fill_tracks_variance_and_flows() {
        let mut h = Hist1D::new("h", "", edges());
        h.fill_weighted(5.0, 2.0);
        h.fill_weighted(5.0, 3.0);
        h.fill(-1.0);
        h.fill(40.0);
        assert_eq!(h.content(0), 5.0);
        assert_eq!(h.variance(0), 13.0);
        assert_eq!(h.underflow(), 1.0);
        assert_eq!(h.overflow(), 1.0);
        assert_eq!(h.entries(), 4.0);
    }

    #[test]
    fn test_binomial_divide_unweighted() {
        let mut pass = Hist1D::new("pass", "", edges());
        let mut all = Hist1D::new("all", "", edges());
        for _ in 0..30 {
            pass.fill(1.0);
        }
        for _ in 0..100 {
            all.fill(1.0);
        }
        pass.divide(&all, DivideMode::Binomial).unwrap();
        assert_relative_eq!(pass.content(0), 0.3, epsilon = 1e-12);
        // e(1-e)/N
        assert_relative_eq!(pass.variance(0), 0.3 * 0.7 / 100.0, epsilon = 1e-12);
    }

    #[test]
    fn test_divide_by_zero_marks_bin_invalid() {
        let mut a = Hist1D::new("a", "", edges());
        let mut b = Hist1D::new("b", "", edges());
        a.fill(15.0);
        b.fill(5.0);
        a.divide(&b, DivideMode::Independent).unwrap();
        assert!(a.is_valid_bin(0));
        assert_eq!(a.content(0), 0.0);
        assert!(!a.is_valid_bin(1));
        assert_eq!(a.invalid_bins(), vec![1, 2]);
    }

    #[test]
    fn test_divide_rejects_incompatible_binning() {
        let mut a = Hist1D::new("a", "", edges());
        let b = Hist1D::new("b", "", Binning::uniform(3, 0.0, 30.0).unwrap());
        assert!(matches!(a.divide(&b, DivideMode::Independent), Err(Error::MalformedBinning(_))));
    }

    #[test]
    fn test_normalize_bin_width() {
        let mut h = Hist1D::new("h", "", edges());
        h.set_bin(2, 40.0, 16.0);
        h.normalize_bin_width();
        assert_eq!(h.content(2), 2.0);
        assert_eq!(h.variance(2), 16.0 / 400.0);
    }

    #[test]
    fn test_scale_then_multiply_restores() {
        let mut h = Hist1D::new("h", "", edges());
        h.set_bin(0, 8.0, 4.0);
        let mut f = Hist1D::new("f", "", edges());
        f.set_bin(0, 0.5, 0.0);
        h.multiply(&f).unwrap();
        assert_eq!(h.content(0), 4.0);
        assert_eq!(h.variance(0), 1.0);
    }

    #[test]
    fn test_labels_and_nan_roundtrip_json() {
        let mut h = Hist1D::new("lumi", "", Binning::uniform(2, 0.0, 2.0).unwrap())
            .with_labels(vec!["A".into(), "B".into()])
            .unwrap();
        h.set_bin(1, f64::NAN, f64::NAN);
        assert_eq!(h.find_label("B"), Some(1));
        let json = serde_json::to_string(&h).unwrap();
        let back: Hist1D = serde_json::from_str(&json).unwrap();
        assert!(back.content(1).is_nan());
        assert_eq!(back.labels().unwrap(), &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_from_parts_rejects_negative_variance() {
        let r = Hist1D::from_parts("x", "", edges(), vec![0.0; 3], vec![0.0, -1.0, 0.0]);
        assert!(r.is_err());
    }

    #[test]
    fn test_deserialize_validates_arrays_and_labels() {
        let short = r#"{"name":"h","binning":[0,1,2,3],"contents":[1.0],"variances":[-4.0]}"#;
        assert!(serde_json::from_str::<Hist1D>(short).is_err());
        let negative =
            r#"{"name":"h","binning":[0,1,2],"contents":[1.0,2.0],"variances":[1.0,-4.0]}"#;
        assert!(serde_json::from_str::<Hist1D>(negative).is_err());
        let labels = r#"{"name":"h","binning":[0,1,2],"contents":[1.0,2.0],"variances":[1.0,2.0],"labels":["A"]}"#;
        assert!(serde_json::from_str::<Hist1D>(labels).is_err());
        let ok = r#"{"name":"h","binning":[0,1,2],"contents":[1.0,null],"variances":[1.0,null],"entries":7.0}"#;
        let h: Hist1D = serde_json::from_str(ok).unwrap();
        assert_eq!(h.entries(), 7.0);
        assert!(!h.is_valid_bin(1));
    }
}
