//! Regularized SVD unfolding (Hoecker & Kartvelishvili, NIM A 372 (1996) 469).
//!
//! The unknowns are the ratios `w = x / x_ini` to the response prior. The
//! measured equations are rescaled by their uncertainties, the curvature of
//! `w` is damped through `C = ξI − L` (L: second-difference operator), and
//! the rotated system `Ã = Â C⁻¹` is solved with Tikhonov filter factors
//! `s² / (s² + τ)`, `τ = s_k²` for regularization strength `k`.

use ju_core::{Binning, Error, Hist1D, Result};
use nalgebra::{DMatrix, DVector, SVD};

use crate::engine::{Unfolded, UnfoldingEngine};
use crate::response::ResponseModel;

/// Diagonal term of the curvature matrix.
pub const DEFAULT_XI: f64 = 1e-3;

/// Singular-value-decomposition unfolding.
#[derive(Debug, Clone, Copy)]
pub struct SvdUnfolding {
    xi: f64,
    max_iterations: Option<usize>,
}

impl Default for SvdUnfolding {
    fn default() -> Self {
        Self { xi: DEFAULT_XI, max_iterations: None }
    }
}

impl SvdUnfolding {
    /// Engine with the default curvature term.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override ξ (must be positive and finite).
    pub fn with_xi(mut self, xi: f64) -> Result<Self> {
        if !(xi.is_finite() && xi > 0.0) {
            return Err(Error::Validation(format!("curvature term must be > 0, got {xi}")));
        }
        self.xi = xi;
        Ok(self)
    }

    /// Cap on the total number of SVD iterations (default: 100 × larger dimension).
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Curvature regularization matrix `ξI − L` of size `n`.
    fn curvature(&self, n: usize) -> DMatrix<f64> {
        let mut c = DMatrix::<f64>::identity(n, n) * self.xi;
        if n < 2 {
            return c;
        }
        // -L: boundary rows [1, -1], interior rows [-1, 2, -1]
        c[(0, 0)] += 1.0;
        c[(0, 1)] -= 1.0;
        c[(n - 1, n - 1)] += 1.0;
        c[(n - 1, n - 2)] -= 1.0;
        for i in 1..n - 1 {
            c[(i, i - 1)] -= 1.0;
            c[(i, i)] += 2.0;
            c[(i, i + 1)] -= 1.0;
        }
        c
    }
}

impl UnfoldingEngine for SvdUnfolding {
    fn name(&self) -> &str {
        "svd"
    }

    fn unfold(&self, response: &ResponseModel, measured: &Hist1D, strength: usize) -> Result<Unfolded> {
        response
            .measured_binning()
            .ensure_compatible(measured.binning(), &format!("unfold {}", measured.name()))?;
        let n = response.truth_binning().n_bins();
        let fail = |what: String| Error::EngineFailure(format!("svd k={strength}: {what}"));

        // Rows with a usable measurement, scaled to unit uncertainty.
        let rows: Vec<usize> = (0..measured.n_bins())
            .filter(|&i| measured.content(i).is_finite() && measured.variance(i).is_finite())
            .collect();
        if rows.is_empty() {
            return Err(fail("no finite measured bin".into()));
        }
        let sigma: Vec<f64> = rows
            .iter()
            .map(|&i| if measured.variance(i) > 0.0 { measured.variance(i).sqrt() } else { 1.0 })
            .collect();
        let m = rows.len();
        let a_hat =
            DMatrix::from_fn(m, n, |r, j| response.matrix().content(rows[r], j) / sigma[r]);
        let b_hat = DVector::from_fn(m, |r, _| measured.content(rows[r]) / sigma[r]);

        let c_inv = self
            .curvature(n)
            .try_inverse()
            .ok_or_else(|| fail("curvature matrix is singular".into()))?;
        let a_tilde = &a_hat * &c_inv;

        let max_iter = self.max_iterations.unwrap_or(100 * m.max(n));
        let svd = SVD::try_new(a_tilde, true, true, f64::EPSILON, max_iter)
            .ok_or_else(|| fail("decomposition did not converge".into()))?;
        let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
            return Err(fail("decomposition returned no singular vectors".into()));
        };
        let s_raw = svd.singular_values;

        let mut order: Vec<usize> = (0..s_raw.len()).collect();
        order.sort_by(|&a, &b| s_raw[b].total_cmp(&s_raw[a]));
        let s: Vec<f64> = order.iter().map(|&i| s_raw[i]).collect();
        let u = u.select_columns(order.iter());
        let v = v_t.select_rows(order.iter()).transpose();

        let s_max = s.first().copied().unwrap_or(0.0);
        let tol = s_max * m.max(n) as f64 * f64::EPSILON;
        let rank = s.iter().filter(|&&x| x > tol).count();
        if strength == 0 || strength > rank {
            return Err(fail(format!("strength outside 1..={rank}")));
        }
        let s_k = s[strength - 1];
        if s_k <= 0.0 {
            return Err(fail("vanishing singular value".into()));
        }
        let tau = s_k * s_k;

        let d = u.transpose() * &b_hat;
        let filter = DVector::from_iterator(s.len(), s.iter().map(|&x| x / (x * x + tau)));

        // K = C⁻¹ V F; w = K Uᵀ b̂
        let mut vf = v;
        for (col, f) in filter.iter().enumerate() {
            vf.column_mut(col).scale_mut(*f);
        }
        let k = &c_inv * vf;
        let w = &k * &d;
        let ku = &k * u.transpose();

        let prior = response.prior();
        let mut contents = Vec::with_capacity(n);
        let mut variances = Vec::with_capacity(n);
        for j in 0..n {
            let xini = prior.content(j);
            let var_w: f64 = rows
                .iter()
                .enumerate()
                .map(|(r, &i)| {
                    let v = measured.variance(i);
                    if v > 0.0 { ku[(j, r)].powi(2) } else { 0.0 }
                })
                .sum();
            contents.push(w[j] * xini);
            variances.push(var_w * xini * xini);
        }
        if contents.iter().chain(&variances).any(|v| !v.is_finite()) {
            return Err(fail("non-finite unfolded spectrum".into()));
        }

        let spectrum = Hist1D::from_parts(
            "unfolded",
            format!("unfolded, k = {strength}"),
            response.truth_binning().clone(),
            contents,
            variances,
        )?;
        let nd = d.len();
        let discrepancy = Hist1D::from_parts(
            "dvector",
            "|d_i|",
            Binning::uniform(nd, 0.0, nd as f64)?,
            d.iter().map(|x| x.abs()).collect(),
            vec![0.0; nd],
        )?;
        tracing::debug!(strength, rank, tau, "svd unfolding done");
        Ok(Unfolded { spectrum, discrepancy: Some(discrepancy) })
    }
}
