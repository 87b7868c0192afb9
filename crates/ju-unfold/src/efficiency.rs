//! Trigger efficiencies from simulation and their application to data.

use ju_core::{DivideMode, Hist1D, Result};

use crate::triggers::TriggerSpectrum;

/// `Efficiency_R<RR>_<TRG>`: simulated triggered spectrum over the simulated
/// reference spectrum, binomial errors.
pub fn trigger_efficiency(mc_triggered: &Hist1D, mc_reference: &Hist1D, name: &str) -> Result<Hist1D> {
    Hist1D::ratio(mc_triggered, mc_reference, DivideMode::Binomial, name, "trigger efficiency")
}

/// Divide `spectrum` in place by `efficiency`. Bins with zero efficiency
/// become NaN.
pub fn apply_efficiency(spectrum: &mut TriggerSpectrum, efficiency: &Hist1D) -> Result<()> {
    spectrum.hist_mut().divide(efficiency, DivideMode::Independent)?;
    let invalid = spectrum.hist().invalid_bins();
    if !invalid.is_empty() {
        tracing::warn!(
            trigger = spectrum.trigger(),
            bins = ?invalid,
            "efficiency-corrected spectrum has undefined bins"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ju_core::Binning;

    fn hist(name: &str, contents: Vec<f64>) -> Hist1D {
        let b = Binning::uniform(contents.len(), 0.0, contents.len() as f64 * 10.0).unwrap();
        let vars = contents.clone();
        Hist1D::from_parts(name, "", b, contents, vars).unwrap()
    }

    #[test]
    fn test_efficiency_is_binomial() {
        let eff = trigger_efficiency(
            &hist("trg", vec![0.0, 50.0, 100.0]),
            &hist("mb", vec![100.0, 100.0, 100.0]),
            "Efficiency_R02_EJ1",
        )
        .unwrap();
        assert_eq!(eff.name(), "Efficiency_R02_EJ1");
        assert_eq!(eff.contents(), &[0.0, 0.5, 1.0]);
        assert_relative_eq!(eff.variance(1), 0.0025, max_relative = 1e-12);
        assert_eq!(eff.variance(2), 0.0);
    }

    #[test]
    fn test_zero_efficiency_marks_bin() {
        let eff = hist("eff", vec![0.0, 0.5]);
        let mut s = TriggerSpectrum::new("EJ1", hist("data", vec![3.0, 4.0]));
        apply_efficiency(&mut s, &eff).unwrap();
        assert!(s.hist().content(0).is_nan());
        assert!(!s.hist().is_valid_bin(0));
        assert_eq!(s.hist().content(1), 8.0);
    }

    #[test]
    fn test_round_trip() {
        let mc_trg = hist("t", vec![5.0, 40.0, 90.0, 100.0]);
        let mc_ref = hist("r", vec![100.0, 100.0, 100.0, 100.0]);
        let eff = trigger_efficiency(&mc_trg, &mc_ref, "eff").unwrap();
        let original = hist("data", vec![1.5, 22.0, 310.0, 47.0]);
        let mut s = TriggerSpectrum::new("EJ1", original.clone());
        s.normalize(7.0).unwrap();
        let normalized = s.hist().clone();
        apply_efficiency(&mut s, &eff).unwrap();

        let mut back = s.hist().clone();
        back.multiply(&eff).unwrap();
        for i in 0..back.n_bins() {
            assert_relative_eq!(back.content(i), normalized.content(i), max_relative = 1e-12);
        }
    }
}
