//! Detector-level jet spectra filled from event tables.

use std::path::Path;

use ju_core::{Binning, EventSource, Hist1D, OutlierPredicate, Result};
use ju_store::{EventSchema, EventTable, Events, Store, columns};

use crate::layout::is_jet_tree;

/// Which weight a spectrum is filled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightMode {
    /// Unit weights.
    Unweighted,
    /// Generator cross-section weight (`PythiaWeight`).
    Generator,
    /// Trigger downscale weight (`EventWeight`).
    Downscale,
}

impl WeightMode {
    /// Event schema reading the columns this mode needs; simulated tables
    /// additionally provide the truth level for outlier rejection.
    pub fn schema(self, simulation: bool) -> EventSchema {
        let base = if simulation { EventSchema::simulation() } else { EventSchema::data() };
        match self {
            WeightMode::Unweighted => base.unweighted(),
            WeightMode::Generator => base.with_weight(columns::PYTHIA_WEIGHT),
            WeightMode::Downscale => base.with_weight(columns::EVENT_WEIGHT),
        }
    }
}

/// Open the store at `path` and materialize its jet tree with `schema`.
pub fn load_tree(path: &Path, schema: &EventSchema) -> Result<Events> {
    let store = Store::open(path)?;
    let events = store.root().find_table(is_jet_tree)?.records(schema)?;
    tracing::debug!(path = %path.display(), events = events.records().len(), "tree loaded");
    Ok(events)
}

/// Fill the detector-level spectrum of `events`, skipping outliers.
pub fn fill_spectrum(
    events: &dyn EventSource,
    binning: &Binning,
    name: &str,
    outlier: Option<&dyn OutlierPredicate>,
) -> Hist1D {
    let mut h = Hist1D::new(name, "spectrum", binning.clone());
    let mut rejected = 0usize;
    for ev in events.events() {
        if let Some(pred) = outlier
            && pred.is_outlier(ev.truth, ev.pt_hard_bin)
        {
            rejected += 1;
            continue;
        }
        h.fill_weighted(ev.measured, ev.weight);
    }
    tracing::debug!(source = events.label(), name, rejected, "spectrum filled");
    h
}

/// Read the spectrum of one tree: schema chosen by `mode`, optional outlier
/// rejection (which requires the simulation columns).
pub fn read_spectrum(
    table: &EventTable,
    binning: &Binning,
    mode: WeightMode,
    outlier: Option<&dyn OutlierPredicate>,
    name: &str,
) -> Result<Hist1D> {
    let simulation = mode == WeightMode::Generator || outlier.is_some();
    let events = table.records(&mode.schema(simulation))?;
    Ok(fill_spectrum(&events, binning, name, outlier))
}

/// [`read_spectrum`] on the jet tree of the store at `path`.
pub fn read_tree_spectrum(
    path: &Path,
    binning: &Binning,
    mode: WeightMode,
    outlier: Option<&dyn OutlierPredicate>,
    name: &str,
) -> Result<Hist1D> {
    let store = Store::open(path)?;
    let table = store.root().find_table(is_jet_tree)?;
    tracing::debug!(path = %path.display(), table = table.name(), "reading spectrum");
    read_spectrum(table, binning, mode, outlier, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outlier::PtHardOutlierCut;
    use ju_core::Error;

    fn mc_table() -> EventTable {
        EventTable::new("JetSubstructureTree")
            .with_f64(columns::PT_REC, vec![25.0, 35.0, 35.0, 45.0])
            .with_f64(columns::PT_SIM, vec![27.0, 36.0, 300.0, 44.0])
            .with_f64(columns::PYTHIA_WEIGHT, vec![2.0, 1.0, 50.0, 0.5])
            .with_i32(columns::PT_HARD_BIN, vec![10, 10, 3, 10])
    }

    #[test]
    fn test_generator_weight_with_outlier_rejection() {
        let b = Binning::new(vec![20.0, 30.0, 40.0, 50.0]).unwrap();
        let cut = PtHardOutlierCut::default();
        let h =
            read_spectrum(&mc_table(), &b, WeightMode::Generator, Some(&cut), "mcspec").unwrap();
        assert_eq!(h.contents(), &[2.0, 1.0, 0.5]);
        assert_eq!(h.variances(), &[4.0, 1.0, 0.25]);

        let all = read_spectrum(&mc_table(), &b, WeightMode::Generator, None, "all").unwrap();
        assert_eq!(all.content(1), 51.0);
    }

    #[test]
    fn test_downscale_weight_for_data() {
        let b = Binning::new(vec![20.0, 30.0, 40.0]).unwrap();
        let t = EventTable::new("data")
            .with_f64(columns::PT_REC, vec![22.0, 33.0, 250.0])
            .with_f64(columns::EVENT_WEIGHT, vec![3.0, 4.0, 1.0]);
        let h = read_spectrum(&t, &b, WeightMode::Downscale, None, "dataspec").unwrap();
        assert_eq!(h.contents(), &[3.0, 4.0]);
        assert_eq!(h.overflow(), 1.0);

        let h = read_spectrum(&t, &b, WeightMode::Unweighted, None, "dataspec").unwrap();
        assert_eq!(h.contents(), &[1.0, 1.0]);
        assert!(matches!(
            read_spectrum(&t, &b, WeightMode::Generator, None, "x"),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_tree_spectrum_from_store() {
        let mut path = std::env::temp_dir();
        path.push(format!("jetunfold_spectrum_{}_tree.json", std::process::id()));
        let mut store = Store::create(&path);
        store.root_mut().write(mc_table()).unwrap();
        store.save().unwrap();

        let b = Binning::new(vec![20.0, 30.0, 40.0, 50.0]).unwrap();
        let h = read_tree_spectrum(&path, &b, WeightMode::Unweighted, None, "dataspec_R02_INT7")
            .unwrap();
        assert_eq!(h.name(), "dataspec_R02_INT7");
        assert_eq!(h.contents(), &[1.0, 2.0, 1.0]);
        std::fs::remove_file(&path).ok();

        let missing = read_tree_spectrum(&path, &b, WeightMode::Unweighted, None, "x");
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }
}
