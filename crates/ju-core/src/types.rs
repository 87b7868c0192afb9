//! Common data types for jetunfold

use serde::{Deserialize, Serialize};

/// Detector-level / particle-level values of a secondary jet observable
/// (e.g. groomed mass `Mg`) carried next to the jet pT.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservablePair {
    /// Detector-level value.
    pub measured: f64,
    /// Particle-level value (NaN for real data).
    pub truth: f64,
}

/// One jet entry as consumed by every pass over an event source.
///
/// Produced by validating an event table against a schema once; fields the
/// schema does not provide hold their documented defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Detector-level jet pT.
    pub measured: f64,
    /// Particle-level jet pT (NaN for real data).
    pub truth: f64,
    /// Event weight (generator or downscale weight; 1 if unweighted).
    pub weight: f64,
    /// Generator pT-hard bin used for outlier rejection (-1 if unknown).
    pub pt_hard_bin: i32,
    /// Index of the EMCAL trigger cluster that fired (CENT < 1), if recorded.
    pub trigger_cluster: Option<i32>,
    /// Secondary observable, if the schema requests one.
    pub observable: Option<ObservablePair>,
}

impl EventRecord {
    /// Simulated jet with both levels known.
    pub fn simulated(measured: f64, truth: f64, weight: f64, pt_hard_bin: i32) -> Self {
        Self { measured, truth, weight, pt_hard_bin, trigger_cluster: None, observable: None }
    }

    /// Data jet (detector level only, unit weight).
    pub fn data(measured: f64) -> Self {
        Self {
            measured,
            truth: f64::NAN,
            weight: 1.0,
            pt_hard_bin: -1,
            trigger_cluster: None,
            observable: None,
        }
    }

    /// Attach a secondary observable.
    pub fn with_observable(mut self, measured: f64, truth: f64) -> Self {
        self.observable = Some(ObservablePair { measured, truth });
        self
    }
}
