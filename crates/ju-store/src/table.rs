//! Columnar event tables and their validation into typed records.

use std::collections::BTreeMap;

use ju_core::{Error, EventRecord, EventSource, ObservablePair, Result};
use serde::{Deserialize, Serialize};

/// Column names written by the jet-substructure analysis task.
pub mod columns {
    /// Detector-level jet pT.
    pub const PT_REC: &str = "PtJetRec";
    /// Particle-level jet pT.
    pub const PT_SIM: &str = "PtJetSim";
    /// Generator cross-section weight.
    pub const PYTHIA_WEIGHT: &str = "PythiaWeight";
    /// Trigger downscale weight.
    pub const EVENT_WEIGHT: &str = "EventWeight";
    /// Generator pT-hard bin.
    pub const PT_HARD_BIN: &str = "PtHardBin";
    /// Index of the EMCAL trigger cluster class.
    pub const TRIGGER_CLUSTER_INDEX: &str = "TriggerClusterIndex";
    /// Detector-level groomed jet mass.
    pub const MG_MEASURED: &str = "MgMeasured";
    /// Particle-level groomed jet mass.
    pub const MG_TRUE: &str = "MgTrue";
}

/// One typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum Column {
    /// Floating-point values.
    F64(Vec<f64>),
    /// Integer values.
    I32(Vec<i32>),
}

impl Column {
    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Column::F64(v) => v.len(),
            Column::I32(v) => v.len(),
        }
    }

    /// Whether the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn f64_at(&self, i: usize) -> f64 {
        match self {
            Column::F64(v) => v[i],
            Column::I32(v) => v[i] as f64,
        }
    }
}

/// A named table of equally long columns (Structure-of-Arrays).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTable {
    name: String,
    columns: BTreeMap<String, Column>,
}

impl EventTable {
    /// Empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), columns: BTreeMap::new() }
    }

    /// Add (or replace) a floating-point column.
    pub fn with_f64(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.insert(name.into(), Column::F64(values));
        self
    }

    /// Add (or replace) an integer column.
    pub fn with_i32(mut self, name: impl Into<String>, values: Vec<i32>) -> Self {
        self.columns.insert(name.into(), Column::I32(values));
        self
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column names (sorted).
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    /// Whether a column is present.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Number of rows; errors if columns disagree.
    pub fn n_rows(&self) -> Result<usize> {
        let mut n: Option<(usize, &str)> = None;
        for (name, col) in &self.columns {
            match n {
                None => n = Some((col.len(), name.as_str())),
                Some((len, first)) if len != col.len() => {
                    return Err(Error::Schema(format!(
                        "table '{}': column length mismatch ('{first}' has {len}, '{name}' has {})",
                        self.name,
                        col.len()
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(n.map(|(len, _)| len).unwrap_or(0))
    }

    /// Validate the table against `schema` once and materialize typed records.
    pub fn records(&self, schema: &EventSchema) -> Result<Events> {
        let missing: Vec<&str> =
            schema.required().filter(|c| !self.columns.contains_key(*c)).collect();
        if !missing.is_empty() {
            return Err(Error::Schema(format!(
                "table '{}' lacks column(s) {:?} (has {:?})",
                self.name,
                missing,
                self.column_names()
            )));
        }
        let n = self.n_rows()?;

        let measured = self.finite_column(&schema.measured)?;
        let truth = schema.truth.as_deref().map(|c| self.finite_column(c)).transpose()?;
        let weight = schema.weight.as_deref().map(|c| self.finite_column(c)).transpose()?;
        let pt_hard = schema.pt_hard_bin.as_deref().map(|c| &self.columns[c]);
        let cluster = schema.trigger_cluster.as_deref().map(|c| &self.columns[c]);
        let obs = match &schema.observable {
            Some(o) => Some((
                self.finite_column(&o.measured)?,
                o.truth.as_deref().map(|c| self.finite_column(c)).transpose()?,
            )),
            None => None,
        };

        let records = (0..n)
            .map(|i| EventRecord {
                measured: measured.f64_at(i),
                truth: truth.map_or(f64::NAN, |c| c.f64_at(i)),
                weight: weight.map_or(1.0, |c| c.f64_at(i)),
                pt_hard_bin: pt_hard.map_or(-1, |c| c.f64_at(i) as i32),
                trigger_cluster: cluster.map(|c| c.f64_at(i) as i32),
                observable: obs.map(|(m, t)| ObservablePair {
                    measured: m.f64_at(i),
                    truth: t.map_or(f64::NAN, |c| c.f64_at(i)),
                }),
            })
            .collect();

        Ok(Events { label: self.name.clone(), records })
    }

    fn finite_column(&self, name: &str) -> Result<&Column> {
        let c = &self.columns[name];
        if let Column::F64(v) = c
            && let Some(row) = v.iter().position(|x| !x.is_finite())
        {
            return Err(Error::Validation(format!(
                "table '{}': column '{name}' has a non-finite value at row {row}",
                self.name
            )));
        }
        Ok(c)
    }
}

/// Names of a secondary observable's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableColumns {
    /// Detector-level column.
    pub measured: String,
    /// Particle-level column (simulation only).
    pub truth: Option<String>,
}

/// Which columns an [`EventRecord`] is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    /// Detector-level pT column (always required).
    pub measured: String,
    /// Particle-level pT column.
    pub truth: Option<String>,
    /// Weight column; unit weights if `None`.
    pub weight: Option<String>,
    /// pT-hard bin column.
    pub pt_hard_bin: Option<String>,
    /// Trigger cluster index column.
    pub trigger_cluster: Option<String>,
    /// Secondary observable columns.
    pub observable: Option<ObservableColumns>,
}

impl EventSchema {
    /// Data jets: detector-level pT only.
    pub fn data() -> Self {
        Self {
            measured: columns::PT_REC.into(),
            truth: None,
            weight: None,
            pt_hard_bin: None,
            trigger_cluster: None,
            observable: None,
        }
    }

    /// Simulated jets: both pT levels, generator weight and pT-hard bin.
    pub fn simulation() -> Self {
        Self {
            measured: columns::PT_REC.into(),
            truth: Some(columns::PT_SIM.into()),
            weight: Some(columns::PYTHIA_WEIGHT.into()),
            pt_hard_bin: Some(columns::PT_HARD_BIN.into()),
            trigger_cluster: None,
            observable: None,
        }
    }

    /// Read weights from `column`.
    pub fn with_weight(mut self, column: impl Into<String>) -> Self {
        self.weight = Some(column.into());
        self
    }

    /// Drop the weight column (unit weights).
    pub fn unweighted(mut self) -> Self {
        self.weight = None;
        self
    }

    /// Require the trigger cluster index column.
    pub fn with_trigger_cluster(mut self) -> Self {
        self.trigger_cluster = Some(columns::TRIGGER_CLUSTER_INDEX.into());
        self
    }

    /// Require a secondary observable.
    pub fn with_observable(mut self, measured: impl Into<String>, truth: Option<String>) -> Self {
        self.observable = Some(ObservableColumns { measured: measured.into(), truth });
        self
    }

    fn required(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.measured.as_str())
            .chain(self.truth.as_deref())
            .chain(self.weight.as_deref())
            .chain(self.pt_hard_bin.as_deref())
            .chain(self.trigger_cluster.as_deref())
            .chain(self.observable.iter().flat_map(|o| {
                std::iter::once(o.measured.as_str()).chain(o.truth.as_deref())
            }))
    }
}

/// Validated, materialized records of one table.
#[derive(Debug, Clone)]
pub struct Events {
    label: String,
    records: Vec<EventRecord>,
}

impl Events {
    /// Wrap already typed records.
    pub fn from_records(label: impl Into<String>, records: Vec<EventRecord>) -> Self {
        Self { label: label.into(), records }
    }

    /// All records.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }
}

impl EventSource for Events {
    fn label(&self) -> &str {
        &self.label
    }

    fn events(&self) -> Box<dyn Iterator<Item = EventRecord> + '_> {
        Box::new(self.records.iter().copied())
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mc_table() -> EventTable {
        EventTable::new("JetSubstructureTree_FullJets_R02_INT7")
            .with_f64(columns::PT_REC, vec![25.0, 42.0])
            .with_f64(columns::PT_SIM, vec![30.0, 40.0])
            .with_f64(columns::PYTHIA_WEIGHT, vec![0.5, 2.0])
            .with_i32(columns::PT_HARD_BIN, vec![3, 7])
    }

    #[test]
    fn test_simulation_records() {
        let ev = mc_table().records(&EventSchema::simulation()).unwrap();
        assert_eq!(ev.len(), 2);
        let r = ev.records()[1];
        assert_eq!(r.measured, 42.0);
        assert_eq!(r.truth, 40.0);
        assert_eq!(r.weight, 2.0);
        assert_eq!(r.pt_hard_bin, 7);
        assert_eq!(r.trigger_cluster, None);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let t = EventTable::new("t").with_f64(columns::PT_REC, vec![1.0]);
        let err = t.records(&EventSchema::simulation()).unwrap_err();
        assert!(matches!(err, Error::Schema(_)), "{err}");
    }

    #[test]
    fn test_length_mismatch_is_schema_error() {
        let t = EventTable::new("t")
            .with_f64(columns::PT_REC, vec![1.0, 2.0])
            .with_f64(columns::EVENT_WEIGHT, vec![1.0]);
        let schema = EventSchema::data().with_weight(columns::EVENT_WEIGHT);
        assert!(matches!(t.records(&schema), Err(Error::Schema(_))));
    }

    #[test]
    fn test_data_defaults() {
        let t = EventTable::new("t")
            .with_f64(columns::PT_REC, vec![55.0])
            .with_i32(columns::TRIGGER_CLUSTER_INDEX, vec![2]);
        let ev = t.records(&EventSchema::data().with_trigger_cluster()).unwrap();
        let r = ev.records()[0];
        assert_eq!(r.weight, 1.0);
        assert!(r.truth.is_nan());
        assert_eq!(r.trigger_cluster, Some(2));
    }

    #[test]
    fn test_non_finite_rejected() {
        let t = EventTable::new("t").with_f64(columns::PT_REC, vec![f64::INFINITY]);
        assert!(matches!(t.records(&EventSchema::data()), Err(Error::Validation(_))));
    }
}
