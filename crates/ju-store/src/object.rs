//! Objects that can live inside a store group.

use ju_core::{Error, Hist1D, Hist2D, Result};
use serde::{Deserialize, Serialize};

use crate::table::EventTable;

/// A named object stored in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredObject {
    /// 1D histogram.
    Hist1d(Hist1D),
    /// 2D histogram.
    Hist2d(Hist2D),
    /// Columnar event table (a "tree").
    Table(EventTable),
}

impl StoredObject {
    /// Name the object is written under.
    pub fn name(&self) -> &str {
        match self {
            StoredObject::Hist1d(h) => h.name(),
            StoredObject::Hist2d(h) => h.name(),
            StoredObject::Table(t) => t.name(),
        }
    }

    /// Kind tag (`hist1d`, `hist2d`, `table`).
    pub fn kind(&self) -> &'static str {
        match self {
            StoredObject::Hist1d(_) => "hist1d",
            StoredObject::Hist2d(_) => "hist2d",
            StoredObject::Table(_) => "table",
        }
    }

    /// Borrow as a 1D histogram.
    pub fn as_hist1d(&self) -> Result<&Hist1D> {
        match self {
            StoredObject::Hist1d(h) => Ok(h),
            other => Err(kind_mismatch(other, "hist1d")),
        }
    }

    /// Borrow as a 2D histogram.
    pub fn as_hist2d(&self) -> Result<&Hist2D> {
        match self {
            StoredObject::Hist2d(h) => Ok(h),
            other => Err(kind_mismatch(other, "hist2d")),
        }
    }

    /// Borrow as an event table.
    pub fn as_table(&self) -> Result<&EventTable> {
        match self {
            StoredObject::Table(t) => Ok(t),
            other => Err(kind_mismatch(other, "table")),
        }
    }
}

fn kind_mismatch(obj: &StoredObject, wanted: &str) -> Error {
    Error::Validation(format!("object '{}' is a {}, expected {wanted}", obj.name(), obj.kind()))
}

impl From<Hist1D> for StoredObject {
    fn from(h: Hist1D) -> Self {
        StoredObject::Hist1d(h)
    }
}

impl From<Hist2D> for StoredObject {
    fn from(h: Hist2D) -> Self {
        StoredObject::Hist2d(h)
    }
}

impl From<EventTable> for StoredObject {
    fn from(t: EventTable) -> Self {
        StoredObject::Table(t)
    }
}
