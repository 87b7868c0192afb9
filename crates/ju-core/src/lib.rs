//! # ju-core
//!
//! Core types for jetunfold: the error taxonomy, bin-edge schemes, 1D/2D
//! histograms with variances, typed event records, and the collaborator
//! traits the unfolding pipelines are written against.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binning;
pub mod error;
pub mod hist2d;
pub mod histogram;
mod serde_nan;
pub mod traits;
pub mod types;

pub use binning::Binning;
pub use error::{Error, Result};
pub use hist2d::Hist2D;
pub use histogram::{DivideMode, Hist1D};
pub use traits::{EventSource, NoOutlierRejection, OutlierPredicate};
pub use types::{EventRecord, ObservablePair};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
