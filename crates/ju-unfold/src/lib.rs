//! # ju-unfold
//!
//! Regularized unfolding of jet spectra.
//!
//! This crate provides:
//! - Trigger spectrum loading, luminosity normalization and stitching
//! - Trigger efficiency correction
//! - Response matrices with an independent closure-test split
//! - The [`UnfoldingEngine`] seam and an SVD implementation
//! - The regularization scan with back-folding checks
//! - The two pipelines: [`correction_chain_1d`] and [`unfolding_mg`]
//!
//! ## Architecture
//!
//! Pipelines read inputs through `ju-store` and depend on the engine trait,
//! not on [`SvdUnfolding`]; any kernel can be plugged into the scan.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// The 1D jet-pT correction chain.
pub mod chain;
/// Run configuration (JSON/YAML).
pub mod config;
/// Trigger efficiencies.
pub mod efficiency;
/// Engine trait and back-folding.
pub mod engine;
/// Flattened 2D spectra.
pub mod flat2d;
/// Input file layout.
pub mod layout;
/// Luminosities and the CENTNOTRD correction.
pub mod lumi;
/// Groomed-mass unfolding.
pub mod mg;
/// pT-hard outlier rejection.
pub mod outlier;
/// Output namespace.
pub mod packager;
/// Response matrices and the closure split.
pub mod response;
/// Regularization scan.
pub mod scan;
/// Spectrum readers.
pub mod spectrum;
/// SVD unfolding engine.
pub mod svd;
/// Per-trigger spectra and stitching.
pub mod triggers;

pub use chain::{ChainRun, ChainSummary, correction_chain_1d};
pub use config::{ChainConfig, MgConfig};
pub use engine::{BackfoldCheck, Unfolded, UnfoldingEngine, backfold};
pub use flat2d::{FlatAxes, FlatBinning2D};
pub use lumi::{CentNotrdCorrection, CorrectionMethod, Luminosities};
pub use mg::{MgRun, MgSummary, unfolding_mg};
pub use outlier::PtHardOutlierCut;
pub use packager::{ResultPackage, regularization_key};
pub use response::{PtAxes, ResponseAxes, ResponseBuilder, ResponseModel, ResponseSet, TruncationWindow};
pub use scan::{RegularizationScan, ScanInputs, ScanOutcome, SpectrumNormalization, UnfoldingResult};
pub use svd::SvdUnfolding;
pub use triggers::{NormalizationSource, StitchPlan, TriggerSpectrum};
