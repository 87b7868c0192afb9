//! # ju-store
//!
//! Hierarchical object store for jetunfold.
//!
//! A store file holds a tree of named groups; each group holds 1D/2D
//! histograms and columnar event tables. Files are JSON documents, so the
//! analysis inputs and all correction outputs can be inspected with any tool.
//!
//! ## Example
//!
//! ```no_run
//! use ju_store::Store;
//!
//! let store = Store::open("AnalysisResults_split.json").unwrap();
//! let dir = store.root().cd("R02_INT7").unwrap();
//! for key in dir.keys() {
//!     println!("{key}");
//! }
//! let lumi = dir.hist1d("hLumiMonitor").unwrap();
//! println!("bins: {}", lumi.n_bins());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod object;
pub mod store;
pub mod table;

pub use object::StoredObject;
pub use store::{Group, GroupMut, Node, STORE_FORMAT, STORE_VERSION, Store};
pub use table::{Column, EventSchema, EventTable, Events, ObservableColumns, columns};
