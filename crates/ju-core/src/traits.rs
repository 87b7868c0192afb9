//! Collaborator traits
//!
//! The pipelines depend on these seams rather than on concrete storage or
//! generator bookkeeping, so synthetic inputs can be swapped in for tests.

use crate::types::EventRecord;

/// A finite, restartable sequence of event records.
///
/// Each call to [`EventSource::events`] starts a fresh pass.
pub trait EventSource {
    /// Source label used in logs.
    fn label(&self) -> &str;

    /// Start a new pass over all records.
    fn events(&self) -> Box<dyn Iterator<Item = EventRecord> + '_>;

    /// Number of records in one pass.
    fn len(&self) -> usize {
        self.events().count()
    }

    /// Whether a pass yields no record.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSource for [EventRecord] {
    fn label(&self) -> &str {
        "memory"
    }

    fn events(&self) -> Box<dyn Iterator<Item = EventRecord> + '_> {
        Box::new(self.iter().copied())
    }

    fn len(&self) -> usize {
        <[EventRecord]>::len(self)
    }
}

impl EventSource for Vec<EventRecord> {
    fn label(&self) -> &str {
        "memory"
    }

    fn events(&self) -> Box<dyn Iterator<Item = EventRecord> + '_> {
        Box::new(self.iter().copied())
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// Rejects simulated jets whose particle-level pT is implausible for the
/// generator pT-hard bin they were produced in.
pub trait OutlierPredicate: Send + Sync {
    /// `true` if the jet must be discarded.
    fn is_outlier(&self, truth: f64, pt_hard_bin: i32) -> bool;
}

/// Keeps every jet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOutlierRejection;

impl OutlierPredicate for NoOutlierRejection {
    fn is_outlier(&self, _truth: f64, _pt_hard_bin: i32) -> bool {
        false
    }
}
