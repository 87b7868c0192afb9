//! Result packager: the fixed output namespace of an unfolding run.
//!
//! ```text
//! rawlevel/            combined spectrum, luminosities, per-trigger inputs
//! detectorresponse/    truth / smeared / closure histograms, responses
//! regularization01/    one group per completed strength
//! regularization02/
//! ...
//! ```

use std::path::Path;

use ju_core::Result;
use ju_store::{GroupMut, Store, StoredObject};

use crate::scan::UnfoldingResult;

/// Raw-level group name.
pub const RAW_LEVEL: &str = "rawlevel";
/// Detector-response group name.
pub const DETECTOR_RESPONSE: &str = "detectorresponse";

/// Group key of strength `r` in a scan whose largest strength is `max`.
///
/// Zero-padded to the width of `max`, so key order is numeric order.
pub fn regularization_key(r: usize, max: usize) -> String {
    let width = max.max(r).max(1).to_string().len().max(2);
    format!("regularization{r:0width$}")
}

/// Everything written by one run.
#[derive(Debug, Clone, Default)]
pub struct ResultPackage {
    /// Objects of the raw-level group.
    pub raw_level: Vec<StoredObject>,
    /// Objects of the detector-response group.
    pub detector_response: Vec<StoredObject>,
    /// Completed strengths.
    pub regularizations: Vec<UnfoldingResult>,
}

impl ResultPackage {
    /// Write the namespace into `root`.
    pub fn write_into(&self, root: &mut GroupMut<'_>) -> Result<()> {
        write_group(root, RAW_LEVEL, &self.raw_level)?;
        write_group(root, DETECTOR_RESPONSE, &self.detector_response)?;
        let max = self.regularizations.iter().map(|r| r.strength).max().unwrap_or(1);
        for result in &self.regularizations {
            let key = regularization_key(result.strength, max);
            write_group(root, &key, &result.objects())?;
        }
        Ok(())
    }

    /// Write to a fresh store file at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut store = Store::create(path);
        self.write_into(&mut store.root_mut())?;
        store.save()?;
        tracing::info!(
            path = %path.display(),
            regularizations = self.regularizations.len(),
            "results written"
        );
        Ok(())
    }
}

fn write_group(root: &mut GroupMut<'_>, name: &str, objects: &[StoredObject]) -> Result<()> {
    let mut group = root.mkdir(name)?;
    for obj in objects {
        group.write(obj.clone())?;
    }
    Ok(())
}
