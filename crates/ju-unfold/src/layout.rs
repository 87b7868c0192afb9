//! On-disk layout of the analysis inputs and output names.

use std::path::{Path, PathBuf};

use ju_core::{Error, Result};

/// Directory holding the 2017 data and its luminosity monitor.
pub const DATA_2017: &str = "data/merged_17";
/// Directory holding the combined 2016+2017 data (minimum-bias trigger).
pub const DATA_1617: &str = "data/merged_1617";
/// Directory holding the merged simulation.
pub const MC_DIR: &str = "mc/merged_calo";
/// Analysis output holding luminosity and counter histograms.
pub const ANALYSIS_RESULTS: &str = "AnalysisResults_split.json";
/// Trigger whose group carries the luminosity monitor.
pub const LUMI_TRIGGER: &str = "INT7";
/// Trigger whose group carries the cluster counter and CENTNOTRD tree.
pub const CENTNOTRD_TRIGGER: &str = "EJ1";

/// `RR` tag of a jet radius: `round(R × 10)` on two digits.
pub fn radius_tag(radius: f64) -> Result<String> {
    let tag = (radius * 10.0).round();
    if !(radius.is_finite() && radius > 0.0 && (1.0..100.0).contains(&tag)) {
        return Err(Error::Validation(format!("unsupported jet radius {radius}")));
    }
    Ok(format!("{:02}", tag as u32))
}

/// Whether a stored table is a jet-substructure tree.
pub fn is_jet_tree(name: &str) -> bool {
    name.contains("JetSubstructure") || name.contains("jetSubstructure")
}

/// Paths of one input directory for a given radius tag and pT cut.
#[derive(Debug, Clone)]
pub struct DataLayout {
    base: PathBuf,
    tag: String,
    pt_cut: u32,
}

impl DataLayout {
    /// Layout rooted at `base` for jets of radius `radius` above `pt_cut`.
    pub fn new(base: impl AsRef<Path>, radius: f64, pt_cut: u32) -> Result<Self> {
        Ok(Self { base: base.as_ref().to_path_buf(), tag: radius_tag(radius)?, pt_cut })
    }

    /// Radius tag (`RR`).
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Output file name of the 1D correction chain.
    pub fn output_name(&self) -> String {
        format!("corrected1DSVD_R{}_pt{}.json", self.tag, self.pt_cut)
    }

    /// File with the luminosity monitor and cluster counters.
    pub fn lumi_file(&self) -> PathBuf {
        self.base.join(DATA_2017).join(ANALYSIS_RESULTS)
    }

    /// File with the per-trigger event counters.
    pub fn counts_file(&self) -> PathBuf {
        self.base.join(DATA_1617).join(ANALYSIS_RESULTS)
    }

    /// Group of `trigger` for jets of radius tag `tag`.
    pub fn group_name(&self, tag: &str, trigger: &str) -> String {
        format!("JetSubstructure_FullJets_R{tag}_{trigger}_pt{}", self.pt_cut)
    }

    /// Group holding `hLumiMonitor` (always the R = 0.2 minimum-bias task).
    pub fn lumi_group(&self) -> String {
        self.group_name("02", LUMI_TRIGGER)
    }

    /// Group holding `hTriggerClusterCounter`.
    pub fn cluster_group(&self) -> String {
        self.group_name(&self.tag, CENTNOTRD_TRIGGER)
    }

    /// Group holding `hEventCounter` of `trigger`.
    pub fn counter_group(&self, trigger: &str) -> String {
        self.group_name("02", trigger)
    }

    /// Data tree of `trigger`; the reference trigger is read from the
    /// combined 2016+2017 sample.
    pub fn data_tree(&self, trigger: &str, reference: bool) -> PathBuf {
        let dir = if reference { DATA_1617 } else { DATA_2017 };
        self.base.join(dir).join(self.tree_name(trigger, ""))
    }

    /// Data tree used by the CENTNOTRD spectrum-ratio fallback.
    pub fn centnotrd_tree(&self) -> PathBuf {
        self.data_tree(CENTNOTRD_TRIGGER, false)
    }

    /// Simulation tree of `trigger`.
    pub fn mc_tree(&self, trigger: &str) -> PathBuf {
        self.base.join(MC_DIR).join(self.tree_name(trigger, "_merged"))
    }

    fn tree_name(&self, trigger: &str, suffix: &str) -> String {
        format!("JetSubstructureTree_FullJets_R{}_{trigger}_pt{}{suffix}.json", self.tag, self.pt_cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_tag() {
        assert_eq!(radius_tag(0.2).unwrap(), "02");
        assert_eq!(radius_tag(0.35000000001).unwrap(), "04");
        assert_eq!(radius_tag(1.2).unwrap(), "12");
        assert!(radius_tag(0.0).is_err());
        assert!(radius_tag(f64::NAN).is_err());
        assert!(radius_tag(0.01).is_err());
    }

    #[test]
    fn test_paths() {
        let l = DataLayout::new("/in", 0.4, 20).unwrap();
        assert_eq!(l.output_name(), "corrected1DSVD_R04_pt20.json");
        assert_eq!(l.lumi_file(), PathBuf::from("/in/data/merged_17/AnalysisResults_split.json"));
        assert_eq!(l.lumi_group(), "JetSubstructure_FullJets_R02_INT7_pt20");
        assert_eq!(l.cluster_group(), "JetSubstructure_FullJets_R04_EJ1_pt20");
        assert_eq!(l.counter_group("EJ2"), "JetSubstructure_FullJets_R02_EJ2_pt20");
        assert_eq!(
            l.data_tree("INT7", true),
            PathBuf::from("/in/data/merged_1617/JetSubstructureTree_FullJets_R04_INT7_pt20.json")
        );
        assert_eq!(
            l.mc_tree("EJ1"),
            PathBuf::from("/in/mc/merged_calo/JetSubstructureTree_FullJets_R04_EJ1_pt20_merged.json")
        );
        assert!(is_jet_tree("jetSubstructureMerged"));
        assert!(!is_jet_tree("hEventCounter"));
    }
}
