use crate::{
    acquisition::AcquisitionStats,
    config::AnalysisType,
    stratum::RankFilter,
};
use serde::{Deserialize, Serialize};

/// Written next to the result files after every `collect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub started: String,
    pub finished: String,
    pub analysis: AnalysisType,
    pub seed: u64,
    pub dataset_sha256: String,
    pub config_sha256: String,
    pub strata: Vec<StratumReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StratumStatus {
    Done,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumReport {
    pub name: String,
    pub filter: RankFilter,
    pub status: StratumStatus,
    pub target: usize,
    pub collected: usize,
    pub stats: AcquisitionStats,
    /// Absent when the stratum aborted and nothing was written.
    pub output: Option<String>,
}
