use crate::{
    scan::{ScanAssessment, ScanTestDetail},
    util::ensure_parent,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// A domain for which both the assessment and its test breakdown were
/// obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub domain: String,
    pub tranco_rank: u32,
    pub assessment: ScanAssessment,
    pub tests: ScanTestDetail,
}

/// Domain to complete result.
pub type ResultMap = BTreeMap<String, ResultRecord>;

pub fn save(results: &ResultMap, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    info!("writing {} results to {}", results.len(), path.display());
    let raw = serde_json::to_vec(results)?;
    std::fs::write(path, raw).with_context(|| format!("write results: {}", path.display()))
}

pub fn load(path: &Path) -> Result<ResultMap> {
    let raw = std::fs::read(path).with_context(|| format!("read results: {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parse results: {}", path.display()))
}

/// Union of two maps; entries of `b` win on key collisions.
pub fn merge(a: &ResultMap, b: &ResultMap) -> ResultMap {
    let mut merged = a.clone();
    merged.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
