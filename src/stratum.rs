use crate::config::{AnalysisType, Config};
use serde::{Deserialize, Serialize};

/// Rank predicate that partitions the ranked population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankFilter {
    AtMost(u32),
    Above(u32),
    /// `min <= rank < max`
    Between { min: u32, max: u32 },
}

impl RankFilter {
    pub fn matches(&self, rank: u32) -> bool {
        match *self {
            RankFilter::AtMost(max) => rank <= max,
            RankFilter::Above(min) => rank > min,
            RankFilter::Between { min, max } => rank >= min && rank < max,
        }
    }
}

/// One sampling stratum: which ranks, how many valid results, and where
/// they are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stratum {
    pub name: String,
    pub filter: RankFilter,
    pub target_count: usize,
    pub output_file: String,
}

pub fn plan(cfg: &Config) -> Vec<Stratum> {
    let s = &cfg.sampling;
    match cfg.global.analysis {
        AnalysisType::PopularVsLongtail => vec![
            Stratum {
                name: "top".into(),
                filter: RankFilter::AtMost(s.top_rank_max),
                target_count: s.sample_size_top,
                output_file: cfg.paths.top_results_file.clone(),
            },
            Stratum {
                name: "longtail".into(),
                filter: RankFilter::Above(s.top_rank_max),
                target_count: s.sample_size_longtail,
                output_file: cfg.paths.longtail_results_file.clone(),
            },
        ],
        AnalysisType::RandomSubset => vec![Stratum {
            name: "random_subset".into(),
            filter: RankFilter::Between {
                min: s.rank_range_min,
                max: s.rank_range_max,
            },
            target_count: s.sample_size,
            output_file: cfg.paths.random_subset_file.clone(),
        }],
    }
}
