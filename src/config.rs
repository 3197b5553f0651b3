use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub dataset: Dataset,
    #[serde(default)]
    pub sampling: Sampling,
    #[serde(default)]
    pub observatory: Observatory,
    #[serde(default)]
    pub enrich: Enrich,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }

    pub fn results_path(&self, file_name: &str) -> PathBuf {
        Path::new(&self.paths.results_dir).join(file_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// Top `top_rank_max` sites against everything ranked below them.
    PopularVsLongtail,
    /// One uniform sample over `[rank_range_min, rank_range_max)`.
    RandomSubset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub analysis: AnalysisType,
    pub seed: u64,
    pub parallel_strata: bool,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            analysis: AnalysisType::PopularVsLongtail,
            seed: 12345,
            parallel_strata: true,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub dataset_zip: String,
    pub dataset_entry: String,
    pub results_dir: String,
    pub top_results_file: String,
    pub longtail_results_file: String,
    pub random_subset_file: String,
    pub manifest_file: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            dataset_zip: "tranco_36PL-1m.csv.zip".into(),
            dataset_entry: "top-1m.csv".into(),
            results_dir: "results".into(),
            top_results_file: "top_sites_results.json".into(),
            longtail_results_file: "longtail_sites_results.json".into(),
            random_subset_file: "results.json".into(),
            manifest_file: "run-manifest.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Number of ranked rows the archive must hold; 0 only checks contiguity.
    pub expected_count: usize,
}
impl Default for Dataset {
    fn default() -> Self {
        Self {
            expected_count: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sampling {
    pub top_rank_max: u32,
    pub sample_size_top: usize,
    pub sample_size_longtail: usize,
    pub rank_range_min: u32,
    pub rank_range_max: u32,
    pub sample_size: usize,
    pub oversample_ratio: f64,
}
impl Default for Sampling {
    fn default() -> Self {
        Self {
            top_rank_max: 10_000,
            sample_size_top: 250,
            sample_size_longtail: 250,
            rank_range_min: 1,
            rank_range_max: 1_000_000,
            sample_size: 10_000,
            oversample_ratio: 1.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownStatePolicy {
    Fail,
    Retry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observatory {
    pub base_url: String,
    pub post_initiation_wait_seconds: u64,
    pub retry_delay_ms: u64,
    pub initiate_max_attempts: u32,
    /// 0 polls until the scan leaves the pending states.
    pub assessment_max_attempts: u32,
    pub test_detail_max_attempts: u32,
    pub unknown_state: UnknownStatePolicy,
    pub connect_timeout_seconds: u64,
    pub read_timeout_seconds: u64,
}
impl Default for Observatory {
    fn default() -> Self {
        Self {
            base_url: "https://http-observatory.security.mozilla.org/api/v1".into(),
            post_initiation_wait_seconds: 120,
            retry_delay_ms: 500,
            initiate_max_attempts: 3,
            assessment_max_attempts: 5,
            test_detail_max_attempts: 5,
            unknown_state: UnknownStatePolicy::Fail,
            connect_timeout_seconds: 10,
            read_timeout_seconds: 30,
        }
    }
}

impl Observatory {
    pub fn post_initiation_wait(&self) -> Duration {
        Duration::from_secs(self.post_initiation_wait_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrich {
    pub workers: usize,
    pub request_timeout_seconds: u64,
    pub output_suffix: String,
}
impl Default for Enrich {
    fn default() -> Self {
        Self {
            workers: 8,
            request_timeout_seconds: 2,
            output_suffix: "-temp".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: true,
        }
    }
}
