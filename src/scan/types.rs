use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanState {
    Pending,
    Starting,
    Running,
    Finished,
    Failed,
    Aborted,
    #[serde(other)]
    Unrecognized,
}

impl ScanState {
    pub fn is_in_progress(self) -> bool {
        matches!(self, ScanState::Pending | ScanState::Starting | ScanState::Running)
    }
}

/// Body of `GET /analyze`. Fields not named here are kept verbatim in
/// `extra` so the stored record matches what the service returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanAssessment {
    pub state: ScanState,
    #[serde(default)]
    pub scan_id: Option<u64>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub grade: Option<String>,
    /// `null` until the scan finishes.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub response_headers: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ScanAssessment {
    pub fn server_header(&self) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("server"))
            .and_then(|(_, v)| v.as_str())
    }
}

/// One entry of `GET /getScanResults`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub pass: bool,
    pub expectation: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub score_modifier: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Test name to outcome.
pub type ScanTestDetail = BTreeMap<String, TestResult>;

/// Result of one bounded poll against the scanner.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Ready(T),
    /// The service answered with a terminal, non-successful state.
    Failed(String),
    /// The attempt budget ran out before a usable answer arrived.
    TimedOut { attempts: u32 },
}

impl<T> FetchOutcome<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            FetchOutcome::Ready(v) => Some(v),
            _ => None,
        }
    }
}
