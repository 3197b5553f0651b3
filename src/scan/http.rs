//! Blocking client for the HTTP Observatory v1 API.

use super::{
    retry::{poll, RetryPolicy, Step},
    types::{FetchOutcome, ScanAssessment, ScanState, ScanTestDetail},
    ScanApi,
};
use crate::config::{Config, UnknownStatePolicy};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("unreadable payload: {0}")]
    Payload(String),
}

pub struct ObservatoryClient {
    agent: ureq::Agent,
    base_url: String,
    initiate: RetryPolicy,
    assessment: RetryPolicy,
    test_detail: RetryPolicy,
    unknown_state: UnknownStatePolicy,
}

impl ObservatoryClient {
    pub fn new(cfg: &Config) -> Self {
        let o = &cfg.observatory;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(o.connect_timeout_seconds))
            .timeout_read(Duration::from_secs(o.read_timeout_seconds))
            .timeout_write(Duration::from_secs(o.read_timeout_seconds))
            .build();
        let delay = o.retry_delay();
        Self {
            agent,
            base_url: o.base_url.trim_end_matches('/').to_string(),
            initiate: RetryPolicy::from_attempts(o.initiate_max_attempts.max(1), delay),
            assessment: RetryPolicy::from_attempts(o.assessment_max_attempts, delay),
            test_detail: RetryPolicy::from_attempts(o.test_detail_max_attempts.max(1), delay),
            unknown_state: o.unknown_state,
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn get_json(&self, endpoint: &str, key: &str, value: &str) -> Result<Value, ScanError> {
        match self.agent.get(&self.url(endpoint)).query(key, value).call() {
            Ok(resp) => resp
                .into_json::<Value>()
                .map_err(|e| ScanError::Payload(e.to_string())),
            Err(ureq::Error::Status(code, resp)) => Err(ScanError::Status {
                code,
                body: body_snippet(resp),
            }),
            Err(ureq::Error::Transport(t)) => Err(ScanError::Transport(t.to_string())),
        }
    }

    fn classify_assessment(&self, assessment: ScanAssessment) -> Step<ScanAssessment> {
        match assessment.state {
            ScanState::Finished => Step::Done(assessment),
            ScanState::Failed | ScanState::Aborted => {
                Step::Fail(format!("scan state {:?}", assessment.state))
            }
            s if s.is_in_progress() => Step::Retry(format!("scan state {s:?}")),
            _ => match self.unknown_state {
                UnknownStatePolicy::Fail => Step::Fail("unrecognized scan state".into()),
                UnknownStatePolicy::Retry => Step::Retry("unrecognized scan state".into()),
            },
        }
    }
}

impl ScanApi for ObservatoryClient {
    fn initiate_scan(&self, domain: &str) -> bool {
        let url = self.url("analyze");
        let out = poll(self.initiate, &format!("initiate {domain}"), |_| {
            match self
                .agent
                .post(&url)
                .query("host", domain)
                .send_form(&[("hidden", "true")])
            {
                Ok(resp) => match resp.into_json::<Value>() {
                    Ok(body) => match service_error(&body) {
                        Some(err) => Step::Fail(err),
                        None => Step::Done(()),
                    },
                    Err(e) => Step::Fail(format!("unreadable body: {e}")),
                },
                Err(ureq::Error::Status(code, resp)) => {
                    Step::Fail(format!("HTTP {code}: {}", body_snippet(resp)))
                }
                Err(ureq::Error::Transport(t)) => Step::Retry(t.to_string()),
            }
        });
        match out {
            FetchOutcome::Ready(()) => true,
            FetchOutcome::Failed(reason) => {
                warn!("scan of {domain} rejected: {reason}");
                false
            }
            FetchOutcome::TimedOut { attempts } => {
                warn!("scan of {domain} could not be initiated after {attempts} attempts");
                false
            }
        }
    }

    fn fetch_assessment(&self, domain: &str) -> FetchOutcome<ScanAssessment> {
        poll(self.assessment, &format!("assessment {domain}"), |_| {
            let body = match self.get_json("analyze", "host", domain) {
                Ok(body) => body,
                Err(e) => return Step::Retry(e.to_string()),
            };
            if let Some(err) = service_error(&body) {
                return Step::Fail(err);
            }
            debug!("assessment {domain}: {body}");
            match serde_json::from_value::<ScanAssessment>(body) {
                Ok(a) => self.classify_assessment(a),
                Err(e) => Step::Fail(format!("unexpected assessment payload: {e}")),
            }
        })
    }

    fn fetch_test_detail(&self, domain: &str, scan_id: u64) -> FetchOutcome<ScanTestDetail> {
        let scan = scan_id.to_string();
        poll(self.test_detail, &format!("tests {domain}"), |_| {
            let body = match self.get_json("getScanResults", "scan", &scan) {
                Ok(body) => body,
                Err(e) => return Step::Retry(e.to_string()),
            };
            if let Some(err) = service_error(&body) {
                return Step::Retry(err);
            }
            match serde_json::from_value::<ScanTestDetail>(body) {
                Ok(tests) if tests.is_empty() => Step::Retry("no test results yet".into()),
                Ok(tests) => Step::Done(tests),
                Err(e) => Step::Fail(format!("unexpected test payload: {e}")),
            }
        })
    }
}

/// The service reports business errors as `{"error": "...", "text": "..."}`.
fn service_error(body: &Value) -> Option<String> {
    let err = body.get("error")?;
    let code = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
    match body.get("text").and_then(Value::as_str) {
        Some(text) => Some(format!("{code}: {text}")),
        None => Some(code),
    }
}

fn body_snippet(resp: ureq::Response) -> String {
    resp.into_string()
        .map(|s| s.chars().take(MAX_ERROR_BODY_CHARS).collect())
        .unwrap_or_default()
}
