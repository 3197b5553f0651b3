#![allow(dead_code)]

use observatory_sampler::scan::{FetchOutcome, ScanApi, ScanAssessment, ScanTestDetail};
use observatory_sampler::source::{DomainRecord, RankedDomainSource};
use observatory_sampler::store::ResultRecord;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Mutex;

pub fn domain(rank: u32) -> String {
    format!("site{rank}.example")
}

pub fn ranked_source(n: u32) -> RankedDomainSource {
    let records = (1..=n)
        .map(|rank| DomainRecord {
            rank,
            domain: domain(rank),
        })
        .collect();
    RankedDomainSource::from_records(records, n as usize).expect("contiguous ranks")
}

pub fn rank_of(domain: &str) -> u32 {
    domain
        .trim_start_matches("site")
        .trim_end_matches(".example")
        .parse()
        .expect("fixture domain")
}

pub fn finished(score: i64, scan_id: u64) -> ScanAssessment {
    let grade = if score >= 70 { "B" } else { "F" };
    serde_json::from_value(json!({
        "state": "FINISHED",
        "scan_id": scan_id,
        "score": score,
        "grade": grade,
        "response_headers": {},
        "tests_quantity": 2,
    }))
    .expect("assessment fixture")
}

pub fn tests_fixture(csp_pass: bool) -> ScanTestDetail {
    let modifier = if csp_pass { 0 } else { -25 };
    serde_json::from_value(json!({
        "content-security-policy": {
            "pass": csp_pass,
            "expectation": "csp-implemented-with-no-unsafe",
            "score_modifier": modifier,
        },
        "x-frame-options": {
            "pass": true,
            "expectation": "x-frame-options-sameorigin-or-deny",
        },
    }))
    .expect("tests fixture")
}

pub fn record(rank: u32, score: i64) -> ResultRecord {
    ResultRecord {
        domain: domain(rank),
        tranco_rank: rank,
        assessment: finished(score, rank as u64),
        tests: tests_fixture(score >= 50),
    }
}

/// In-memory scanner with per-rank scripted behaviour.
#[derive(Default)]
pub struct ScriptedScanner {
    pub rejected: HashSet<u32>,
    pub assessment_fails: HashSet<u32>,
    pub tests_time_out: HashSet<u32>,
    pub initiated: Mutex<Vec<String>>,
    pub retrieved: Mutex<Vec<String>>,
}

impl ScriptedScanner {
    pub fn initiated(&self) -> Vec<String> {
        self.initiated.lock().unwrap().clone()
    }
}

impl ScanApi for ScriptedScanner {
    fn initiate_scan(&self, domain: &str) -> bool {
        self.initiated.lock().unwrap().push(domain.to_string());
        !self.rejected.contains(&rank_of(domain))
    }

    fn fetch_assessment(&self, domain: &str) -> FetchOutcome<ScanAssessment> {
        self.retrieved.lock().unwrap().push(domain.to_string());
        let rank = rank_of(domain);
        if self.assessment_fails.contains(&rank) {
            return FetchOutcome::Failed("scan state Aborted".into());
        }
        FetchOutcome::Ready(finished(100 - (rank as i64 % 100), rank as u64))
    }

    fn fetch_test_detail(&self, domain: &str, _scan_id: u64) -> FetchOutcome<ScanTestDetail> {
        if self.tests_time_out.contains(&rank_of(domain)) {
            return FetchOutcome::TimedOut { attempts: 5 };
        }
        FetchOutcome::Ready(tests_fixture(true))
    }
}
