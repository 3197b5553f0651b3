pub mod http;
pub mod retry;
pub mod types;

pub use http::ObservatoryClient;
pub use types::{FetchOutcome, ScanAssessment, ScanState, ScanTestDetail, TestResult};

/// The three calls the acquisition loop makes against the scanning service.
pub trait ScanApi {
    /// `true` when the service accepted the host for scanning.
    fn initiate_scan(&self, domain: &str) -> bool;
    fn fetch_assessment(&self, domain: &str) -> FetchOutcome<ScanAssessment>;
    fn fetch_test_detail(&self, domain: &str, scan_id: u64) -> FetchOutcome<ScanTestDetail>;
}

impl<T: ScanApi + ?Sized> ScanApi for &T {
    fn initiate_scan(&self, domain: &str) -> bool {
        (**self).initiate_scan(domain)
    }

    fn fetch_assessment(&self, domain: &str) -> FetchOutcome<ScanAssessment> {
        (**self).fetch_assessment(domain)
    }

    fn fetch_test_detail(&self, domain: &str, scan_id: u64) -> FetchOutcome<ScanTestDetail> {
        (**self).fetch_test_detail(domain, scan_id)
    }
}
