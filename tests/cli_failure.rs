use observatory_sampler::cli::{failure_sink, report_failure, FailureSink};

// Single test: the global subscriber can only be installed once per binary.
#[test]
fn failures_go_to_stderr_until_a_subscriber_is_installed() {
    assert_eq!(failure_sink(), FailureSink::Stderr);
    report_failure(&anyhow::anyhow!("config missing"));

    tracing_subscriber::fmt()
        .with_writer(std::io::sink)
        .try_init()
        .unwrap();
    assert_eq!(failure_sink(), FailureSink::Log);
    report_failure(&anyhow::anyhow!("stratum aborted"));
}
