mod common;

use common::record;
use observatory_sampler::stats::{mean, median, spearman, summarize};
use observatory_sampler::store::ResultMap;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn spearman_handles_monotone_and_degenerate_input() {
    let ranks = [1.0, 2.0, 3.0, 4.0, 5.0];
    assert!(close(spearman(&ranks, &[90.0, 80.0, 70.0, 60.0, 50.0]).unwrap(), -1.0));
    assert!(close(spearman(&ranks, &[1.0, 4.0, 9.0, 16.0, 25.0]).unwrap(), 1.0));
    assert_eq!(spearman(&ranks, &[50.0; 5]), None);
    assert_eq!(spearman(&[1.0], &[2.0]), None);
}

#[test]
fn spearman_uses_average_ranks_for_ties() {
    // ranks of y: [1.5, 1.5, 3, 4]; pearson against [1, 2, 3, 4]
    let rho = spearman(&[1.0, 2.0, 3.0, 4.0], &[10.0, 10.0, 20.0, 30.0]).unwrap();
    assert!(close(rho, 4.5 / (5.0f64.sqrt() * 4.5f64.sqrt())));
}

#[test]
fn mean_and_median() {
    assert_eq!(mean(&[]), None);
    assert_eq!(mean(&[10.0, 20.0]), Some(15.0));
    assert_eq!(median(&[30.0, 10.0, 20.0]), Some(20.0));
    assert_eq!(median(&[40.0, 10.0, 20.0, 30.0]), Some(25.0));
}

#[test]
fn summary_counts_tests_grades_and_servers() {
    let mut results = ResultMap::new();
    for (rank, score) in [(1, 100), (2, 80), (3, 40), (4, 20)] {
        let mut r = record(rank, score);
        if rank <= 3 {
            let server = if rank == 3 { "Apache/2.4" } else { "nginx/1.18.0" };
            r.assessment
                .response_headers
                .insert("server".into(), serde_json::json!(server));
        }
        results.insert(r.domain.clone(), r);
    }
    let s = summarize("top", &results);

    assert_eq!(s.records, 4);
    assert_eq!(s.scored, 4);
    assert_eq!(s.mean_score, Some(60.0));
    assert_eq!(s.median_score, Some(60.0));
    assert!(close(s.rank_score_spearman.unwrap(), -1.0));

    let csp = s
        .test_pass_rates
        .iter()
        .find(|t| t.test == "content-security-policy")
        .unwrap();
    assert_eq!((csp.passed, csp.total), (2, 4));
    assert!(close(csp.rate, 0.5));

    assert_eq!(s.grades.get("B"), Some(&2));
    assert_eq!(s.grades.get("F"), Some(&2));
    assert_eq!(s.servers[0].value, "nginx");
    assert_eq!(s.servers[0].count, 2);
    assert_eq!(s.servers[1].value, "apache");
}

#[test]
fn empty_group_has_no_statistics() {
    let s = summarize("empty", &ResultMap::new());
    assert_eq!(s.records, 0);
    assert_eq!(s.mean_score, None);
    assert_eq!(s.rank_score_spearman, None);
    assert!(s.test_pass_rates.is_empty());
}
