//! Descriptive statistics over stored result maps.

use crate::store::ResultMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group: String,
    pub records: usize,
    pub scored: usize,
    pub mean_score: Option<f64>,
    pub median_score: Option<f64>,
    /// Spearman correlation between tranco rank and score.
    pub rank_score_spearman: Option<f64>,
    pub test_pass_rates: Vec<TestPassRate>,
    pub grades: BTreeMap<String, usize>,
    pub servers: Vec<Frequency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPassRate {
    pub test: String,
    pub passed: usize,
    pub total: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frequency {
    pub value: String,
    pub count: usize,
}

pub fn summarize(group: &str, results: &ResultMap) -> GroupSummary {
    let pairs: Vec<(f64, f64)> = results
        .values()
        .filter_map(|r| r.assessment.score.map(|s| (r.tranco_rank as f64, s as f64)))
        .collect();
    let ranks: Vec<f64> = pairs.iter().map(|p| p.0).collect();
    let scores: Vec<f64> = pairs.iter().map(|p| p.1).collect();

    let mut tests: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    let mut grades: BTreeMap<String, usize> = BTreeMap::new();
    let mut servers: BTreeMap<String, usize> = BTreeMap::new();
    for r in results.values() {
        for (name, t) in &r.tests {
            let e = tests.entry(name.as_str()).or_insert((0, 0));
            e.1 += 1;
            if t.pass {
                e.0 += 1;
            }
        }
        if let Some(g) = r.assessment.grade.as_deref() {
            *grades.entry(g.to_string()).or_insert(0) += 1;
        }
        if let Some(s) = r.assessment.server_header().and_then(server_product) {
            *servers.entry(s).or_insert(0) += 1;
        }
    }

    let mut servers: Vec<Frequency> = servers
        .into_iter()
        .map(|(value, count)| Frequency { value, count })
        .collect();
    servers.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));

    GroupSummary {
        group: group.to_string(),
        records: results.len(),
        scored: scores.len(),
        mean_score: mean(&scores),
        median_score: median(&scores),
        rank_score_spearman: spearman(&ranks, &scores),
        test_pass_rates: tests
            .into_iter()
            .map(|(test, (passed, total))| TestPassRate {
                test: test.to_string(),
                passed,
                total,
                rate: passed as f64 / total as f64,
            })
            .collect(),
        grades,
        servers,
    }
}

/// `nginx/1.18.0 (Ubuntu)` -> `nginx`
fn server_product(raw: &str) -> Option<String> {
    let token = raw
        .split(|c: char| c == '/' || c.is_whitespace())
        .find(|t| !t.is_empty())?;
    Some(token.to_ascii_lowercase())
}

pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    Some(xs.iter().sum::<f64>() / xs.len() as f64)
}

pub fn median(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    let mut v = xs.to_vec();
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) / 2.0)
    } else {
        Some(v[mid])
    }
}

/// Spearman rank correlation with average ranks for ties. `None` for fewer
/// than two pairs or when either side is constant.
pub fn spearman(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    pearson(&average_ranks(xs), &average_ranks(ys))
}

fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let (mut cov, mut vx, mut vy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mx, y - my);
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

/// 1-based ranks; tied values share the mean of the ranks they span.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_share_average_rank() {
        assert_eq!(average_ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn server_product_strips_version() {
        assert_eq!(server_product("nginx/1.18.0 (Ubuntu)").as_deref(), Some("nginx"));
        assert_eq!(server_product("  cloudflare").as_deref(), Some("cloudflare"));
        assert_eq!(server_product("   "), None);
    }
}
