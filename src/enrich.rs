//! Fill in missing `Server` response headers by querying each domain over
//! plain HTTP, fanned out over disjoint shards of a result map.

use crate::store::{ResultMap, ResultRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichStats {
    pub already_tagged: usize,
    pub queried: usize,
    pub tagged: usize,
}

impl EnrichStats {
    fn add(&mut self, other: EnrichStats) {
        self.already_tagged += other.already_tagged;
        self.queried += other.queried;
        self.tagged += other.tagged;
    }
}

type Shard = Vec<(String, ResultRecord)>;

/// Split into at most `workers` shards of `len / workers + 1` entries.
pub fn shard(results: ResultMap, workers: usize) -> Vec<Shard> {
    let chunk = results.len() / workers.max(1) + 1;
    let mut shards = Vec::new();
    let mut current = Vec::with_capacity(chunk);
    for entry in results {
        current.push(entry);
        if current.len() == chunk {
            shards.push(std::mem::replace(&mut current, Vec::with_capacity(chunk)));
        }
    }
    if !current.is_empty() {
        shards.push(current);
    }
    shards
}

/// `GET http://<domain>` and report its `Server` header, error statuses
/// included. Any transport failure yields `None`.
pub fn http_server_probe(timeout: Duration) -> impl Fn(&str) -> Option<String> + Sync {
    let agent = ureq::AgentBuilder::new()
        .timeout(timeout)
        .redirects(5)
        .build();
    move |domain: &str| {
        let resp = match agent.get(&format!("http://{domain}")).call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(ureq::Error::Transport(t)) => {
                debug!("{domain}: {t}");
                return None;
            }
        };
        resp.header("Server").map(str::to_string)
    }
}

/// Each worker owns one shard; shards are merged after every worker joins.
pub fn tag_servers<P>(results: ResultMap, workers: usize, probe: &P) -> (ResultMap, EnrichStats)
where
    P: Fn(&str) -> Option<String> + Sync,
{
    let shards = shard(results, workers);
    let finished: Vec<(Shard, EnrichStats)> = std::thread::scope(|scope| {
        let handles: Vec<_> = shards
            .into_iter()
            .enumerate()
            .map(|(id, shard)| scope.spawn(move || tag_shard(id, shard, probe)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });

    let mut merged = ResultMap::new();
    let mut stats = EnrichStats::default();
    for (shard, s) in finished {
        merged.extend(shard);
        stats.add(s);
    }
    (merged, stats)
}

fn tag_shard<P>(id: usize, mut shard: Shard, probe: &P) -> (Shard, EnrichStats)
where
    P: Fn(&str) -> Option<String> + Sync,
{
    info!("worker {id} was assigned {} items", shard.len());
    let total = shard.len();
    let mut stats = EnrichStats::default();
    for (i, (domain, record)) in shard.iter_mut().enumerate() {
        if i % PROGRESS_EVERY == 0 {
            info!(
                "worker {id} is {:.2}% complete",
                (i + 1) as f64 / total as f64 * 100.0
            );
        }
        if record.assessment.server_header().is_some() {
            stats.already_tagged += 1;
            continue;
        }
        stats.queried += 1;
        if let Some(server) = probe(domain) {
            record
                .assessment
                .response_headers
                .insert("server".into(), Value::String(server));
            stats.tagged += 1;
        }
    }
    (shard, stats)
}
