//! Group acquisition: sample a stratum, initiate scans, wait, retrieve, and
//! resample until the target count of complete results is reached.

use crate::{
    config::Config,
    scan::{FetchOutcome, ScanApi},
    source::{DomainRecord, RankedDomainSource},
    store::{ResultMap, ResultRecord},
    stratum::Stratum,
};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Sampling,
    Initiating,
    Waiting,
    Retrieving,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy)]
pub struct AcquisitionSettings {
    pub wait: Duration,
    pub oversample_ratio: f64,
}

impl AcquisitionSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            wait: cfg.observatory.post_initiation_wait(),
            oversample_ratio: cfg.sampling.oversample_ratio,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionStats {
    pub batches: u32,
    pub sampled: usize,
    pub rejected: usize,
    pub incomplete: usize,
    pub missing_tests: usize,
    pub unused: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error(
        "stratum {stratum}: ran out of domains to sample, got {collected} of {target}"
    )]
    SourcePoolExhausted {
        stratum: String,
        collected: usize,
        target: usize,
        partial: ResultMap,
        stats: AcquisitionStats,
        phase: Phase,
    },
}

#[derive(Debug, Clone)]
pub struct AcquisitionOutput {
    pub results: ResultMap,
    pub stats: AcquisitionStats,
    /// Phase the state machine stopped in.
    pub phase: Phase,
}

/// Seed for the `index`-th stratum of a run. Each stratum gets its own
/// generator so strata can run in any order or in parallel.
pub fn stratum_rng(seed: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_add(index as u64))
}

/// Batch size for `remaining` still-needed results.
pub fn oversampled(remaining: usize, ratio: f64) -> usize {
    if remaining == 0 {
        return 0;
    }
    let raw = ((remaining as f64) * ratio.max(1.0) - 1e-9).ceil();
    (raw as usize).max(remaining)
}

pub struct GroupAcquisition<'a, S: ScanApi> {
    source: &'a RankedDomainSource,
    client: S,
    stratum: Stratum,
    settings: AcquisitionSettings,
    rng: StdRng,
    consumed: HashSet<u32>,
    results: ResultMap,
    stats: AcquisitionStats,
    phase: Phase,
}

impl<'a, S: ScanApi> GroupAcquisition<'a, S> {
    pub fn new(
        source: &'a RankedDomainSource,
        client: S,
        stratum: Stratum,
        settings: AcquisitionSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            source,
            client,
            stratum,
            settings,
            rng,
            consumed: HashSet::new(),
            results: ResultMap::new(),
            stats: AcquisitionStats::default(),
            phase: Phase::Sampling,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Ranks drawn so far in this run. Only ever grows.
    pub fn consumed(&self) -> &HashSet<u32> {
        &self.consumed
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
    }

    fn remaining(&self) -> usize {
        self.stratum.target_count.saturating_sub(self.results.len())
    }

    pub fn run(mut self) -> Result<AcquisitionOutput, AcquisitionError> {
        let name = self.stratum.name.clone();
        info!(
            "stratum={} target={} filter={:?}",
            name, self.stratum.target_count, self.stratum.filter
        );

        while self.remaining() > 0 {
            self.enter(Phase::Sampling);
            let batch = self.draw_batch();
            if batch.is_empty() {
                return Err(self.abort());
            }

            self.enter(Phase::Initiating);
            let accepted = self.initiate(batch);

            if accepted.is_empty() {
                info!("stratum={name}: no domains accepted in this batch");
                continue;
            }

            self.enter(Phase::Waiting);
            info!(
                "stratum={name}: waiting {:?} for {} scans to complete",
                self.settings.wait,
                accepted.len()
            );
            std::thread::sleep(self.settings.wait);

            self.enter(Phase::Retrieving);
            self.retrieve(accepted);
            info!(
                "stratum={name}: batch {} done, {}/{} collected",
                self.stats.batches,
                self.results.len(),
                self.stratum.target_count
            );
        }

        self.enter(Phase::Done);
        info!(
            "stratum={name}: done after {} batches, {} sampled",
            self.stats.batches, self.stats.sampled
        );
        Ok(AcquisitionOutput {
            results: self.results,
            stats: self.stats,
            phase: self.phase,
        })
    }

    fn draw_batch(&mut self) -> Vec<DomainRecord> {
        let remaining = self.remaining();
        let want = oversampled(remaining, self.settings.oversample_ratio);
        let filter = self.stratum.filter;
        let batch = self.source.sample(
            |rank| filter.matches(rank),
            want,
            &self.consumed,
            &mut self.rng,
        );
        self.consumed.extend(batch.iter().map(|r| r.rank));
        self.stats.sampled += batch.len();
        if !batch.is_empty() {
            self.stats.batches += 1;
        }
        info!(
            "stratum={}: batch {} drew {} of {} requested ({} still needed)",
            self.stratum.name,
            self.stats.batches,
            batch.len(),
            want,
            remaining
        );
        batch
    }

    fn initiate(&mut self, batch: Vec<DomainRecord>) -> Vec<DomainRecord> {
        let mut accepted = Vec::with_capacity(batch.len());
        for record in batch {
            if self.client.initiate_scan(&record.domain) {
                accepted.push(record);
            } else {
                self.stats.rejected += 1;
            }
        }
        accepted
    }

    fn retrieve(&mut self, accepted: Vec<DomainRecord>) {
        let mut pending = accepted.into_iter();
        for record in pending.by_ref() {
            if self.remaining() == 0 {
                self.stats.unused += 1;
                break;
            }
            if let Some(result) = self.retrieve_one(&record) {
                self.results.insert(record.domain.clone(), result);
            }
        }
        self.stats.unused += pending.count();
    }

    fn retrieve_one(&mut self, record: &DomainRecord) -> Option<ResultRecord> {
        let domain = record.domain.as_str();
        let assessment = match self.client.fetch_assessment(domain) {
            FetchOutcome::Ready(a) => a,
            FetchOutcome::Failed(reason) => {
                warn!("{domain}: scan failed ({reason}), dropping");
                self.stats.incomplete += 1;
                return None;
            }
            FetchOutcome::TimedOut { attempts } => {
                warn!("{domain}: scan not finished after {attempts} polls, dropping");
                self.stats.incomplete += 1;
                return None;
            }
        };
        let Some(scan_id) = assessment.scan_id else {
            warn!("{domain}: finished assessment carries no scan_id, dropping");
            self.stats.incomplete += 1;
            return None;
        };
        let tests = match self.client.fetch_test_detail(domain, scan_id) {
            FetchOutcome::Ready(t) => t,
            FetchOutcome::Failed(reason) => {
                warn!("{domain}: test results unusable ({reason}), dropping");
                self.stats.missing_tests += 1;
                return None;
            }
            FetchOutcome::TimedOut { attempts } => {
                warn!("{domain}: no test results after {attempts} polls, dropping");
                self.stats.missing_tests += 1;
                return None;
            }
        };
        Some(ResultRecord {
            domain: record.domain.clone(),
            tranco_rank: record.rank,
            assessment,
            tests,
        })
    }

    fn abort(mut self) -> AcquisitionError {
        self.enter(Phase::Aborted);
        warn!(
            "stratum={}: ran out of domains to sample, got {} of {}",
            self.stratum.name,
            self.results.len(),
            self.stratum.target_count
        );
        AcquisitionError::SourcePoolExhausted {
            stratum: self.stratum.name,
            collected: self.results.len(),
            target: self.stratum.target_count,
            partial: self.results,
            stats: self.stats,
            phase: self.phase,
        }
    }
}

/// Outcome of one stratum inside a multi-stratum run.
#[derive(Debug)]
pub struct StratumRun {
    pub stratum: Stratum,
    pub outcome: Result<AcquisitionOutput, AcquisitionError>,
}

/// Run every stratum, each with its own generator and exclusion set. With
/// `parallel`, strata run on scoped threads and are joined before returning;
/// the source is shared read-only.
pub fn run_strata<S>(
    source: &RankedDomainSource,
    client: &S,
    strata: &[Stratum],
    settings: AcquisitionSettings,
    seed: u64,
    parallel: bool,
) -> Vec<StratumRun>
where
    S: ScanApi + Sync,
{
    let run_one = |index: usize, stratum: &Stratum| StratumRun {
        stratum: stratum.clone(),
        outcome: GroupAcquisition::new(
            source,
            client,
            stratum.clone(),
            settings,
            stratum_rng(seed, index),
        )
        .run(),
    };

    if !parallel || strata.len() < 2 {
        return strata
            .iter()
            .enumerate()
            .map(|(i, s)| run_one(i, s))
            .collect();
    }

    std::thread::scope(|scope| {
        let run_one = &run_one;
        let handles: Vec<_> = strata
            .iter()
            .enumerate()
            .map(|(i, s)| scope.spawn(move || run_one(i, s)))
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversampling_rounds_up_without_float_drift() {
        assert_eq!(oversampled(5, 1.3), 7);
        assert_eq!(oversampled(10, 1.3), 13);
        assert_eq!(oversampled(1, 1.3), 2);
        assert_eq!(oversampled(3, 1.3), 4);
        assert_eq!(oversampled(0, 1.3), 0);
    }

    #[test]
    fn ratio_below_one_still_covers_remaining() {
        assert_eq!(oversampled(8, 0.5), 8);
    }
}
