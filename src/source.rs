//! The ranked domain list (Tranco top-N) and seeded sampling over it.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub rank: u32,
    pub domain: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceFormatError {
    #[error("reading dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("dataset archive: {0}")]
    Archive(String),
    #[error("line {line}: expected `rank,domain`, got {content:?}")]
    MalformedRow { line: usize, content: String },
    #[error("line {line}: expected rank {expected}, found {found}")]
    RankGap {
        line: usize,
        expected: u32,
        found: u32,
    },
    #[error("expected {expected} ranked domains, found {found}")]
    CountMismatch { expected: usize, found: usize },
    #[error("dataset is empty")]
    Empty,
}

/// Immutable, contiguously ranked domain collection. Ranks run `1..=len()`
/// and `records[i].rank == i + 1`.
#[derive(Debug, Clone)]
pub struct RankedDomainSource {
    records: Vec<DomainRecord>,
}

impl RankedDomainSource {
    /// Load `entry` from the zip archive at `zip_path`.
    pub fn load(
        zip_path: &Path,
        entry: &str,
        expected_count: usize,
    ) -> Result<Self, SourceFormatError> {
        let file = File::open(zip_path)?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|err| SourceFormatError::Archive(err.to_string()))?;
        let csv = archive
            .by_name(entry)
            .map_err(|err| SourceFormatError::Archive(format!("{entry}: {err}")))?;
        let source = Self::from_reader(BufReader::new(csv), expected_count)?;
        info!(
            "loaded {} ranked domains from {}",
            source.len(),
            zip_path.display()
        );
        Ok(source)
    }

    /// Parse a headerless `rank,domain` table.
    pub fn from_reader<R: BufRead>(
        reader: R,
        expected_count: usize,
    ) -> Result<Self, SourceFormatError> {
        let mut records = Vec::with_capacity(expected_count);
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim_end_matches('\r');
            if trimmed.is_empty() {
                continue;
            }
            let line_no = idx + 1;
            let malformed = || SourceFormatError::MalformedRow {
                line: line_no,
                content: trimmed.to_string(),
            };
            let (rank, domain) = trimmed.split_once(',').ok_or_else(malformed)?;
            let rank: u32 = rank.trim().parse().map_err(|_| malformed())?;
            let domain = domain.trim();
            if domain.is_empty() || domain.contains(',') {
                return Err(malformed());
            }
            let expected = records.len() as u32 + 1;
            if rank != expected {
                return Err(SourceFormatError::RankGap {
                    line: line_no,
                    expected,
                    found: rank,
                });
            }
            records.push(DomainRecord {
                rank,
                domain: domain.to_string(),
            });
        }
        Self::from_records(records, expected_count)
    }

    pub fn from_records(
        records: Vec<DomainRecord>,
        expected_count: usize,
    ) -> Result<Self, SourceFormatError> {
        if records.is_empty() {
            return Err(SourceFormatError::Empty);
        }
        for (i, r) in records.iter().enumerate() {
            let expected = i as u32 + 1;
            if r.rank != expected {
                return Err(SourceFormatError::RankGap {
                    line: i + 1,
                    expected,
                    found: r.rank,
                });
            }
        }
        if expected_count > 0 && records.len() != expected_count {
            return Err(SourceFormatError::CountMismatch {
                expected: expected_count,
                found: records.len(),
            });
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, rank: u32) -> Option<&DomainRecord> {
        let idx = (rank as usize).checked_sub(1)?;
        self.records.get(idx)
    }

    pub fn records(&self) -> &[DomainRecord] {
        &self.records
    }

    pub fn eligible_count<P>(&self, predicate: P, exclude: &HashSet<u32>) -> usize
    where
        P: Fn(u32) -> bool,
    {
        self.records
            .iter()
            .filter(|r| predicate(r.rank) && !exclude.contains(&r.rank))
            .count()
    }

    /// Draw up to `count` records whose rank satisfies `predicate` and is not
    /// in `exclude`, without replacement. Returns fewer when the eligible pool
    /// runs dry. The same rng state over the same source yields the same draw.
    pub fn sample<P, R>(
        &self,
        predicate: P,
        count: usize,
        exclude: &HashSet<u32>,
        rng: &mut R,
    ) -> Vec<DomainRecord>
    where
        P: Fn(u32) -> bool,
        R: Rng + ?Sized,
    {
        let eligible: Vec<&DomainRecord> = self
            .records
            .iter()
            .filter(|r| predicate(r.rank) && !exclude.contains(&r.rank))
            .collect();
        let amount = count.min(eligible.len());
        if amount == 0 {
            return Vec::new();
        }
        rand::seq::index::sample(rng, eligible.len(), amount)
            .into_iter()
            .map(|i| eligible[i].clone())
            .collect()
    }
}
