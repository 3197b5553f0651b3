mod common;

use common::ranked_source;
use observatory_sampler::source::{RankedDomainSource, SourceFormatError};
use rand::{SeedableRng, rngs::StdRng};
use std::collections::HashSet;
use std::io::{Cursor, Write};

fn parse(raw: &str, expected: usize) -> Result<RankedDomainSource, SourceFormatError> {
    RankedDomainSource::from_reader(Cursor::new(raw), expected)
}

#[test]
fn parses_headerless_rank_domain_rows() {
    let source = parse("1,google.com\n2,facebook.com\r\n3,example.org\n", 3).unwrap();
    assert_eq!(source.len(), 3);
    assert_eq!(source.get(2).unwrap().domain, "facebook.com");
    assert!(source.get(0).is_none());
    assert!(source.get(4).is_none());
}

#[test]
fn rank_gaps_and_duplicates_are_fatal() {
    assert!(matches!(
        parse("1,a.com\n3,b.com\n", 0),
        Err(SourceFormatError::RankGap { expected: 2, found: 3, .. })
    ));
    assert!(matches!(
        parse("1,a.com\n1,b.com\n", 0),
        Err(SourceFormatError::RankGap { expected: 2, found: 1, .. })
    ));
    assert!(matches!(
        parse("2,a.com\n", 0),
        Err(SourceFormatError::RankGap { expected: 1, .. })
    ));
}

#[test]
fn count_mismatch_is_fatal() {
    assert!(matches!(
        parse("1,a.com\n2,b.com\n", 1_000_000),
        Err(SourceFormatError::CountMismatch { expected: 1_000_000, found: 2 })
    ));
    assert!(matches!(parse("", 0), Err(SourceFormatError::Empty)));
}

#[test]
fn malformed_rows_are_fatal() {
    assert!(matches!(
        parse("rank,domain\n1,a.com\n", 0),
        Err(SourceFormatError::MalformedRow { line: 1, .. })
    ));
    assert!(matches!(
        parse("1,a.com\n2\n", 0),
        Err(SourceFormatError::MalformedRow { line: 2, .. })
    ));
}

#[test]
fn loads_named_entry_from_zip_archive() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("tranco.csv.zip");
    {
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        zip.start_file("top-1m.csv", options).unwrap();
        for rank in 1..=25u32 {
            writeln!(zip, "{rank},site{rank}.example").unwrap();
        }
        zip.finish().unwrap();
    }

    let source = RankedDomainSource::load(&zip_path, "top-1m.csv", 25).unwrap();
    assert_eq!(source.len(), 25);
    assert_eq!(source.get(25).unwrap().domain, "site25.example");

    assert!(matches!(
        RankedDomainSource::load(&zip_path, "missing.csv", 25),
        Err(SourceFormatError::Archive(_))
    ));
    assert!(matches!(
        RankedDomainSource::load(&zip_path, "top-1m.csv", 26),
        Err(SourceFormatError::CountMismatch { .. })
    ));
}

#[test]
fn sampling_is_seeded_filtered_and_without_replacement() {
    let source = ranked_source(1000);
    let none = HashSet::new();
    let draw = |seed| {
        let mut rng = StdRng::seed_from_u64(seed);
        source.sample(|r| r <= 100, 30, &none, &mut rng)
    };

    let a = draw(12345);
    assert_eq!(a, draw(12345));
    assert_eq!(a.len(), 30);
    assert!(a.iter().all(|r| r.rank <= 100));
    let unique: HashSet<u32> = a.iter().map(|r| r.rank).collect();
    assert_eq!(unique.len(), 30);
}

#[test]
fn sampling_skips_excluded_and_returns_short_when_exhausted() {
    let source = ranked_source(50);
    let exclude: HashSet<u32> = (1..=8).collect();
    let mut rng = StdRng::seed_from_u64(1);

    let picked = source.sample(|r| r <= 10, 5, &exclude, &mut rng);
    let ranks: HashSet<u32> = picked.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, [9, 10].into_iter().collect());
    assert_eq!(source.eligible_count(|r| r <= 10, &exclude), 2);

    let all: HashSet<u32> = (1..=10).collect();
    assert!(source.sample(|r| r <= 10, 5, &all, &mut rng).is_empty());
}
