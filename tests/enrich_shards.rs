mod common;

use common::record;
use observatory_sampler::enrich::{http_server_probe, shard, tag_servers};
use observatory_sampler::store::ResultMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

fn results(n: u32) -> ResultMap {
    (1..=n)
        .map(|rank| {
            let r = record(rank, 50);
            (r.domain.clone(), r)
        })
        .collect()
}

#[test]
fn shards_are_disjoint_and_cover_everything() {
    let shards = shard(results(10), 3);
    assert_eq!(
        shards.iter().map(Vec::len).collect::<Vec<_>>(),
        vec![4, 4, 2]
    );
    let mut seen: Vec<&String> = shards.iter().flatten().map(|(d, _)| d).collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 10);

    assert!(shard(ResultMap::new(), 8).is_empty());
    assert_eq!(shard(results(3), 0).len(), 1);
}

#[test]
fn only_untagged_records_are_probed() {
    let mut input = results(12);
    input
        .get_mut("site1.example")
        .unwrap()
        .assessment
        .response_headers
        .insert("Server".into(), serde_json::json!("already"));

    let probe = |domain: &str| -> Option<String> {
        assert_ne!(domain, "site1.example");
        domain.contains('2').then(|| "nginx/1.25".to_string())
    };
    let (tagged, stats) = tag_servers(input, 4, &probe);

    assert_eq!(tagged.len(), 12);
    assert_eq!(stats.already_tagged, 1);
    assert_eq!(stats.queried, 11);
    // site2, site12
    assert_eq!(stats.tagged, 2);
    assert_eq!(
        tagged["site12.example"].assessment.server_header(),
        Some("nginx/1.25")
    );
    assert_eq!(tagged["site3.example"].assessment.server_header(), None);
    assert_eq!(
        tagged["site1.example"].assessment.server_header(),
        Some("already")
    );
}

#[test]
fn http_probe_reads_server_header_of_error_responses() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            let _ = stream.write_all(
                b"HTTP/1.1 404 Not Found\r\nServer: test-server/0.1\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
        }
    });

    let probe = http_server_probe(Duration::from_secs(2));
    assert_eq!(probe(addr.to_string().as_str()).as_deref(), Some("test-server/0.1"));
}

#[test]
fn http_probe_swallows_connection_failures() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let probe = http_server_probe(Duration::from_secs(1));
    assert_eq!(probe(addr.to_string().as_str()), None);
}
