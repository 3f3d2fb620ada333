#![cfg(test)]
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use frontscan_common::config::ScanConfig;
use frontscan_common::network::range::IpCollection;
use frontscan_common::network::token;
use frontscan_common::record::{Category, ProbeRecord};
use frontscan_core::classify::Classifier;
use frontscan_core::export::{self, EXPORT_FILE, ExportOptions};
use frontscan_core::probe::{Handshake, ProbeError};
use frontscan_core::scanner::{self, Scanner};
use frontscan_core::store::{FAILED_FILE, REJECTED_FILE, ResultStore, SUCCESS_FILE};
use frontscan_integration_tests::{ScriptedProber, handshake, lines, v4};

fn always_google(_: IpAddr) -> Result<Handshake, ProbeError> {
    Ok(handshake(30, "*.google.com", "Google LLC"))
}

fn google_config(pool_size: Option<usize>) -> ScanConfig {
    ScanConfig {
        organizations: vec!["Google LLC".into()],
        gws_domains: vec!["*.google.com".into()],
        pool_enabled: pool_size.is_some(),
        pool_size: pool_size.unwrap_or(100),
        ..ScanConfig::default()
    }
}

/// Eight probes complete together while only three successes fit in the pool.
#[tokio::test]
async fn pool_cap_records_exactly_three() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(ResultStore::new(dir.path()));
    let cfg = google_config(Some(3));

    let prober = Arc::new(ScriptedProber::new(always_google).with_gate(8));
    let scanner = Scanner::new(
        prober.clone(),
        Classifier::from_config(&cfg),
        store.clone(),
        8,
        cfg.success_cap(),
    );

    let targets: Vec<IpAddr> = (1..=100).map(|d| v4(10, 0, 0, d)).collect();
    let summary = scanner.run(targets).await;

    assert_eq!(summary.success, 3);
    assert!(summary.dropped >= 5, "only {} probes dropped", summary.dropped);
    assert!(prober.calls() < 100, "run did not stop early");
    assert_eq!(lines(dir.path(), SUCCESS_FILE).len(), 3);
    assert!(lines(dir.path(), REJECTED_FILE).is_empty());
    assert!(lines(dir.path(), FAILED_FILE).is_empty());
    Ok(())
}

#[tokio::test]
async fn uncapped_run_records_every_success() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(ResultStore::new(dir.path()));
    let cfg = google_config(None);

    let prober = Arc::new(ScriptedProber::new(always_google).with_latency(Duration::from_millis(1)));
    let scanner = Scanner::new(prober, Classifier::from_config(&cfg), store.clone(), 16, cfg.success_cap());

    let mut ranges = IpCollection::new();
    token::extend_collection("# edge block\n10.1.0.0/28\n10.1.0.1\n", &mut ranges);
    let summary = scanner.run(scanner::plan_targets(ranges, None)).await;

    assert_eq!(summary.queued, 14);
    assert_eq!(summary.success, 14);
    assert_eq!(store.load_successes().await?.len(), 14);
    Ok(())
}

fn acme(addr: IpAddr) -> Result<Handshake, ProbeError> {
    let delay: u64 = match addr {
        IpAddr::V4(v4) if v4.octets()[3] == 1 => 80,
        IpAddr::V4(v4) if v4.octets()[3] == 2 => 150,
        _ => return Err(ProbeError::DialTimeout),
    };
    Ok(handshake(delay, "edge.example.com", "Acme"))
}

#[tokio::test]
async fn edge_prefix_match_then_export_threshold() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(ResultStore::new(dir.path()));
    let cfg = ScanConfig::from_json(
        r#"{
            // hand-edited
            "organization": ["Acme"],
            "gws": ["edge."],
            "delay": 100,
            "match_dns_names": true,
        }"#,
    )?;

    let scanner = Scanner::new(
        Arc::new(ScriptedProber::new(acme)),
        Classifier::from_config(&cfg),
        store.clone(),
        cfg.concurrency,
        cfg.success_cap(),
    );
    let summary = scanner.run(vec![v4(10, 9, 0, 1), v4(10, 9, 0, 2), v4(10, 9, 0, 3)]).await;
    assert_eq!((summary.success, summary.failed), (2, 1));

    let map = store.load_successes().await?;
    let recorded: &ProbeRecord = map.get(&v4(10, 9, 0, 1)).expect("recorded");
    assert_eq!(recorded.common_name, "edge.example.com");
    assert_eq!(recorded.category, Category::Gws);
    assert_eq!(lines(dir.path(), FAILED_FILE), vec!["10.9.0.3 -ms   -"]);

    let out = export::export(&store, dir.path(), &ExportOptions::from_config(&cfg)).await?;
    assert_eq!(out.pipe_list, "10.9.0.1");
    assert_eq!(out.gws, 1);
    assert_eq!(
        std::fs::read_to_string(dir.path().join(EXPORT_FILE))?,
        "10.9.0.1\n\n\"10.9.0.1\""
    );

    let mut wider = ExportOptions::from_config(&cfg);
    wider.max_delay = 150;
    assert_eq!(export::export(&store, dir.path(), &wider).await?.pipe_list, "10.9.0.1|10.9.0.2");
    Ok(())
}

#[tokio::test]
async fn recheck_probes_previous_successes_first() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(ResultStore::new(dir.path()));
    let cfg = google_config(None);

    let first = Scanner::new(
        Arc::new(ScriptedProber::new(always_google)),
        Classifier::from_config(&cfg),
        store.clone(),
        4,
        None,
    );
    first.run(vec![v4(10, 2, 0, 7)]).await;

    let mut ranges = IpCollection::new();
    ranges.extend([v4(10, 2, 0, 1), v4(10, 2, 0, 7)]);
    let previous = store.load_successes().await?;
    let targets = scanner::plan_targets(ranges, Some(&previous));
    let order: Vec<IpAddr> = targets.clone().into_iter().collect();
    assert_eq!(order, vec![v4(10, 2, 0, 7), v4(10, 2, 0, 1)]);

    let second = Scanner::new(
        Arc::new(ScriptedProber::new(always_google)),
        Classifier::from_config(&cfg),
        store.clone(),
        4,
        None,
    );
    second.run(targets).await;

    assert_eq!(lines(dir.path(), SUCCESS_FILE).len(), 3);
    assert_eq!(store.load_successes().await?.len(), 2);
    Ok(())
}
