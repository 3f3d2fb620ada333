use std::sync::Arc;

use anyhow::Context;
use tracing::{Instrument, info_span};

use frontscan_common::config::RANGE_FILE;
use frontscan_common::network::range::IpCollection;
use frontscan_common::network::token;
use frontscan_common::success;
use frontscan_core::classify::Classifier;
use frontscan_core::probe::{Outcome, TlsProber};
use frontscan_core::scanner::{self, ScanSummary, Scanner};

use crate::commands::{Session, bandwidth, export};
use crate::mprint;
use crate::terminal::{format, print, progress::PhaseProgress};

pub async fn scan(session: &Session) -> anyhow::Result<()> {
    let dialer = session.dialer()?;
    let q: u8 = session.cfg.quiet;

    let range_path = session.dir.join(RANGE_FILE);
    let content: String = tokio::fs::read_to_string(&range_path)
        .await
        .with_context(|| format!("Could not read {}", range_path.display()))?;
    let mut ranges = IpCollection::new();
    token::extend_collection(&content, &mut ranges);

    session.store.ensure_files().await?;
    let previous = if session.scan.recheck_last_success {
        Some(session.store.load_successes().await?)
    } else {
        None
    };
    let targets = scanner::plan_targets(ranges, previous.as_ref());

    if targets.is_empty() {
        print::no_results("addresses to probe");
        return Ok(());
    }

    session.print_settings();
    print::header("probing", q);

    let span = info_span!("scan", indicatif.pb_show = true);
    let progress = PhaseProgress::new(span.clone(), targets.len(), "front ends found");
    let tick = progress.clone();

    let scanner = Scanner::new(
        Arc::new(TlsProber::new(dialer.clone())),
        Classifier::from_config(&session.scan),
        session.store.clone(),
        session.scan.concurrency,
        session.scan.success_cap(),
    )
    .on_outcome(Arc::new(move |outcome: &Outcome| {
        tick.advance(matches!(outcome, Outcome::Success(_)));
    }));

    let summary: ScanSummary = scanner.run(targets).instrument(span).await;
    drop(scanner);
    drop(progress);

    scan_ends(&summary, q);

    if session.scan.measure_bandwidth {
        bandwidth::measure(session, dialer).await?;
    }
    export::export(session).await
}

fn scan_ends(summary: &ScanSummary, q: u8) {
    if q > 0 {
        mprint!();
    }

    match q {
        0 => {
            print::header("probe summary", q);
            print::as_tree_one_level(format::scan_details(summary));
        }
        _ => success!(
            "Probed {} addresses: {} success, {} rejected, {} failed in {}",
            summary.probed,
            summary.success,
            summary.rejected,
            summary.failed,
            format::elapsed(summary.elapsed)
        ),
    }
}
