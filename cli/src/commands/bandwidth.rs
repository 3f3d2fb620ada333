use std::sync::Arc;

use tracing::{Instrument, info_span};

use frontscan_common::record::{ProbeRecord, UNMEASURED_BANDWIDTH};
use frontscan_core::bandwidth::{self, TlsThroughputMeter};
use frontscan_core::probe::TlsDialer;

use crate::commands::Session;
use crate::terminal::{format, print, progress::PhaseProgress};

/// Runs the bandwidth phase on its own.
pub async fn run(session: &Session) -> anyhow::Result<()> {
    let dialer = session.dialer()?;
    session.store.ensure_files().await?;
    measure(session, dialer).await
}

pub async fn measure(session: &Session, dialer: TlsDialer) -> anyhow::Result<()> {
    let q: u8 = session.cfg.quiet;
    let successes = session.store.load_successes().await?;
    if successes.is_empty() {
        print::no_results("successes to measure");
        return Ok(());
    }

    print::header("measuring bandwidth", q);

    let span = info_span!("bandwidth", indicatif.pb_show = true);
    let progress = PhaseProgress::new(span.clone(), successes.len(), "measured");
    let tick = progress.clone();

    let meter = TlsThroughputMeter::new(
        dialer,
        &session.scan.bandwidth_host,
        &session.scan.bandwidth_path,
    );
    let summary = bandwidth::measure_all(
        Arc::new(meter),
        session.store.clone(),
        successes,
        session.scan.bandwidth_concurrency,
        Some(Arc::new(move |record: &ProbeRecord| {
            tick.advance(record.bandwidth.is_some_and(|bw| bw != UNMEASURED_BANDWIDTH));
        })),
    )
    .instrument(span)
    .await;
    drop(progress);

    if q == 0 {
        print::as_tree_one_level(format::bandwidth_details(&summary));
    }
    Ok(())
}
