//! The **Concurrency Coordinator** of a probing run.
//!
//! [`Scanner`] fans the target list out over the fixed-width [`pool`](crate::pool),
//! hands each address to a [`ProbeWorker`], tallies the outcomes and reports
//! each one through an optional callback (the CLI drives its progress bar from it).
//!
//! With a success cap, the worker that takes the last slot raises the stop
//! signal; [`Scanner::run`] still waits for every in-flight probe before it
//! returns, so an export started afterwards sees the final success file.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use frontscan_common::network::range::IpCollection;
use frontscan_common::record::Category;
use frontscan_common::{debug, success};

use crate::classify::Classifier;
use crate::context::RunContext;
use crate::pool;
use crate::probe::{Outcome, ProbeWorker, Prober};
use crate::store::{ResultStore, SuccessMap};

pub type OutcomeCallback = Arc<dyn Fn(&Outcome) + Send + Sync>;

/// Tally of one probing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub queued: usize,
    pub probed: usize,
    pub success: usize,
    pub rejected: usize,
    pub failed: usize,
    pub dropped: usize,
    pub gws: usize,
    pub gvs: usize,
    pub elapsed: Duration,
}

impl ScanSummary {
    fn count(&mut self, outcome: &Outcome) {
        self.probed += 1;
        match outcome {
            Outcome::Success(record) => {
                self.success += 1;
                match record.category {
                    Category::Gws => self.gws += 1,
                    Category::Gvs => self.gvs += 1,
                    Category::Unclassified => {}
                }
            }
            Outcome::Rejected(_) => self.rejected += 1,
            Outcome::Failed(_) => self.failed += 1,
            Outcome::Dropped(_) => self.dropped += 1,
        }
    }
}

/// Orders the addresses to probe: previous successes first when re-checking,
/// then the expanded ranges, each address once.
pub fn plan_targets(ranges: IpCollection, previous: Option<&SuccessMap>) -> IpCollection {
    let Some(previous) = previous else {
        return ranges;
    };

    let mut targets: IpCollection = previous.addresses().collect();
    let rechecked: usize = targets.len();
    targets.append(ranges);

    debug!("{rechecked} previous successes queued for re-check");
    targets
}

pub struct Scanner {
    prober: Arc<dyn Prober>,
    classifier: Arc<Classifier>,
    store: Arc<ResultStore>,
    ctx: Arc<RunContext>,
    width: usize,
    on_outcome: Option<OutcomeCallback>,
}

impl Scanner {
    pub fn new(
        prober: Arc<dyn Prober>,
        classifier: Classifier,
        store: Arc<ResultStore>,
        width: usize,
        cap: Option<usize>,
    ) -> Self {
        Self {
            prober,
            classifier: Arc::new(classifier),
            store,
            ctx: Arc::new(RunContext::new(cap)),
            width,
            on_outcome: None,
        }
    }

    pub fn on_outcome(mut self, callback: OutcomeCallback) -> Self {
        self.on_outcome = Some(callback);
        self
    }

    pub fn context(&self) -> Arc<RunContext> {
        self.ctx.clone()
    }

    /// Probes every target and returns once all workers are done.
    pub async fn run<I>(&self, targets: I) -> ScanSummary
    where
        I: IntoIterator<Item = IpAddr>,
        I::IntoIter: ExactSizeIterator + Send + 'static,
    {
        let started = Instant::now();
        let targets = targets.into_iter();
        let queued: usize = targets.len();

        let worker = Arc::new(ProbeWorker::new(
            self.prober.clone(),
            self.classifier.clone(),
            self.store.clone(),
            self.ctx.clone(),
        ));
        let tally = Arc::new(Mutex::new(ScanSummary::default()));
        let callback = self.on_outcome.clone();

        let sink = tally.clone();
        pool::drive(targets, self.width, self.ctx.clone(), move |addr: IpAddr| {
            let worker = worker.clone();
            let sink = sink.clone();
            let callback = callback.clone();
            async move {
                let outcome = worker.run(addr).await;
                if let Ok(mut summary) = sink.lock() {
                    summary.count(&outcome);
                }
                if let Some(cb) = &callback {
                    cb(&outcome);
                }
            }
        })
        .await;

        let mut summary: ScanSummary = tally.lock().map(|s| s.clone()).unwrap_or_default();
        summary.queued = queued;
        summary.elapsed = started.elapsed();

        if self.ctx.is_stopped() {
            success!("Address pool filled with {} successes", self.ctx.successes());
        }
        summary
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
