//! Fixed-width worker pool over a bounded queue.
//!
//! A producer task pulls items one by one into a `width`-sized mpsc queue and closes
//! it; `width` workers share the receiving end and run `work` per item. The
//! stop signal of the [`RunContext`] halts both sides: the producer stops
//! enqueuing and workers stop pulling. [`drive`] only returns once every task
//! has finished, so nothing is still writing when the caller moves on.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

use frontscan_common::error;

use crate::context::RunContext;

/// Runs `work` over `items` with at most `width` jobs in flight.
///
/// Returns how many items were handed to `work`.
pub async fn drive<I, T, W, Fut>(
    items: I,
    width: usize,
    ctx: Arc<RunContext>,
    work: W,
) -> usize
where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    T: Send + 'static,
    W: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let width: usize = width.max(1);
    let (tx, rx) = mpsc::channel::<T>(width);
    let rx = Arc::new(Mutex::new(rx));
    let work = Arc::new(work);
    let dispatched = Arc::new(AtomicUsize::new(0));

    let items = items.into_iter();
    let producer_ctx = ctx.clone();
    let producer = tokio::spawn(async move {
        for item in items {
            if producer_ctx.is_stopped() {
                break;
            }
            // every worker is gone, nobody left to feed
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });

    let mut workers: JoinSet<()> = JoinSet::new();
    for _ in 0..width {
        let rx = rx.clone();
        let work = work.clone();
        let ctx = ctx.clone();
        let dispatched = dispatched.clone();

        workers.spawn(async move {
            loop {
                if ctx.is_stopped() {
                    break;
                }
                let next: Option<T> = rx.lock().await.recv().await;
                let Some(item) = next else { break };
                if ctx.is_stopped() {
                    break;
                }
                dispatched.fetch_add(1, Ordering::Relaxed);
                work(item).await;
            }
        });
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!("Worker task ended abnormally: {e}");
        }
    }

    // Workers are gone, which closes the queue and releases a blocked producer.
    drop(rx);
    if let Err(e) = producer.await {
        error!("Producer task ended abnormally: {e}");
    }

    dispatched.load(Ordering::Relaxed)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
