//! Run-wide shared state.
//!
//! One [`RunContext`] is built per run and handed to every worker as an `Arc`.
//! The success counter is the only mutable piece; it is bumped with a
//! compare-and-increment so concurrent writers can never push it past the cap.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct RunContext {
    cap: Option<usize>,
    successes: AtomicUsize,
    stop: AtomicBool,
}

impl RunContext {
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            cap,
            successes: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
        }
    }

    pub fn cap(&self) -> Option<usize> {
        self.cap
    }

    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::Acquire)
    }

    /// Reserves one slot in the success file.
    ///
    /// Without a cap this always succeeds. With a cap it fails once the cap is
    /// reached, and the call that takes the last slot raises the stop signal.
    pub fn try_claim_success(&self) -> bool {
        let Some(cap) = self.cap else {
            self.successes.fetch_add(1, Ordering::AcqRel);
            return true;
        };

        let claimed = self
            .successes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < cap).then_some(n + 1)
            });

        match claimed {
            Ok(previous) => {
                if previous + 1 >= cap {
                    self.stop();
                }
                true
            }
            Err(_) => {
                self.stop();
                false
            }
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
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
