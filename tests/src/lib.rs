//! Fixtures shared by the workspace integration tests.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Barrier;

use frontscan_core::cert::CertSubject;
use frontscan_core::probe::{Handshake, ProbeError, Prober};

pub type Script = fn(IpAddr) -> Result<Handshake, ProbeError>;

/// A [`Prober`] answering from a script instead of the network.
///
/// The first `gate` calls wait for each other before answering, which puts
/// that many probes in flight at once.
pub struct ScriptedProber {
    script: Script,
    latency: Duration,
    gate: Option<(usize, Arc<Barrier>)>,
    calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            latency: Duration::ZERO,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_gate(mut self, width: usize) -> Self {
        self.gate = Some((width, Arc::new(Barrier::new(width))));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, addr: IpAddr) -> Result<Handshake, ProbeError> {
        let call: usize = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((width, barrier)) = &self.gate
            && call < *width
        {
            barrier.wait().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.script)(addr)
    }
}

pub fn handshake(delay_ms: u64, common_name: &str, organization: &str) -> Handshake {
    Handshake {
        delay_ms,
        subject: CertSubject::new(common_name, organization).with_country("US"),
    }
}

pub fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(a, b, c, d))
}

/// Non-empty lines of a file in `dir`, empty when the file is missing.
pub fn lines(dir: &Path, name: &str) -> Vec<String> {
    std::fs::read_to_string(dir.join(name))
        .unwrap_or_default()
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
