//! # Bandwidth Prober
//!
//! Optional second phase: every `gws` address of the de-duplicated success map
//! downloads a fixed resource over a fresh TLS connection, and the throughput
//! is appended to the success file as a new record. `gvs` addresses and
//! failed measurements carry [`UNMEASURED_BANDWIDTH`].

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use frontscan_common::record::{Category, ProbeRecord, UNMEASURED_BANDWIDTH};
use frontscan_common::{debug, error, success};

use crate::context::RunContext;
use crate::pool;
use crate::probe::{ProbeError, TlsDialer};
use crate::store::{OutcomeFile, ResultStore, SuccessMap};

/// Upper bound on one download, connection setup excluded.
pub const DOWNLOAD_CEILING: Duration = Duration::from_secs(30);

const READ_CHUNK: usize = 16 * 1024;

#[async_trait]
pub trait ThroughputMeter: Send + Sync {
    /// Throughput in KB/s.
    async fn measure(&self, addr: IpAddr) -> Result<u64, ProbeError>;
}

pub struct TlsThroughputMeter {
    dialer: TlsDialer,
    request: String,
    ceiling: Duration,
}

impl TlsThroughputMeter {
    pub fn new(dialer: TlsDialer, host: &str, path: &str) -> Self {
        Self {
            dialer,
            request: format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n"),
            ceiling: DOWNLOAD_CEILING,
        }
    }

    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }
}

#[async_trait]
impl ThroughputMeter for TlsThroughputMeter {
    async fn measure(&self, addr: IpAddr) -> Result<u64, ProbeError> {
        let (mut stream, _) = self.dialer.connect(addr).await?;
        let started = Instant::now();

        let download = async {
            stream.write_all(self.request.as_bytes()).await?;
            stream.flush().await?;

            let mut buf = vec![0u8; READ_CHUNK];
            let mut total: u64 = 0;
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => total += n as u64,
                    // servers often drop the connection without close_notify
                    Err(e) if total > 0 && e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(e),
                }
            }
            Ok::<u64, std::io::Error>(total)
        };

        let bytes: u64 = match timeout(self.ceiling, download).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(ProbeError::Transfer(e)),
            Err(_) => return Err(ProbeError::TransferTimeout),
        };

        Ok(kilobytes_per_second(bytes, started.elapsed()))
    }
}

pub fn kilobytes_per_second(bytes: u64, elapsed: Duration) -> u64 {
    let secs: f64 = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        return bytes / 1024;
    }
    (bytes as f64 / secs / 1024.0) as u64
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BandwidthSummary {
    pub measured: usize,
    pub unmeasured: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

/// Measures every record of `successes` and re-appends it with its bandwidth.
pub async fn measure_all(
    meter: Arc<dyn ThroughputMeter>,
    store: Arc<ResultStore>,
    successes: SuccessMap,
    width: usize,
    on_done: Option<Arc<dyn Fn(&ProbeRecord) + Send + Sync>>,
) -> BandwidthSummary {
    let started = Instant::now();
    let records: Vec<ProbeRecord> = successes.into_records();
    let tally = Arc::new(std::sync::Mutex::new(BandwidthSummary::default()));

    let sink = tally.clone();
    pool::drive(records, width, Arc::new(RunContext::new(None)), move |record: ProbeRecord| {
        let meter = meter.clone();
        let store = store.clone();
        let sink = sink.clone();
        let on_done = on_done.clone();
        async move {
            let addr: IpAddr = record.address;
            let (bandwidth, field) = if record.category == Category::Gvs {
                (UNMEASURED_BANDWIDTH, Field::Skipped)
            } else {
                match meter.measure(addr).await {
                    Ok(kbps) => {
                        debug!("{addr}: {kbps}KB/s");
                        (kbps, Field::Measured)
                    }
                    Err(e) => {
                        debug!("{addr}: bandwidth not measured: {e}");
                        (UNMEASURED_BANDWIDTH, Field::Unmeasured)
                    }
                }
            };

            let record = record.with_bandwidth(bandwidth);
            if let Err(e) = store.append(OutcomeFile::Success, &record).await {
                error!("Could not record bandwidth of {addr}: {e}");
            }
            if let Ok(mut summary) = sink.lock() {
                match field {
                    Field::Measured => summary.measured += 1,
                    Field::Unmeasured => summary.unmeasured += 1,
                    Field::Skipped => summary.skipped += 1,
                }
            }
            if let Some(cb) = &on_done {
                cb(&record);
            }
        }
    })
    .await;

    let mut summary: BandwidthSummary = tally.lock().map(|s| s.clone()).unwrap_or_default();
    summary.elapsed = started.elapsed();
    success!(
        "Bandwidth measured for {} addresses ({} failed, {} gvs skipped)",
        summary.measured,
        summary.unmeasured,
        summary.skipped
    );
    summary
}

enum Field {
    Measured,
    Unmeasured,
    Skipped,
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ThroughputMeter for Scripted {
        async fn measure(&self, addr: IpAddr) -> Result<u64, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match addr {
                IpAddr::V4(v4) if v4.octets()[3] == 1 => Ok(2048),
                _ => Err(ProbeError::DialTimeout),
            }
        }
    }

    fn record(d: u8, category: Category) -> ProbeRecord {
        let mut record = ProbeRecord::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, d)))
            .with_delay(20)
            .with_category(category);
        record.common_name = "edge".into();
        record
    }

    #[test]
    fn test_throughput_math() {
        assert_eq!(kilobytes_per_second(1024 * 1024, Duration::from_secs(2)), 512);
        assert_eq!(kilobytes_per_second(0, Duration::from_secs(1)), 0);
        assert_eq!(kilobytes_per_second(4096, Duration::ZERO), 4);
    }

    #[test]
    fn test_request_closes_the_connection() {
        let connector = crate::tls::build_connector(rustls::RootCertStore::empty()).unwrap();
        let dialer = TlsDialer::new(connector, &frontscan_common::config::ScanConfig::default());
        let meter = TlsThroughputMeter::new(dialer, "www.google.com", "/logo.png");

        assert_eq!(
            meter.request,
            "GET /logo.png HTTP/1.1\r\nHost: www.google.com\r\nConnection: close\r\n\r\n"
        );
        assert_eq!(meter.ceiling, DOWNLOAD_CEILING);
    }

    #[tokio::test]
    async fn test_gvs_skipped_and_failures_get_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ResultStore::new(dir.path()));
        let meter = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
        });

        let mut map = SuccessMap::new();
        map.insert(record(1, Category::Gws));
        map.insert(record(2, Category::Gws));
        map.insert(record(3, Category::Gvs));

        let summary = measure_all(meter.clone(), store.clone(), map, 2, None).await;
        assert_eq!(summary.measured, 1);
        assert_eq!(summary.unmeasured, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(meter.calls.load(Ordering::SeqCst), 2);

        let after = store.load_successes().await.unwrap();
        let bandwidths: Vec<Option<u64>> = after.records().map(|r| r.bandwidth).collect();
        assert_eq!(bandwidths.len(), 3);
        assert!(bandwidths.contains(&Some(2048)));
        assert_eq!(bandwidths.iter().filter(|b| **b == Some(0)).count(), 2);
    }
}
