//! # Probe Worker
//!
//! One probe is a TCP dial, a TLS handshake under a deadline, and an inspection
//! of the leaf certificate. [`ProbeWorker`] turns the outcome into exactly one
//! record in exactly one outcome file, or drops it when the success cap is full.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use frontscan_common::config::ScanConfig;
use frontscan_common::record::ProbeRecord;
use frontscan_common::{debug, error};

use crate::cert::{self, CertSubject};
use crate::classify::{Classifier, Verdict};
use crate::context::RunContext;
use crate::store::{OutcomeFile, ResultStore};
use crate::tls;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connect failed: {0}")]
    Dial(#[source] std::io::Error),
    #[error("connect timed out")]
    DialTimeout,
    #[error("handshake failed: {0}")]
    Handshake(#[source] std::io::Error),
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("server sent no certificate")]
    NoPeerCertificate,
    #[error("unreadable certificate: {0}")]
    Certificate(String),
    #[error("transfer failed: {0}")]
    Transfer(#[source] std::io::Error),
    #[error("transfer exceeded its deadline")]
    TransferTimeout,
}

impl ProbeError {
    /// Connection-level failures go to the failed file, certificate problems
    /// to the rejected file.
    pub fn outcome_file(&self) -> OutcomeFile {
        match self {
            ProbeError::Dial(_)
            | ProbeError::DialTimeout
            | ProbeError::Handshake(_)
            | ProbeError::HandshakeTimeout
            | ProbeError::Transfer(_)
            | ProbeError::TransferTimeout => OutcomeFile::Failed,
            ProbeError::NoPeerCertificate | ProbeError::Certificate(_) => OutcomeFile::Rejected,
        }
    }
}

/// A completed handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Handshake duration in milliseconds, dial excluded.
    pub delay_ms: u64,
    pub subject: CertSubject,
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, addr: IpAddr) -> Result<Handshake, ProbeError>;
}

/// Dial and handshake settings shared by the probe and bandwidth phases.
#[derive(Clone)]
pub struct TlsDialer {
    connector: TlsConnector,
    port: u16,
    dial_timeout: Duration,
    handshake_timeout: Duration,
    sni: Option<String>,
}

impl TlsDialer {
    pub fn new(connector: TlsConnector, cfg: &ScanConfig) -> Self {
        Self {
            connector,
            port: cfg.port,
            dial_timeout: cfg.dial_timeout(),
            handshake_timeout: cfg.handshake_deadline(),
            sni: cfg.sni.clone(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub async fn dial(&self, addr: IpAddr) -> Result<TcpStream, ProbeError> {
        let target = SocketAddr::new(addr, self.port);
        match timeout(self.dial_timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(ProbeError::Dial(e)),
            Err(_) => Err(ProbeError::DialTimeout),
        }
    }

    /// Runs the handshake on a dialed stream, returning it with its duration.
    pub async fn handshake(
        &self,
        addr: IpAddr,
        stream: TcpStream,
    ) -> Result<(TlsStream<TcpStream>, Duration), ProbeError> {
        let name = tls::server_name(addr, self.sni.as_deref())
            .map_err(|e| ProbeError::Handshake(std::io::Error::other(e)))?;

        let started = Instant::now();
        match timeout(self.handshake_timeout, self.connector.connect(name, stream)).await {
            Ok(Ok(tls)) => Ok((tls, started.elapsed())),
            Ok(Err(e)) => Err(ProbeError::Handshake(e)),
            Err(_) => Err(ProbeError::HandshakeTimeout),
        }
    }

    pub async fn connect(&self, addr: IpAddr) -> Result<(TlsStream<TcpStream>, Duration), ProbeError> {
        let stream = self.dial(addr).await?;
        self.handshake(addr, stream).await
    }
}

/// Real prober: dial, handshake, read the leaf certificate.
pub struct TlsProber {
    dialer: TlsDialer,
}

impl TlsProber {
    pub fn new(dialer: TlsDialer) -> Self {
        Self { dialer }
    }
}

#[async_trait]
impl Prober for TlsProber {
    async fn probe(&self, addr: IpAddr) -> Result<Handshake, ProbeError> {
        let (stream, elapsed) = self.dialer.connect(addr).await?;

        let (_, session) = stream.get_ref();
        let leaf = session
            .peer_certificates()
            .and_then(|chain| chain.first())
            .ok_or(ProbeError::NoPeerCertificate)?;

        Ok(Handshake {
            delay_ms: elapsed.as_millis() as u64,
            subject: cert::inspect(leaf.as_ref())?,
        })
    }
}

/// How a single probe ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(ProbeRecord),
    Rejected(ProbeRecord),
    Failed(ProbeRecord),
    /// Accepted, but the success cap was already full.
    Dropped(ProbeRecord),
}

impl Outcome {
    pub fn record(&self) -> &ProbeRecord {
        match self {
            Outcome::Success(r) | Outcome::Rejected(r) | Outcome::Failed(r) | Outcome::Dropped(r) => r,
        }
    }

    fn file(&self) -> Option<OutcomeFile> {
        match self {
            Outcome::Success(_) => Some(OutcomeFile::Success),
            Outcome::Rejected(_) => Some(OutcomeFile::Rejected),
            Outcome::Failed(_) => Some(OutcomeFile::Failed),
            Outcome::Dropped(_) => None,
        }
    }
}

/// Probes, classifies and records one address.
pub struct ProbeWorker {
    prober: Arc<dyn Prober>,
    classifier: Arc<Classifier>,
    store: Arc<ResultStore>,
    ctx: Arc<RunContext>,
}

impl ProbeWorker {
    pub fn new(
        prober: Arc<dyn Prober>,
        classifier: Arc<Classifier>,
        store: Arc<ResultStore>,
        ctx: Arc<RunContext>,
    ) -> Self {
        Self {
            prober,
            classifier,
            store,
            ctx,
        }
    }

    pub async fn run(&self, addr: IpAddr) -> Outcome {
        let outcome: Outcome = self.evaluate(addr).await;

        if let Some(file) = outcome.file()
            && let Err(e) = self.store.append(file, outcome.record()).await
        {
            error!("Could not record {addr}: {e}");
        }
        outcome
    }

    async fn evaluate(&self, addr: IpAddr) -> Outcome {
        let handshake: Handshake = match self.prober.probe(addr).await {
            Ok(handshake) => handshake,
            Err(e) => {
                debug!("{addr}: {e}");
                let record = ProbeRecord::new(addr);
                return match e.outcome_file() {
                    OutcomeFile::Rejected => Outcome::Rejected(record),
                    _ => Outcome::Failed(record),
                };
            }
        };

        let mut record = ProbeRecord::new(addr).with_delay(handshake.delay_ms);
        record.common_name = handshake.subject.common_name.clone();
        record.organization = handshake.subject.organization.clone();
        if !handshake.subject.country.is_empty() {
            record.country = handshake.subject.country.clone();
        }

        match self.classifier.classify(&handshake.subject) {
            Verdict::Rejected => {
                debug!(
                    "{addr}: {}ms, '{}' / '{}' not accepted",
                    handshake.delay_ms, record.common_name, record.organization
                );
                Outcome::Rejected(record)
            }
            Verdict::Accepted {
                category,
                common_name,
            } => {
                record.common_name = common_name;
                record.category = category;

                if self.ctx.try_claim_success() {
                    debug!("{addr}: {}ms {} {}", handshake.delay_ms, record.common_name, category);
                    Outcome::Success(record)
                } else {
                    debug!("{addr}: success cap reached, dropped");
                    Outcome::Dropped(record)
                }
            }
        }
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
