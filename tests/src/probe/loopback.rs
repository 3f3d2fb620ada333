#![cfg(test)]
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::ServerConfig;
use rustls::crypto::ring;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use frontscan_common::config::ScanConfig;
use frontscan_common::record::Category;
use frontscan_core::bandwidth::{ThroughputMeter, TlsThroughputMeter};
use frontscan_core::classify::Classifier;
use frontscan_core::context::RunContext;
use frontscan_core::probe::{Outcome, ProbeError, ProbeWorker, Prober, TlsDialer, TlsProber};
use frontscan_core::store::{FAILED_FILE, REJECTED_FILE, ResultStore, SUCCESS_FILE};
use frontscan_core::tls;
use frontscan_integration_tests::{lines, v4};

fn localhost() -> IpAddr {
    v4(127, 0, 0, 1)
}

fn google_config() -> ScanConfig {
    ScanConfig {
        timeout: 500,
        handshake_timeout: 300,
        organizations: vec!["Google LLC".into()],
        gws_domains: vec!["*.google.com".into()],
        ..ScanConfig::default()
    }
}

fn acme_config() -> ScanConfig {
    ScanConfig {
        timeout: 500,
        handshake_timeout: 1_000,
        organizations: vec!["Acme".into()],
        gws_domains: vec!["edge.".into()],
        match_dns_names: true,
        ..ScanConfig::default()
    }
}

fn dialer(cfg: &ScanConfig, port: u16) -> anyhow::Result<TlsDialer> {
    let connector = tls::build_connector(rustls::RootCertStore::empty())?;
    Ok(TlsDialer::new(connector, cfg).with_port(port))
}

fn worker_with(dir: &std::path::Path, cfg: &ScanConfig, port: u16) -> anyhow::Result<ProbeWorker> {
    Ok(ProbeWorker::new(
        Arc::new(TlsProber::new(dialer(cfg, port)?)),
        Arc::new(Classifier::from_config(cfg)),
        Arc::new(ResultStore::new(dir)),
        Arc::new(RunContext::new(None)),
    ))
}

fn worker(dir: &std::path::Path, port: u16) -> anyhow::Result<ProbeWorker> {
    worker_with(dir, &google_config(), port)
}

/// Server side of a self-signed `edge.example.com` front end owned by Acme.
fn edge_acceptor() -> anyhow::Result<TlsAcceptor> {
    let mut params = CertificateParams::new(vec![
        "static.example.com".to_string(),
        "edge.example.com".to_string(),
    ])?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, "edge.example.com");
    name.push(DnType::OrganizationName, "Acme");
    name.push(DnType::CountryName, "US");
    params.distinguished_name = name;

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Accepts one TLS client, reads its request, then lets `reply` answer it.
async fn serve_once<F, Fut>(reply: F) -> anyhow::Result<(u16, tokio::task::JoinHandle<()>)>
where
    F: FnOnce(tokio_rustls::server::TlsStream<tokio::net::TcpStream>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let acceptor = edge_acceptor()?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port: u16 = listener.local_addr()?.port();

    let server = tokio::spawn(async move {
        let Ok((socket, _)) = listener.accept().await else { return };
        let Ok(stream) = acceptor.accept(socket).await else { return };
        reply(stream).await;
    });
    Ok((port, server))
}

async fn drain(mut stream: tokio_rustls::server::TlsStream<tokio::net::TcpStream>) {
    let mut buf = [0u8; 1024];
    while let Ok(n) = stream.read(&mut buf).await {
        if n == 0 {
            break;
        }
    }
}

fn only_failed(dir: &std::path::Path) {
    assert_eq!(lines(dir, FAILED_FILE), vec!["127.0.0.1 -ms   -"]);
    assert!(lines(dir, SUCCESS_FILE).is_empty());
    assert!(lines(dir, REJECTED_FILE).is_empty());
}

#[tokio::test]
async fn refused_dial_is_recorded_as_failed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let port: u16 = {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?.port()
    };

    let outcome = worker(dir.path(), port)?.run(localhost()).await;

    assert!(matches!(outcome, Outcome::Failed(_)));
    only_failed(dir.path());
    Ok(())
}

#[tokio::test]
async fn dropped_connection_is_a_handshake_failure() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port: u16 = listener.local_addr()?.port();

    let server = tokio::spawn(async move {
        if let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });

    let outcome = worker(dir.path(), port)?.run(localhost()).await;
    server.await?;

    assert!(matches!(outcome, Outcome::Failed(_)));
    only_failed(dir.path());
    Ok(())
}

#[tokio::test]
async fn silent_server_hits_the_handshake_deadline() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port: u16 = listener.local_addr()?.port();

    let server = tokio::spawn(async move {
        if let Ok((socket, _)) = listener.accept().await {
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(socket);
        }
    });

    let outcome = worker(dir.path(), port)?.run(localhost()).await;
    server.abort();

    assert!(matches!(outcome, Outcome::Failed(_)));
    only_failed(dir.path());
    Ok(())
}

#[tokio::test]
async fn handshake_reads_the_leaf_subject() -> anyhow::Result<()> {
    let cfg = acme_config();
    let (port, server) = serve_once(drain).await?;

    let handshake = TlsProber::new(dialer(&cfg, port)?).probe(localhost()).await?;
    server.abort();

    assert_eq!(handshake.subject.common_name, "edge.example.com");
    assert_eq!(handshake.subject.organization, "Acme");
    assert_eq!(handshake.subject.country, "US");
    assert_eq!(
        handshake.subject.dns_names,
        vec!["static.example.com", "edge.example.com"]
    );
    assert!(handshake.delay_ms <= cfg.handshake_timeout);
    Ok(())
}

#[tokio::test]
async fn accepted_front_end_lands_in_success_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cfg = acme_config();
    let (port, server) = serve_once(drain).await?;

    let outcome = worker_with(dir.path(), &cfg, port)?.run(localhost()).await;
    server.abort();

    let record = match outcome {
        Outcome::Success(record) => record,
        other => panic!("front end not accepted: {other:?}"),
    };
    assert_eq!(record.common_name, "edge.example.com");
    assert_eq!(record.category, Category::Gws);
    assert_eq!(record.country, "US");
    assert_eq!(lines(dir.path(), SUCCESS_FILE).len(), 1);
    assert!(lines(dir.path(), REJECTED_FILE).is_empty());
    assert!(lines(dir.path(), FAILED_FILE).is_empty());
    Ok(())
}

#[tokio::test]
async fn download_without_close_notify_is_measured() -> anyhow::Result<()> {
    let cfg = acme_config();
    let (port, server) = serve_once(|mut stream| async move {
        let mut request = [0u8; 1024];
        if stream.read(&mut request).await.is_err() {
            return;
        }
        let body = vec![b'x'; 256 * 1024];
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len());
        if stream.write_all(head.as_bytes()).await.is_ok() && stream.write_all(&body).await.is_ok() {
            let _ = stream.flush().await;
        }
        // dropped without close_notify
    })
    .await?;

    let meter = TlsThroughputMeter::new(dialer(&cfg, port)?, "edge.example.com", "/blob");
    let kbps: u64 = meter.measure(localhost()).await?;
    server.await?;

    assert!(kbps > 0);
    Ok(())
}

#[tokio::test]
async fn stalled_download_hits_the_ceiling() -> anyhow::Result<()> {
    let cfg = acme_config();
    let (port, server) = serve_once(|mut stream| async move {
        let mut request = [0u8; 1024];
        let _ = stream.read(&mut request).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    })
    .await?;

    let meter = TlsThroughputMeter::new(dialer(&cfg, port)?, "edge.example.com", "/blob")
        .with_ceiling(Duration::from_millis(200));
    let result = meter.measure(localhost()).await;
    server.abort();

    assert!(matches!(result, Err(ProbeError::TransferTimeout)));
    Ok(())
}
