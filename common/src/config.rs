//! # Configuration
//!
//! [`Config`] holds terminal settings taken from the command line, while
//! [`ScanConfig`] is the run configuration read from `config.json`.
//!
//! The JSON reader is lenient with hand-edited files: whole-line `//`
//! comments are dropped and a trailing comma before a closing `]` or `}`
//! is removed before parsing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE: &str = "config.json";
pub const CA_BUNDLE_FILE: &str = "cacert.pem";
pub const RANGE_FILE: &str = "googleip.txt";

/// Terminal behaviour selected on the command line.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// 0 prints everything, 1 drops headers, 2 also drops per-phase details.
    pub quiet: u8,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How domain labels are matched against the peer certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// The label must equal the certificate common name.
    #[default]
    CommonName,
    /// The label prefixes the common name or, failing that, a subject alternative DNS name.
    DnsName,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Width of the probing worker pool.
    pub concurrency: usize,
    /// Width of the bandwidth worker pool.
    pub bandwidth_concurrency: usize,
    /// TCP dial timeout, in milliseconds.
    pub timeout: u64,
    /// TLS handshake deadline, in milliseconds.
    pub handshake_timeout: u64,
    /// Highest delay, in milliseconds, accepted by the export.
    pub delay: u64,
    #[serde(rename = "organization")]
    pub organizations: Vec<String>,
    #[serde(rename = "gws")]
    pub gws_domains: Vec<String>,
    #[serde(rename = "gvs")]
    pub gvs_domains: Vec<String>,
    pub match_dns_names: bool,
    #[serde(rename = "check_last_okip")]
    pub recheck_last_success: bool,
    #[serde(rename = "ip_pool")]
    pub pool_enabled: bool,
    #[serde(rename = "ip_pool_size")]
    pub pool_size: usize,
    pub measure_bandwidth: bool,
    #[serde(rename = "sort_tmpokfile")]
    pub sort_by_delay: bool,
    pub only_gws: bool,
    /// Lowest bandwidth, in KB/s, accepted by the export for `gws` addresses.
    pub min_bandwidth: Option<u64>,
    pub port: u16,
    /// Server name sent in the handshake; none by default, like a bare IP dial.
    pub sni: Option<String>,
    pub bandwidth_host: String,
    pub bandwidth_path: String,
    /// External JSON file whose `splice_field` array receives the quoted list.
    pub splice_file: Option<PathBuf>,
    pub splice_field: Option<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 100,
            bandwidth_concurrency: 10,
            timeout: 1_000,
            handshake_timeout: 2_500,
            delay: 1_500,
            organizations: Vec::new(),
            gws_domains: Vec::new(),
            gvs_domains: Vec::new(),
            match_dns_names: false,
            recheck_last_success: true,
            pool_enabled: false,
            pool_size: 100,
            measure_bandwidth: false,
            sort_by_delay: true,
            only_gws: false,
            min_bandwidth: None,
            port: 443,
            sni: None,
            bandwidth_host: "www.google.com".to_string(),
            bandwidth_path: "/images/branding/googlelogo/2x/googlelogo_color_272x92dp.png"
                .to_string(),
            splice_file: None,
            splice_field: None,
        }
    }
}

impl ScanConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let cfg: ScanConfig = serde_json::from_str(&strip_json_comments(raw))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.bandwidth_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "bandwidth_concurrency must be at least 1".into(),
            ));
        }
        if self.pool_enabled && self.pool_size == 0 {
            return Err(ConfigError::Invalid("ip_pool_size must be at least 1".into()));
        }
        if self.splice_file.is_some() != self.splice_field.is_some() {
            return Err(ConfigError::Invalid(
                "splice_file and splice_field must be set together".into(),
            ));
        }
        Ok(())
    }

    pub fn match_mode(&self) -> MatchMode {
        if self.match_dns_names {
            MatchMode::DnsName
        } else {
            MatchMode::CommonName
        }
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn handshake_deadline(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout)
    }

    /// The success cap, when address-pool mode is on.
    pub fn success_cap(&self) -> Option<usize> {
        self.pool_enabled.then_some(self.pool_size)
    }
}

/// Drops `//` comment lines and trailing commas before a closing bracket.
pub fn strip_json_comments(raw: &str) -> String {
    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .collect();

    let mut out = String::with_capacity(raw.len());
    for (idx, line) in lines.iter().enumerate() {
        let closes_next: bool = lines
            .get(idx + 1)
            .is_some_and(|next| next.starts_with(']') || next.starts_with('}'));

        let line: &str = match line.strip_suffix(',') {
            Some(stripped) if closes_next => stripped,
            _ => line,
        };
        out.push_str(line);
        out.push('\n');
    }
    out
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
