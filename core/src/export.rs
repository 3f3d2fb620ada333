//! # Exporter
//!
//! Turns the de-duplicated success map into the ranked export file:
//!
//! ```text
//! 1.2.3.4|5.6.7.8
//!
//! "1.2.3.4","5.6.7.8"
//! ```
//!
//! The success file is rewritten in export order on every run, so exporting
//! twice without new probes produces byte-identical files.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use thiserror::Error;

use frontscan_common::config::ScanConfig;
use frontscan_common::record::{Category, ProbeRecord};
use frontscan_common::{debug, success};

use crate::store::{ResultStore, StoreError};

pub const EXPORT_FILE: &str = "ip_output.txt";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("field '{field}' has no array in {path}")]
    SpliceTarget { path: PathBuf, field: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub sort_by_delay: bool,
    /// Highest delay in milliseconds.
    pub max_delay: u64,
    pub gws_only: bool,
    /// Pool mode exports every success, whatever the filters say.
    pub pool_mode: bool,
    /// Lowest bandwidth in KB/s, applied to `gws` records only.
    pub min_bandwidth: Option<u64>,
}

impl ExportOptions {
    pub fn from_config(cfg: &ScanConfig) -> Self {
        Self {
            sort_by_delay: cfg.sort_by_delay,
            max_delay: cfg.delay,
            gws_only: cfg.only_gws,
            pool_mode: cfg.pool_enabled,
            min_bandwidth: cfg.min_bandwidth,
        }
    }

    pub fn accepts(&self, record: &ProbeRecord) -> bool {
        if self.pool_mode {
            return true;
        }
        let Some(delay) = record.delay else {
            return false;
        };
        if delay > self.max_delay {
            return false;
        }
        if self.gws_only && record.category != Category::Gws {
            return false;
        }
        if let Some(min) = self.min_bandwidth
            && record.category == Category::Gws
        {
            return record.bandwidth.is_some_and(|bw| bw >= min);
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub gws: usize,
    pub gvs: usize,
    pub pipe_list: String,
    pub quoted_list: String,
}

impl ExportSummary {
    pub fn total(&self) -> usize {
        self.gws + self.gvs
    }
}

/// Ascending delay, ties by address, records without a delay last.
pub fn by_delay(a: &ProbeRecord, b: &ProbeRecord) -> Ordering {
    match (a.delay, b.delay) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.address.cmp(&b.address)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.address.cmp(&b.address),
    }
}

/// Builds the pipe-delimited and quoted lists from `records`, in order.
pub fn render(records: &[ProbeRecord], opts: &ExportOptions) -> ExportSummary {
    let mut summary = ExportSummary::default();
    let mut pipes: Vec<String> = Vec::new();
    let mut quoted: Vec<String> = Vec::new();

    for record in records.iter().filter(|r| opts.accepts(r)) {
        match record.category {
            Category::Gws => summary.gws += 1,
            Category::Gvs => summary.gvs += 1,
            Category::Unclassified => {}
        }
        pipes.push(record.address.to_string());
        quoted.push(format!("\"{}\"", record.address));
    }

    summary.pipe_list = pipes.join("|");
    summary.quoted_list = quoted.join(",");
    summary
}

/// Rewrites the success file in export order and writes the export file into `dir`.
pub async fn export(
    store: &ResultStore,
    dir: &Path,
    opts: &ExportOptions,
) -> Result<ExportSummary, ExportError> {
    let mut records: Vec<ProbeRecord> = store.load_successes().await?.into_records();
    if opts.sort_by_delay {
        records.sort_by(by_delay);
    }
    store.rewrite_successes(&records).await?;

    let summary = render(&records, opts);
    let path = dir.join(EXPORT_FILE);
    let body = format!("{}\n\n{}", summary.pipe_list, summary.quoted_list);
    tokio::fs::write(&path, body.as_bytes())
        .await
        .map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;

    success!(
        "{} addresses exported to {} (gws: {}, gvs: {})",
        summary.total(),
        path.display(),
        summary.gws,
        summary.gvs
    );
    Ok(summary)
}

/// Replaces the content of the JSON array named `field` in `path` with `quoted`.
///
/// The rest of the file is kept byte for byte, comments included.
pub async fn splice_json_array(path: &Path, field: &str, quoted: &str) -> Result<(), ExportError> {
    let content: String = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ExportError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let (open, close) = array_bounds(&content, field).ok_or_else(|| ExportError::SpliceTarget {
        path: path.to_path_buf(),
        field: field.to_string(),
    })?;

    let mut spliced = String::with_capacity(content.len() + quoted.len());
    spliced.push_str(&content[..=open]);
    spliced.push_str(quoted);
    spliced.push_str(&content[close..]);

    tokio::fs::write(path, spliced.as_bytes())
        .await
        .map_err(|source| ExportError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("Spliced {} bytes into '{field}' of {}", quoted.len(), path.display());
    Ok(())
}

/// Byte offsets of the `[` and matching `]` of the array value of `field`.
fn array_bounds(content: &str, field: &str) -> Option<(usize, usize)> {
    let key = format!("\"{field}\"");
    let mut from: usize = 0;

    while let Some(found) = content[from..].find(&key) {
        let after_key: usize = from + found + key.len();
        from = after_key;

        let rest = content[after_key..].trim_start();
        let Some(rest) = rest.strip_prefix(':') else {
            continue;
        };
        let rest_trimmed = rest.trim_start();
        if !rest_trimmed.starts_with('[') {
            continue;
        }
        let open: usize = content.len() - rest_trimmed.len();

        let mut depth: usize = 0;
        let mut in_string = false;
        let mut escaped = false;
        for (idx, ch) in content[open..].char_indices() {
            if in_string {
                match ch {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match ch {
                '"' => in_string = true,
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((open, open + idx));
                    }
                }
                _ => {}
            }
        }
        return None;
    }
    None
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
