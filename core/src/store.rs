//! # Result Store
//!
//! Three append-only outcome files live in the working directory. Each append
//! opens its file, writes the whole line at once and flushes, under a lock per
//! file, so concurrent workers never interleave partial lines.
//!
//! The success file is read back into a [`SuccessMap`]: keyed by address, the
//! newest line wins, and iteration follows the order in which each address
//! first appeared.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use frontscan_common::debug;
use frontscan_common::record::ProbeRecord;

pub const SUCCESS_FILE: &str = "ip_tmpok.txt";
pub const REJECTED_FILE: &str = "ip_tmpno.txt";
pub const FAILED_FILE: &str = "ip_tmperr.txt";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StoreError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Which outcome file a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeFile {
    Success,
    Rejected,
    Failed,
}

#[derive(Debug)]
struct Sink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Sink {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }
}

#[derive(Debug)]
pub struct ResultStore {
    success: Sink,
    rejected: Sink,
    failed: Sink,
}

impl ResultStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            success: Sink::new(dir.join(SUCCESS_FILE)),
            rejected: Sink::new(dir.join(REJECTED_FILE)),
            failed: Sink::new(dir.join(FAILED_FILE)),
        }
    }

    pub fn path(&self, file: OutcomeFile) -> &Path {
        &self.sink(file).path
    }

    /// Creates any missing outcome file, leaving existing content untouched.
    pub async fn ensure_files(&self) -> Result<(), StoreError> {
        for sink in [&self.success, &self.rejected, &self.failed] {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&sink.path)
                .await
                .map_err(StoreError::io(&sink.path))?;
        }
        Ok(())
    }

    pub async fn append(&self, file: OutcomeFile, record: &ProbeRecord) -> Result<(), StoreError> {
        let sink = self.sink(file);
        let line: String = record.to_line();

        let _guard = sink.lock.lock().await;
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&sink.path)
            .await
            .map_err(StoreError::io(&sink.path))?;
        handle
            .write_all(line.as_bytes())
            .await
            .map_err(StoreError::io(&sink.path))?;
        handle.flush().await.map_err(StoreError::io(&sink.path))?;
        Ok(())
    }

    /// Rebuilds the de-duplicated success map. A missing file reads as empty.
    pub async fn load_successes(&self) -> Result<SuccessMap, StoreError> {
        let path = &self.success.path;
        let _guard = self.success.lock.lock().await;

        let content: String = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SuccessMap::new()),
            Err(e) => return Err(StoreError::io(path)(e)),
        };
        Ok(SuccessMap::parse(&content))
    }

    /// Truncates the success file and writes `records` in order.
    pub async fn rewrite_successes(&self, records: &[ProbeRecord]) -> Result<(), StoreError> {
        let path = &self.success.path;
        let body: String = records.iter().map(ProbeRecord::to_line).collect();

        let _guard = self.success.lock.lock().await;
        tokio::fs::write(path, body.as_bytes())
            .await
            .map_err(StoreError::io(path))
    }

    fn sink(&self, file: OutcomeFile) -> &Sink {
        match file {
            OutcomeFile::Success => &self.success,
            OutcomeFile::Rejected => &self.rejected,
            OutcomeFile::Failed => &self.failed,
        }
    }
}

/// Newest record per address, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuccessMap {
    order: Vec<IpAddr>,
    records: HashMap<IpAddr, ProbeRecord>,
}

impl SuccessMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses outcome-file content, skipping lines that are not complete records.
    pub fn parse(content: &str) -> Self {
        let mut map = Self::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<ProbeRecord>() {
                Ok(record) => map.insert(record),
                Err(e) => debug!("Skipping line {} of success file: {e}", idx + 1),
            }
        }
        map
    }

    pub fn insert(&mut self, record: ProbeRecord) {
        match self.records.entry(record.address) {
            Entry::Occupied(mut slot) => {
                slot.insert(record);
            }
            Entry::Vacant(slot) => {
                self.order.push(record.address);
                slot.insert(record);
            }
        }
    }

    pub fn get(&self, addr: &IpAddr) -> Option<&ProbeRecord> {
        self.records.get(addr)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.order.iter().copied()
    }

    pub fn records(&self) -> impl Iterator<Item = &ProbeRecord> {
        self.order.iter().filter_map(|addr| self.records.get(addr))
    }

    pub fn into_records(mut self) -> Vec<ProbeRecord> {
        self.order
            .iter()
            .filter_map(|addr| self.records.remove(addr))
            .collect()
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

#[cfg(test)]
mod tests {
    use super::*;
    use frontscan_common::record::Category;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn v4(d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(142, 250, 4, d))
    }

    fn ok(d: u8, delay: u64) -> ProbeRecord {
        let mut record = ProbeRecord::new(v4(d))
            .with_delay(delay)
            .with_category(Category::Gws);
        record.common_name = "*.google.com".into();
        record.country = "US".into();
        record
    }

    #[tokio::test]
    async fn test_missing_success_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        assert!(store.load_successes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_files_creates_all_three() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        store.ensure_files().await.unwrap();

        for name in [SUCCESS_FILE, REJECTED_FILE, FAILED_FILE] {
            assert!(dir.path().join(name).exists(), "{name} missing");
        }
    }

    #[tokio::test]
    async fn test_newest_record_wins_in_first_seen_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());

        store.append(OutcomeFile::Success, &ok(1, 300)).await.unwrap();
        store.append(OutcomeFile::Success, &ok(2, 100)).await.unwrap();
        store.append(OutcomeFile::Success, &ok(1, 50)).await.unwrap();

        let map = store.load_successes().await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.addresses().collect::<Vec<_>>(), vec![v4(1), v4(2)]);
        assert_eq!(map.get(&v4(1)).unwrap().delay, Some(50));
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let content = format!("{}{}{}", ok(1, 10).to_line(), ok(1, 20).to_line(), ok(3, 5).to_line());
        let once = SuccessMap::parse(&content);

        let rewritten: String = once.records().map(ProbeRecord::to_line).collect();
        let twice = SuccessMap::parse(&rewritten);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let content = format!(
            "garbage\n142.250.4.9 12ms\n{}\n{}",
            ok(4, 40).to_line(),
            "not.an.ip 1ms a gws US"
        );
        let map = SuccessMap::parse(&content);
        assert_eq!(map.len(), 1);
        assert!(map.get(&v4(4)).is_some());
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_lines_whole() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ResultStore::new(dir.path()));

        let mut tasks = tokio::task::JoinSet::new();
        for d in 1..=50u8 {
            let store = store.clone();
            tasks.spawn(async move { store.append(OutcomeFile::Failed, &ProbeRecord::new(v4(d))).await });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap().unwrap();
        }

        let content = std::fs::read_to_string(dir.path().join(FAILED_FILE)).unwrap();
        assert_eq!(content.lines().count(), 50);
        assert!(content.lines().all(|line| line.ends_with("-ms   -")));
    }

    #[tokio::test]
    async fn test_rewrite_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        for d in 1..=5 {
            store.append(OutcomeFile::Success, &ok(d, 10)).await.unwrap();
        }

        store.rewrite_successes(&[ok(9, 1)]).await.unwrap();
        let content = std::fs::read_to_string(store.path(OutcomeFile::Success)).unwrap();
        assert_eq!(content, ok(9, 1).to_line());
    }
}
