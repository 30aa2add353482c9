//! Journal Record Store
//!
//! Append-only JSONL file backend. Every append is flushed and synced before
//! it becomes visible to readers; reopening replays and re-verifies the file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::error::{LedgerError, Result};
use crate::ledger::record::{ComplianceRecord, RecordKind};
use crate::ledger::store::{RecordIndex, RecordStore};

pub struct JournalRecordStore {
    path: PathBuf,
    file: Mutex<Option<File>>,
    index: RwLock<RecordIndex>,
}

impl JournalRecordStore {
    /// Open (or create) the journal at `path` and replay its records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut index = RecordIndex::default();
        if path.exists() {
            for record in load_journal(&path)? {
                index.check_insertable(&record)?;
                index.insert(record);
            }
            info!("Loaded {} existing journal records from {:?}", index.len(), path);
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
            index: RwLock::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The file operations a journal append relies on.
trait JournalFile: Write {
    fn end_offset(&mut self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl JournalFile for File {
    fn end_offset(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

#[derive(Debug)]
enum WriteFailure {
    /// The file is back at its length before the write.
    RolledBack(io::Error),
    /// Part of the line may remain in the file.
    Torn(io::Error),
}

/// Append one line and make it durable, or leave the file as it was.
fn write_line<F: JournalFile>(file: &mut F, line: &str) -> std::result::Result<(), WriteFailure> {
    let start = file.end_offset().map_err(WriteFailure::RolledBack)?;

    match write_and_sync(file, line) {
        Ok(()) => Ok(()),
        Err(e) => match file.truncate_to(start) {
            Ok(()) => Err(WriteFailure::RolledBack(e)),
            Err(_) => Err(WriteFailure::Torn(e)),
        },
    }
}

fn write_and_sync<F: JournalFile>(file: &mut F, line: &str) -> io::Result<()> {
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    file.sync()
}

/// Read every record from a journal file, verifying each record's hash.
pub fn load_journal(path: &Path) -> Result<Vec<ComplianceRecord>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record: ComplianceRecord = serde_json::from_str(&line).map_err(|e| {
            LedgerError::EncodingError(format!("Failed to parse journal line {}: {}", line_num + 1, e))
        })?;

        if !record.verify_hash() {
            return Err(LedgerError::IntegrityViolation(format!(
                "journal line {}: {} {} fails hash verification",
                line_num + 1,
                record.kind(),
                record.id()
            )));
        }

        records.push(record);
    }

    debug!("Loaded {} records from {:?}", records.len(), path);
    Ok(records)
}

#[async_trait]
impl RecordStore for JournalRecordStore {
    async fn append(&self, record: &ComplianceRecord) -> Result<u64> {
        let json = serde_json::to_string(record)?;

        // The file lock serializes writers; readers only wait on the index.
        let mut file_guard = self.file.lock().await;
        let file = file_guard.as_mut().ok_or_else(LedgerError::store_closed)?;

        self.index.read().await.check_insertable(record)?;

        match write_line(file, &json) {
            Ok(()) => {}
            Err(WriteFailure::RolledBack(e)) => return Err(e.into()),
            Err(WriteFailure::Torn(e)) => {
                // A partial line must not be followed by further records
                *file_guard = None;
                error!("Journal {:?} closed after a write that could not be undone: {}", self.path, e);
                return Err(LedgerError::StorageUnavailable(format!(
                    "journal write failed and could not be undone: {}",
                    e
                )));
            }
        }

        let seq = self.index.write().await.insert(record.clone());
        debug!("Journaled {} at line {}", record.summary(), seq + 1);
        Ok(seq)
    }

    async fn records_for_user(&self, user_id: &str) -> Result<Vec<ComplianceRecord>> {
        Ok(self.index.read().await.for_user(user_id))
    }

    async fn records_for_order(&self, order_id: &str) -> Result<Vec<ComplianceRecord>> {
        Ok(self.index.read().await.for_order(order_id))
    }

    async fn find(&self, kind: RecordKind, id: &str) -> Result<Option<ComplianceRecord>> {
        Ok(self.index.read().await.find(kind, id))
    }

    async fn records_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ComplianceRecord>> {
        Ok(self.index.read().await.in_range(start, end))
    }

    async fn users(&self) -> Result<Vec<String>> {
        Ok(self.index.read().await.users())
    }

    async fn len(&self) -> Result<u64> {
        Ok(self.index.read().await.len())
    }

    async fn close(&self) -> Result<()> {
        if let Some(mut file) = self.file.lock().await.take() {
            file.flush()?;
            file.sync_all()?;
        }
        info!("Closed journal {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::record::GeofenceCheckRecord;
    use tempfile::tempdir;

    fn sealed(id: &str, user: &str) -> ComplianceRecord {
        let mut record: ComplianceRecord = GeofenceCheckRecord {
            id: id.to_string(),
            user_id: user.to_string(),
            order_id: "order-9".to_string(),
            is_inside: true,
            latitude: 50.4501,
            longitude: 30.5234,
            timestamp: Utc::now(),
            ..Default::default()
        }
        .into();
        let hash = record.calculate_hash().unwrap();
        record.set_hash(hash);
        record
    }

    /// In-memory journal file whose sync or truncate can be made to fail.
    #[derive(Default)]
    struct FaultyFile {
        data: Vec<u8>,
        fail_sync: bool,
        fail_truncate: bool,
    }

    impl Write for FaultyFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl JournalFile for FaultyFile {
        fn end_offset(&mut self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            if self.fail_truncate {
                return Err(io::Error::new(io::ErrorKind::Other, "read-only filesystem"));
            }
            self.data.truncate(len as usize);
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            if self.fail_sync {
                return Err(io::Error::new(io::ErrorKind::Other, "sync failed"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_write_line_appends_newline() {
        let mut file = FaultyFile::default();
        write_line(&mut file, "{}").unwrap();
        write_line(&mut file, "[]").unwrap();
        assert_eq!(file.data, b"{}\n[]\n");
    }

    #[test]
    fn test_failed_sync_removes_the_line() {
        let mut file = FaultyFile::default();
        write_line(&mut file, "first").unwrap();

        file.fail_sync = true;
        match write_line(&mut file, "second") {
            Err(WriteFailure::RolledBack(_)) => {}
            other => panic!("expected rollback, got {:?}", other),
        }
        assert_eq!(file.data, b"first\n");
    }

    #[test]
    fn test_failed_truncate_reports_torn_write() {
        let mut file = FaultyFile {
            fail_sync: true,
            fail_truncate: true,
            ..Default::default()
        };
        assert!(matches!(write_line(&mut file, "line"), Err(WriteFailure::Torn(_))));
    }

    #[tokio::test]
    async fn test_journal_reopen_replays_records() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("ledger").join("journal.jsonl");

        let store = JournalRecordStore::open(&path).unwrap();
        store.append(&sealed("g1", "u1")).await.unwrap();
        store.append(&sealed("g2", "u1")).await.unwrap();
        store.close().await.unwrap();

        let reopened = JournalRecordStore::open(&path).unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);
        assert_eq!(reopened.records_for_order("order-9").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_journal_rejects_appends() {
        let temp_dir = tempdir().unwrap();
        let store = JournalRecordStore::open(temp_dir.path().join("j.jsonl")).unwrap();
        store.close().await.unwrap();
        let err = store.append(&sealed("g1", "u1")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_tampered_journal_fails_to_open() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("journal.jsonl");

        let store = JournalRecordStore::open(&path).unwrap();
        store.append(&sealed("g1", "u1")).await.unwrap();
        store.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, contents.replace("\"is_inside\":true", "\"is_inside\":false")).unwrap();

        match JournalRecordStore::open(&path) {
            Err(LedgerError::IntegrityViolation(msg)) => assert!(msg.contains("line 1")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("tampered journal opened"),
        }
    }
}
