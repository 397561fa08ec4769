//! Append-only JSON-lines ledger.
//!
//! Every attempt is one line. On open the file is locked exclusively and the
//! whole file is replayed into an in-memory index of the latest record per
//! key; appends are fsynced before they are acknowledged.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use fs4::fs_std::FileExt;
use nudge_core::HistoryKey;
use tracing::{error, info, warn};

use crate::backend::{sorted, upsert_latest, HistoryBackend};
use crate::error::{HistoryError, Result};
use crate::record::HistoryRecord;

pub struct JsonlLedger {
    path: PathBuf,
    file: Mutex<File>,
    index: RwLock<HashMap<HistoryKey, HistoryRecord>>,
}

impl JsonlLedger {
    /// Open (or create) the ledger at `path`, lock it and replay it.
    ///
    /// The lock is held until the ledger is dropped; a second open of the same
    /// file, from this process or another, fails with [`HistoryError::Locked`].
    ///
    /// An unparseable final line is treated as a torn write and skipped; an
    /// unparseable line anywhere else is [`HistoryError::Corrupt`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
        file.try_lock_exclusive().map_err(|e| HistoryError::Locked {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let mut content = String::new();
        file.read_to_string(&mut content)?;
        let replay = parse_lines(&path, &content)?;
        if let Some(offset) = replay.torn_at {
            file.set_len(offset)?;
        }
        if replay.unterminated {
            file.write_all(b"\n")?;
        }
        let mut index = HashMap::new();
        for record in replay.records {
            upsert_latest(&mut index, record);
        }
        info!(path = %path.display(), keys = index.len(), "opened history ledger");

        Ok(Self {
            path,
            file: Mutex::new(file),
            index: RwLock::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every line of a ledger file, oldest first, without locking it.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<HistoryRecord>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(parse_lines(path, &content)?.records)
    }

    /// Latest record of every key in a ledger file, ordered by key, without
    /// locking it. Safe to call while another process holds the ledger open.
    pub fn read_latest(path: impl AsRef<Path>) -> Result<Vec<HistoryRecord>> {
        let mut index = HashMap::new();
        for record in Self::read_all(path)? {
            upsert_latest(&mut index, record);
        }
        Ok(sorted(&index))
    }
}

/// The pieces of a file an append needs, so a failed write can be undone.
trait AppendTarget: Write {
    fn len(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl AppendTarget for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Write and sync one line, or cut the file back to where it was.
fn append_line<F: AppendTarget>(file: &mut F, line: &[u8]) -> Result<()> {
    let before = file.len()?;
    let written = file.write_all(line).and_then(|()| file.sync());
    if let Err(e) = written {
        if let Err(undo) = file.truncate(before) {
            error!(error = %undo, len = before, "failed to roll back partial ledger append");
        }
        return Err(e.into());
    }
    Ok(())
}

/// Parsed ledger plus the byte offset of a torn trailing line, if any.
struct Replay {
    records: Vec<HistoryRecord>,
    torn_at: Option<u64>,
    /// Last complete line has no terminating newline.
    unterminated: bool,
}

fn parse_lines(path: &Path, content: &str) -> Result<Replay> {
    let mut lines = Vec::new();
    let mut offset = 0usize;
    for line in content.split_inclusive('\n') {
        lines.push((offset, line.trim_end_matches(['\n', '\r'])));
        offset += line.len();
    }
    let last_non_empty = lines.iter().rposition(|(_, l)| !l.trim().is_empty());

    let mut replay = Replay {
        records: Vec::with_capacity(lines.len()),
        torn_at: None,
        unterminated: !content.is_empty() && !content.ends_with('\n'),
    };
    for (idx, (start, line)) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryRecord>(line) {
            Ok(record) => replay.records.push(record),
            Err(e) if Some(idx) == last_non_empty => {
                warn!(path = %path.display(), line = idx + 1, error = %e, "dropping torn trailing ledger line");
                replay.torn_at = Some(*start as u64);
                replay.unterminated = false;
            }
            Err(e) => {
                return Err(HistoryError::Corrupt {
                    line: idx + 1,
                    reason: e.to_string(),
                })
            }
        }
    }
    Ok(replay)
}

impl HistoryBackend for JsonlLedger {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn latest(&self, key: &HistoryKey) -> Result<Option<HistoryRecord>> {
        let guard = self.index.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get(key).cloned())
    }

    fn append(&self, record: &HistoryRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        {
            let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
            append_line(&mut *file, line.as_bytes())?;
        }
        let mut guard = self.index.write().unwrap_or_else(|e| e.into_inner());
        upsert_latest(&mut guard, record.clone());
        Ok(())
    }

    fn latest_all(&self) -> Result<Vec<HistoryRecord>> {
        let guard = self.index.read().unwrap_or_else(|e| e.into_inner());
        Ok(sorted(&guard))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use nudge_core::{DeliveryStatus, RuleKind};

    use super::*;

    fn key(task: &str) -> HistoryKey {
        HistoryKey::new(task, RuleKind::MissingLogtime, "dev@example.com")
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/history.jsonl");
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 3, 0, 0).unwrap();
        {
            let ledger = JsonlLedger::open(&path).unwrap();
            ledger
                .append(&HistoryRecord::new(&key("FC-1"), t, DeliveryStatus::Failure, "503"))
                .unwrap();
            ledger
                .append(&HistoryRecord::new(&key("FC-1"), t + Duration::hours(4), DeliveryStatus::Success, "ok"))
                .unwrap();
            ledger
                .append(&HistoryRecord::new(&key("FC-2"), t, DeliveryStatus::NoRoute, ""))
                .unwrap();
        }
        let reopened = JsonlLedger::open(&path).unwrap();
        let latest = reopened.latest(&key("FC-1")).unwrap().unwrap();
        assert_eq!(latest.status, DeliveryStatus::Success);
        assert_eq!(latest.sent_at, t + Duration::hours(4));
        assert_eq!(reopened.latest_all().unwrap().len(), 2);
        assert_eq!(JsonlLedger::read_all(&path).unwrap().len(), 3);
    }

    #[test]
    fn torn_trailing_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 3, 0, 0).unwrap();
        let good = serde_json::to_string(&HistoryRecord::new(&key("FC-1"), t, DeliveryStatus::Success, "")).unwrap();
        fs::write(&path, format!("{good}\n{{\"task_key\":\"FC-2\",\"ru")).unwrap();

        let ledger = JsonlLedger::open(&path).unwrap();
        assert!(ledger.latest(&key("FC-1")).unwrap().is_some());
        assert!(ledger.latest(&key("FC-2")).unwrap().is_none());

        // the torn tail is cut so later appends stay line-aligned
        ledger
            .append(&HistoryRecord::new(&key("FC-3"), t, DeliveryStatus::Success, ""))
            .unwrap();
        drop(ledger);
        assert_eq!(JsonlLedger::read_all(&path).unwrap().len(), 2);
    }

    #[test]
    fn corrupt_middle_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 3, 0, 0).unwrap();
        let good = serde_json::to_string(&HistoryRecord::new(&key("FC-1"), t, DeliveryStatus::Success, "")).unwrap();
        fs::write(&path, format!("garbage\n{good}\n")).unwrap();

        match JsonlLedger::open(&path) {
            Err(HistoryError::Corrupt { line, .. }) => assert_eq!(line, 1),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected corrupt ledger"),
        }
    }

    #[test]
    fn second_open_is_refused_while_first_is_alive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 3, 0, 0).unwrap();

        let first = JsonlLedger::open(&path).unwrap();
        first
            .append(&HistoryRecord::new(&key("FC-1"), t, DeliveryStatus::Success, "ok"))
            .unwrap();
        match JsonlLedger::open(&path) {
            Err(HistoryError::Locked { path: locked, .. }) => assert_eq!(locked, path),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected the ledger to be locked"),
        }
        // readers do not need the lock
        assert_eq!(JsonlLedger::read_latest(&path).unwrap().len(), 1);

        drop(first);
        let second = JsonlLedger::open(&path).unwrap();
        assert!(second.latest(&key("FC-1")).unwrap().is_some());
    }

    /// Accepts `accept` bytes, then fails every write.
    struct ShortWriter {
        data: Vec<u8>,
        accept: usize,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.accept.saturating_sub(self.data.len()).min(buf.len());
            if room == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.data.extend_from_slice(&buf[..room]);
            Ok(room)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AppendTarget for ShortWriter {
        fn len(&self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn partial_append_is_rolled_back() {
        let mut file = ShortWriter {
            data: b"{\"first\":1}\n".to_vec(),
            accept: 20,
        };
        let before = file.data.clone();

        let err = append_line(&mut file, b"{\"second\":\"a long line that does not fit\"}\n").unwrap_err();
        assert!(matches!(err, HistoryError::Io(_)));
        assert_eq!(file.data, before);

        // the next append starts on a clean line boundary
        file.accept = 1024;
        append_line(&mut file, b"{\"third\":3}\n").unwrap();
        assert_eq!(file.data, b"{\"first\":1}\n{\"third\":3}\n");
    }
}
