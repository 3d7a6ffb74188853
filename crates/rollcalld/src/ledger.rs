//! Attendance ledger: durable append-only CSV plus the per-session seen set.
//!
//! Within a session each identity is recorded once. A new session forgets
//! who was seen but never touches what was written.

use crate::status::{notify, Severity, StatusSink};
use chrono::{Local, NaiveDateTime};
use rollcall_core::Identity;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub const CSV_HEADER: &str = "Name,DateTime";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger write failed: {0}")]
    Write(#[from] std::io::Error),
}

/// One line of the durable ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub identity: Identity,
    pub timestamp: NaiveDateTime,
}

impl AttendanceRecord {
    pub fn now(identity: Identity) -> Self {
        Self {
            identity,
            timestamp: Local::now().naive_local(),
        }
    }

    pub fn formatted_time(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// `name,YYYY-MM-DD HH:MM:SS`, with the name quoted when CSV requires it.
    pub fn csv_row(&self) -> String {
        format!("{},{}", csv_field(self.identity.name()), self.formatted_time())
    }

    /// Line shown in the session log.
    pub fn log_line(&self) -> String {
        format!("{} marked present at {}", self.identity, self.formatted_time())
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Storage the ledger appends to.
pub trait LedgerStore: Send {
    /// Whether anything (including a header) has been written already.
    fn has_content(&self) -> std::io::Result<bool>;

    /// Append `text` in one write.
    fn append(&mut self, text: &str) -> std::io::Result<()>;
}

/// CSV file opened in append mode for every write.
#[derive(Debug, Clone)]
pub struct CsvFile {
    path: PathBuf,
}

impl CsvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LedgerStore for CsvFile {
    fn has_content(&self) -> std::io::Result<bool> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len() > 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn append(&mut self, text: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(text.as_bytes())?;
        file.flush()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    /// First sighting this session; the record was written.
    MarkedNow(AttendanceRecord),
    /// Already recorded this session; nothing was written.
    AlreadyMarked,
}

pub struct AttendanceLedger {
    store: Box<dyn LedgerStore>,
    seen: HashSet<Identity>,
    sink: Arc<dyn StatusSink>,
}

impl AttendanceLedger {
    pub fn new(store: Box<dyn LedgerStore>, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            store,
            seen: HashSet::new(),
            sink,
        }
    }

    /// Record `identity` unless it was already seen this session.
    ///
    /// On a write failure the identity stays unseen so the next sighting
    /// retries.
    pub fn mark(&mut self, identity: &Identity) -> Result<MarkOutcome, LedgerError> {
        if self.seen.contains(identity) {
            return Ok(MarkOutcome::AlreadyMarked);
        }

        let record = AttendanceRecord::now(identity.clone());
        match self.write(&record) {
            Ok(()) => {
                self.seen.insert(identity.clone());
                tracing::info!(identity = %identity, time = %record.formatted_time(), "attendance recorded");
                self.sink.attendance(&record);
                notify(
                    self.sink.as_ref(),
                    &format!("Attendance marked for {identity}."),
                    Severity::Success,
                );
                Ok(MarkOutcome::MarkedNow(record))
            }
            Err(e) => {
                notify(
                    self.sink.as_ref(),
                    &format!("Error marking attendance: {e}"),
                    Severity::Error,
                );
                Err(e)
            }
        }
    }

    fn write(&mut self, record: &AttendanceRecord) -> Result<(), LedgerError> {
        let mut text = String::new();
        if !self.store.has_content()? {
            text.push_str(CSV_HEADER);
            text.push('\n');
        }
        text.push_str(&record.csv_row());
        text.push('\n');
        self.store.append(&text)?;
        Ok(())
    }

    /// Forget this session's sightings. The durable ledger is untouched.
    pub fn new_session(&mut self) {
        tracing::info!(forgotten = self.seen.len(), "new attendance session");
        self.seen.clear();
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    #[cfg(test)]
    pub fn has_seen(&self, identity: &Identity) -> bool {
        self.seen.contains(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<(String, Severity)>>,
    }

    impl StatusSink for RecordingSink {
        fn status(&self, message: &str, severity: Severity) {
            self.messages.lock().unwrap().push((message.to_string(), severity));
        }
    }

    /// Store whose writes fail while `fail` is set.
    struct FlakyStore {
        fail: Arc<Mutex<bool>>,
        written: Arc<Mutex<String>>,
    }

    impl LedgerStore for FlakyStore {
        fn has_content(&self) -> std::io::Result<bool> {
            Ok(!self.written.lock().unwrap().is_empty())
        }

        fn append(&mut self, text: &str) -> std::io::Result<()> {
            if *self.fail.lock().unwrap() {
                return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"));
            }
            self.written.lock().unwrap().push_str(text);
            Ok(())
        }
    }

    fn csv_ledger(path: &Path) -> AttendanceLedger {
        AttendanceLedger::new(Box::new(CsvFile::new(path)), Arc::new(RecordingSink::default()))
    }

    fn lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_mark_twice_in_session_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        let mut ledger = csv_ledger(&path);
        let alice = Identity::new("alice");

        assert!(matches!(ledger.mark(&alice).unwrap(), MarkOutcome::MarkedNow(_)));
        assert_eq!(ledger.mark(&alice).unwrap(), MarkOutcome::AlreadyMarked);

        let lines = lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("alice,"));
    }

    #[test]
    fn test_new_session_records_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        let mut ledger = csv_ledger(&path);
        let alice = Identity::new("alice");

        ledger.mark(&alice).unwrap();
        ledger.new_session();
        assert_eq!(ledger.seen_count(), 0);
        assert!(matches!(ledger.mark(&alice).unwrap(), MarkOutcome::MarkedNow(_)));

        let lines = lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines.iter().filter(|l| *l == CSV_HEADER).count(), 1);
        assert!(lines[2].starts_with("alice,"));
    }

    #[test]
    fn test_existing_ledger_keeps_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(&path, "Name,DateTime\nbob,2024-01-01 08:00:00\n").unwrap();

        let mut ledger = csv_ledger(&path);
        ledger.mark(&Identity::new("carol")).unwrap();

        let lines = lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines.iter().filter(|l| *l == CSV_HEADER).count(), 1);
        assert_eq!(lines[1], "bob,2024-01-01 08:00:00");
        assert!(lines[2].starts_with("carol,"));
    }

    #[test]
    fn test_empty_existing_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(&path, "").unwrap();

        csv_ledger(&path).mark(&Identity::new("dave")).unwrap();
        assert_eq!(lines(&path)[0], CSV_HEADER);
    }

    #[test]
    fn test_row_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        csv_ledger(&path).mark(&Identity::new("erin")).unwrap();

        let row = &lines(&path)[1];
        let (name, time) = row.split_once(',').unwrap();
        assert_eq!(name, "erin");
        assert!(NaiveDateTime::parse_from_str(time, TIMESTAMP_FORMAT).is_ok(), "bad time: {time}");
    }

    #[test]
    fn test_write_failure_leaves_identity_unseen() {
        let fail = Arc::new(Mutex::new(true));
        let written = Arc::new(Mutex::new(String::new()));
        let sink = Arc::new(RecordingSink::default());
        let store = FlakyStore { fail: fail.clone(), written: written.clone() };
        let mut ledger = AttendanceLedger::new(Box::new(store), sink.clone());
        let frank = Identity::new("frank");

        assert!(matches!(ledger.mark(&frank), Err(LedgerError::Write(_))));
        assert!(!ledger.has_seen(&frank));
        let (message, severity) = sink.messages.lock().unwrap().last().cloned().unwrap();
        assert!(message.starts_with("Error marking attendance"));
        assert_eq!(severity, Severity::Error);

        *fail.lock().unwrap() = false;
        assert!(matches!(ledger.mark(&frank).unwrap(), MarkOutcome::MarkedNow(_)));
        assert!(ledger.has_seen(&frank));
        assert!(written.lock().unwrap().starts_with("Name,DateTime\nfrank,"));
    }

    #[test]
    fn test_success_status_message() {
        let sink = Arc::new(RecordingSink::default());
        let written = Arc::new(Mutex::new(String::new()));
        let store = FlakyStore { fail: Arc::new(Mutex::new(false)), written };
        let mut ledger = AttendanceLedger::new(Box::new(store), sink.clone());

        ledger.mark(&Identity::new("gina")).unwrap();
        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages[0], ("Attendance marked for gina.".to_string(), Severity::Success));
    }

    #[test]
    fn test_csv_quoting() {
        let record = AttendanceRecord {
            identity: Identity::new("Doe, \"JD\""),
            timestamp: NaiveDateTime::parse_from_str("2024-05-06 07:08:09", TIMESTAMP_FORMAT).unwrap(),
        };
        assert_eq!(record.csv_row(), "\"Doe, \"\"JD\"\"\",2024-05-06 07:08:09");
        assert_eq!(record.log_line(), "Doe, \"JD\" marked present at 2024-05-06 07:08:09");
    }
}
