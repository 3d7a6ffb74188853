//! Status reporting toward whatever displays the engine.
//!
//! The engine never touches a UI: it calls a [`StatusSink`]. The daemon's
//! sink keeps the latest state for the D-Bus surface.

use crate::ledger::AttendanceRecord;
use crate::processor::FaceMatch;
use image::GrayImage;
use rollcall_hw::Frame;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Receives engine events. Called from both the worker and the control context.
pub trait StatusSink: Send + Sync {
    fn status(&self, message: &str, severity: Severity);

    fn running_changed(&self, _running: bool) {}

    fn attendance(&self, _record: &AttendanceRecord) {}

    /// The displayed session log should be emptied.
    fn log_cleared(&self) {}

    /// An annotated frame and the faces drawn on it.
    fn frame(&self, _frame: &Frame, _matches: &[FaceMatch]) {}
}

/// Log a status message and forward it to the sink.
pub fn notify(sink: &dyn StatusSink, message: &str, severity: Severity) {
    match severity {
        Severity::Info | Severity::Success => tracing::info!(status = message),
        Severity::Warning => tracing::warn!(status = message),
        Severity::Error => tracing::error!(status = message),
    }
    sink.status(message, severity);
}

/// Point-in-time view of the daemon's display state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub message: String,
    pub severity: Severity,
    pub running: bool,
    pub log: Vec<String>,
    pub matches: Vec<FaceMatch>,
}

#[derive(Default)]
struct Latest {
    message: String,
    severity: Option<Severity>,
    running: bool,
    log: Vec<String>,
    frame: Option<Frame>,
    matches: Vec<FaceMatch>,
}

/// Sink that remembers the latest state for remote queries.
#[derive(Default)]
pub struct DaemonStatus {
    latest: Mutex<Latest>,
}

impl DaemonStatus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Latest> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let latest = self.lock();
        StatusSnapshot {
            message: if latest.message.is_empty() {
                "Waiting for action".to_string()
            } else {
                latest.message.clone()
            },
            severity: latest.severity.unwrap_or(Severity::Info),
            running: latest.running,
            log: latest.log.clone(),
            matches: latest.matches.clone(),
        }
    }

    /// Write the latest annotated frame to `path`. Returns `false` if no
    /// frame has been captured yet.
    pub fn save_frame(&self, path: &Path) -> Result<bool, image::ImageError> {
        let Some(frame) = self.lock().frame.clone() else {
            return Ok(false);
        };
        match GrayImage::from_raw(frame.width, frame.height, frame.data) {
            Some(img) => {
                img.save(path)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl StatusSink for DaemonStatus {
    fn status(&self, message: &str, severity: Severity) {
        let mut latest = self.lock();
        latest.message = message.to_string();
        latest.severity = Some(severity);
    }

    fn running_changed(&self, running: bool) {
        self.lock().running = running;
    }

    fn attendance(&self, record: &AttendanceRecord) {
        self.lock().log.push(record.log_line());
    }

    fn log_cleared(&self) {
        self.lock().log.clear();
    }

    fn frame(&self, frame: &Frame, matches: &[FaceMatch]) {
        let mut latest = self.lock();
        latest.frame = Some(frame.clone());
        latest.matches = matches.to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rollcall_core::Identity;

    fn record(name: &str) -> AttendanceRecord {
        AttendanceRecord {
            identity: Identity::new(name),
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(9, 15, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_snapshot_defaults() {
        let status = DaemonStatus::new();
        let snap = status.snapshot();
        assert_eq!(snap.message, "Waiting for action");
        assert!(!snap.running);
        assert!(snap.log.is_empty());
    }

    #[test]
    fn test_log_accumulates_and_clears() {
        let status = DaemonStatus::new();
        status.attendance(&record("alice"));
        status.attendance(&record("bob"));
        assert_eq!(
            status.snapshot().log,
            vec![
                "alice marked present at 2024-03-01 09:15:00",
                "bob marked present at 2024-03-01 09:15:00"
            ]
        );
        status.log_cleared();
        assert!(status.snapshot().log.is_empty());
    }

    #[test]
    fn test_notify_updates_message() {
        let status = DaemonStatus::new();
        notify(&status, "Camera stopped.", Severity::Info);
        status.running_changed(true);
        let snap = status.snapshot();
        assert_eq!(snap.message, "Camera stopped.");
        assert_eq!(snap.severity, Severity::Info);
        assert!(snap.running);
    }

    #[test]
    fn test_notify_forwards_every_severity() {
        #[derive(Default)]
        struct Collect(Mutex<Vec<(String, Severity)>>);

        impl StatusSink for Collect {
            fn status(&self, message: &str, severity: Severity) {
                self.0.lock().unwrap().push((message.to_string(), severity));
            }
        }

        let sink = Collect::default();
        for severity in [Severity::Info, Severity::Success, Severity::Warning, Severity::Error] {
            notify(&sink, &format!("{severity:?}"), severity);
        }

        let seen = sink.0.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[2], ("Warning".to_string(), Severity::Warning));
        assert_eq!(seen[3], ("Error".to_string(), Severity::Error));
    }

    #[test]
    fn test_save_frame() {
        let status = DaemonStatus::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.png");

        assert!(!status.save_frame(&path).unwrap());

        status.frame(&Frame::new(vec![7; 4 * 3], 4, 3, 0), &[]);
        assert!(status.save_frame(&path).unwrap());
        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (4, 3));
    }
}
