use crate::engine::{SessionController, StartOutcome};
use crate::status::DaemonStatus;
use std::path::PathBuf;
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus control surface for the attendance daemon.
///
/// Bus name: org.rollcall.Attendance1 (session bus)
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    controller: Arc<SessionController>,
    status: Arc<DaemonStatus>,
}

impl AttendanceService {
    pub fn new(controller: Arc<SessionController>, status: Arc<DaemonStatus>) -> Self {
        Self { controller, status }
    }
}

fn failed(e: impl std::fmt::Display) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Start the camera loop. Returns false if it was already running.
    async fn start(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("start requested");
        let controller = Arc::clone(&self.controller);
        let outcome = tokio::task::spawn_blocking(move || controller.start())
            .await
            .map_err(failed)?
            .map_err(failed)?;
        Ok(outcome == StartOutcome::Started)
    }

    /// Stop the camera loop after the current frame.
    async fn stop(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("stop requested");
        Ok(self.controller.stop())
    }

    /// Forget who was seen this session; the CSV is untouched.
    async fn new_session(&self) -> zbus::fdo::Result<()> {
        tracing::info!("new session requested");
        let controller = Arc::clone(&self.controller);
        tokio::task::spawn_blocking(move || controller.new_session())
            .await
            .map_err(failed)
    }

    /// Daemon status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let snap = self.status.snapshot();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "state": format!("{:?}", self.controller.state()).to_lowercase(),
            "running": snap.running,
            "message": snap.message,
            "severity": snap.severity,
            "gallery_size": self.controller.gallery_size(),
            "seen_this_session": self.controller.session_count(),
            "faces": snap.matches,
        })
        .to_string())
    }

    /// This session's attendance lines as a JSON array.
    async fn log(&self) -> zbus::fdo::Result<String> {
        serde_json::to_string(&self.status.snapshot().log).map_err(failed)
    }

    /// Save the latest annotated frame as an image at `path`.
    async fn snapshot(&self, path: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(path, "snapshot requested");
        let status = Arc::clone(&self.status);
        let path = PathBuf::from(path);
        tokio::task::spawn_blocking(move || status.save_frame(&path))
            .await
            .map_err(failed)?
            .map_err(failed)
    }
}
