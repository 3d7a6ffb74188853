use anyhow::{bail, Context, Result};
use rollcall_core::{EuclideanMatcher, OnnxFaceEncoder};
use rollcall_hw::V4lCapture;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod access;
mod config;
mod dbus_interface;
mod engine;
mod ledger;
mod processor;
mod status;

use access::AccessDecision;
use config::Config;
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};
use engine::{EngineParts, SessionController};
use ledger::{AttendanceLedger, CsvFile};
use status::DaemonStatus;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load();
    tracing::info!(
        known_faces = %config.known_faces_dir.display(),
        attendance = %config.attendance_csv.display(),
        camera = config.camera_index,
        threshold = config.match_threshold,
        "rollcalld starting"
    );

    let supplied = access::read_secret(
        std::env::var("ROLLCALL_ACCESS_SECRET").ok(),
        &mut std::io::stdin().lock(),
        &mut std::io::stdout(),
    )
    .context("reading access secret")?;
    match access::check(&supplied, &config.access_secret) {
        AccessDecision::Granted => println!("Access granted"),
        AccessDecision::Denied => {
            println!("Access denied");
            bail!("access denied");
        }
    }

    let encoder = OnnxFaceEncoder::load(&config.model_dir)
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))?;

    let status = Arc::new(DaemonStatus::new());
    let ledger = AttendanceLedger::new(Box::new(CsvFile::new(&config.attendance_csv)), status.clone());
    let controller = Arc::new(SessionController::new(EngineParts {
        capture: Arc::new(V4lCapture),
        camera_index: config.camera_index,
        encoder: Box::new(encoder),
        gallery_dir: config.known_faces_dir.clone(),
        matcher: Arc::new(EuclideanMatcher::new(config.match_threshold)),
        ledger,
        sink: status.clone(),
    }));

    let service = AttendanceService::new(Arc::clone(&controller), Arc::clone(&status));
    let _connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("registering on the session bus")?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    tokio::task::spawn_blocking(move || controller.shutdown()).await?;

    Ok(())
}
