use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{default_model_dir, Gallery, OnnxFaceEncoder};
use rollcall_hw::Camera;
use std::path::PathBuf;

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    fn start(&self) -> zbus::Result<bool>;
    fn stop(&self) -> zbus::Result<bool>;
    fn new_session(&self) -> zbus::Result<()>;
    fn status(&self) -> zbus::Result<String>;
    fn log(&self) -> zbus::Result<String>;
    fn snapshot(&self, path: &str) -> zbus::Result<bool>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "rollcall attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the camera and begin marking attendance
    Start,
    /// Stop the camera
    Stop,
    /// Begin a new session so everyone can be marked again
    NewSession,
    /// Show daemon status
    Status,
    /// Show attendance marked this session
    Log,
    /// Save the latest annotated frame
    Snapshot {
        /// Output image path (format chosen by extension)
        path: PathBuf,
    },
    /// List video capture devices
    Devices,
    /// Load the enrollment gallery locally and report what was found
    Gallery {
        /// Directory of enrollment photos
        #[arg(short, long, default_value = "known_faces")]
        dir: PathBuf,
        /// Directory holding the ONNX models
        #[arg(short, long)]
        models: Option<PathBuf>,
    },
}

async fn proxy() -> Result<AttendanceProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    AttendanceProxy::new(&conn)
        .await
        .context("rollcalld is not reachable")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            if proxy().await?.start().await? {
                println!("Camera started");
            } else {
                println!("Camera already running");
            }
        }
        Commands::Stop => {
            if proxy().await?.stop().await? {
                println!("Camera stopped");
            } else {
                println!("Camera was not running");
            }
        }
        Commands::NewSession => {
            proxy().await?.new_session().await?;
            println!("New session started");
        }
        Commands::Status => {
            let raw = proxy().await?.status().await?;
            let value: serde_json::Value = serde_json::from_str(&raw).context("parsing status")?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Log => {
            let raw = proxy().await?.log().await?;
            let lines: Vec<String> = serde_json::from_str(&raw).context("parsing log")?;
            if lines.is_empty() {
                println!("No attendance marked this session");
            }
            for line in lines {
                println!("{line}");
            }
        }
        Commands::Snapshot { path } => {
            // The daemon resolves paths against its own working directory.
            let path = if path.is_relative() {
                std::env::current_dir()?.join(path)
            } else {
                path
            };
            let shown = path.display().to_string();
            if proxy().await?.snapshot(&shown).await? {
                println!("Saved frame to {shown}");
            } else {
                println!("No frame captured yet");
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Gallery { dir, models } => {
            let models = models.unwrap_or_else(default_model_dir);
            let mut encoder = OnnxFaceEncoder::load(&models)
                .with_context(|| format!("loading face models from {}", models.display()))?;
            let load = Gallery::load(&dir, &mut encoder)?;

            println!("{}", load.summary(&dir));
            for entry in load.gallery.entries() {
                println!("  {}", entry.identity);
            }
            for skipped in &load.skipped {
                println!("  skipped {}: {}", skipped.path.display(), skipped.reason);
            }
        }
    }

    Ok(())
}
