//! Session controller: owns the camera loop and its lifecycle.
//!
//! One worker thread runs capture → recognize → mark → report while the
//! control context issues start/stop/new-session. The run state is a single
//! atomic so a second start can never spawn a second loop, and the worker
//! releases the camera before the state returns to idle.

use crate::ledger::{AttendanceLedger, MarkOutcome};
use crate::processor::FrameProcessor;
use crate::status::{notify, Severity, StatusSink};
use rollcall_core::{FaceEncoder, Gallery, Identity, Matcher};
use rollcall_hw::{CameraError, CaptureDevice, FrameSource};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;
use thiserror::Error;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("could not open video device: {0}")]
    CaptureOpen(#[from] CameraError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    /// Stop requested; the worker finishes its current frame first.
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Everything the controller needs, supplied by the daemon.
pub struct EngineParts {
    pub capture: Arc<dyn CaptureDevice>,
    pub camera_index: u32,
    pub encoder: Box<dyn FaceEncoder>,
    pub gallery_dir: PathBuf,
    pub matcher: Arc<dyn Matcher>,
    pub ledger: AttendanceLedger,
    pub sink: Arc<dyn StatusSink>,
}

/// State shared between the control context and the worker.
struct Shared {
    state: AtomicU8,
    capture: Arc<dyn CaptureDevice>,
    camera_index: u32,
    encoder: Mutex<Box<dyn FaceEncoder>>,
    gallery_dir: PathBuf,
    gallery: RwLock<Arc<Gallery>>,
    matcher: Arc<dyn Matcher>,
    ledger: Mutex<AttendanceLedger>,
    sink: Arc<dyn StatusSink>,
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn gallery(&self) -> Arc<Gallery> {
        Arc::clone(&self.gallery.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Rebuild the gallery and swap it in whole. On failure the previous
    /// gallery stays in place.
    fn reload_gallery(&self, encoder: &mut dyn FaceEncoder) {
        match Gallery::load(&self.gallery_dir, encoder) {
            Ok(load) => {
                for skipped in &load.skipped {
                    let name = skipped.path.file_name().unwrap_or_default().to_string_lossy();
                    notify(
                        self.sink.as_ref(),
                        &format!("Warning: skipped {name}: {}", skipped.reason),
                        Severity::Warning,
                    );
                }
                let severity = if load.created_dir || load.gallery.is_empty() {
                    Severity::Info
                } else {
                    Severity::Success
                };
                notify(self.sink.as_ref(), &load.summary(&self.gallery_dir), severity);
                *self.gallery.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(load.gallery);
            }
            Err(e) => notify(self.sink.as_ref(), &format!("Error loading faces: {e}"), Severity::Error),
        }
    }

    fn mark(&self, identity: &Identity) {
        match lock(&self.ledger).mark(identity) {
            Ok(MarkOutcome::MarkedNow(record)) => {
                tracing::debug!(line = %record.log_line(), "session log appended");
            }
            Ok(MarkOutcome::AlreadyMarked) => {}
            // The ledger reports its own failures to the sink.
            Err(e) => {
                tracing::debug!(identity = %identity, error = %e, "mark failed, will retry on next sighting");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }
}

/// Drives the camera loop. Cheap to share behind an `Arc`.
pub struct SessionController {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(parts: EngineParts) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(IDLE),
                capture: parts.capture,
                camera_index: parts.camera_index,
                encoder: Mutex::new(parts.encoder),
                gallery_dir: parts.gallery_dir,
                gallery: RwLock::new(Arc::new(Gallery::default())),
                matcher: parts.matcher,
                ledger: Mutex::new(parts.ledger),
                sink: parts.sink,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> RunState {
        match self.shared.state.load(Ordering::Acquire) {
            RUNNING => RunState::Running,
            STOPPING => RunState::Stopping,
            _ => RunState::Idle,
        }
    }

    pub fn gallery_size(&self) -> usize {
        self.shared.gallery().len()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.shared.ledger).seen_count()
    }

    /// Open the camera and spawn the loop. A no-op unless idle.
    pub fn start(&self) -> Result<StartOutcome, EngineError> {
        if self
            .shared
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("start ignored, camera loop already active");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let source = match self.shared.capture.open(self.shared.camera_index) {
            Ok(source) => source,
            Err(e) => {
                self.shared.state.store(IDLE, Ordering::Release);
                notify(
                    self.shared.sink.as_ref(),
                    &format!("Could not open video device. ({e})"),
                    Severity::Error,
                );
                return Err(EngineError::CaptureOpen(e));
            }
        };

        let mut worker = lock(&self.worker);
        // The previous worker has already released its device; reap it.
        if let Some(old) = worker.take() {
            let _ = old.join();
        }

        // Reported before the worker exists so its own exit status lands last.
        self.shared.sink.running_changed(true);
        notify(
            self.shared.sink.as_ref(),
            &format!("Camera {} started.", self.shared.camera_index),
            Severity::Info,
        );

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("rollcall-engine".into())
            .spawn(move || run_loop(shared, source));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                // The closure, and the device inside it, were dropped with the error.
                self.shared.state.store(IDLE, Ordering::Release);
                self.shared.sink.running_changed(false);
                notify(
                    self.shared.sink.as_ref(),
                    &format!("Could not start camera loop: {e}"),
                    Severity::Error,
                );
                Err(EngineError::Spawn(e))
            }
        }
    }

    /// Ask the loop to stop after its current frame. Returns `false` if it
    /// was not running.
    pub fn stop(&self) -> bool {
        let requested = self
            .shared
            .state
            .compare_exchange(RUNNING, STOPPING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if requested {
            notify(self.shared.sink.as_ref(), "Camera stopped.", Severity::Info);
        } else {
            tracing::debug!("stop ignored, camera loop not running");
        }
        requested
    }

    /// Start a new attendance session. Legal whether or not the loop runs.
    pub fn new_session(&self) {
        // Clear the displayed log under the ledger lock so a concurrent mark
        // lands either before both or after both.
        let mut ledger = lock(&self.shared.ledger);
        ledger.new_session();
        self.shared.sink.log_cleared();
        drop(ledger);
        notify(self.shared.sink.as_ref(), "New session started.", Severity::Success);
    }

    /// Wait for the current worker, if any, to exit.
    pub fn join(&self) {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("engine thread panicked");
            }
        }
    }

    /// Stop the loop and wait for it.
    pub fn shutdown(&self) {
        self.stop();
        self.join();
    }
}

enum LoopExit {
    Stopped,
    ReadFailed(CameraError),
}

fn run_loop(shared: Arc<Shared>, mut source: Box<dyn FrameSource>) {
    tracing::info!("engine thread started");

    let mut encoder = lock(&shared.encoder);
    shared.reload_gallery(&mut **encoder);

    let mut processor = FrameProcessor::new();
    let mut frames = 0u64;

    let exit = loop {
        if !shared.is_running() {
            break LoopExit::Stopped;
        }
        let mut frame = match source.read_frame() {
            Ok(frame) => frame,
            Err(e) => break LoopExit::ReadFailed(e),
        };
        let gallery = shared.gallery();
        let matches = processor.process(
            &mut frame,
            &mut **encoder,
            &gallery,
            shared.matcher.as_ref(),
            |identity| shared.mark(identity),
        );
        shared.sink.frame(&frame, &matches);
        frames += 1;
    };

    drop(encoder);
    drop(source);
    shared.state.store(IDLE, Ordering::Release);
    shared.sink.running_changed(false);

    match exit {
        LoopExit::Stopped => tracing::info!(frames, "engine thread exiting"),
        LoopExit::ReadFailed(e) => {
            tracing::info!(frames, "engine thread exiting after capture failure");
            notify(shared.sink.as_ref(), &format!("Failed to capture video: {e}"), Severity::Error);
        }
    }
}
