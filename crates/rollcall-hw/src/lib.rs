//! rollcall-hw: camera capture for the attendance loop.
//!
//! V4L2 access by device index, plus the grayscale frame type the
//! recognition pipeline consumes.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraStream, CaptureDevice, FrameSource, PixelFormat, V4lCapture};
pub use frame::Frame;
