//! rollcall-core: face recognition for attendance.
//!
//! SCRFD detection and ArcFace encoding via ONNX Runtime, the enrollment
//! gallery built from a directory of photos, and distance-based matching.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod gallery;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use encoder::{default_model_dir, EncoderError, FaceEncoder, OnnxFaceEncoder};
pub use gallery::{Gallery, GalleryEntry, GalleryError, GalleryLoad, SkipReason, SkippedImage};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use types::{BoundingBox, Encoding, FaceDetection, Identity};
