//! Detection + encoding seam used by the gallery and the frame pipeline.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::FaceDetection;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds faces in a grayscale image and encodes each one.
///
/// Implementations return faces ordered by detector confidence, highest
/// first, so callers that want "the first face" get the most confident one.
pub trait FaceEncoder: Send {
    fn encode_faces(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceDetection>, EncoderError>;
}

/// SCRFD detection followed by ArcFace encoding, both via ONNX Runtime.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, EncoderError> {
        let det_path = model_dir.join(DETECTOR_MODEL_FILE);
        let rec_path = model_dir.join(RECOGNIZER_MODEL_FILE);

        let detector = FaceDetector::load(&det_path)?;
        let recognizer = FaceRecognizer::load(&rec_path)?;

        tracing::info!(dir = %model_dir.display(), "face encoder ready");
        Ok(Self { detector, recognizer })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode_faces(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceDetection>, EncoderError> {
        let faces = self.detector.detect(pixels, width, height)?;

        let mut out = Vec::with_capacity(faces.len());
        for bbox in faces {
            let encoding = self.recognizer.extract(pixels, width, height, &bbox)?;
            out.push(FaceDetection { bbox, encoding });
        }
        Ok(out)
    }
}

/// Default model directory: `$XDG_DATA_HOME/rollcall/models`, else
/// `~/.local/share/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall/models")
}
