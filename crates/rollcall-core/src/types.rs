use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Scale position, size and landmarks by `factor` (confidence unchanged).
    ///
    /// Used to map boxes found on a downscaled frame back onto the full frame.
    pub fn scaled(&self, factor: f32) -> BoundingBox {
        BoundingBox {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx * factor, ly * factor))),
        }
    }
}

/// Face encoding vector (512 values for the ArcFace backend).
///
/// Distances are only meaningful between encodings of equal length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance to `other`, or `None` when the lengths differ.
    pub fn euclidean_distance(&self, other: &Encoding) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        let sum = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>();
        Some(sum.sqrt())
    }
}

/// An enrolled person, named after the stem of their enrollment image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One face found in an image: where it is and what it encodes to.
#[derive(Debug, Clone)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub encoding: Encoding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Encoding::new(vec![0.1, 0.2, 0.3]);
        assert_eq!(a.euclidean_distance(&a), Some(0.0));
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = Encoding::new(vec![0.0, 0.0]);
        let b = Encoding::new(vec![3.0, 4.0]);
        let d = a.euclidean_distance(&b).unwrap();
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_length_mismatch() {
        let a = Encoding::new(vec![1.0, 0.0]);
        let b = Encoding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.euclidean_distance(&b), None);
    }

    #[test]
    fn test_bbox_scaled() {
        let bbox = BoundingBox {
            x: 10.0,
            y: 5.0,
            width: 20.0,
            height: 30.0,
            confidence: 0.9,
            landmarks: Some([(1.0, 2.0); 5]),
        };
        let up = bbox.scaled(4.0);
        assert_eq!((up.x, up.y, up.width, up.height), (40.0, 20.0, 80.0, 120.0));
        assert_eq!(up.confidence, 0.9);
        assert_eq!(up.landmarks.unwrap()[0], (4.0, 8.0));
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::new("alice").to_string(), "alice");
    }
}
