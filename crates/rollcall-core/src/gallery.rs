//! Enrollment gallery: one encoding per photo in the known-faces directory.
//!
//! The identity is the photo's filename stem. Photos that fail to decode or
//! contain no face are skipped with a warning; only directory access errors
//! fail the whole load.

use crate::encoder::FaceEncoder;
use crate::types::{Encoding, Identity};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ENROLLMENT_EXTENSIONS: [&str; 2] = ["jpg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("enrollment directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One enrolled face.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub identity: Identity,
    pub encoding: Encoding,
}

/// The set of enrolled faces, in enrollment-directory filename order.
///
/// Built wholesale by [`Gallery::load`]; never edited in place.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

/// Why an enrollment photo was left out of the gallery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Decode(String),
    NoFace,
    Encode(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Decode(e) => write!(f, "could not decode image: {e}"),
            SkipReason::NoFace => f.write_str("no face found"),
            SkipReason::Encode(e) => write!(f, "face encoding failed: {e}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkippedImage {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Outcome of a gallery load.
#[derive(Debug)]
pub struct GalleryLoad {
    pub gallery: Gallery,
    /// The directory did not exist and was created empty.
    pub created_dir: bool,
    pub skipped: Vec<SkippedImage>,
}

impl GalleryLoad {
    /// Human-readable one-line summary for status reporting.
    pub fn summary(&self, dir: &Path) -> String {
        if self.created_dir {
            format!("Created missing directory: {}", dir.display())
        } else if self.gallery.is_empty() && self.skipped.is_empty() {
            format!("No images found in {}.", dir.display())
        } else {
            format!("Loaded {} faces successfully.", self.gallery.len())
        }
    }
}

impl Gallery {
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a gallery from every `.jpg`/`.png` in `dir`, creating `dir` if missing.
    pub fn load(dir: &Path, encoder: &mut dyn FaceEncoder) -> Result<GalleryLoad, GalleryError> {
        let io_err = |source| GalleryError::Io { path: dir.to_path_buf(), source };

        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
            tracing::info!(dir = %dir.display(), "created missing enrollment directory");
            return Ok(GalleryLoad {
                gallery: Gallery::default(),
                created_dir: true,
                skipped: Vec::new(),
            });
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && is_enrollment_image(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        let mut skipped = Vec::new();

        for path in paths {
            match enroll_one(&path, encoder) {
                Ok(entry) => {
                    tracing::debug!(identity = %entry.identity, path = %path.display(), "enrolled");
                    entries.push(entry);
                }
                Err(reason) => {
                    tracing::warn!(path = %path.display(), %reason, "skipping enrollment image");
                    skipped.push(SkippedImage { path, reason });
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            enrolled = entries.len(),
            skipped = skipped.len(),
            "gallery loaded"
        );

        Ok(GalleryLoad {
            gallery: Gallery { entries },
            created_dir: false,
            skipped,
        })
    }
}

fn is_enrollment_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ENROLLMENT_EXTENSIONS.iter().any(|want| ext.eq_ignore_ascii_case(want)))
}

/// Decode, detect, and keep the first face's encoding.
fn enroll_one(path: &Path, encoder: &mut dyn FaceEncoder) -> Result<GalleryEntry, SkipReason> {
    let image = image::open(path)
        .map_err(|e| SkipReason::Decode(e.to_string()))?
        .to_luma8();

    let faces = encoder
        .encode_faces(image.as_raw(), image.width(), image.height())
        .map_err(|e| SkipReason::Encode(e.to_string()))?;

    let first = faces.into_iter().next().ok_or(SkipReason::NoFace)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(GalleryEntry {
        identity: Identity::new(name),
        encoding: first.encoding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncoderError;
    use crate::types::{BoundingBox, FaceDetection};
    use image::{GrayImage, Luma};

    /// Reads the top-left pixel: 0 → no face, otherwise two faces whose
    /// encodings are `[v]` and `[v + 1000]`.
    struct PixelEncoder;

    impl FaceEncoder for PixelEncoder {
        fn encode_faces(
            &mut self,
            pixels: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<FaceDetection>, EncoderError> {
            let v = pixels[0];
            if v == 0 {
                return Ok(Vec::new());
            }
            let face = |value: f32| FaceDetection {
                bbox: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 1.0,
                    height: 1.0,
                    confidence: 0.9,
                    landmarks: None,
                },
                encoding: Encoding::new(vec![value]),
            };
            Ok(vec![face(v as f32), face(v as f32 + 1000.0)])
        }
    }

    fn write_photo(dir: &Path, name: &str, value: u8) {
        GrayImage::from_pixel(8, 8, Luma([value])).save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_load_creates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("known_faces");

        let load = Gallery::load(&dir, &mut PixelEncoder).unwrap();
        assert!(load.created_dir);
        assert!(load.gallery.is_empty());
        assert!(dir.is_dir());
        assert!(load.summary(&dir).starts_with("Created missing directory"));
    }

    #[test]
    fn test_load_uses_stem_and_first_face() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "bob.png", 20);
        write_photo(dir.path(), "alice.jpg", 10);

        let load = Gallery::load(dir.path(), &mut PixelEncoder).unwrap();
        let names: Vec<&str> = load.gallery.entries().iter().map(|e| e.identity.name()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        // JPEG is lossy, but a flat gray image survives exactly enough.
        assert!((load.gallery.entries()[0].encoding.values[0] - 10.0).abs() <= 2.0);
        assert_eq!(load.gallery.entries()[1].encoding, Encoding::new(vec![20.0]));
        assert_eq!(load.summary(dir.path()), "Loaded 2 faces successfully.");
    }

    #[test]
    fn test_faceless_photo_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "empty_room.png", 0);
        write_photo(dir.path(), "carol.png", 30);

        let load = Gallery::load(dir.path(), &mut PixelEncoder).unwrap();
        assert_eq!(load.gallery.len(), 1);
        assert_eq!(load.gallery.entries()[0].identity.name(), "carol");
        assert_eq!(load.skipped.len(), 1);
        assert_eq!(load.skipped[0].reason, SkipReason::NoFace);
    }

    #[test]
    fn test_undecodable_photo_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();
        write_photo(dir.path(), "dave.png", 40);

        let load = Gallery::load(dir.path(), &mut PixelEncoder).unwrap();
        assert_eq!(load.gallery.len(), 1);
        assert!(matches!(load.skipped[0].reason, SkipReason::Decode(_)));
    }

    #[test]
    fn test_other_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();
        write_photo(dir.path(), "ERIN.PNG", 50);

        let load = Gallery::load(dir.path(), &mut PixelEncoder).unwrap();
        assert_eq!(load.gallery.len(), 1);
        assert_eq!(load.gallery.entries()[0].identity.name(), "ERIN");
        assert!(load.skipped.is_empty());
    }

    #[test]
    fn test_empty_directory_summary() {
        let dir = tempfile::tempdir().unwrap();
        let load = Gallery::load(dir.path(), &mut PixelEncoder).unwrap();
        assert!(load.gallery.is_empty());
        assert!(load.summary(dir.path()).starts_with("No images found"));
    }

    #[test]
    fn test_unreadable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain_file");
        std::fs::write(&file, b"x").unwrap();

        assert!(matches!(
            Gallery::load(&file, &mut PixelEncoder),
            Err(GalleryError::Io { .. })
        ));
    }
}
