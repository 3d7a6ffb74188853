//! Per-frame recognition: throttled detection, matching, and overlay.

use rollcall_core::{BoundingBox, FaceEncoder, Gallery, Identity, Matcher};
use rollcall_hw::Frame;
use serde::Serialize;

/// Detection runs on a frame this many times smaller in each dimension.
pub const DETECTION_SCALE: u32 = 4;

const BOX_THICKNESS: u32 = 2;
const BOX_VALUE: u8 = 255;

/// A face drawn on a frame and who it was matched to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceMatch {
    /// Position on the full-resolution frame.
    pub bbox: BoundingBox,
    pub identity: Option<Identity>,
    pub distance: Option<f32>,
}

impl FaceMatch {
    pub fn label(&self) -> &str {
        self.identity.as_ref().map_or("Unknown", Identity::name)
    }
}

/// Alternates between recognizing a frame and re-drawing the last result.
pub struct FrameProcessor {
    process_this_frame: bool,
    last: Vec<FaceMatch>,
}

impl Default for FrameProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameProcessor {
    pub fn new() -> Self {
        Self {
            process_this_frame: true,
            last: Vec::new(),
        }
    }

    /// Annotate `frame` in place and return the faces drawn on it.
    ///
    /// On recognition frames every known face is passed to `on_recognized`,
    /// including faces already seen; deduplication belongs to the ledger.
    /// Skipped frames reuse the previous frame's matches.
    pub fn process(
        &mut self,
        frame: &mut Frame,
        encoder: &mut dyn FaceEncoder,
        gallery: &Gallery,
        matcher: &dyn Matcher,
        mut on_recognized: impl FnMut(&Identity),
    ) -> Vec<FaceMatch> {
        if self.process_this_frame {
            self.last = recognize(frame, encoder, gallery, matcher);
            if !self.last.is_empty() {
                let labels: Vec<&str> = self.last.iter().map(FaceMatch::label).collect();
                tracing::trace!(seq = frame.sequence, faces = ?labels, "frame recognized");
            }
            for identity in self.last.iter().filter_map(|m| m.identity.as_ref()) {
                on_recognized(identity);
            }
        }
        self.process_this_frame = !self.process_this_frame;

        for m in &self.last {
            frame.draw_rect(m.bbox.x, m.bbox.y, m.bbox.width, m.bbox.height, BOX_THICKNESS, BOX_VALUE);
        }
        self.last.clone()
    }
}

fn recognize(
    frame: &Frame,
    encoder: &mut dyn FaceEncoder,
    gallery: &Gallery,
    matcher: &dyn Matcher,
) -> Vec<FaceMatch> {
    let small = frame.downscale(DETECTION_SCALE);
    // Partial edge blocks are dropped, so a small pixel x is full-frame x * scale.
    // A frame smaller than one block is not downscaled, so neither are its boxes.
    let scale_back = if small.width != frame.width {
        DETECTION_SCALE as f32
    } else {
        1.0
    };

    let faces = match encoder.encode_faces(&small.data, small.width, small.height) {
        Ok(faces) => faces,
        Err(e) => {
            tracing::warn!(seq = frame.sequence, error = %e, "face detection failed on frame");
            return Vec::new();
        }
    };

    faces
        .into_iter()
        .map(|face| {
            let result = matcher.compare(&face.encoding, gallery);
            FaceMatch {
                bbox: face.bbox.scaled(scale_back),
                identity: result.identity,
                distance: result.distance,
            }
        })
        .collect()
}
