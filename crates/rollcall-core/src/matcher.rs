//! Nearest-neighbour identity matching over the enrollment gallery.

use crate::gallery::Gallery;
use crate::types::{Encoding, Identity};

/// Euclidean cutoff for "plausibly the same person" on unit-length ArcFace
/// encodings.
///
/// For L2-normalized vectors `d = sqrt(2 - 2 * cos)`, so this is the distance
/// equivalent of a cosine similarity of 0.40: `sqrt(1.2)`.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 1.095_445;

/// Result of matching a probe encoding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// The recognized identity, or `None` for an unknown face.
    pub identity: Option<Identity>,
    /// Distance to the nearest gallery entry, whether or not it passed the threshold.
    pub distance: Option<f32>,
}

impl MatchResult {
    pub fn unknown() -> Self {
        Self { identity: None, distance: None }
    }

    pub fn is_known(&self) -> bool {
        self.identity.is_some()
    }
}

/// Strategy for resolving a probe encoding to an enrolled identity.
pub trait Matcher: Send + Sync {
    fn compare(&self, probe: &Encoding, gallery: &Gallery) -> MatchResult;
}

/// Euclidean nearest neighbour gated by a distance threshold.
///
/// The nearest entry is chosen first (ties keep the earliest gallery row),
/// then rejected as unknown if it is farther than `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Encoding, gallery: &Gallery) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, entry) in gallery.entries().iter().enumerate() {
            let Some(distance) = probe.euclidean_distance(&entry.encoding) else {
                tracing::debug!(
                    identity = %entry.identity,
                    expected = entry.encoding.len(),
                    actual = probe.len(),
                    "skipping gallery entry with mismatched encoding length"
                );
                continue;
            };
            // Strict `<` keeps the first-encountered entry on ties.
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }

        match best {
            Some((idx, distance)) if distance <= self.threshold => MatchResult {
                identity: Some(gallery.entries()[idx].identity.clone()),
                distance: Some(distance),
            },
            Some((_, distance)) => MatchResult {
                identity: None,
                distance: Some(distance),
            },
            None => MatchResult::unknown(),
        }
    }
}
