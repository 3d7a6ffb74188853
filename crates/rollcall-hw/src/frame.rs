//! Grayscale frames: YUYV conversion, downscaling, and box overlay.

use std::time::Instant;

/// A captured grayscale camera frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
    pub sequence: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
            sequence,
        }
    }

    /// Shrink by an integer `factor` in each dimension, averaging each block.
    ///
    /// Trailing rows/columns that do not fill a whole block are dropped. A
    /// frame smaller than one block comes back unchanged.
    pub fn downscale(&self, factor: u32) -> Frame {
        if factor <= 1 || self.width < factor || self.height < factor {
            return self.clone();
        }
        let (w, f) = (self.width as usize, factor as usize);
        let out_w = self.width / factor;
        let out_h = self.height / factor;

        let mut data = Vec::with_capacity((out_w * out_h) as usize);
        for by in 0..out_h as usize {
            for bx in 0..out_w as usize {
                let mut sum = 0u32;
                for y in by * f..(by + 1) * f {
                    let row = &self.data[y * w + bx * f..y * w + (bx + 1) * f];
                    sum += row.iter().map(|&p| p as u32).sum::<u32>();
                }
                data.push((sum / (f * f) as u32) as u8);
            }
        }

        Frame {
            data,
            width: out_w,
            height: out_h,
            timestamp: self.timestamp,
            sequence: self.sequence,
        }
    }

    /// Draw an unfilled rectangle, clipped to the frame.
    pub fn draw_rect(&mut self, x: f32, y: f32, width: f32, height: f32, thickness: u32, value: u8) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let max_x = self.width as i64 - 1;
        let max_y = self.height as i64 - 1;
        let (left, top) = (x.round() as i64, y.round() as i64);
        let (right, bottom) = ((x + width).round() as i64, (y + height).round() as i64);
        if right < 0 || bottom < 0 || left > max_x || top > max_y {
            return;
        }
        let (left, top) = (left.max(0), top.max(0));
        let (right, bottom) = (right.min(max_x), bottom.min(max_y));
        let t = thickness.max(1) as i64;

        let w = self.width as usize;
        for py in top..=bottom {
            for px in left..=right {
                let on_edge = px - left < t || right - px < t || py - top < t || bottom - py < t;
                if on_edge {
                    self.data[py as usize * w + px as usize] = value;
                }
            }
        }
    }
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_grayscale() {
        let yuyv = vec![100, 128, 200, 128];
        assert_eq!(yuyv_to_grayscale(&yuyv, 2, 1).unwrap(), vec![100, 200]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_grayscale(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_downscale_averages_blocks() {
        // 8x4 frame: left half 0, right half 200.
        let data: Vec<u8> = (0..32).map(|i| if i % 8 < 4 { 0 } else { 200 }).collect();
        let frame = Frame::new(data, 8, 4, 7);

        let small = frame.downscale(4);
        assert_eq!((small.width, small.height), (2, 1));
        assert_eq!(small.data, vec![0, 200]);
        assert_eq!(small.sequence, 7);
    }

    #[test]
    fn test_downscale_drops_partial_blocks() {
        let frame = Frame::new(vec![10; 10 * 9], 10, 9, 0);
        let small = frame.downscale(4);
        assert_eq!((small.width, small.height), (2, 2));
        assert!(small.data.iter().all(|&p| p == 10));
    }

    #[test]
    fn test_downscale_tiny_frame_unchanged() {
        let frame = Frame::new(vec![1, 2, 3], 3, 1, 0);
        assert_eq!(frame.downscale(4).data, vec![1, 2, 3]);
    }

    #[test]
    fn test_draw_rect_outline_only() {
        let mut frame = Frame::new(vec![0; 10 * 10], 10, 10, 0);
        frame.draw_rect(2.0, 2.0, 5.0, 5.0, 1, 255);

        assert_eq!(frame.data[2 * 10 + 2], 255); // corner
        assert_eq!(frame.data[7 * 10 + 4], 255); // bottom edge
        assert_eq!(frame.data[4 * 10 + 4], 0); // interior
        assert_eq!(frame.data[0], 0); // outside
    }

    #[test]
    fn test_draw_rect_clips_to_frame() {
        let mut frame = Frame::new(vec![0; 4 * 4], 4, 4, 0);
        frame.draw_rect(-10.0, -10.0, 100.0, 100.0, 1, 9);
        assert_eq!(frame.data[0], 9);
        assert_eq!(frame.data[15], 9);
        assert_eq!(frame.data[5], 0);
    }

    #[test]
    fn test_draw_rect_outside_frame_draws_nothing() {
        let mut frame = Frame::new(vec![0; 4 * 4], 4, 4, 0);
        frame.draw_rect(10.0, 1.0, 3.0, 2.0, 1, 9);
        frame.draw_rect(-8.0, -8.0, 3.0, 3.0, 1, 9);
        frame.draw_rect(1.0, 6.0, 2.0, 2.0, 1, 9);
        assert!(frame.data.iter().all(|&p| p == 0));
    }
}
