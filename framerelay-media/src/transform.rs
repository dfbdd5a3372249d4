//! Per-frame image transforms
//!
//! A [`FrameTransform`] maps one BGR image to another of the same resolution.
//! Transforms are chosen when a session is built and shared across frames, so
//! they take `&self` and must be `Send + Sync`. Any closure with the right
//! signature is a transform.

use crate::error::{MediaError, MediaResult};
use crate::frame::BgrImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Strategy applied to every decoded frame
pub trait FrameTransform: Send + Sync {
    /// Produce the transformed image
    fn apply(&self, image: &BgrImage) -> MediaResult<BgrImage>;

    /// Name used in logs
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> FrameTransform for F
where
    F: Fn(&BgrImage) -> MediaResult<BgrImage> + Send + Sync,
{
    fn apply(&self, image: &BgrImage) -> MediaResult<BgrImage> {
        self(image)
    }
}

/// Returns the image unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl FrameTransform for Passthrough {
    fn apply(&self, image: &BgrImage) -> MediaResult<BgrImage> {
        Ok(image.clone())
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// BT.601 luma in 14-bit fixed point, as used for BGR to gray conversion
#[inline]
fn gray_level(b: u8, g: u8, r: u8) -> u8 {
    ((r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14) as u8
}

/// Converts to gray and back to three equal channels
#[derive(Debug, Clone, Copy, Default)]
pub struct Grayscale;

impl FrameTransform for Grayscale {
    fn apply(&self, image: &BgrImage) -> MediaResult<BgrImage> {
        let mut out = image.clone();
        for px in out.data_mut().chunks_exact_mut(3) {
            let y = gray_level(px[0], px[1], px[2]);
            px.fill(y);
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "grayscale"
    }
}

/// Mirrors each row, for a selfie-style preview
#[derive(Debug, Clone, Copy, Default)]
pub struct HorizontalFlip;

impl FrameTransform for HorizontalFlip {
    fn apply(&self, image: &BgrImage) -> MediaResult<BgrImage> {
        let mut out = image.clone();
        let stride = image.width() as usize * 3;
        for row in out.data_mut().chunks_exact_mut(stride) {
            let mut pixels: Vec<[u8; 3]> = row
                .chunks_exact(3)
                .map(|px| [px[0], px[1], px[2]])
                .collect();
            pixels.reverse();
            for (dst, src) in row.chunks_exact_mut(3).zip(pixels) {
                dst.copy_from_slice(&src);
            }
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "flip"
    }
}

/// Canny edge detector producing a white-on-black edge map in three channels
///
/// Sobel 3x3 gradients with L1 magnitude, non-maximum suppression along four
/// directions and 8-connected hysteresis between `low` and `high`.
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetection {
    low: f32,
    high: f32,
}

impl Default for EdgeDetection {
    fn default() -> Self {
        Self {
            low: 100.0,
            high: 200.0,
        }
    }
}

impl EdgeDetection {
    /// Detector with custom hysteresis thresholds
    pub fn new(low: f32, high: f32) -> MediaResult<Self> {
        if !(low >= 0.0 && high >= low) {
            return Err(MediaError::InvalidConfiguration {
                message: format!("edge thresholds must satisfy 0 <= low <= high, got {low}/{high}"),
            });
        }
        Ok(Self { low, high })
    }

    /// `(low, high)` thresholds
    pub fn thresholds(&self) -> (f32, f32) {
        (self.low, self.high)
    }

    fn edge_map(&self, image: &BgrImage) -> Vec<bool> {
        let w = image.width() as usize;
        let h = image.height() as usize;
        let gray: Vec<i32> = image
            .pixels()
            .map(|px| gray_level(px[0], px[1], px[2]) as i32)
            .collect();
        let at = |x: isize, y: isize| -> i32 {
            let x = x.clamp(0, w as isize - 1) as usize;
            let y = y.clamp(0, h as isize - 1) as usize;
            gray[y * w + x]
        };

        let mut gx = vec![0i32; w * h];
        let mut gy = vec![0i32; w * h];
        let mut mag = vec![0i32; w * h];
        for y in 0..h as isize {
            for x in 0..w as isize {
                let dx = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                    - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
                let dy = (at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1))
                    - (at(x - 1, y - 1) + 2 * at(x, y - 1) + at(x + 1, y - 1));
                let i = y as usize * w + x as usize;
                gx[i] = dx;
                gy[i] = dy;
                mag[i] = dx.abs() + dy.abs();
            }
        }

        let mag_at = |x: isize, y: isize| -> i32 {
            if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
                0
            } else {
                mag[y as usize * w + x as usize]
            }
        };

        // 0 = none, 1 = weak, 2 = strong
        let mut class = vec![0u8; w * h];
        let mut stack = Vec::new();
        for y in 0..h as isize {
            for x in 0..w as isize {
                let i = y as usize * w + x as usize;
                let m = mag[i];
                if (m as f32) <= self.low {
                    continue;
                }
                let (ax, ay) = (gx[i].abs() as f32, gy[i].abs() as f32);
                // tan(22.5) ~= 0.4142
                let (n1, n2) = if ay <= ax * 0.4142 {
                    (mag_at(x - 1, y), mag_at(x + 1, y))
                } else if ay >= ax * 2.4142 {
                    (mag_at(x, y - 1), mag_at(x, y + 1))
                } else if (gx[i] < 0) == (gy[i] < 0) {
                    (mag_at(x - 1, y - 1), mag_at(x + 1, y + 1))
                } else {
                    (mag_at(x + 1, y - 1), mag_at(x - 1, y + 1))
                };
                if m > n1 && m >= n2 {
                    if (m as f32) > self.high {
                        class[i] = 2;
                        stack.push(i);
                    } else {
                        class[i] = 1;
                    }
                }
            }
        }

        let mut edges = vec![false; w * h];
        while let Some(i) = stack.pop() {
            if edges[i] {
                continue;
            }
            edges[i] = true;
            let (x, y) = ((i % w) as isize, (i / w) as isize);
            for ny in (y - 1)..=(y + 1) {
                for nx in (x - 1)..=(x + 1) {
                    if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                        continue;
                    }
                    let j = ny as usize * w + nx as usize;
                    if class[j] > 0 && !edges[j] {
                        stack.push(j);
                    }
                }
            }
        }
        edges
    }
}

impl FrameTransform for EdgeDetection {
    fn apply(&self, image: &BgrImage) -> MediaResult<BgrImage> {
        let edges = self.edge_map(image);
        let data = edges
            .iter()
            .flat_map(|&e| if e { [255u8; 3] } else { [0u8; 3] })
            .collect();
        BgrImage::new(image.width(), image.height(), data)
    }

    fn name(&self) -> &str {
        "edges"
    }
}

/// Built-in transform selectable from configuration
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    /// No processing
    #[default]
    Passthrough,
    /// Three-channel grayscale
    Grayscale,
    /// Canny edge map
    Edges,
    /// Horizontal mirror
    Flip,
}

impl TransformKind {
    /// Instantiate the transform; passthrough means no transform at all
    pub fn build(self) -> Option<Arc<dyn FrameTransform>> {
        match self {
            TransformKind::Passthrough => None,
            TransformKind::Grayscale => Some(Arc::new(Grayscale)),
            TransformKind::Edges => Some(Arc::new(EdgeDetection::default())),
            TransformKind::Flip => Some(Arc::new(HorizontalFlip)),
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransformKind::Passthrough => "passthrough",
            TransformKind::Grayscale => "grayscale",
            TransformKind::Edges => "edges",
            TransformKind::Flip => "flip",
        };
        f.write_str(s)
    }
}
