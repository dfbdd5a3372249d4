//! Color-space conversion between I420 and interleaved BGR
//!
//! BT.601 limited-range integer math. Chroma is subsampled by averaging each
//! 2x2 block; blocks on an odd right or bottom edge average the pixels that
//! exist.

use crate::error::MediaResult;
use crate::frame::{BgrImage, TimeBase, VideoFrame};

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[inline]
fn luma(r: i32, g: i32, b: i32) -> u8 {
    clamp_u8(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16)
}

#[inline]
fn chroma_u(r: i32, g: i32, b: i32) -> u8 {
    clamp_u8(((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128)
}

#[inline]
fn chroma_v(r: i32, g: i32, b: i32) -> u8 {
    clamp_u8(((112 * r - 94 * g - 18 * b + 128) >> 8) + 128)
}

/// Convert a planar I420 frame to an interleaved BGR image
pub fn i420_to_bgr(frame: &VideoFrame) -> MediaResult<BgrImage> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let (cw, _) = frame.chroma_dimensions();
    let (y_plane, u_plane, v_plane) = (frame.y(), frame.u(), frame.v());

    let mut out = vec![0u8; width * height * 3];
    for row in 0..height {
        let chroma_row = (row / 2) * cw;
        for col in 0..width {
            let c = y_plane[row * width + col] as i32 - 16;
            let d = u_plane[chroma_row + col / 2] as i32 - 128;
            let e = v_plane[chroma_row + col / 2] as i32 - 128;

            let i = (row * width + col) * 3;
            out[i] = clamp_u8((298 * c + 516 * d + 128) >> 8);
            out[i + 1] = clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8);
            out[i + 2] = clamp_u8((298 * c + 409 * e + 128) >> 8);
        }
    }

    BgrImage::new(frame.width(), frame.height(), out)
}

/// Convert an interleaved BGR image to a planar I420 frame
pub fn bgr_to_i420(image: &BgrImage, pts: i64, time_base: TimeBase) -> MediaResult<VideoFrame> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let cw = width.div_ceil(2);
    let ch = height.div_ceil(2);
    let bgr = image.data();

    let mut data = vec![0u8; width * height + 2 * cw * ch];
    let (y_plane, chroma) = data.split_at_mut(width * height);
    let (u_plane, v_plane) = chroma.split_at_mut(cw * ch);

    for row in 0..height {
        for col in 0..width {
            let i = (row * width + col) * 3;
            let (b, g, r) = (bgr[i] as i32, bgr[i + 1] as i32, bgr[i + 2] as i32);
            y_plane[row * width + col] = luma(r, g, b);
        }
    }

    for crow in 0..ch {
        for ccol in 0..cw {
            let (mut r, mut g, mut b, mut n) = (0i32, 0i32, 0i32, 0i32);
            for row in (crow * 2)..((crow * 2 + 2).min(height)) {
                for col in (ccol * 2)..((ccol * 2 + 2).min(width)) {
                    let i = (row * width + col) * 3;
                    b += bgr[i] as i32;
                    g += bgr[i + 1] as i32;
                    r += bgr[i + 2] as i32;
                    n += 1;
                }
            }
            let (r, g, b) = ((r + n / 2) / n, (g + n / 2) / n, (b + n / 2) / n);
            u_plane[crow * cw + ccol] = chroma_u(r, g, b);
            v_plane[crow * cw + ccol] = chroma_v(r, g, b);
        }
    }

    VideoFrame::new(image.width(), image.height(), data, pts, time_base)
}
