//! Video frame types
//!
//! [`VideoFrame`] is a decoded planar I420 picture with its presentation
//! timestamp and time base. [`BgrImage`] is the interleaved 8-bit BGR working
//! format handed to frame transforms.

use crate::error::{MediaError, MediaResult};

/// Rational time base of a presentation timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBase {
    /// Numerator
    pub num: u32,
    /// Denominator
    pub den: u32,
}

impl TimeBase {
    /// 90 kHz RTP video clock
    pub const RTP_VIDEO: TimeBase = TimeBase { num: 1, den: 90_000 };

    /// Create a time base of `num/den` seconds per tick
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::RTP_VIDEO
    }
}

/// A decoded I420 video frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
    /// Presentation timestamp in `time_base` units
    pub pts: i64,
    /// Time base of `pts`
    pub time_base: TimeBase,
}

impl VideoFrame {
    /// Wrap contiguous Y, U and V planes
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        pts: i64,
        time_base: TimeBase,
    ) -> MediaResult<Self> {
        if width == 0 || height == 0 {
            return Err(MediaError::InvalidDimensions { width, height });
        }
        let expected = Self::buffer_len(width, height);
        if data.len() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
            pts,
            time_base,
        })
    }

    /// Bytes needed for an I420 frame of this size
    pub fn buffer_len(width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        let (cw, ch) = chroma_dimensions(width, height);
        luma + 2 * cw * ch
    }

    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Chroma plane width and height
    pub fn chroma_dimensions(&self) -> (usize, usize) {
        chroma_dimensions(self.width, self.height)
    }

    /// Luma plane
    pub fn y(&self) -> &[u8] {
        &self.data[..self.width as usize * self.height as usize]
    }

    /// Blue-difference chroma plane
    pub fn u(&self) -> &[u8] {
        let luma = self.width as usize * self.height as usize;
        let (cw, ch) = self.chroma_dimensions();
        &self.data[luma..luma + cw * ch]
    }

    /// Red-difference chroma plane
    pub fn v(&self) -> &[u8] {
        let luma = self.width as usize * self.height as usize;
        let (cw, ch) = self.chroma_dimensions();
        &self.data[luma + cw * ch..]
    }

    /// All three planes, contiguous
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Copy timing metadata from another frame
    pub fn with_timing_of(mut self, other: &VideoFrame) -> Self {
        self.pts = other.pts;
        self.time_base = other.time_base;
        self
    }
}

pub(crate) fn chroma_dimensions(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

/// Interleaved 8-bit BGR image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgrImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl BgrImage {
    /// Wrap an interleaved BGR buffer
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> MediaResult<Self> {
        if width == 0 || height == 0 {
            return Err(MediaError::InvalidDimensions { width, height });
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Image filled with one color
    pub fn solid(width: u32, height: u32, bgr: [u8; 3]) -> MediaResult<Self> {
        let pixels = width as usize * height as usize;
        let data = bgr.iter().copied().cycle().take(pixels * 3).collect();
        Self::new(width, height, data)
    }

    /// Build from packed RGB bytes, as cameras and image decoders produce them
    pub fn from_rgb(width: u32, height: u32, rgb: &[u8]) -> MediaResult<Self> {
        let mut data = rgb.to_vec();
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        Self::new(width, height, data)
    }

    /// Packed RGB copy of this image
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = self.data.clone();
        for px in rgb.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        rgb
    }

    /// Image width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Interleaved BGR bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable interleaved BGR bytes
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// BGR value at `(x, y)`
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Iterate over BGR pixels in row-major order
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(3).map(|px| [px[0], px[1], px[2]])
    }
}
