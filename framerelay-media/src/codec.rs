//! H.264 encode and decode with openh264
//!
//! The relay decodes every inbound access unit to an I420 [`VideoFrame`],
//! runs it through the adapter and encodes the result again. Encoded output is
//! an Annex-B byte stream, which is what the engine's H.264 packetizer expects.

use crate::error::{MediaError, MediaResult};
use crate::frame::{chroma_dimensions, TimeBase, VideoFrame};
use openh264::decoder::Decoder;
use openh264::encoder::Encoder;
use openh264::formats::{YUVBuffer, YUVSource};

const CODEC_NAME: &str = "H.264";

/// H.264 encoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H264Config {
    /// Frames per second the source produces
    pub framerate: u32,
    /// Force an IDR frame every this many frames
    pub keyframe_interval: u32,
}

impl Default for H264Config {
    fn default() -> Self {
        Self {
            framerate: 30,
            keyframe_interval: 60,
        }
    }
}

/// Stateful H.264 encoder, recreated when the input resolution changes
pub struct H264Encoder {
    config: H264Config,
    encoder: Option<Encoder>,
    dimensions: (u32, u32),
    frames_since_keyframe: u32,
}

impl std::fmt::Debug for H264Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("H264Encoder")
            .field("config", &self.config)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl H264Encoder {
    /// Create an encoder; the codec itself is initialized on the first frame
    pub fn new(config: H264Config) -> Self {
        Self {
            config,
            encoder: None,
            dimensions: (0, 0),
            frames_since_keyframe: 0,
        }
    }

    /// Encoder configuration
    pub fn config(&self) -> &H264Config {
        &self.config
    }

    /// Encode one frame into an Annex-B access unit
    ///
    /// Returns an empty buffer when the encoder skips the frame.
    pub fn encode(&mut self, frame: &VideoFrame) -> MediaResult<Vec<u8>> {
        let (width, height) = (frame.width(), frame.height());
        if width % 2 != 0 || height % 2 != 0 {
            return Err(MediaError::InvalidDimensions { width, height });
        }

        if self.encoder.is_none() || self.dimensions != (width, height) {
            let encoder = Encoder::new().map_err(|e| MediaError::CodecInitializationFailed {
                codec: CODEC_NAME.to_string(),
                reason: e.to_string(),
            })?;
            tracing::debug!("Initialized H.264 encoder for {}x{}", width, height);
            self.encoder = Some(encoder);
            self.dimensions = (width, height);
            self.frames_since_keyframe = 0;
        }

        let force_keyframe = self.config.keyframe_interval > 0
            && self.frames_since_keyframe >= self.config.keyframe_interval;

        let encoder = self
            .encoder
            .as_mut()
            .ok_or(MediaError::CodecInitializationFailed {
                codec: CODEC_NAME.to_string(),
                reason: "encoder missing".to_string(),
            })?;

        if force_keyframe {
            encoder.force_intra_frame();
            self.frames_since_keyframe = 0;
        }

        let yuv = YUVBuffer::from_vec(frame.data().to_vec(), width as usize, height as usize);
        let bitstream = encoder
            .encode(&yuv)
            .map_err(|e| MediaError::EncodingFailed {
                codec: CODEC_NAME.to_string(),
                reason: e.to_string(),
            })?;

        self.frames_since_keyframe += 1;
        Ok(bitstream.to_vec())
    }
}

/// Stateful H.264 decoder
pub struct H264Decoder {
    decoder: Decoder,
}

impl std::fmt::Debug for H264Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("H264Decoder").finish()
    }
}

impl H264Decoder {
    /// Create a decoder
    pub fn new() -> MediaResult<Self> {
        let decoder = Decoder::new().map_err(|e| MediaError::CodecInitializationFailed {
            codec: CODEC_NAME.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { decoder })
    }

    /// Decode one Annex-B access unit
    ///
    /// Returns `None` while the decoder is still waiting for enough data
    /// (for example before the first IDR frame).
    pub fn decode(
        &mut self,
        access_unit: &[u8],
        pts: i64,
        time_base: TimeBase,
    ) -> MediaResult<Option<VideoFrame>> {
        let decoded = self
            .decoder
            .decode(access_unit)
            .map_err(|e| MediaError::DecodingFailed {
                codec: CODEC_NAME.to_string(),
                reason: e.to_string(),
            })?;

        let Some(yuv) = decoded else {
            return Ok(None);
        };

        let (width, height) = yuv.dimensions();
        let (y_stride, u_stride, v_stride) = yuv.strides();
        let (cw, ch) = chroma_dimensions(width as u32, height as u32);

        let mut data = Vec::with_capacity(VideoFrame::buffer_len(width as u32, height as u32));
        copy_plane(&mut data, yuv.y(), y_stride, width, height)?;
        copy_plane(&mut data, yuv.u(), u_stride, cw, ch)?;
        copy_plane(&mut data, yuv.v(), v_stride, cw, ch)?;

        VideoFrame::new(width as u32, height as u32, data, pts, time_base).map(Some)
    }
}

fn copy_plane(
    out: &mut Vec<u8>,
    plane: &[u8],
    stride: usize,
    width: usize,
    height: usize,
) -> MediaResult<()> {
    for row in 0..height {
        let start = row * stride;
        let line = plane
            .get(start..start + width)
            .ok_or_else(|| MediaError::DecodingFailed {
                codec: CODEC_NAME.to_string(),
                reason: format!("plane too short for {}x{} at row {}", width, height, row),
            })?;
        out.extend_from_slice(line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::bgr_to_i420;
    use crate::frame::BgrImage;

    fn gradient_frame(width: u32, height: u32, pts: i64) -> VideoFrame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 4) as u8, (y * 4) as u8, 128]);
            }
        }
        let img = BgrImage::new(width, height, data).unwrap();
        bgr_to_i420(&img, pts, TimeBase::RTP_VIDEO).unwrap()
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        let mut encoder = H264Encoder::new(H264Config::default());
        let frame = VideoFrame::new(3, 2, vec![0; VideoFrame::buffer_len(3, 2)], 0, TimeBase::RTP_VIDEO)
            .unwrap();
        assert!(matches!(
            encoder.encode(&frame),
            Err(MediaError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_encoded_stream_decodes_with_caller_timing() {
        let mut encoder = H264Encoder::new(H264Config::default());
        let mut decoder = H264Decoder::new().unwrap();

        let mut decoded = None;
        for i in 0..5 {
            let au = encoder.encode(&gradient_frame(64, 48, i * 3000)).unwrap();
            if au.is_empty() {
                continue;
            }
            assert_eq!(&au[..3], &[0, 0, 0]);
            if let Some(frame) = decoder.decode(&au, i * 3000, TimeBase::RTP_VIDEO).unwrap() {
                decoded = Some(frame);
            }
        }

        let frame = decoded.expect("decoder produced no frame");
        assert_eq!((frame.width(), frame.height()), (64, 48));
        assert_eq!(frame.time_base, TimeBase::RTP_VIDEO);
        assert_eq!(frame.pts % 3000, 0);
    }

    #[test]
    fn test_resolution_change_reinitializes() {
        let mut encoder = H264Encoder::new(H264Config::default());
        assert!(!encoder.encode(&gradient_frame(32, 32, 0)).unwrap().is_empty());
        assert!(!encoder.encode(&gradient_frame(64, 32, 1)).unwrap().is_empty());
        assert_eq!(encoder.dimensions, (64, 32));
    }

    #[test]
    fn test_keyframe_interval_lets_late_decoder_join() {
        let mut encoder = H264Encoder::new(H264Config {
            framerate: 30,
            keyframe_interval: 3,
        });
        let mut last = Vec::new();
        for i in 0..4 {
            last = encoder.encode(&gradient_frame(32, 32, i * 3000)).unwrap();
        }

        let mut late = H264Decoder::new().unwrap();
        let frame = late
            .decode(&last, 9000, TimeBase::RTP_VIDEO)
            .unwrap()
            .expect("forced keyframe did not decode on its own");
        assert_eq!((frame.width(), frame.height()), (32, 32));
    }
}
