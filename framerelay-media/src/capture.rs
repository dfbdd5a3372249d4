//! Local frame capture
//!
//! A [`FrameSource`] produces BGR images on demand. Sources run on a
//! dedicated OS thread owned by a [`CaptureStream`], because camera drivers
//! block and are often not `Send`; the source is opened on that thread and
//! frames are handed to async code through a bounded channel. A capture error
//! ends the stream: it is delivered once and nothing follows it.

use crate::error::{MediaError, MediaResult};
use crate::frame::BgrImage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// Capture device settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Camera index as enumerated by the OS
    pub camera_index: u32,
    /// Requested width
    pub width: u32,
    /// Requested height
    pub height: u32,
    /// Requested frames per second
    pub framerate: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            width: 640,
            height: 480,
            framerate: 30,
        }
    }
}

impl CaptureConfig {
    /// Check the settings are usable
    pub fn validate(&self) -> MediaResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MediaError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(MediaError::InvalidConfiguration {
                message: format!(
                    "capture size must be even for H.264, got {}x{}",
                    self.width, self.height
                ),
            });
        }
        if self.framerate == 0 || self.framerate > 120 {
            return Err(MediaError::InvalidConfiguration {
                message: format!("framerate must be within 1..=120, got {}", self.framerate),
            });
        }
        Ok(())
    }

    /// Time between frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.framerate.max(1)
    }
}

/// Produces frames on demand; called from the capture thread only
pub trait FrameSource {
    /// Human-readable device description
    fn describe(&self) -> String;

    /// Block until the next frame is available
    fn read_frame(&mut self) -> MediaResult<BgrImage>;
}

/// Synthetic color bars with a moving marker column
#[derive(Debug, Clone)]
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame: u64,
}

impl TestPatternSource {
    const BARS: [[u8; 3]; 8] = [
        [255, 255, 255],
        [0, 255, 255],
        [255, 255, 0],
        [0, 255, 0],
        [255, 0, 255],
        [0, 0, 255],
        [255, 0, 0],
        [0, 0, 0],
    ];

    /// Pattern of the given size
    pub fn new(width: u32, height: u32) -> MediaResult<Self> {
        if width == 0 || height == 0 {
            return Err(MediaError::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            frame: 0,
        })
    }
}

impl FrameSource for TestPatternSource {
    fn describe(&self) -> String {
        format!("test pattern {}x{}", self.width, self.height)
    }

    fn read_frame(&mut self) -> MediaResult<BgrImage> {
        let (w, h) = (self.width as usize, self.height as usize);
        let marker = (self.frame as usize * 4) % w;
        let mut data = Vec::with_capacity(w * h * 3);
        for _y in 0..h {
            for x in 0..w {
                let px = if x == marker {
                    [128, 128, 128]
                } else {
                    Self::BARS[x * Self::BARS.len() / w]
                };
                data.extend_from_slice(&px);
            }
        }
        self.frame += 1;
        BgrImage::new(self.width, self.height, data)
    }
}

/// Camera capture through nokhwa
#[cfg(feature = "camera")]
pub struct CameraSource {
    camera: nokhwa::Camera,
    index: u32,
}

#[cfg(feature = "camera")]
impl CameraSource {
    /// Open and start the camera described by `config`
    pub fn open(config: &CaptureConfig) -> MediaResult<Self> {
        use nokhwa::pixel_format::RgbFormat;
        use nokhwa::utils::{
            CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
            Resolution,
        };

        let device = format!("camera {}", config.camera_index);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(config.width, config.height),
                FrameFormat::MJPEG,
                config.framerate,
            ),
        ));

        let mut camera = nokhwa::Camera::new(CameraIndex::Index(config.camera_index), requested)
            .map_err(|e| MediaError::CaptureFailed {
                device: device.clone(),
                reason: format!("failed to open: {}", e),
            })?;
        camera.open_stream().map_err(|e| MediaError::CaptureFailed {
            device: device.clone(),
            reason: format!("failed to start stream: {}", e),
        })?;

        tracing::info!(
            "Opened {} at {}x{}",
            device,
            camera.resolution().width(),
            camera.resolution().height()
        );

        Ok(Self {
            camera,
            index: config.camera_index,
        })
    }
}

#[cfg(feature = "camera")]
impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        format!("camera {}", self.index)
    }

    fn read_frame(&mut self) -> MediaResult<BgrImage> {
        use nokhwa::pixel_format::RgbFormat;

        let buffer = self.camera.frame().map_err(|e| MediaError::CaptureFailed {
            device: self.describe(),
            reason: e.to_string(),
        })?;
        let rgb = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| MediaError::CaptureFailed {
                device: self.describe(),
                reason: format!("failed to decode frame: {}", e),
            })?;
        let (width, height) = (rgb.width(), rgb.height());
        BgrImage::from_rgb(width, height, &rgb.into_raw())
    }
}

#[cfg(feature = "camera")]
impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::debug!("Failed to stop camera {}: {}", self.index, e);
        }
    }
}

/// Open the camera if this build has camera support
pub fn open_camera(config: &CaptureConfig) -> MediaResult<Box<dyn FrameSource>> {
    #[cfg(feature = "camera")]
    {
        Ok(Box::new(CameraSource::open(config)?))
    }
    #[cfg(not(feature = "camera"))]
    {
        Err(MediaError::DeviceNotFound {
            device_id: format!("camera {} (built without camera support)", config.camera_index),
        })
    }
}

/// One captured image with its sequence number
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Zero-based frame counter
    pub index: u64,
    /// Captured pixels
    pub image: BgrImage,
}

/// Frames from a [`FrameSource`] running on its own thread
#[derive(Debug)]
pub struct CaptureStream {
    receiver: mpsc::Receiver<MediaResult<CapturedFrame>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureStream {
    /// Open a source on a new capture thread and start reading at `framerate`
    ///
    /// Fails if the source cannot be opened.
    pub async fn spawn<F>(open: F, framerate: u32) -> MediaResult<Self>
    where
        F: FnOnce() -> MediaResult<Box<dyn FrameSource>> + Send + 'static,
    {
        let (frame_tx, receiver) = mpsc::channel(2);
        let (ready_tx, ready_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let interval = Duration::from_secs(1) / framerate.max(1);

        let thread = std::thread::Builder::new()
            .name("framerelay-capture".to_string())
            .spawn(move || {
                let mut source = match open() {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(source.describe()));
                        source
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                capture_loop(source.as_mut(), &frame_tx, &thread_stop, interval);
            })?;

        match ready_rx.await {
            Ok(Ok(device)) => {
                tracing::info!("Capturing from {}", device);
                Ok(Self {
                    receiver,
                    stop,
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(MediaError::CaptureNotActive),
        }
    }

    /// Next frame, a terminal capture error, or `None` once stopped
    pub async fn recv(&mut self) -> Option<MediaResult<CapturedFrame>> {
        self.receiver.recv().await
    }

    /// Ask the capture thread to stop
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
        self.receiver.close();
        // The thread exits after its current frame; it is not joined here
        // so dropping never blocks an async task.
        self.thread.take();
    }
}

fn capture_loop(
    source: &mut dyn FrameSource,
    frames: &mpsc::Sender<MediaResult<CapturedFrame>>,
    stop: &AtomicBool,
    interval: Duration,
) {
    let mut index = 0u64;
    let mut next_deadline = Instant::now();
    while !stop.load(Ordering::SeqCst) {
        match source.read_frame() {
            Ok(image) => {
                if frames.blocking_send(Ok(CapturedFrame { index, image })).is_err() {
                    break;
                }
                index += 1;
            }
            Err(e) => {
                tracing::error!("Capture from {} failed: {}", source.describe(), e);
                let _ = frames.blocking_send(Err(e));
                break;
            }
        }

        next_deadline += interval;
        let now = Instant::now();
        if next_deadline > now {
            std::thread::sleep(next_deadline - now);
        } else {
            next_deadline = now;
        }
    }
    tracing::debug!("Capture thread stopped after {} frames", index);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource {
        remaining: u32,
    }

    impl FrameSource for FailingSource {
        fn describe(&self) -> String {
            "failing".to_string()
        }

        fn read_frame(&mut self) -> MediaResult<BgrImage> {
            if self.remaining == 0 {
                return Err(MediaError::CaptureFailed {
                    device: "failing".to_string(),
                    reason: "unplugged".to_string(),
                });
            }
            self.remaining -= 1;
            BgrImage::solid(2, 2, [0, 0, 0])
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(CaptureConfig::default().validate().is_ok());
        let odd = CaptureConfig {
            width: 641,
            ..Default::default()
        };
        assert!(odd.validate().is_err());
        let fast = CaptureConfig {
            framerate: 240,
            ..Default::default()
        };
        assert!(fast.validate().is_err());
        assert_eq!(
            CaptureConfig::default().frame_interval(),
            Duration::from_secs(1) / 30
        );
    }

    #[test]
    fn test_pattern_has_requested_size_and_moves() {
        let mut source = TestPatternSource::new(64, 48).unwrap();
        let a = source.read_frame().unwrap();
        let b = source.read_frame().unwrap();
        assert_eq!(a.dimensions(), (64, 48));
        assert_ne!(a, b);
        assert_eq!(a.pixel(63, 0), [0, 0, 0]);
    }

    #[tokio::test]
    async fn test_stream_delivers_frames_in_order() {
        let mut stream = CaptureStream::spawn(
            || Ok(Box::new(TestPatternSource::new(16, 16)?) as Box<dyn FrameSource>),
            120,
        )
        .await
        .unwrap();

        for expected in 0..3 {
            let frame = stream.recv().await.unwrap().unwrap();
            assert_eq!(frame.index, expected);
            assert_eq!(frame.image.dimensions(), (16, 16));
        }
        stream.stop();
    }

    #[tokio::test]
    async fn test_open_failure_is_reported() {
        let err = CaptureStream::spawn(
            || {
                Err(MediaError::DeviceNotFound {
                    device_id: "7".to_string(),
                })
            },
            30,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::DeviceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_read_error_ends_stream() {
        let mut stream = CaptureStream::spawn(
            || Ok(Box::new(FailingSource { remaining: 2 }) as Box<dyn FrameSource>),
            120,
        )
        .await
        .unwrap();

        assert!(stream.recv().await.unwrap().is_ok());
        assert!(stream.recv().await.unwrap().is_ok());
        assert!(matches!(
            stream.recv().await,
            Some(Err(MediaError::CaptureFailed { .. }))
        ));
        assert!(stream.recv().await.is_none());
    }
}
