//! Display sinks for received video

use crate::error::{MediaError, MediaResult};
use crate::frame::BgrImage;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Consumes decoded frames on the receiving side
pub trait FrameSink: Send {
    /// Present one frame
    fn show(&mut self, image: &BgrImage, pts: i64) -> MediaResult<()>;

    /// Called once when the stream ends
    fn finish(&mut self) {}
}

/// Logs resolution and frame rate once per interval
#[derive(Debug)]
pub struct LoggingSink {
    label: String,
    interval: Duration,
    window_start: Instant,
    window_frames: u64,
    total_frames: u64,
    last_dimensions: Option<(u32, u32)>,
}

impl LoggingSink {
    /// Sink reporting every `interval`
    pub fn new(label: impl Into<String>, interval: Duration) -> Self {
        Self {
            label: label.into(),
            interval,
            window_start: Instant::now(),
            window_frames: 0,
            total_frames: 0,
            last_dimensions: None,
        }
    }

    /// Frames shown so far
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}

impl FrameSink for LoggingSink {
    fn show(&mut self, image: &BgrImage, _pts: i64) -> MediaResult<()> {
        self.total_frames += 1;
        self.window_frames += 1;

        let dimensions = image.dimensions();
        if self.last_dimensions != Some(dimensions) {
            tracing::info!(
                "{}: receiving {}x{} video",
                self.label,
                dimensions.0,
                dimensions.1
            );
            self.last_dimensions = Some(dimensions);
        }

        let elapsed = self.window_start.elapsed();
        if elapsed >= self.interval {
            let fps = self.window_frames as f64 / elapsed.as_secs_f64();
            tracing::info!(
                "{}: {:.1} fps, {} frames total",
                self.label,
                fps,
                self.total_frames
            );
            self.window_start = Instant::now();
            self.window_frames = 0;
        }
        Ok(())
    }

    fn finish(&mut self) {
        tracing::info!("{}: stream ended after {} frames", self.label, self.total_frames);
    }
}

/// Writes every Nth frame as a PNG file
#[derive(Debug)]
pub struct SnapshotSink {
    dir: PathBuf,
    every: u64,
    seen: u64,
    written: u64,
}

impl SnapshotSink {
    /// Save one frame out of every `every` into `dir`, creating it if needed
    pub fn new(dir: impl AsRef<Path>, every: u64) -> MediaResult<Self> {
        if every == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "snapshot interval must be at least 1".to_string(),
            });
        }
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            every,
            seen: 0,
            written: 0,
        })
    }

    /// Number of files written
    pub fn written(&self) -> u64 {
        self.written
    }

    fn path_for(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame-{:06}.png", index))
    }
}

impl FrameSink for SnapshotSink {
    fn show(&mut self, image: &BgrImage, _pts: i64) -> MediaResult<()> {
        let index = self.seen;
        self.seen += 1;
        if index % self.every != 0 {
            return Ok(());
        }

        let rgb = image::RgbImage::from_raw(image.width(), image.height(), image.to_rgb())
            .ok_or_else(|| MediaError::Display {
                message: "image buffer does not match dimensions".to_string(),
            })?;
        let path = self.path_for(index);
        rgb.save(&path).map_err(|e| MediaError::Display {
            message: format!("failed to write {}: {}", path.display(), e),
        })?;
        self.written += 1;
        tracing::debug!("Wrote snapshot {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("framerelay-{}-{}-{}", name, std::process::id(), nanos))
    }

    #[test]
    fn test_logging_sink_counts() {
        let mut sink = LoggingSink::new("test", Duration::from_millis(0));
        let img = BgrImage::solid(4, 4, [1, 2, 3]).unwrap();
        for pts in 0..5 {
            sink.show(&img, pts).unwrap();
        }
        assert_eq!(sink.total_frames(), 5);
        sink.finish();
    }

    #[test]
    fn test_snapshot_sink_writes_every_nth() {
        let dir = scratch_dir("snapshots");
        let mut sink = SnapshotSink::new(&dir, 3).unwrap();
        let img = BgrImage::solid(8, 6, [0, 0, 255]).unwrap();
        for pts in 0..7 {
            sink.show(&img, pts).unwrap();
        }
        assert_eq!(sink.written(), 3);
        assert!(dir.join("frame-000000.png").exists());
        assert!(dir.join("frame-000003.png").exists());
        assert!(dir.join("frame-000006.png").exists());
        assert!(!dir.join("frame-000001.png").exists());

        let decoded = image::open(dir.join("frame-000000.png")).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 0, 0]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_snapshot_interval_must_be_positive() {
        assert!(SnapshotSink::new(scratch_dir("zero"), 0).is_err());
    }
}
