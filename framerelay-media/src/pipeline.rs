//! Per-session media loops
//!
//! Three loops cover both ends of a relay session:
//!
//! * [`run_camera_sender`] encodes captured frames onto the client's outbound
//!   track.
//! * [`run_processing_loop`] depacketizes the server's inbound track, decodes
//!   it, runs every frame through a [`FrameAdapter`] and re-encodes the result
//!   onto the outbound track of the same connection.
//! * [`run_display_loop`] decodes the client's inbound track and hands frames
//!   to a [`FrameSink`].
//!
//! All loops stop when their cancellation token fires. Codec work runs on the
//! blocking pool so it never stalls the async scheduler.

use crate::adapter::FrameAdapter;
use crate::capture::CaptureStream;
use crate::codec::{H264Config, H264Decoder, H264Encoder};
use crate::convert::{bgr_to_i420, i420_to_bgr};
use crate::display::FrameSink;
use crate::error::{MediaError, MediaResult};
use crate::frame::{BgrImage, TimeBase};
use crate::relay::RelaySubscription;
use bytes::Bytes;
use framerelay_core::VIDEO_CLOCK_RATE;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use webrtc::media::io::sample_builder::SampleBuilder;
use webrtc::media::Sample;
use webrtc::rtp::codecs::h264::H264Packet;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Packets the depacketizer may hold back waiting for reordered data
const MAX_LATE_PACKETS: u16 = 128;

/// Counters reported when a loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// Frames or access units taken in
    pub frames_in: u64,
    /// Frames written or shown
    pub frames_out: u64,
    /// Frames dropped on decode or encode errors
    pub errors: u64,
}

async fn write_access_unit(
    track: &TrackLocalStaticSample,
    access_unit: Vec<u8>,
    duration: Duration,
) -> MediaResult<()> {
    track
        .write_sample(&Sample {
            data: Bytes::from(access_unit),
            duration,
            timestamp: SystemTime::now(),
            ..Default::default()
        })
        .await
        .map_err(|e| MediaError::TrackWrite {
            reason: e.to_string(),
        })
}

async fn blocking<T, F>(f: F) -> MediaResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MediaError::Io {
            source: std::io::Error::other(e.to_string()),
        })
}

/// Encode captured frames onto `track` until capture ends or `cancel` fires
///
/// A capture error is returned as-is; it is fatal for the session.
pub async fn run_camera_sender(
    mut capture: CaptureStream,
    track: Arc<TrackLocalStaticSample>,
    config: H264Config,
    cancel: CancellationToken,
) -> MediaResult<LoopSummary> {
    let framerate = config.framerate.max(1);
    let frame_duration = Duration::from_secs(1) / framerate;
    let ticks_per_frame = (VIDEO_CLOCK_RATE / framerate) as i64;
    let mut encoder = H264Encoder::new(config);
    let mut summary = LoopSummary::default();

    loop {
        let captured = tokio::select! {
            _ = cancel.cancelled() => break,
            captured = capture.recv() => captured,
        };
        let captured = match captured {
            Some(Ok(captured)) => captured,
            Some(Err(e)) => {
                capture.stop();
                return Err(e);
            }
            None => break,
        };
        summary.frames_in += 1;

        let pts = captured.index as i64 * ticks_per_frame;
        let (returned, encoded) = blocking(move || {
            let result = bgr_to_i420(&captured.image, pts, TimeBase::RTP_VIDEO)
                .and_then(|frame| encoder.encode(&frame));
            (encoder, result)
        })
        .await?;
        encoder = returned;

        match encoded {
            Ok(au) if au.is_empty() => {}
            Ok(au) => match write_access_unit(&track, au, frame_duration).await {
                Ok(()) => summary.frames_out += 1,
                Err(e) => tracing::debug!("Dropped camera frame: {}", e),
            },
            Err(e) => {
                summary.errors += 1;
                tracing::warn!("Failed to encode camera frame: {}", e);
            }
        }
    }

    capture.stop();
    tracing::info!(
        "Camera sender stopped: {} captured, {} sent",
        summary.frames_in,
        summary.frames_out
    );
    Ok(summary)
}

/// Decode, adapt and re-encode state owned by one processing loop
struct Transcoder {
    decoder: H264Decoder,
    encoder: H264Encoder,
    adapter: FrameAdapter,
}

enum TranscodeOutcome {
    Pending,
    Encoded(Vec<u8>),
    Failed(MediaError),
}

impl Transcoder {
    fn run(&mut self, access_unit: &[u8], pts: i64) -> TranscodeOutcome {
        let frame = match self.decoder.decode(access_unit, pts, TimeBase::RTP_VIDEO) {
            Ok(Some(frame)) => frame,
            Ok(None) => return TranscodeOutcome::Pending,
            Err(e) => return TranscodeOutcome::Failed(e),
        };
        let processed = self.adapter.process(frame);
        match self.encoder.encode(&processed) {
            Ok(au) if au.is_empty() => TranscodeOutcome::Pending,
            Ok(au) => TranscodeOutcome::Encoded(au),
            Err(e) => TranscodeOutcome::Failed(e),
        }
    }
}

/// Relay inbound H.264 through `adapter` onto `output`
///
/// Runs until the inbound track ends or `cancel` fires. Timestamps of the
/// decoded frames are the RTP timestamps of the inbound samples.
pub async fn run_processing_loop(
    mut input: RelaySubscription,
    adapter: FrameAdapter,
    output: Arc<TrackLocalStaticSample>,
    cancel: CancellationToken,
) -> MediaResult<LoopSummary> {
    let transform = adapter.transform_name().to_string();
    let mut transcoder = Transcoder {
        decoder: H264Decoder::new()?,
        encoder: H264Encoder::new(H264Config::default()),
        adapter,
    };
    let mut builder = SampleBuilder::new(MAX_LATE_PACKETS, H264Packet::default(), VIDEO_CLOCK_RATE);
    let mut summary = LoopSummary::default();

    tracing::info!("Processing loop started with transform {}", transform);

    'outer: loop {
        let packet = tokio::select! {
            _ = cancel.cancelled() => break,
            packet = input.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
        };
        builder.push((*packet).clone());

        while let Some(sample) = builder.pop() {
            if cancel.is_cancelled() {
                break 'outer;
            }
            summary.frames_in += 1;
            let pts = sample.packet_timestamp as i64;
            let duration = sample.duration;
            let data = sample.data;

            let (returned, outcome) = blocking(move || {
                let outcome = transcoder.run(&data, pts);
                (transcoder, outcome)
            })
            .await?;
            transcoder = returned;

            match outcome {
                TranscodeOutcome::Pending => {}
                TranscodeOutcome::Encoded(au) => {
                    match write_access_unit(&output, au, duration).await {
                        Ok(()) => summary.frames_out += 1,
                        Err(e) => tracing::debug!("Dropped processed frame: {}", e),
                    }
                }
                TranscodeOutcome::Failed(e) => {
                    summary.errors += 1;
                    tracing::warn!("Dropped inbound frame: {}", e);
                }
            }
        }
    }

    tracing::info!(
        "Processing loop stopped: {} in, {} out, {} errors",
        summary.frames_in,
        summary.frames_out,
        summary.errors
    );
    Ok(summary)
}

/// Decode inbound H.264 and present it through `sink`
///
/// `adapter` is applied to each decoded image before display; its failures
/// fall back to the unprocessed image. Decoding and the sink both run on the
/// blocking pool.
pub async fn run_display_loop(
    mut input: RelaySubscription,
    adapter: FrameAdapter,
    mut sink: Box<dyn FrameSink>,
    cancel: CancellationToken,
) -> MediaResult<LoopSummary> {
    let mut decoder = H264Decoder::new()?;
    let mut builder = SampleBuilder::new(MAX_LATE_PACKETS, H264Packet::default(), VIDEO_CLOCK_RATE);
    let mut summary = LoopSummary::default();

    'outer: loop {
        let packet = tokio::select! {
            _ = cancel.cancelled() => break,
            packet = input.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
        };
        builder.push((*packet).clone());

        while let Some(sample) = builder.pop() {
            if cancel.is_cancelled() {
                break 'outer;
            }
            summary.frames_in += 1;
            let pts = sample.packet_timestamp as i64;
            let data = sample.data;
            let frame_adapter = adapter.clone();

            let (returned_decoder, returned_sink, shown) = blocking(move || {
                let shown = decode_for_display(&mut decoder, &data, pts, &frame_adapter)
                    .map(|decoded| decoded.map(|image| sink.show(&image, pts)));
                (decoder, sink, shown)
            })
            .await?;
            decoder = returned_decoder;
            sink = returned_sink;

            match shown {
                Ok(Some(Ok(()))) => summary.frames_out += 1,
                Ok(Some(Err(e))) => tracing::warn!("Display failed: {}", e),
                Ok(None) => {}
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!("Dropped received frame: {}", e);
                }
            }
        }
    }

    sink.finish();
    Ok(summary)
}

fn decode_for_display(
    decoder: &mut H264Decoder,
    access_unit: &[u8],
    pts: i64,
    adapter: &FrameAdapter,
) -> MediaResult<Option<BgrImage>> {
    let Some(frame) = decoder.decode(access_unit, pts, TimeBase::RTP_VIDEO)? else {
        return Ok(None);
    };
    let image = i420_to_bgr(&frame)?;
    Ok(Some(adapter.process_image(image)))
}
