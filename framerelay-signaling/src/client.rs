//! Signaling client and the client side of a relay session

use crate::lifecycle::close_on_failure;
use crate::protocol::{is_json_content_type, SdpType, SessionDescription, OFFER_PATH};
use framerelay_core::{
    h264_capability, ConnectionState, EngineConfig, PeerConnectionHandle, RelayError, RelayResult,
};
use framerelay_media::{
    run_camera_sender, run_display_loop, AdapterStats, CaptureStream, FrameAdapter, FrameSink,
    FrameTransform, H264Config, TrackRelay,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Default total timeout of the offer POST
pub const DEFAULT_SIGNALING_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts offers to a signaling server
#[derive(Debug, Clone)]
pub struct SignalingClient {
    http: reqwest::Client,
    offer_url: String,
    timeout: Duration,
}

impl SignalingClient {
    /// Client for the server at `server_url`, e.g. `http://localhost:8080`
    pub fn new(server_url: &str, timeout: Duration) -> RelayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Signaling {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            http,
            offer_url: format!("{}{}", server_url.trim_end_matches('/'), OFFER_PATH),
            timeout,
        })
    }

    /// URL offers are posted to
    pub fn offer_url(&self) -> &str {
        &self.offer_url
    }

    /// POST `offer` and return the server's answer
    ///
    /// Anything other than a 200 response with a JSON answer body is a
    /// signaling failure.
    pub async fn post_offer(&self, offer: &SessionDescription) -> RelayResult<SessionDescription> {
        offer.expect_kind(SdpType::Offer)?;

        let response = self
            .http
            .post(&self.offer_url)
            .json(offer)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::SignalingStatus {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_json_content_type(&content_type) {
            return Err(RelayError::UnexpectedContentType { content_type });
        }

        let body = response.bytes().await.map_err(|e| self.request_error(e))?;
        let answer = SessionDescription::from_json(&body).map_err(|e| {
            RelayError::InvalidSessionDescription {
                reason: format!("malformed answer: {}", e),
            }
        })?;
        answer.expect_kind(SdpType::Answer)?;
        Ok(answer)
    }

    fn request_error(&self, err: reqwest::Error) -> RelayError {
        if err.is_timeout() {
            RelayError::SignalingTimeout {
                url: self.offer_url.clone(),
                duration: self.timeout,
            }
        } else {
            RelayError::Signaling {
                reason: err.to_string(),
            }
        }
    }
}

/// Settings for a [`RelayClient`]
#[derive(Clone)]
pub struct RelayClientConfig {
    /// Base URL of the signaling server
    pub server_url: String,
    /// Peer connection settings
    pub engine: EngineConfig,
    /// Total timeout of the offer POST
    pub signaling_timeout: Duration,
    /// Outbound camera encoding
    pub encoder: H264Config,
    /// Transform applied to received frames before display
    pub display_transform: Option<Arc<dyn FrameTransform>>,
}

impl RelayClientConfig {
    /// Defaults for the server at `server_url`
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            engine: EngineConfig::default(),
            signaling_timeout: DEFAULT_SIGNALING_TIMEOUT,
            encoder: H264Config::default(),
            display_transform: None,
        }
    }
}

impl std::fmt::Debug for RelayClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClientConfig")
            .field("server_url", &self.server_url)
            .field("engine", &self.engine)
            .field("signaling_timeout", &self.signaling_timeout)
            .field("encoder", &self.encoder)
            .field(
                "display_transform",
                &self.display_transform.as_ref().map(|t| t.name()),
            )
            .finish()
    }
}

struct Session {
    handle: Arc<PeerConnectionHandle>,
    tasks: Vec<JoinHandle<()>>,
}

/// Sends camera video to a relay server and displays what comes back
pub struct RelayClient {
    config: RelayClientConfig,
    signaling: SignalingClient,
    display: FrameAdapter,
    session: Option<Session>,
}

impl RelayClient {
    /// Create a disconnected client
    pub fn new(config: RelayClientConfig) -> RelayResult<Self> {
        let signaling = SignalingClient::new(&config.server_url, config.signaling_timeout)?;
        let display = FrameAdapter::new(config.display_transform.clone());
        Ok(Self {
            config,
            signaling,
            display,
            session: None,
        })
    }

    /// Frame counters of the display-side transform
    pub fn display_stats(&self) -> Arc<AdapterStats> {
        self.display.stats()
    }

    /// Connection of the current session, if any
    pub fn handle(&self) -> Option<Arc<PeerConnectionHandle>> {
        self.session.as_ref().map(|s| Arc::clone(&s.handle))
    }

    /// Negotiate a session: send `capture` to the server and show the
    /// returned video on `sink`
    ///
    /// The camera track is attached before the offer is created. Any failure
    /// closes the connection and leaves the client disconnected.
    pub async fn connect(
        &mut self,
        capture: CaptureStream,
        sink: Box<dyn FrameSink>,
    ) -> RelayResult<Arc<PeerConnectionHandle>> {
        if let Some(session) = &self.session {
            return Err(RelayError::InvalidState {
                expected: "disconnected".to_string(),
                actual: session.handle.state().to_string(),
            });
        }

        let handle = PeerConnectionHandle::new(&self.config.engine).await?;
        let camera_track = match self.negotiate(&handle).await {
            Ok(track) => track,
            Err(e) => {
                tracing::error!(connection_id = %handle.id(), "Connection attempt failed: {}", e);
                if let Err(close_err) = handle.close().await {
                    tracing::warn!("Close after failed connect: {}", close_err);
                }
                return Err(e);
            }
        };

        let tasks = vec![
            self.spawn_sender(Arc::clone(&handle), capture, camera_track),
            self.spawn_display(Arc::clone(&handle), sink),
            spawn_failure_watch(Arc::clone(&handle)),
        ];
        self.session = Some(Session {
            handle: Arc::clone(&handle),
            tasks,
        });
        Ok(handle)
    }

    async fn negotiate(
        &self,
        handle: &Arc<PeerConnectionHandle>,
    ) -> RelayResult<Arc<TrackLocalStaticSample>> {
        let camera_track = Arc::new(TrackLocalStaticSample::new(
            h264_capability(),
            "video".to_owned(),
            format!("framerelay-camera-{}", handle.id()),
        ));
        let local: Arc<dyn TrackLocal + Send + Sync> = Arc::clone(&camera_track) as _;
        handle.add_local_track(local).await?;

        let offer = handle.create_local_offer().await?;
        tracing::debug!(connection_id = %handle.id(), "Posting offer to {}", self.signaling.offer_url());
        let answer = self.signaling.post_offer(&offer).await?;
        handle.apply_answer(&answer).await?;
        tracing::info!(connection_id = %handle.id(), "Negotiated session with {}", self.config.server_url);
        Ok(camera_track)
    }

    fn spawn_sender(
        &self,
        handle: Arc<PeerConnectionHandle>,
        capture: CaptureStream,
        track: Arc<TrackLocalStaticSample>,
    ) -> JoinHandle<()> {
        let encoder = self.config.encoder;
        tokio::spawn(async move {
            let cancel = handle.cancellation();
            if let Err(e) = run_camera_sender(capture, track, encoder, cancel).await {
                tracing::error!(connection_id = %handle.id(), "Capture failed: {}", e);
                if let Err(close_err) = handle.close().await {
                    tracing::warn!("Close after capture failure: {}", close_err);
                }
            }
        })
    }

    fn spawn_display(&self, handle: Arc<PeerConnectionHandle>, sink: Box<dyn FrameSink>) -> JoinHandle<()> {
        let adapter = self.display.clone();
        tokio::spawn(async move {
            let id = handle.id();
            let Some(track) = handle.next_remote_track().await else {
                return;
            };
            let cancel = handle.cancellation();
            drop(handle);

            let relay = TrackRelay::default();
            let subscription = relay.subscribe();
            let relay_task = relay.start(track, cancel.clone());
            match run_display_loop(subscription, adapter, sink, cancel.clone()).await {
                Ok(summary) => tracing::debug!(
                    connection_id = %id,
                    frames = summary.frames_out,
                    "Display finished"
                ),
                Err(e) => tracing::warn!(connection_id = %id, "Display stopped: {}", e),
            }
            cancel.cancel();
            let _ = relay_task.await;
        })
    }

    /// Wait until the current connection fails or closes
    ///
    /// Returns immediately with [`ConnectionState::Closed`] when disconnected.
    pub async fn wait_closed(&self) -> ConnectionState {
        let Some(session) = &self.session else {
            return ConnectionState::Closed;
        };
        let mut states = session.handle.subscribe_state();
        let state = match states.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => ConnectionState::Closed,
        };
        state
    }

    /// Close the connection, stop capture and wait for the media tasks
    pub async fn disconnect(&mut self) -> RelayResult<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let result = session.handle.close().await;
        for task in session.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Media task ended abnormally: {}", e);
            }
        }
        tracing::info!(connection_id = %session.handle.id(), "Disconnected");
        result
    }
}

/// Close the connection once it reports failure
fn spawn_failure_watch(handle: Arc<PeerConnectionHandle>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let id = handle.id();
        let states = handle.subscribe_state();
        let terminal = close_on_failure(states, || handle.close()).await;
        tracing::debug!(connection_id = %id, state = %terminal, "Connection ended");
    })
}
