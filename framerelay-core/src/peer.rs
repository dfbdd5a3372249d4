//! Peer connection handle
//!
//! [`PeerConnectionHandle`] owns one engine peer connection for the lifetime
//! of a session. Engine callbacks are turned into two explicit subscription
//! points: a `watch` channel carrying [`ConnectionState`] and a queue of
//! inbound video tracks. A [`CancellationToken`] is cancelled when the
//! connection closes or fails, so every media loop tied to the session can
//! stop without polling the connection state.

use crate::engine::EngineConfig;
use crate::error::{RelayError, RelayResult};
use crate::sdp::{SdpType, SessionDescription};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Lifecycle state of a peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Created, negotiation not started
    New,
    /// ICE/DTLS in progress
    Connecting,
    /// Media can flow
    Connected,
    /// Connectivity lost, may recover
    Disconnected,
    /// Connectivity could not be established or was lost for good
    Failed,
    /// Closed locally or remotely, resources released
    Closed,
}

impl ConnectionState {
    /// Whether no further transitions are expected
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => {
                ConnectionState::New
            }
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
        }
    }
}

/// Unique identifier of a peer connection handle
pub type ConnectionId = Uuid;

/// One negotiated session with a remote peer
pub struct PeerConnectionHandle {
    id: ConnectionId,
    peer_connection: Arc<RTCPeerConnection>,
    state: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
    remote_tracks: Mutex<mpsc::Receiver<Arc<TrackRemote>>>,
    gather_timeout: Duration,
    created_at: DateTime<Utc>,
    closed: AtomicBool,
}

impl fmt::Debug for PeerConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnectionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl PeerConnectionHandle {
    /// Create a new peer connection using the given engine settings
    pub async fn new(config: &EngineConfig) -> RelayResult<Arc<Self>> {
        let api = config.build_api()?;
        let peer_connection = Arc::new(
            api.new_peer_connection(config.rtc_configuration())
                .await
                .map_err(|e| RelayError::engine("create peer connection", e))?,
        );

        let id = Uuid::new_v4();
        let (state_tx, _) = watch::channel(ConnectionState::New);
        let state = Arc::new(state_tx);
        let cancel = CancellationToken::new();
        let (track_tx, track_rx) = mpsc::channel(4);

        let state_clone = Arc::clone(&state);
        let cancel_clone = cancel.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let next = ConnectionState::from(s);
                let changed = publish_state(&state_clone, next);
                if changed {
                    tracing::info!(connection_id = %id, state = %next, "Peer connection state changed");
                }
                if next.is_terminal() {
                    cancel_clone.cancel();
                }
                Box::pin(async {})
            },
        ));

        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let track_tx = track_tx.clone();
            Box::pin(async move {
                if track.kind() != RTPCodecType::Video {
                    tracing::debug!(connection_id = %id, kind = %track.kind(), "Ignoring non-video track");
                    return;
                }
                tracing::info!(
                    connection_id = %id,
                    codec = %track.codec().capability.mime_type,
                    "Remote video track received"
                );
                if track_tx.try_send(track).is_err() {
                    tracing::warn!(connection_id = %id, "Dropping extra remote video track");
                }
            })
        }));

        tracing::debug!(connection_id = %id, "Created peer connection");

        Ok(Arc::new(Self {
            id,
            peer_connection,
            state,
            cancel,
            remote_tracks: Mutex::new(track_rx),
            gather_timeout: config.gather_timeout,
            created_at: Utc::now(),
            closed: AtomicBool::new(false),
        }))
    }

    /// Unique id of this connection
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// When the handle was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Token cancelled once the connection fails or closes
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Underlying engine peer connection
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    /// Wait until the connection reaches `target`
    ///
    /// Fails early if the connection ends up in a different terminal state.
    pub async fn wait_for_state(
        &self,
        target: ConnectionState,
        timeout: Duration,
    ) -> RelayResult<()> {
        let mut rx = self.subscribe_state();
        let reached = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| *s == target || s.is_terminal()),
        )
        .await
        .map_err(|_| RelayError::Timeout {
            operation: format!("waiting for state {}", target),
            duration: timeout,
        })?
        .map(|s| *s)
        .map_err(|_| RelayError::InvalidState {
            expected: target.to_string(),
            actual: "dropped".to_string(),
        })?;

        if reached == target {
            Ok(())
        } else {
            Err(RelayError::InvalidState {
                expected: target.to_string(),
                actual: reached.to_string(),
            })
        }
    }

    /// Attach a local track; must happen before the offer or answer is created
    pub async fn add_local_track(
        &self,
        track: Arc<dyn TrackLocal + Send + Sync>,
    ) -> RelayResult<Arc<RTCRtpSender>> {
        let sender = self
            .peer_connection
            .add_track(track)
            .await
            .map_err(|e| RelayError::engine("add track", e))?;

        // RTCP must be read for the interceptors (NACK, reports) to run.
        let rtcp_sender = Arc::clone(&sender);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    res = rtcp_sender.read(&mut buf) => {
                        if res.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(sender)
    }

    /// Create an offer, set it locally and wait for ICE gathering to complete
    pub async fn create_local_offer(&self) -> RelayResult<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| RelayError::engine("create offer", e))?;
        self.set_local_and_gather(offer).await
    }

    /// Create an answer, set it locally and wait for ICE gathering to complete
    pub async fn create_local_answer(&self) -> RelayResult<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| RelayError::engine("create answer", e))?;
        self.set_local_and_gather(answer).await
    }

    async fn set_local_and_gather(
        &self,
        desc: webrtc::peer_connection::sdp::session_description::RTCSessionDescription,
    ) -> RelayResult<SessionDescription> {
        let mut gather_complete = self.peer_connection.gathering_complete_promise().await;

        self.peer_connection
            .set_local_description(desc)
            .await
            .map_err(|e| RelayError::engine("set local description", e))?;

        tokio::time::timeout(self.gather_timeout, gather_complete.recv())
            .await
            .map_err(|_| RelayError::Timeout {
                operation: "ICE gathering".to_string(),
                duration: self.gather_timeout,
            })?;

        tracing::debug!(connection_id = %self.id, "ICE gathering complete");

        self.local_description().await?.ok_or_else(|| RelayError::InvalidState {
            expected: "local description".to_string(),
            actual: "none".to_string(),
        })
    }

    /// Current local description, including gathered candidates
    pub async fn local_description(&self) -> RelayResult<Option<SessionDescription>> {
        match self.peer_connection.local_description().await {
            Some(desc) => Ok(Some(SessionDescription::from_rtc(&desc)?)),
            None => Ok(None),
        }
    }

    /// Apply a remote description of any supported kind
    pub async fn set_remote_description(&self, desc: &SessionDescription) -> RelayResult<()> {
        let rtc = desc.to_rtc()?;
        self.peer_connection
            .set_remote_description(rtc)
            .await
            .map_err(|e| RelayError::engine("set remote description", e))
    }

    /// Apply the remote offer and produce the local answer
    pub async fn accept_offer(&self, offer: &SessionDescription) -> RelayResult<SessionDescription> {
        offer.expect_kind(SdpType::Offer)?;
        self.set_remote_description(offer).await?;
        self.create_local_answer().await
    }

    /// Apply the answer received from the signaling peer
    pub async fn apply_answer(&self, answer: &SessionDescription) -> RelayResult<()> {
        answer.expect_kind(SdpType::Answer)?;
        self.set_remote_description(answer).await?;
        tracing::debug!(connection_id = %self.id, "Applied remote answer");
        Ok(())
    }

    /// Wait for the first inbound video track
    ///
    /// Returns `None` if the connection closes before a track arrives.
    pub async fn next_remote_track(&self) -> Option<Arc<TrackRemote>> {
        let mut tracks = self.remote_tracks.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            track = tracks.recv() => track,
        }
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the connection and cancel every task tied to it
    ///
    /// Calling close more than once is a no-op.
    pub async fn close(&self) -> RelayResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.cancel.cancel();
        let result = self
            .peer_connection
            .close()
            .await
            .map_err(|e| RelayError::engine("close peer connection", e));

        publish_state(&self.state, ConnectionState::Closed);
        tracing::info!(connection_id = %self.id, "Closed peer connection");
        result
    }
}

/// Publish a state unless the connection is already closed
fn publish_state(state: &watch::Sender<ConnectionState>, next: ConnectionState) -> bool {
    state.send_if_modified(|current| {
        if *current == next || *current == ConnectionState::Closed {
            return false;
        }
        *current = next;
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping() {
        assert_eq!(
            ConnectionState::from(RTCPeerConnectionState::Failed),
            ConnectionState::Failed
        );
        assert_eq!(
            ConnectionState::from(RTCPeerConnectionState::Unspecified),
            ConnectionState::New
        );
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Disconnected.is_terminal());
    }

    #[test]
    fn test_closed_state_is_sticky() {
        let (tx, rx) = watch::channel(ConnectionState::New);
        assert!(publish_state(&tx, ConnectionState::Connecting));
        assert!(publish_state(&tx, ConnectionState::Closed));
        assert!(!publish_state(&tx, ConnectionState::Connected));
        assert_eq!(*rx.borrow(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_new_handle_starts_new() {
        let handle = PeerConnectionHandle::new(&EngineConfig::local_only())
            .await
            .unwrap();
        assert_eq!(handle.state(), ConnectionState::New);
        assert!(!handle.is_closed());
        assert!(!handle.cancellation().is_cancelled());
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_cancels() {
        let handle = PeerConnectionHandle::new(&EngineConfig::local_only())
            .await
            .unwrap();
        let token = handle.cancellation();

        handle.close().await.unwrap();
        handle.close().await.unwrap();

        assert!(token.is_cancelled());
        assert_eq!(handle.state(), ConnectionState::Closed);
        assert!(handle.next_remote_track().await.is_none());
    }

    #[tokio::test]
    async fn test_apply_answer_rejects_offer() {
        let handle = PeerConnectionHandle::new(&EngineConfig::local_only())
            .await
            .unwrap();
        let err = handle
            .apply_answer(&SessionDescription::offer("v=0"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_SESSION_DESCRIPTION");
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_state_after_close() {
        let handle = PeerConnectionHandle::new(&EngineConfig::local_only())
            .await
            .unwrap();
        handle.close().await.unwrap();

        assert!(handle
            .wait_for_state(ConnectionState::Closed, Duration::from_millis(100))
            .await
            .is_ok());
        let err = handle
            .wait_for_state(ConnectionState::Connected, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
    }
}
