//! Signaling server: accepts offers over HTTP and relays video back

use crate::lifecycle::close_on_failure;
use crate::protocol::{OfferRejection, SdpType, SessionDescription, OFFER_PATH};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use framerelay_core::{
    h264_capability, ConnectionId, ConnectionRegistry, ConnectionState, EngineConfig,
    PeerConnectionHandle, RelayError, RelayResult,
};
use framerelay_media::{run_processing_loop, AdapterStats, FrameAdapter, FrameTransform, TrackRelay};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Offer/answer endpoint that relays each client's video back through a
/// frame transform
#[derive(Debug, Clone)]
pub struct SignalingServer {
    /// Address the server binds to in [`SignalingServer::run`]
    pub bind_addr: SocketAddr,
    engine: EngineConfig,
    adapter: FrameAdapter,
    registry: ConnectionRegistry,
}

impl SignalingServer {
    /// Create new signaling server
    ///
    /// `transform` is applied to every relayed frame; `None` relays frames
    /// unchanged.
    pub fn new(
        bind_addr: SocketAddr,
        engine: EngineConfig,
        transform: Option<Arc<dyn FrameTransform>>,
    ) -> Self {
        Self {
            bind_addr,
            engine,
            adapter: FrameAdapter::new(transform),
            registry: ConnectionRegistry::new(),
        }
    }

    /// Live connections
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Frame counters shared by every connection's adapter
    pub fn adapter_stats(&self) -> Arc<AdapterStats> {
        self.adapter.stats()
    }

    /// HTTP routes served by this server
    pub fn router(&self) -> Router {
        Router::new()
            .route(OFFER_PATH, post(offer_endpoint))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Bind [`bind_addr`](Self::bind_addr) and serve until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> RelayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// Every registered connection is closed before this returns.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> RelayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            "Signaling server listening on {} (transform: {})",
            local_addr,
            self.adapter.transform_name()
        );

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;
        self.shutdown().await;
        result.map_err(RelayError::from)
    }

    /// Close every registered connection concurrently and clear the registry
    pub async fn shutdown(&self) -> usize {
        let closed = self.registry.close_all().await;
        tracing::info!("Signaling server closed {} connections", closed);
        closed
    }

    /// Negotiate a relay session for a JSON-encoded offer
    ///
    /// A body that is not a well-formed offer is rejected before any
    /// connection is created. Once negotiation starts, a failure or a dropped
    /// request closes and deregisters the connection.
    pub async fn handle_offer(&self, body: &[u8]) -> Result<SessionDescription, OfferRejection> {
        let offer = SessionDescription::from_json(body).map_err(OfferRejection::BadRequest)?;
        offer
            .expect_kind(SdpType::Offer)
            .map_err(OfferRejection::BadRequest)?;
        offer.to_rtc().map_err(OfferRejection::BadRequest)?;

        let handle = PeerConnectionHandle::new(&self.engine)
            .await
            .map_err(OfferRejection::Negotiation)?;
        let id = handle.id();
        self.registry.insert(Arc::clone(&handle));
        let pending = PendingConnection::new(self.registry.clone(), Arc::clone(&handle));
        self.watch_connection(Arc::clone(&handle));

        match self.negotiate(&handle, &offer).await {
            Ok(answer) => {
                pending.disarm();
                tracing::info!(connection_id = %id, "Answered offer");
                Ok(answer)
            }
            Err(e) => {
                tracing::error!(connection_id = %id, error_code = %e.error_code(), "Negotiation failed: {}", e);
                pending.abandon().await;
                Err(OfferRejection::Negotiation(e))
            }
        }
    }

    async fn negotiate(
        &self,
        handle: &Arc<PeerConnectionHandle>,
        offer: &SessionDescription,
    ) -> RelayResult<SessionDescription> {
        let output = Arc::new(TrackLocalStaticSample::new(
            h264_capability(),
            "video".to_owned(),
            format!("framerelay-{}", handle.id()),
        ));
        let local: Arc<dyn TrackLocal + Send + Sync> = Arc::clone(&output) as _;
        handle.add_local_track(local).await?;
        self.spawn_relay(Arc::clone(handle), output);
        handle.accept_offer(offer).await
    }

    /// Relay the first inbound video track through the adapter onto `output`
    fn spawn_relay(&self, handle: Arc<PeerConnectionHandle>, output: Arc<TrackLocalStaticSample>) {
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            let id = handle.id();
            let Some(track) = handle.next_remote_track().await else {
                tracing::debug!(connection_id = %id, "Connection ended before a track arrived");
                return;
            };
            let cancel = handle.cancellation();
            drop(handle);

            let relay = TrackRelay::default();
            let subscription = relay.subscribe();
            let relay_task = relay.start(track, cancel.clone());

            match run_processing_loop(subscription, adapter, output, cancel.clone()).await {
                Ok(summary) => tracing::debug!(
                    connection_id = %id,
                    frames_in = summary.frames_in,
                    frames_out = summary.frames_out,
                    "Relay finished"
                ),
                Err(e) => tracing::warn!(connection_id = %id, "Relay stopped: {}", e),
            }
            cancel.cancel();
            let _ = relay_task.await;
        });
    }

    /// Close and deregister the connection once it fails; deregister on close
    fn watch_connection(&self, handle: Arc<PeerConnectionHandle>) {
        let registry = self.registry.clone();
        let id = handle.id();
        let states = handle.subscribe_state();
        tokio::spawn(supervise_connection(registry, id, states, move || async move {
            handle.close().await
        }));
    }
}

/// Apply the failure policy to one registered connection, then deregister it
pub(crate) async fn supervise_connection<F, Fut>(
    registry: ConnectionRegistry,
    id: ConnectionId,
    states: watch::Receiver<ConnectionState>,
    close: F,
) -> ConnectionState
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = RelayResult<()>>,
{
    let terminal = close_on_failure(states, close).await;
    if registry.remove(&id).is_some() {
        tracing::debug!(connection_id = %id, state = %terminal, "Deregistered connection");
    }
    terminal
}

/// Registered connection whose offer has not been answered yet
///
/// Dropping it without [`disarm`](Self::disarm), e.g. when the request is
/// cancelled mid-negotiation, deregisters and closes the connection.
struct PendingConnection {
    registry: ConnectionRegistry,
    handle: Option<Arc<PeerConnectionHandle>>,
}

impl PendingConnection {
    fn new(registry: ConnectionRegistry, handle: Arc<PeerConnectionHandle>) -> Self {
        Self {
            registry,
            handle: Some(handle),
        }
    }

    /// Keep the connection; negotiation succeeded
    fn disarm(mut self) {
        self.handle = None;
    }

    /// Deregister and close the connection, waiting for the close
    async fn abandon(mut self) {
        if let Some(handle) = self.handle.take() {
            let id = handle.id();
            self.registry.remove(&id);
            if let Err(e) = handle.close().await {
                tracing::warn!(connection_id = %id, "Close after failed negotiation: {}", e);
            }
        }
    }
}

impl Drop for PendingConnection {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let id = handle.id();
        self.registry.remove(&id);
        tracing::warn!(connection_id = %id, "Offer abandoned mid-negotiation, closing");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = handle.close().await {
                        tracing::warn!(connection_id = %id, "Close after abandoned offer: {}", e);
                    }
                });
            }
            Err(_) => handle.cancellation().cancel(),
        }
    }
}

async fn offer_endpoint(State(server): State<SignalingServer>, body: Bytes) -> Response {
    match server.handle_offer(&body).await {
        Ok(answer) => Json(answer).into_response(),
        Err(rejection) => {
            tracing::warn!(
                status = rejection.status().as_u16(),
                error_code = %rejection.error().error_code(),
                "Rejected offer: {}",
                rejection
            );
            rejection.into_response()
        }
    }
}
