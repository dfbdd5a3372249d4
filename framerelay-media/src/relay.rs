//! Fan-out of one inbound RTP track to any number of consumers

use crate::error::{MediaError, MediaResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use webrtc::rtp::packet::Packet;
use webrtc::track::track_remote::TrackRemote;

/// Default number of packets a slow subscriber may fall behind
pub const DEFAULT_RELAY_CAPACITY: usize = 512;

/// Something that yields RTP packets
#[async_trait]
pub trait RtpSource: Send + Sync + 'static {
    /// Read the next packet; an error ends the stream
    async fn read_packet(&self) -> MediaResult<Packet>;
}

#[async_trait]
impl RtpSource for TrackRemote {
    async fn read_packet(&self) -> MediaResult<Packet> {
        let (packet, _attributes) = self
            .read_rtp()
            .await
            .map_err(|e| MediaError::TrackRead {
                reason: e.to_string(),
            })?;
        Ok(packet)
    }
}

/// Relays packets from one source to every subscriber
#[derive(Debug, Clone)]
pub struct TrackRelay {
    sender: broadcast::Sender<Arc<Packet>>,
}

impl Default for TrackRelay {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_CAPACITY)
    }
}

impl TrackRelay {
    /// Create a relay buffering up to `capacity` packets per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New consumer; receives packets read after this call
    pub fn subscribe(&self) -> RelaySubscription {
        RelaySubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Pump packets from `source` until it fails or `cancel` fires
    ///
    /// Subscribers see the end of the stream once the task finishes and the
    /// relay itself is dropped.
    pub fn start<S: RtpSource + ?Sized>(
        self,
        source: Arc<S>,
        cancel: CancellationToken,
    ) -> JoinHandle<u64> {
        tokio::spawn(async move {
            let mut relayed = 0u64;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Track relay cancelled after {} packets", relayed);
                        break;
                    }
                    packet = source.read_packet() => match packet {
                        Ok(packet) => {
                            relayed += 1;
                            // No subscribers is not an error
                            let _ = self.sender.send(Arc::new(packet));
                        }
                        Err(e) => {
                            tracing::info!("Inbound track ended after {} packets: {}", relayed, e);
                            break;
                        }
                    }
                }
            }
            relayed
        })
    }
}

/// Receiving side of a [`TrackRelay`]
#[derive(Debug)]
pub struct RelaySubscription {
    receiver: broadcast::Receiver<Arc<Packet>>,
}

impl RelaySubscription {
    /// Next packet, or `None` once the relay has stopped
    ///
    /// Packets dropped because this subscriber fell behind are skipped.
    pub async fn recv(&mut self) -> Option<Arc<Packet>> {
        loop {
            match self.receiver.recv().await {
                Ok(packet) => return Some(packet),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Relay subscriber lagged, skipped {} packets", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{mpsc, Mutex};

    struct ChannelSource {
        rx: Mutex<mpsc::Receiver<Packet>>,
    }

    #[async_trait]
    impl RtpSource for ChannelSource {
        async fn read_packet(&self) -> MediaResult<Packet> {
            self.rx
                .lock()
                .await
                .recv()
                .await
                .ok_or(MediaError::TrackRead {
                    reason: "closed".to_string(),
                })
        }
    }

    fn packet(seq: u16) -> Packet {
        let mut p = Packet::default();
        p.header.sequence_number = seq;
        p
    }

    #[tokio::test]
    async fn test_fans_out_to_every_subscriber() {
        let (tx, rx) = mpsc::channel(16);
        let relay = TrackRelay::new(16);
        let mut a = relay.subscribe();
        let mut b = relay.subscribe();
        assert_eq!(relay.subscriber_count(), 2);

        let source = Arc::new(ChannelSource { rx: Mutex::new(rx) });
        let task = relay.start(source, CancellationToken::new());
        for seq in 0..3 {
            tx.send(packet(seq)).await.unwrap();
        }
        drop(tx);

        for seq in 0..3 {
            assert_eq!(a.recv().await.unwrap().header.sequence_number, seq);
            assert_eq!(b.recv().await.unwrap().header.sequence_number, seq);
        }
        assert_eq!(task.await.unwrap(), 3);
        assert!(a.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_relay() {
        let (_tx, rx) = mpsc::channel::<Packet>(1);
        let relay = TrackRelay::default();
        let mut sub = relay.subscribe();
        let cancel = CancellationToken::new();
        let task = relay.start(Arc::new(ChannelSource { rx: Mutex::new(rx) }), cancel.clone());

        cancel.cancel();
        assert_eq!(task.await.unwrap(), 0);
        assert!(sub.recv().await.is_none());
    }
}
