//! Peer registry: single source of truth for the active opponent.

use crate::error::Result;
use crate::protocol::announce::PeerRecord;
use crate::protocol::message::Payload;
use crate::transport::Transport;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Tracks the one active opponent and mediates transport peer registration.
///
/// Invariants: at most one opponent is active at a time, and key material is
/// installed into the transport strictly before the address is registered as
/// a known peer. Registering first would let sealed traffic race ahead of the
/// keys needed to open it.
pub struct PeerRegistry<T> {
    transport: Arc<T>,
    opponent: Mutex<Option<PeerRecord>>,
}

impl<T: Transport> PeerRegistry<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            opponent: Mutex::new(None),
        }
    }

    /// Installs keys and registers the opponent.
    ///
    /// Calling twice with the same address updates the key material without
    /// re-registering. Switching to a different address clears all prior
    /// state before the new opponent is accepted.
    pub async fn set_opponent(&self, record: PeerRecord) -> Result<()> {
        let mut slot = self.opponent.lock().await;

        if let Some(existing) = slot.take() {
            if existing.addr != record.addr {
                tracing::info!(
                    "switching opponent from {} to {}",
                    existing.addr,
                    record.addr
                );
            } else {
                tracing::debug!("refreshing keys for {}", record.addr);
            }
        }

        // keys-before-peer-registration
        self.transport
            .update_peer_keys(record.addr, &record.enc_key, &record.sign_key)
            .await?;
        if !self.transport.has_peer(record.addr).await {
            self.transport.register_peer(record.addr).await?;
            tracing::info!("added peer {}", record.addr);
        }

        *slot = Some(record);
        Ok(())
    }

    /// Address of the active opponent, if any.
    pub async fn current_opponent(&self) -> Option<SocketAddr> {
        self.opponent.lock().await.as_ref().map(|r| r.addr)
    }

    /// Display name of the active opponent, if any.
    pub async fn opponent_name(&self) -> Option<String> {
        self.opponent.lock().await.as_ref().map(|r| r.name.clone())
    }

    /// Forgets the active opponent. Safe to call when none is set.
    pub async fn clear(&self) {
        if self.opponent.lock().await.take().is_some() {
            tracing::info!("cleared opponent");
        }
    }

    /// Sends a replication payload to the active opponent.
    ///
    /// A send with no opponent set is a logged no-op; transport failures are
    /// logged and swallowed. Delivery is best effort, never retried, and
    /// never fatal to the caller.
    pub async fn send_payload(&self, payload: &Payload) {
        let addr = {
            let slot = self.opponent.lock().await;
            match slot.as_ref() {
                Some(record) => record.addr,
                None => {
                    tracing::warn!("no opponent address set, dropping outbound payload");
                    return;
                }
            }
        };

        let encoded = match payload.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!("failed to encode payload: {}", e);
                return;
            }
        };

        if let Err(e) = self.transport.send(&encoded, addr).await {
            tracing::error!("failed to send payload to {}: {}", addr, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::{Datagram, PublicKeys};
    use futures::Stream;
    use std::pin::Pin;
    use std::sync::Mutex as StdMutex;

    /// Records the order of adapter calls so tests can assert on it.
    struct RecordingTransport {
        calls: StdMutex<Vec<String>>,
        peers: StdMutex<Vec<SocketAddr>>,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: StdMutex::new(Vec::new()),
                peers: StdMutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transport for RecordingTransport {
        async fn register_peer(&self, addr: SocketAddr) -> std::result::Result<(), TransportError> {
            self.calls.lock().unwrap().push(format!("register {}", addr));
            self.peers.lock().unwrap().push(addr);
            Ok(())
        }

        async fn has_peer(&self, addr: SocketAddr) -> bool {
            self.peers.lock().unwrap().contains(&addr)
        }

        async fn update_peer_keys(
            &self,
            addr: SocketAddr,
            _enc_key: &str,
            _sign_key: &str,
        ) -> std::result::Result<(), TransportError> {
            self.calls.lock().unwrap().push(format!("keys {}", addr));
            Ok(())
        }

        async fn send(&self, _payload: &str, addr: SocketAddr) -> std::result::Result<(), TransportError> {
            self.calls.lock().unwrap().push(format!("send {}", addr));
            Ok(())
        }

        fn incoming(&self) -> Pin<Box<dyn Stream<Item = Datagram> + Send>> {
            Box::pin(futures::stream::pending())
        }

        fn local_keys(&self) -> PublicKeys {
            PublicKeys {
                enc_key: "00".to_string(),
                sign_key: "11".to_string(),
            }
        }
    }

    fn record(addr: &str) -> PeerRecord {
        PeerRecord {
            addr: addr.parse().unwrap(),
            name: "bob".to_string(),
            enc_key: "aa".to_string(),
            sign_key: "bb".to_string(),
        }
    }

    #[tokio::test]
    async fn keys_are_installed_before_registration() {
        let transport = RecordingTransport::new();
        let registry = PeerRegistry::new(transport.clone());

        registry.set_opponent(record("10.0.0.2:4000")).await.unwrap();

        assert_eq!(
            transport.calls(),
            vec!["keys 10.0.0.2:4000", "register 10.0.0.2:4000"]
        );
    }

    #[tokio::test]
    async fn set_opponent_twice_updates_keys_without_reregistering() {
        let transport = RecordingTransport::new();
        let registry = PeerRegistry::new(transport.clone());

        registry.set_opponent(record("10.0.0.2:4000")).await.unwrap();
        registry.set_opponent(record("10.0.0.2:4000")).await.unwrap();

        assert_eq!(
            transport.calls(),
            vec![
                "keys 10.0.0.2:4000",
                "register 10.0.0.2:4000",
                "keys 10.0.0.2:4000",
            ]
        );
        assert_eq!(
            registry.current_opponent().await,
            Some("10.0.0.2:4000".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn switching_opponents_replaces_the_record() {
        let transport = RecordingTransport::new();
        let registry = PeerRegistry::new(transport.clone());

        registry.set_opponent(record("10.0.0.2:4000")).await.unwrap();
        registry.set_opponent(record("10.0.0.3:4001")).await.unwrap();

        assert_eq!(
            registry.current_opponent().await,
            Some("10.0.0.3:4001".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn send_without_opponent_is_a_noop() {
        let transport = RecordingTransport::new();
        let registry = PeerRegistry::new(transport.clone());

        registry
            .send_payload(&Payload::from(crate::protocol::message::GameMessage::Ready))
            .await;

        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn clear_forgets_the_opponent() {
        let transport = RecordingTransport::new();
        let registry = PeerRegistry::new(transport.clone());

        registry.set_opponent(record("10.0.0.2:4000")).await.unwrap();
        registry.clear().await;

        assert_eq!(registry.current_opponent().await, None);
    }
}
