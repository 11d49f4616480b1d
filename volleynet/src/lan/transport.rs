//! Encrypted UDP datagram transport.
//!
//! Outbound payloads are sealed to a key derived from the recipient's
//! announced key material; inbound frames are opened with the key derived
//! from our own, so a handshake init is readable before the sender's keys
//! are installed. Undecodable frames are dropped on receive.

use crate::error::{Result, TransportError};
use crate::lan::crypto;
use crate::transport::{Datagram, PublicKeys, Transport};
use bytes::Bytes;
use futures::Stream;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

#[derive(Default)]
struct PeerEntry {
    registered: bool,
    seal_key: Option<[u8; 32]>,
}

/// UDP implementation of the [`Transport`] contract.
pub struct LanTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    keys: PublicKeys,
    peers: Arc<RwLock<HashMap<SocketAddr, PeerEntry>>>,
    datagram_rx: Arc<Mutex<mpsc::UnboundedReceiver<Datagram>>>,
    recv_task: JoinHandle<()>,
}

impl LanTransport {
    /// Binds the receive socket and generates fresh local key material.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let local_addr = socket.local_addr()?;

        let keys = PublicKeys {
            enc_key: hex::encode(rand::random::<[u8; 32]>()),
            sign_key: hex::encode(rand::random::<[u8; 32]>()),
        };
        let open_key = crypto::derive_key(keys.enc_key.as_bytes());

        let (datagram_tx, datagram_rx) = mpsc::unbounded_channel();
        let recv_socket = socket.clone();
        let recv_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                match recv_socket.recv_from(&mut buf).await {
                    Ok((n, from)) => match crypto::open(&buf[..n], &open_key) {
                        Ok(plaintext) => {
                            let _ = datagram_tx.send(Datagram {
                                payload: Bytes::from(plaintext),
                                from,
                            });
                        }
                        Err(e) => tracing::debug!("dropping frame from {}: {}", from, e),
                    },
                    Err(e) => {
                        tracing::debug!("socket receive error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            socket,
            local_addr,
            keys,
            peers: Arc::new(RwLock::new(HashMap::new())),
            datagram_rx: Arc::new(Mutex::new(datagram_rx)),
            recv_task,
        })
    }

    /// The bound receive address, with the OS-assigned port resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for LanTransport {
    async fn register_peer(&self, addr: SocketAddr) -> std::result::Result<(), TransportError> {
        let mut peers = self.peers.write().await;
        peers.entry(addr).or_default().registered = true;
        Ok(())
    }

    async fn has_peer(&self, addr: SocketAddr) -> bool {
        self.peers
            .read()
            .await
            .get(&addr)
            .map(|entry| entry.registered)
            .unwrap_or(false)
    }

    async fn update_peer_keys(
        &self,
        addr: SocketAddr,
        enc_key: &str,
        _sign_key: &str,
    ) -> std::result::Result<(), TransportError> {
        if enc_key.is_empty() {
            return Err(TransportError::Crypto(
                "empty encryption key material".to_string(),
            ));
        }
        let mut peers = self.peers.write().await;
        peers.entry(addr).or_default().seal_key = Some(crypto::derive_key(enc_key.as_bytes()));
        Ok(())
    }

    async fn send(&self, payload: &str, addr: SocketAddr) -> std::result::Result<(), TransportError> {
        let seal_key = {
            let peers = self.peers.read().await;
            let entry = peers.get(&addr).ok_or(TransportError::UnknownPeer(addr))?;
            if !entry.registered {
                return Err(TransportError::UnknownPeer(addr));
            }
            entry.seal_key.ok_or(TransportError::MissingKeys(addr))?
        };

        let frame = crypto::seal(payload.as_bytes(), &seal_key)?;
        self.socket
            .send_to(&frame, addr)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    fn incoming(&self) -> Pin<Box<dyn Stream<Item = Datagram> + Send>> {
        let rx = self.datagram_rx.clone();
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut locked_rx = rx.lock().await;
            let datagram = locked_rx.recv().await;
            drop(locked_rx);
            datagram.map(|d| (d, rx))
        }))
    }

    fn local_keys(&self) -> PublicKeys {
        self.keys.clone()
    }
}

impl Drop for LanTransport {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    async fn pair() -> (LanTransport, LanTransport) {
        let a = LanTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let b = LanTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn sealed_payload_reaches_the_peer() {
        let (a, b) = pair().await;
        let b_keys = b.local_keys();

        a.update_peer_keys(b.local_addr(), &b_keys.enc_key, &b_keys.sign_key)
            .await
            .unwrap();
        a.register_peer(b.local_addr()).await.unwrap();
        a.send("{\"ready\":true}", b.local_addr()).await.unwrap();

        let mut incoming = b.incoming();
        let datagram = tokio::time::timeout(Duration::from_secs(2), incoming.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&datagram.payload[..], b"{\"ready\":true}");
        assert_eq!(datagram.from, a.local_addr());
    }

    #[tokio::test]
    async fn send_to_unregistered_peer_fails() {
        let (a, b) = pair().await;
        let err = a.send("{}", b.local_addr()).await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownPeer(_)));
    }

    #[tokio::test]
    async fn send_without_keys_fails() {
        let (a, b) = pair().await;
        a.register_peer(b.local_addr()).await.unwrap();
        let err = a.send("{}", b.local_addr()).await.unwrap_err();
        assert!(matches!(err, TransportError::MissingKeys(_)));
    }

    #[tokio::test]
    async fn frames_sealed_to_someone_else_are_dropped() {
        let (a, b) = pair().await;
        // keys of a third party, not b's
        a.update_peer_keys(b.local_addr(), "not-bobs-key", "x")
            .await
            .unwrap();
        a.register_peer(b.local_addr()).await.unwrap();
        a.send("{\"ready\":true}", b.local_addr()).await.unwrap();

        let mut incoming = b.incoming();
        let received = tokio::time::timeout(Duration::from_millis(200), incoming.next()).await;
        assert!(received.is_err(), "unreadable frame must not surface");
    }
}
