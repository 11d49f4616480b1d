//! Encrypted point-to-point datagram transport contract.
//!
//! The session core never touches sockets or cipher state directly; it talks
//! to an adapter through this trait. The reference LAN adapter lives in
//! [`crate::lan`], tests substitute in-memory fakes.

use crate::error::TransportError;
use bytes::Bytes;
use futures::Stream;
use std::net::SocketAddr;
use std::pin::Pin;

/// A payload received from the network, still in its textual form.
#[derive(Debug, Clone)]
pub struct Datagram {
    /// Decoded textual payload
    pub payload: Bytes,
    /// Sender address
    pub from: SocketAddr,
}

/// Local public key material handed out to opponents during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeys {
    /// Hex-encoded encryption public key material
    pub enc_key: String,
    /// Hex-encoded signature public key material
    pub sign_key: String,
}

/// Encrypted datagram adapter.
///
/// Implementations must accept `update_peer_keys` for addresses that are not
/// yet registered: installing key material strictly before registering the
/// address is the contract the peer registry relies on. Sending to an address
/// that is registered without keys fails with [`TransportError::MissingKeys`].
pub trait Transport: Send + Sync {
    /// Marks an address as a known peer.
    fn register_peer(
        &self,
        addr: SocketAddr,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Whether the address is already registered.
    fn has_peer(&self, addr: SocketAddr) -> impl std::future::Future<Output = bool> + Send;

    /// Installs or replaces the key material used to seal payloads to `addr`.
    fn update_peer_keys(
        &self,
        addr: SocketAddr,
        enc_key: &str,
        sign_key: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Sends a textual payload to a registered peer. Best effort: delivery is
    /// not acknowledged and failures carry no retry semantics.
    fn send(
        &self,
        payload: &str,
        addr: SocketAddr,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Stream of inbound payloads from known and yet-unknown peers.
    fn incoming(&self) -> Pin<Box<dyn Stream<Item = Datagram> + Send>>;

    /// The local public key material advertised in announcements.
    fn local_keys(&self) -> PublicKeys;
}
