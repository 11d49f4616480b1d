use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors related to the volleynet protocol.
#[derive(Debug, Error)]
pub enum VolleyError {
    /// Payload could not be decoded
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Discovery or init record lacks a required credential
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// Transport adapter error
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Discovery error
    #[error("discovery error: {0}")]
    Discovery(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Operation not valid in the current session state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// General error
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by a transport adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Destination address was never registered as a peer
    #[error("peer not registered: {0}")]
    UnknownPeer(SocketAddr),

    /// Peer is registered but has no usable key material
    #[error("no keys installed for peer: {0}")]
    MissingKeys(SocketAddr),

    /// Datagram could not be handed to the network
    #[error("failed to send datagram: {0}")]
    SendFailed(String),

    /// Frame could not be sealed or opened
    #[error("frame crypto error: {0}")]
    Crypto(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, VolleyError>;
