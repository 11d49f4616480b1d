//! Tokio-based protocol for two-player paddle duels on a local network.
//!
//! This crate takes two independently started processes from "searching"
//! to a running, state-replicated session:
//! - [`DiscoveryChannel`] for multicast self-announcement and opponent discovery
//! - [`Coordinator`] for role arbitration, the readiness handshake and the
//!   session state machine
//! - [`PeerRegistry`] for the single active opponent and its key material
//! - [`Payload`]/[`GameMessage`] for the steady-state replication vocabulary
//! - [`lan`] for reference UDP adapters behind the [`Transport`] and
//!   [`Beacon`] contracts
//!
//! ## Session flow
//!
//! ```text
//! searching:     A and B multicast announcements on the shared group
//! handshake:     B accepts A's record -> init to A -> both arbitrate roles
//! readiness:     ready/ack exchange -> both synchronized
//! running:       per-tick paddle replication, owner-authoritative ball/score
//! teardown:      opponent-left notice -> full reset -> searching again
//! ```
//!
//! Roles are decided by a deterministic comparison of display names: the
//! lexicographically smaller name owns the authoritative ball and score.

pub mod builders;
pub mod discovery;
pub mod error;
pub mod lan;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

pub use builders::NodeConfig;
pub use discovery::{Beacon, DiscoveryChannel};
pub use error::{Result, TransportError, VolleyError};
pub use protocol::announce::{Announcement, PeerRecord};
pub use protocol::message::{GameMessage, Payload, PlayerSlot, Vec2};
pub use registry::PeerRegistry;
pub use session::{Coordinator, Role, SessionEvent, SessionState, StatusChange};
pub use transport::{Datagram, PublicKeys, Transport};
