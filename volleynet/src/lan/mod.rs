//! Reference LAN adapters: a multicast beacon and an encrypted UDP
//! transport. The protocol core only ever sees the [`crate::discovery::Beacon`]
//! and [`crate::transport::Transport`] contracts; these implementations make
//! a node runnable on a real network.

mod beacon;
pub(crate) mod crypto;
mod transport;

pub use beacon::{marshal_announcement, unmarshal_announcement, UdpBeacon};
pub use transport::LanTransport;
