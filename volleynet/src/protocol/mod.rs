//! Wire vocabulary: constants, announcement records and replication messages.

pub mod announce;
pub mod constants;
pub mod message;

pub use announce::{Announcement, PeerRecord};
pub use message::{GameMessage, Payload, PlayerSlot, Vec2};
