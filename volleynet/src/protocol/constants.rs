//! Constants for the volleynet wire protocol.

use std::net::Ipv4Addr;
use std::ops::Range;
use std::time::Duration;

/// Multicast group shared by all searching nodes.
pub const DISCOVERY_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 117);

/// UDP port the discovery group listens on.
pub const DISCOVERY_PORT: u16 = 7733;

/// Application ID used to derive the discovery frame key.
pub const APPLICATION_ID: u64 = 0x564F4C4C; // "VOLL"

/// Interval between self-announcements while searching.
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(2);

/// Session type tag carried in every announcement.
/// Records with a different tag share the group but belong to a foreign protocol.
pub const SESSION_TYPE: &str = "pong";

/// Points required to win a game.
pub const POINTS_TO_WIN: u32 = 10;

/// Fixed driver rate for the game loop, in ticks per second.
pub const TICK_RATE: u32 = 60;

/// Default window size replicated from the Owner to the Guest.
pub const DEFAULT_WINDOW_SIZE: [f32; 2] = [800.0, 600.0];

/// Maximum accepted size of a single wire payload (in bytes).
pub const MAX_PAYLOAD_SIZE: usize = 10000;

/// Range the receive port is drawn from when none is configured.
pub const PORT_RANGE: Range<u16> = 2000..20000;
