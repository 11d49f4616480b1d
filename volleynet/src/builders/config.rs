use crate::protocol::constants::{
    ANNOUNCE_INTERVAL, DEFAULT_WINDOW_SIZE, POINTS_TO_WIN, PORT_RANGE, SESSION_TYPE,
};
use crate::protocol::message::Vec2;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Node configuration with chainable setters.
///
/// Defaults:
/// - `name` = `Dave_<7-digit-random>`
/// - `bind_addr` = `127.0.0.1` with a random port from the node port range
/// - `session_type` = `"pong"`
/// - `points_to_win` = 10
/// - `window_size` = 800x600
/// - `announce_interval` = 2s
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Display name, broadcast in announcements and fed to role arbitration
    pub name: String,
    /// Address this node receives datagrams on, advertised verbatim
    pub bind_addr: SocketAddr,
    /// Protocol tag separating sessions from foreign traffic on the group
    pub session_type: String,
    /// Score threshold that ends a game
    pub points_to_win: u32,
    /// Surface size the Owner replicates to the Guest
    pub window_size: Vec2,
    /// Interval between discovery self-announcements
    pub announce_interval: Duration,
}

impl NodeConfig {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            name: format!("Dave_{}", rng.gen_range(1_000_000..10_000_000)),
            bind_addr: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                rng.gen_range(PORT_RANGE),
            ),
            session_type: SESSION_TYPE.to_string(),
            points_to_win: POINTS_TO_WIN,
            window_size: DEFAULT_WINDOW_SIZE,
            announce_interval: ANNOUNCE_INTERVAL,
        }
    }

    /// Sets the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the receive address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the protocol tag.
    pub fn session_type(mut self, session_type: impl Into<String>) -> Self {
        self.session_type = session_type.into();
        self
    }

    /// Sets the winning score threshold.
    pub fn points_to_win(mut self, points: u32) -> Self {
        self.points_to_win = points;
        self
    }

    /// Sets the replicated surface size.
    pub fn window_size(mut self, size: Vec2) -> Self {
        self.window_size = size;
        self
    }

    /// Sets the discovery announce interval.
    pub fn announce_interval(mut self, interval: Duration) -> Self {
        self.announce_interval = interval;
        self
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new()
    }
}
