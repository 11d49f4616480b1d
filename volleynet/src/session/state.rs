//! Session lifecycle states and role arbitration.

use crate::protocol::message::PlayerSlot;
use std::cmp::Ordering;
use std::fmt;

/// Lifecycle of a session, owned exclusively by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Broadcasting and listening for an opponent
    Searching,
    /// Opponent known, role not yet committed
    AwaitingRoleDecision,
    /// Role committed, waiting for the readiness handshake to complete
    SyncReady,
    /// Both sides confirmed ready; waiting for the first tick
    Synchronized,
    /// Game loop is ticking
    Running,
    /// Ticking suspended by either side
    Paused,
    /// Score threshold reached
    GameOver,
    /// Local teardown; no further transitions
    Disconnected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Searching => "searching",
            SessionState::AwaitingRoleDecision => "awaiting-role-decision",
            SessionState::SyncReady => "sync-ready",
            SessionState::Synchronized => "synchronized",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::GameOver => "game-over",
            SessionState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which side of the session this process plays.
///
/// The Owner is authoritative for ball physics and score; the Guest mirrors
/// them. Computed once per session and never changed until the session is
/// torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Guest,
}

impl Role {
    /// Court slot this role plays: the Owner is always player 1.
    pub fn slot(&self) -> PlayerSlot {
        match self {
            Role::Owner => PlayerSlot::Player1,
            Role::Guest => PlayerSlot::Player2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Guest => write!(f, "guest"),
        }
    }
}

/// Decides the local role from the two display names.
///
/// Both sides evaluate the same pure comparison with their arguments swapped,
/// so exactly one of them becomes Owner: the lexicographically smaller name.
/// Equal names cannot be ordered into complementary roles; `None` tells the
/// caller to reject the pairing.
pub fn decide_role(self_name: &str, other_name: &str) -> Option<Role> {
    match self_name.cmp(other_name) {
        Ordering::Less => Some(Role::Owner),
        Ordering::Greater => Some(Role::Guest),
        Ordering::Equal => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arbitration_is_complementary() {
        let pairs = [
            ("alice", "bob"),
            ("bob", "alice"),
            ("Dave_1000000", "Dave_9999999"),
            ("a", "ab"),
            ("Zed", "ada"), // uppercase sorts before lowercase
        ];
        for (a, b) in pairs {
            let left = decide_role(a, b).unwrap();
            let right = decide_role(b, a).unwrap();
            assert_ne!(left, right, "{} vs {}", a, b);
            let owners = [left, right]
                .iter()
                .filter(|r| **r == Role::Owner)
                .count();
            assert_eq!(owners, 1, "{} vs {}", a, b);
        }
    }

    #[test]
    fn smaller_name_owns_the_session() {
        assert_eq!(decide_role("alice", "bob"), Some(Role::Owner));
        assert_eq!(decide_role("bob", "alice"), Some(Role::Guest));
    }

    #[test]
    fn equal_names_have_no_role() {
        assert_eq!(decide_role("alice", "alice"), None);
    }

    #[test]
    fn owner_plays_slot_one() {
        assert_eq!(Role::Owner.slot(), PlayerSlot::Player1);
        assert_eq!(Role::Guest.slot(), PlayerSlot::Player2);
    }
}
