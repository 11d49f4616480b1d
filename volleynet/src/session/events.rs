//! Typed notifications delivered to the game loop.

use crate::protocol::message::{GameMessage, PlayerSlot, Vec2};
use crate::session::state::Role;

/// Everything the game loop can learn from the session, as one tagged
/// notification stream. Session state itself is never exposed through
/// scattered flags; it lives in the coordinator's state enum.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A searching announcement was accepted and the init handshake sent
    OpponentFound { name: String },
    /// The opponent addressed us first with an init record
    GameInit { name: String },
    /// Role arbitration committed
    RoleDecided { role: Role },
    /// Both sides completed the readiness handshake
    Synchronized,
    /// Opponent paddle or authoritative ball data changed
    GameDataUpdate(GameMessage),
    /// Session status changed
    GameStatusUpdate(StatusChange),
    /// Authoritative score changed
    ScoreUpdate { slot: PlayerSlot, points: u32 },
}

/// Status-level changes carried by [`SessionEvent::GameStatusUpdate`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    /// Pause flag adopted
    Paused(bool),
    /// Scores zeroed, game-over cleared
    ScoresReset,
    /// Owner's surface size to mirror
    WindowSize(Vec2),
    /// Match decided; `local_win` tells whether this process won
    GameOver { winner: PlayerSlot, local_win: bool },
    /// Opponent tore the session down; searching again
    OpponentLeft,
}
