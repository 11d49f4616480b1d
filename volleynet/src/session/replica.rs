//! Replicated game state and its reconciliation rules.

use crate::protocol::constants::DEFAULT_WINDOW_SIZE;
use crate::protocol::message::{PlayerSlot, Vec2};

/// The mirrored view of the match both processes converge on.
///
/// The Owner is authoritative for ball and score; each process is
/// authoritative for its own paddle. Reconciliation is last-write-wins for
/// paddles, unconditional overwrite for the ball vector, and
/// changed-only overwrite for the ball position.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicatedGameState {
    /// Paddle positions, indexed by [`PlayerSlot::index`]
    pub paddles: [Vec2; 2],
    pub ball_position: Vec2,
    pub ball_velocity: Vec2,
    /// Score pair, indexed by [`PlayerSlot::index`]
    pub scores: [u32; 2],
    pub paused: bool,
    /// Owner's surface size, mirrored by the Guest
    pub window_size: Vec2,
}

impl Default for ReplicatedGameState {
    fn default() -> Self {
        Self {
            paddles: [[0.0, 0.0]; 2],
            ball_position: [0.0, 0.0],
            ball_velocity: [0.0, 0.0],
            scores: [0, 0],
            paused: false,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl ReplicatedGameState {
    /// Last-write-wins paddle update, no validation.
    pub fn set_paddle(&mut self, slot: PlayerSlot, position: Vec2) {
        self.paddles[slot.index()] = position;
    }

    pub fn paddle(&self, slot: PlayerSlot) -> Vec2 {
        self.paddles[slot.index()]
    }

    /// Unconditional overwrite of the authoritative ball vector.
    pub fn apply_ball_velocity(&mut self, velocity: Vec2) {
        self.ball_velocity = velocity;
    }

    /// Overwrites the ball position only when it differs from the local one.
    /// Returns whether anything changed.
    pub fn apply_ball_position(&mut self, position: Vec2) -> bool {
        if self.ball_position == position {
            return false;
        }
        self.ball_position = position;
        true
    }

    /// Overwrites the score for one slot with the authoritative value.
    pub fn apply_score(&mut self, slot: PlayerSlot, points: u32) {
        self.scores[slot.index()] = points;
    }

    pub fn score(&self, slot: PlayerSlot) -> u32 {
        self.scores[slot.index()]
    }

    /// Owner-side scoring event: bumps the slot and returns the new value.
    pub fn record_point(&mut self, slot: PlayerSlot) -> u32 {
        self.scores[slot.index()] += 1;
        self.scores[slot.index()]
    }

    /// First slot at or past the threshold, if any.
    ///
    /// The comparison is pure, so Owner and Guest reach the same conclusion
    /// from the same score value.
    pub fn winner(&self, threshold: u32) -> Option<PlayerSlot> {
        if self.scores[0] >= threshold {
            Some(PlayerSlot::Player1)
        } else if self.scores[1] >= threshold {
            Some(PlayerSlot::Player2)
        } else {
            None
        }
    }

    /// Zeroes both scores, leaving positions untouched.
    pub fn reset_scores(&mut self) {
        self.scores = [0, 0];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ball_position_is_idempotent() {
        let mut state = ReplicatedGameState::default();
        assert!(state.apply_ball_position([729.0, 275.0]));
        assert!(!state.apply_ball_position([729.0, 275.0]));
        assert_eq!(state.ball_position, [729.0, 275.0]);
    }

    #[test]
    fn winner_at_threshold_not_below() {
        let mut state = ReplicatedGameState::default();
        state.apply_score(PlayerSlot::Player1, 9);
        assert_eq!(state.winner(10), None);
        state.apply_score(PlayerSlot::Player1, 10);
        assert_eq!(state.winner(10), Some(PlayerSlot::Player1));
    }

    #[test]
    fn record_point_counts_up() {
        let mut state = ReplicatedGameState::default();
        assert_eq!(state.record_point(PlayerSlot::Player2), 1);
        assert_eq!(state.record_point(PlayerSlot::Player2), 2);
        assert_eq!(state.score(PlayerSlot::Player2), 2);
        assert_eq!(state.score(PlayerSlot::Player1), 0);
    }

    #[test]
    fn reset_zeroes_both_scores() {
        let mut state = ReplicatedGameState::default();
        state.apply_score(PlayerSlot::Player1, 10);
        state.apply_score(PlayerSlot::Player2, 4);
        state.reset_scores();
        assert_eq!(state.scores, [0, 0]);
    }

    #[test]
    fn paddles_are_independent() {
        let mut state = ReplicatedGameState::default();
        state.set_paddle(PlayerSlot::Player1, [10.0, 50.0]);
        state.set_paddle(PlayerSlot::Player2, [790.0, 120.0]);
        assert_eq!(state.paddle(PlayerSlot::Player1), [10.0, 50.0]);
        assert_eq!(state.paddle(PlayerSlot::Player2), [790.0, 120.0]);
    }
}
