//! Replication message vocabulary.
//!
//! Steady-state traffic is a stream of small key/value records. One wire
//! payload is a single JSON object that may bundle several unrelated keys;
//! every key is decoded and dispatched independently of the others in the
//! same payload. Unknown keys are logged and skipped, a known key with a
//! value of the wrong shape rejects the whole payload as malformed.

use crate::error::{Result, VolleyError};
use crate::protocol::announce::PeerRecord;
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// 2D vector carried on the wire as a two-element array.
pub type Vec2 = [f32; 2];

/// Which side of the court a value belongs to.
///
/// The Owner always plays the `Player1` slot, the Guest plays `Player2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSlot {
    Player1,
    Player2,
}

impl PlayerSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerSlot::Player1 => "player1",
            PlayerSlot::Player2 => "player2",
        }
    }

    /// The slot on the other side of the court.
    pub fn other(&self) -> PlayerSlot {
        match self {
            PlayerSlot::Player1 => PlayerSlot::Player2,
            PlayerSlot::Player2 => PlayerSlot::Player1,
        }
    }

    /// Index into `[player1, player2]` pairs.
    pub fn index(&self) -> usize {
        match self {
            PlayerSlot::Player1 => 0,
            PlayerSlot::Player2 => 1,
        }
    }

    fn score_key(&self) -> &'static str {
        match self {
            PlayerSlot::Player1 => KEY_SCORE_PL1,
            PlayerSlot::Player2 => KEY_SCORE_PL2,
        }
    }
}

impl FromStr for PlayerSlot {
    type Err = VolleyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "player1" => Ok(PlayerSlot::Player1),
            "player2" => Ok(PlayerSlot::Player2),
            _ => Err(VolleyError::Malformed(format!("unknown player slot: {}", s))),
        }
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const KEY_INIT: &str = "init";
const KEY_PAD_POS: &str = "pad_pos";
const KEY_BALL_VEL: &str = "ball_vel";
const KEY_BALL_POS: &str = "ball_pos";
const KEY_SCORE_PL1: &str = "score_pl1";
const KEY_SCORE_PL2: &str = "score_pl2";
const KEY_PAUSE: &str = "pause";
const KEY_RESET_SCORES: &str = "reset_scores";
const KEY_GAME_CLOSE: &str = "game_close";
const KEY_GAME_OVER: &str = "game_over";
const KEY_WIN_SIZE: &str = "win_size";
const KEY_READY: &str = "ready";
const KEY_ACK: &str = "ack";

/// One replication message.
#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    /// Handshake bootstrap: the sender's address, name and key material
    Init(PeerRecord),
    /// Sender's own paddle coordinates
    PaddlePosition(Vec2),
    /// Authoritative ball vector (Owner only)
    BallVelocity(Vec2),
    /// Authoritative ball position (Owner only)
    BallPosition(Vec2),
    /// Authoritative score for one slot (Owner only)
    Score { slot: PlayerSlot, points: u32 },
    /// Desired pause state
    Pause(bool),
    /// Both scores should zero, game-over cleared
    ResetScores,
    /// The sender is tearing down
    OpponentLeft,
    /// Authoritative end of game with the winning slot (Owner only)
    GameOver(PlayerSlot),
    /// Owner's surface size, mirrored by the Guest (Owner only)
    WinSize(Vec2),
    /// Readiness handshake: sender reached sync-ready
    Ready,
    /// Readiness handshake: sender observed our `ready`
    Acknowledge,
}

impl GameMessage {
    /// Wire key this message is carried under.
    pub fn key(&self) -> &'static str {
        match self {
            GameMessage::Init(_) => KEY_INIT,
            GameMessage::PaddlePosition(_) => KEY_PAD_POS,
            GameMessage::BallVelocity(_) => KEY_BALL_VEL,
            GameMessage::BallPosition(_) => KEY_BALL_POS,
            GameMessage::Score { slot, .. } => slot.score_key(),
            GameMessage::Pause(_) => KEY_PAUSE,
            GameMessage::ResetScores => KEY_RESET_SCORES,
            GameMessage::OpponentLeft => KEY_GAME_CLOSE,
            GameMessage::GameOver(_) => KEY_GAME_OVER,
            GameMessage::WinSize(_) => KEY_WIN_SIZE,
            GameMessage::Ready => KEY_READY,
            GameMessage::Acknowledge => KEY_ACK,
        }
    }

    /// Whether only the Owner may send this kind.
    pub fn owner_only(&self) -> bool {
        matches!(
            self,
            GameMessage::BallVelocity(_)
                | GameMessage::BallPosition(_)
                | GameMessage::Score { .. }
                | GameMessage::GameOver(_)
                | GameMessage::WinSize(_)
        )
    }

    fn value(&self) -> Result<Value> {
        let value = match self {
            GameMessage::Init(record) => serde_json::to_value(record)
                .map_err(|e| VolleyError::Malformed(e.to_string()))?,
            GameMessage::PaddlePosition(v)
            | GameMessage::BallVelocity(v)
            | GameMessage::BallPosition(v)
            | GameMessage::WinSize(v) => json!(v),
            GameMessage::Score { points, .. } => json!(points),
            GameMessage::Pause(flag) => json!(flag),
            GameMessage::ResetScores | GameMessage::OpponentLeft => json!(true),
            GameMessage::GameOver(winner) => json!(winner.as_str()),
            GameMessage::Ready | GameMessage::Acknowledge => json!(true),
        };
        Ok(value)
    }

    /// Decode one key/value pair. `Ok(None)` means the key is not part of the
    /// vocabulary and should be skipped by the caller.
    fn from_key_value(key: &str, value: &Value) -> Result<Option<GameMessage>> {
        let message = match key {
            KEY_INIT => {
                let record: PeerRecord = serde_json::from_value(value.clone())
                    .map_err(|e| VolleyError::Malformed(format!("bad init record: {}", e)))?;
                GameMessage::Init(record)
            }
            KEY_PAD_POS => GameMessage::PaddlePosition(decode_vec2(key, value)?),
            KEY_BALL_VEL => GameMessage::BallVelocity(decode_vec2(key, value)?),
            KEY_BALL_POS => GameMessage::BallPosition(decode_vec2(key, value)?),
            KEY_WIN_SIZE => GameMessage::WinSize(decode_vec2(key, value)?),
            KEY_SCORE_PL1 => GameMessage::Score {
                slot: PlayerSlot::Player1,
                points: decode_points(key, value)?,
            },
            KEY_SCORE_PL2 => GameMessage::Score {
                slot: PlayerSlot::Player2,
                points: decode_points(key, value)?,
            },
            KEY_PAUSE => GameMessage::Pause(decode_flag(key, value)?),
            KEY_RESET_SCORES => {
                decode_flag(key, value)?;
                GameMessage::ResetScores
            }
            KEY_GAME_CLOSE => {
                decode_flag(key, value)?;
                GameMessage::OpponentLeft
            }
            KEY_GAME_OVER => {
                let tag = value.as_str().ok_or_else(|| {
                    VolleyError::Malformed(format!("{}: winner tag must be a string", key))
                })?;
                GameMessage::GameOver(tag.parse()?)
            }
            KEY_READY => {
                decode_flag(key, value)?;
                GameMessage::Ready
            }
            KEY_ACK => {
                decode_flag(key, value)?;
                GameMessage::Acknowledge
            }
            _ => return Ok(None),
        };
        Ok(Some(message))
    }
}

fn decode_vec2(key: &str, value: &Value) -> Result<Vec2> {
    serde_json::from_value(value.clone())
        .map_err(|e| VolleyError::Malformed(format!("{}: expected [x, y], {}", key, e)))
}

fn decode_points(key: &str, value: &Value) -> Result<u32> {
    value
        .as_u64()
        .and_then(|points| u32::try_from(points).ok())
        .ok_or_else(|| VolleyError::Malformed(format!("{}: expected a score value", key)))
}

fn decode_flag(key: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| VolleyError::Malformed(format!("{}: expected a boolean", key)))
}

/// A bundle of independent replication messages sharing one wire payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    messages: Vec<GameMessage>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundle another message into this payload.
    pub fn push(&mut self, message: GameMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[GameMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<GameMessage> {
        self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Encode the bundle as a single textual JSON object.
    pub fn encode(&self) -> Result<String> {
        let mut map = Map::new();
        for message in &self.messages {
            map.insert(message.key().to_string(), message.value()?);
        }
        serde_json::to_string(&Value::Object(map)).map_err(|e| VolleyError::Malformed(e.to_string()))
    }

    /// Decode a textual payload into its bundled messages.
    ///
    /// Keys outside the vocabulary are logged at warn level and skipped; a
    /// payload that is not a JSON object, or carries a known key with a
    /// malformed value, is rejected as a whole.
    pub fn decode(text: &str) -> Result<Self> {
        let map: Map<String, Value> = serde_json::from_str(text)
            .map_err(|e| VolleyError::Malformed(format!("payload is not an object: {}", e)))?;

        let mut messages = Vec::with_capacity(map.len());
        for (key, value) in &map {
            match GameMessage::from_key_value(key, value)? {
                Some(message) => messages.push(message),
                None => tracing::warn!("unknown replication key received: {}", key),
            }
        }
        Ok(Self { messages })
    }
}

impl From<GameMessage> for Payload {
    fn from(message: GameMessage) -> Self {
        Self {
            messages: vec![message],
        }
    }
}

impl FromIterator<GameMessage> for Payload {
    fn from_iter<I: IntoIterator<Item = GameMessage>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}
