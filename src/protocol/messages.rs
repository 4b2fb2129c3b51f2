use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::{GameEndReason, GameId};

use super::error_codes::ErrorCode;

/// Requested opponent kind for `join_game`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Pvp,
    Bot,
}

/// Message types sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter the matchmaking queue
    JoinQueue { username: String },
    /// Leave the matchmaking queue (idempotent)
    LeaveQueue,
    /// Ask for a game directly, either queued PvP or an immediate bot match
    #[serde(rename_all = "camelCase")]
    JoinGame {
        username: String,
        game_type: GameType,
    },
    /// Create a private room and receive its code
    CreateCustomRoom { username: String },
    /// Join a private room by code
    #[serde(rename_all = "camelCase")]
    JoinCustomRoom { username: String, room_code: String },
    /// Drop a disc into a column of an active game
    #[serde(rename_all = "camelCase")]
    MakeMove { game_id: GameId, column: usize },
    /// Re-attach to a game after a disconnection
    #[serde(rename_all = "camelCase")]
    Reconnect { game_id: GameId, username: String },
    /// Voluntarily leave the current game (forfeits if it is active)
    LeaveGame,
    /// Heartbeat
    Ping,
}

/// Payload for the `game_state` server message.
/// Boxed in [`ServerMessage`] to reduce enum size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatePayload {
    pub game_id: GameId,
    pub player1: String,
    pub player2: String,
    /// Rows bottom-up; each cell a color string or null.
    pub board: Vec<Vec<Option<String>>>,
    pub current_turn: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    pub move_count: u32,
    pub start_time: DateTime<Utc>,
}

/// Payload for the `move_made` server message.
/// Boxed in [`ServerMessage`] to reduce enum size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveMadePayload {
    pub game_id: GameId,
    pub player: String,
    pub column: usize,
    pub row: usize,
    pub board: Vec<Vec<Option<String>>>,
    pub next_turn: String,
    pub move_count: u32,
}

/// Message types sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Queue entry accepted
    #[serde(rename_all = "camelCase")]
    QueueJoined {
        position: usize,
        /// Estimated wait in seconds
        estimated_wait: u64,
    },
    /// Queue membership snapshot
    #[serde(rename_all = "camelCase")]
    QueueStatus {
        in_queue: bool,
        position: usize,
        /// Seconds spent waiting so far
        wait_time: u64,
        /// Seconds until bot fallback
        time_remaining: u64,
    },
    /// An opponent has been found
    #[serde(rename_all = "camelCase")]
    MatchFound {
        game_id: GameId,
        opponent: String,
        is_bot: bool,
    },
    /// The game is live
    #[serde(rename_all = "camelCase")]
    GameStarted {
        game_id: GameId,
        opponent: String,
        your_color: String,
        current_turn: String,
        is_bot: bool,
    },
    /// A move was accepted and applied (boxed to reduce enum size)
    MoveMade(Box<MoveMadePayload>),
    /// The game is over
    #[serde(rename_all = "camelCase")]
    GameEnded {
        game_id: GameId,
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<String>,
        reason: GameEndReason,
        /// Seconds from start to end
        duration: i64,
    },
    /// Full state replay, sent on reconnection (boxed to reduce enum size)
    GameState(Box<GameStatePayload>),
    /// Another player joined the room
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        game_id: GameId,
        username: String,
        color: String,
    },
    /// Another player left or disconnected
    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        game_id: GameId,
        username: String,
        reason: String,
    },
    /// A private room was created
    #[serde(rename_all = "camelCase")]
    RoomCreated { game_id: GameId, room_code: String },
    /// Structured error frame
    Error {
        code: ErrorCode,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    /// Heartbeat response
    Pong,
}

impl ServerMessage {
    pub fn error(code: ErrorCode) -> Self {
        Self::Error {
            code,
            message: code.description().to_string(),
            details: None,
        }
    }

    pub fn error_with_details(code: ErrorCode, details: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: code.description().to_string(),
            details: Some(details.into()),
        }
    }
}

/// Envelope for client frames: `{type, payload, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(flatten)]
    pub message: ClientMessage,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Envelope for server frames: `{type, payload, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(flatten)]
    pub message: ServerMessage,
    pub timestamp: DateTime<Utc>,
}

impl ServerFrame {
    pub fn new(message: ServerMessage) -> Self {
        Self {
            message,
            timestamp: Utc::now(),
        }
    }
}

impl From<ServerMessage> for ServerFrame {
    fn from(message: ServerMessage) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn round_trip_client(message: ClientMessage) -> ClientMessage {
        let frame = ClientFrame {
            message,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        serde_json::from_str::<ClientFrame>(&json).unwrap().message
    }

    fn round_trip_server(message: ServerMessage) -> ServerMessage {
        let frame = ServerFrame::new(message);
        let json = serde_json::to_string(&frame).unwrap();
        serde_json::from_str::<ServerFrame>(&json).unwrap().message
    }

    #[test]
    fn client_frames_round_trip() {
        let game_id = Uuid::new_v4();
        for message in [
            ClientMessage::JoinQueue {
                username: "alice".into(),
            },
            ClientMessage::LeaveQueue,
            ClientMessage::JoinGame {
                username: "alice".into(),
                game_type: GameType::Bot,
            },
            ClientMessage::CreateCustomRoom {
                username: "alice".into(),
            },
            ClientMessage::JoinCustomRoom {
                username: "bob".into(),
                room_code: "AB23CD45".into(),
            },
            ClientMessage::MakeMove { game_id, column: 3 },
            ClientMessage::Reconnect {
                game_id,
                username: "alice".into(),
            },
            ClientMessage::LeaveGame,
            ClientMessage::Ping,
        ] {
            assert_eq!(round_trip_client(message.clone()), message);
        }
    }

    #[test]
    fn server_frames_round_trip() {
        let game_id = Uuid::new_v4();
        for message in [
            ServerMessage::QueueJoined {
                position: 1,
                estimated_wait: 10,
            },
            ServerMessage::MatchFound {
                game_id,
                opponent: "bob".into(),
                is_bot: false,
            },
            ServerMessage::GameEnded {
                game_id,
                winner: Some("alice".into()),
                reason: GameEndReason::ConnectFour,
                duration: 93,
            },
            ServerMessage::error(ErrorCode::NotYourTurn),
            ServerMessage::Pong,
        ] {
            assert_eq!(round_trip_server(message.clone()), message);
        }
    }

    #[test]
    fn frame_envelope_has_type_payload_timestamp() {
        let frame = ServerFrame::new(ServerMessage::QueueJoined {
            position: 2,
            estimated_wait: 5,
        });
        let value: serde_json::Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "queue_joined");
        assert_eq!(value["payload"]["position"], 2);
        assert_eq!(value["payload"]["estimatedWait"], 5);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn make_move_parses_camel_case_fields() {
        let game_id = Uuid::new_v4();
        let json = format!(
            r#"{{"type":"make_move","payload":{{"gameId":"{game_id}","column":4}},"timestamp":"2026-01-05T12:00:00Z"}}"#
        );
        let frame: ClientFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame.message, ClientMessage::MakeMove { game_id, column: 4 });
    }

    #[test]
    fn unit_frames_need_no_payload() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"ping","timestamp":"2026-01-05T12:00:00Z"}"#).unwrap();
        assert_eq!(frame.message, ClientMessage::Ping);
    }

    #[test]
    fn game_ended_reason_uses_snake_case_strings() {
        let frame = ServerFrame::new(ServerMessage::GameEnded {
            game_id: Uuid::new_v4(),
            winner: None,
            reason: GameEndReason::ConnectFour,
            duration: 10,
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["payload"]["reason"], "connect_four");
        assert!(value["payload"].get("winner").is_none());
    }
}
