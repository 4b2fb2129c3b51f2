use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes for structured error frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    InvalidInput,
    InvalidHandle,
    DuplicateHandles,
    InvalidMove,
    NotYourTurn,
    InvalidRoomCode,

    // Lifecycle errors
    GameNotFound,
    GameNotActive,
    GameAlreadyEnded,
    PlayerNotInGame,
    RoomNotFound,
    RoomFull,
    RoomClosed,
    CannotJoinOwnRoom,
    AlreadyInGame,

    // Resource errors
    ConnectionClosed,
    MessageTooLarge,

    // Server errors
    InternalError,
    StorageError,
    ServiceUnavailable,
}

impl ErrorCode {
    /// Human-readable description suitable for direct display.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidInput => "The provided input is invalid or malformed.",
            Self::InvalidHandle => "Player handles must be non-empty.",
            Self::DuplicateHandles => "A game requires two distinct player handles.",
            Self::InvalidMove => "That column is full or out of range.",
            Self::NotYourTurn => "It is not your turn to move.",
            Self::InvalidRoomCode => "The room code is invalid or malformed.",
            Self::GameNotFound => "No game with that identifier exists.",
            Self::GameNotActive => "The game is not currently in progress.",
            Self::GameAlreadyEnded => "The game has already ended.",
            Self::PlayerNotInGame => "You are not a participant in this game.",
            Self::RoomNotFound => "No room with that code exists.",
            Self::RoomFull => "The room already has two players.",
            Self::RoomClosed => "The room is no longer accepting players.",
            Self::CannotJoinOwnRoom => "You cannot join a room you created.",
            Self::AlreadyInGame => "You are already in an active game.",
            Self::ConnectionClosed => "The connection has been closed.",
            Self::MessageTooLarge => "The message exceeds the maximum allowed size.",
            Self::InternalError => "An internal server error occurred. Please try again.",
            Self::StorageError => "A storage operation failed. Please try again.",
            Self::ServiceUnavailable => "The service is temporarily unavailable.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Match the wire representation (SCREAMING_SNAKE_CASE)
        let s = serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"));
        f.write_str(s.trim_matches('"'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::NotYourTurn).unwrap(),
            "\"NOT_YOUR_TURN\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::GameNotFound).unwrap(),
            "\"GAME_NOT_FOUND\""
        );
        assert_eq!(ErrorCode::InvalidMove.to_string(), "INVALID_MOVE");
    }

    #[test]
    fn every_code_has_a_description() {
        for code in [
            ErrorCode::InvalidInput,
            ErrorCode::NotYourTurn,
            ErrorCode::RoomClosed,
            ErrorCode::InternalError,
        ] {
            assert!(!code.description().is_empty());
        }
    }
}
