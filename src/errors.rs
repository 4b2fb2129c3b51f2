use thiserror::Error;

use crate::game::GameId;
use crate::protocol::ErrorCode;

/// Validation and lifecycle errors surfaced by the session engine.
///
/// Every variant maps onto a stable wire [`ErrorCode`]; infrastructure
/// failures are wrapped so the handler can log the cause while the client
/// only sees the code.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("player handle must not be empty")]
    EmptyHandle,

    #[error("both players cannot share the handle `{0}`")]
    DuplicateHandles(String),

    #[error("game {0} not found")]
    GameNotFound(GameId),

    #[error("room `{0}` not found")]
    RoomNotFound(String),

    #[error("room `{0}` already has two players")]
    RoomFull(String),

    #[error("room `{0}` is no longer accepting players")]
    RoomClosed(String),

    #[error("creator cannot join their own room `{0}`")]
    SelfJoin(String),

    #[error("failed to generate a unique room code after {attempts} attempts")]
    RoomCodeExhausted { attempts: u32 },

    #[error("game {0} is not in progress")]
    GameNotActive(GameId),

    #[error("it is not `{handle}`'s turn in game {game_id}")]
    WrongTurn { game_id: GameId, handle: String },

    #[error("illegal move in column {column}")]
    IllegalMove { column: usize },

    #[error("`{handle}` is not a participant of game {game_id}")]
    PlayerNotInGame { game_id: GameId, handle: String },

    #[error("`{0}` is already in an active game")]
    AlreadyInGame(String),

    #[error("connection is already bound to `{bound}`")]
    ConnectionBound { bound: String },

    #[error("storage operation failed: {0}")]
    Storage(#[source] anyhow::Error),
}

impl GameError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyHandle => ErrorCode::InvalidHandle,
            Self::DuplicateHandles(_) => ErrorCode::DuplicateHandles,
            Self::GameNotFound(_) => ErrorCode::GameNotFound,
            Self::RoomNotFound(_) => ErrorCode::RoomNotFound,
            Self::RoomFull(_) => ErrorCode::RoomFull,
            Self::RoomClosed(_) => ErrorCode::RoomClosed,
            Self::SelfJoin(_) => ErrorCode::CannotJoinOwnRoom,
            Self::RoomCodeExhausted { .. } => ErrorCode::InternalError,
            Self::GameNotActive(_) => ErrorCode::GameNotActive,
            Self::WrongTurn { .. } => ErrorCode::NotYourTurn,
            Self::IllegalMove { .. } => ErrorCode::InvalidMove,
            Self::PlayerNotInGame { .. } => ErrorCode::PlayerNotInGame,
            Self::AlreadyInGame(_) => ErrorCode::AlreadyInGame,
            Self::ConnectionBound { .. } => ErrorCode::InvalidInput,
            Self::Storage(_) => ErrorCode::StorageError,
        }
    }
}
