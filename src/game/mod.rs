//! Board rules and game data model.

pub mod board;
pub mod types;

pub use board::{Board, BoardError, Color, COLS, ROWS, WIN_LENGTH};
pub use types::{
    is_bot_handle, GameEndReason, GameId, GameSession, GameStatus, MoveRecord, PlayerStats,
    BOT_HANDLE_PREFIX, WAITING_PLAYER,
};
