//! WebSocket wire protocol: message enums, error codes, room codes.

pub mod error_codes;
pub mod messages;
pub mod room_codes;

pub use error_codes::ErrorCode;
pub use messages::{
    ClientFrame, ClientMessage, GameStatePayload, GameType, MoveMadePayload, ServerFrame,
    ServerMessage,
};
pub use room_codes::{generate_room_code, normalize_room_code, ROOM_CODE_LENGTH};
