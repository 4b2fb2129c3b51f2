use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::board::{Board, Color};

pub type GameId = Uuid;

/// Sentinel handle installed as Player2 while a custom room waits for its
/// second participant.
pub const WAITING_PLAYER: &str = "waiting";

/// Prefix identifying synthetic bot participants.
pub const BOT_HANDLE_PREFIX: &str = "bot_";

pub fn is_bot_handle(handle: &str) -> bool {
    handle.starts_with(BOT_HANDLE_PREFIX)
}

/// Session lifecycle state. Transitions are monotone:
/// Waiting -> InProgress -> {Completed, Abandoned}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    InProgress,
    Completed,
    Abandoned,
}

impl GameStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }

    pub fn is_active(self) -> bool {
        self == Self::InProgress
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Why a game ended, as reported in `game_ended` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEndReason {
    ConnectFour,
    Draw,
    Forfeit,
    Disconnect,
    Timeout,
}

/// A single game instance: participants, board, turn, status, timeline.
///
/// Player1 owns Red and moves first; Player2 owns Yellow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub id: GameId,
    pub player1: String,
    pub player2: String,
    pub board: Board,
    pub current_turn: Color,
    pub status: GameStatus,
    pub winner: Option<Color>,
    pub move_count: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Touched on every accepted mutation; drives idle abandonment.
    pub last_activity: DateTime<Utc>,
    /// Set when the session was created as a private room.
    pub room_code: Option<String>,
    pub created_by: Option<String>,
}

impl GameSession {
    pub fn new_pvp(player1: String, player2: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            player1,
            player2,
            board: Board::new(),
            current_turn: Color::Red,
            status: GameStatus::InProgress,
            winner: None,
            move_count: 0,
            started_at: now,
            ended_at: None,
            last_activity: now,
            room_code: None,
            created_by: None,
        }
    }

    /// A private room starts Waiting with the sentinel second player until
    /// someone joins by code.
    pub fn new_custom(creator: String, room_code: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            player1: creator.clone(),
            player2: WAITING_PLAYER.to_string(),
            board: Board::new(),
            current_turn: Color::Red,
            status: GameStatus::Waiting,
            winner: None,
            move_count: 0,
            started_at: now,
            ended_at: None,
            last_activity: now,
            room_code: Some(room_code),
            created_by: Some(creator),
        }
    }

    pub fn is_custom(&self) -> bool {
        self.room_code.is_some()
    }

    pub fn player_for(&self, color: Color) -> &str {
        match color {
            Color::Red => &self.player1,
            Color::Yellow => &self.player2,
        }
    }

    pub fn color_of(&self, handle: &str) -> Option<Color> {
        if handle == self.player1 {
            Some(Color::Red)
        } else if handle == self.player2 {
            Some(Color::Yellow)
        } else {
            None
        }
    }

    pub fn is_participant(&self, handle: &str) -> bool {
        self.color_of(handle).is_some()
    }

    pub fn opponent_of(&self, handle: &str) -> Option<&str> {
        match self.color_of(handle)? {
            Color::Red => Some(&self.player2),
            Color::Yellow => Some(&self.player1),
        }
    }

    pub fn involves_bot(&self) -> bool {
        is_bot_handle(&self.player1) || is_bot_handle(&self.player2)
    }

    /// Seconds from start until `ended_at`, or until now while running.
    pub fn duration_secs(&self) -> i64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0)
    }
}

/// An accepted move, as persisted and echoed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRecord {
    pub id: Uuid,
    pub game_id: GameId,
    pub player: String,
    pub color: Color,
    pub column: usize,
    pub row: usize,
    /// 1-indexed, dense per session.
    pub move_number: u32,
    pub played_at: DateTime<Utc>,
}

/// Per-player win/loss tally. `win_rate` is derived and recomputed whenever
/// `games_played` changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStats {
    pub handle: String,
    pub games_played: u32,
    pub games_won: u32,
    pub win_rate: f64,
    pub updated_at: DateTime<Utc>,
}

impl PlayerStats {
    pub fn new(handle: String) -> Self {
        Self {
            handle,
            games_played: 0,
            games_won: 0,
            win_rate: 0.0,
            updated_at: Utc::now(),
        }
    }

    pub fn record_result(&mut self, won: bool) {
        self.games_played += 1;
        if won {
            self.games_won += 1;
        }
        self.win_rate = if self.games_played > 0 {
            f64::from(self.games_won) / f64::from(self.games_played)
        } else {
            0.0
        };
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pvp_session_starts_in_progress_with_red_turn() {
        let session = GameSession::new_pvp("alice".into(), "bob".into());
        assert_eq!(session.status, GameStatus::InProgress);
        assert_eq!(session.current_turn, Color::Red);
        assert_eq!(session.player_for(Color::Red), "alice");
        assert_eq!(session.player_for(Color::Yellow), "bob");
        assert_eq!(session.color_of("bob"), Some(Color::Yellow));
        assert_eq!(session.color_of("carol"), None);
        assert_eq!(session.opponent_of("alice"), Some("bob"));
    }

    #[test]
    fn custom_session_waits_for_second_player() {
        let session = GameSession::new_custom("alice".into(), "AB23CD45".into());
        assert_eq!(session.status, GameStatus::Waiting);
        assert_eq!(session.player2, WAITING_PLAYER);
        assert!(session.is_custom());
        assert_eq!(session.created_by.as_deref(), Some("alice"));
    }

    #[test]
    fn stats_win_rate_recomputed() {
        let mut stats = PlayerStats::new("alice".into());
        assert_eq!(stats.win_rate, 0.0);
        stats.record_result(true);
        assert_eq!(stats.games_played, 1);
        assert_eq!(stats.games_won, 1);
        assert!((stats.win_rate - 1.0).abs() < f64::EPSILON);
        stats.record_result(false);
        assert!((stats.win_rate - 0.5).abs() < f64::EPSILON);
        assert!(stats.games_won <= stats.games_played);
    }

    #[test]
    fn bot_handles_detected_by_prefix() {
        assert!(is_bot_handle("bot_123456"));
        assert!(!is_bot_handle("alice"));
        let session = GameSession::new_pvp("alice".into(), "bot_424242".into());
        assert!(session.involves_bot());
    }
}
