use rand::RngExt;

use crate::game::{Board, Color, BOT_HANDLE_PREFIX};

/// Source of bot moves. The engine treats bots as ordinary players; only the
/// dispatch layer consults a strategy, keyed off the handle prefix.
pub trait BotStrategy: Send + Sync {
    /// Pick a column for `color` on `board`, or `None` when no legal move
    /// exists (full board).
    fn choose_column(&self, board: &Board, color: Color) -> Option<usize>;
}

/// Uniform random legal column. Stands in for the external search
/// collaborator, which is out of scope here.
pub struct RandomBot;

impl BotStrategy for RandomBot {
    fn choose_column(&self, board: &Board, _color: Color) -> Option<usize> {
        let legal = board.legal_columns();
        if legal.is_empty() {
            return None;
        }
        let mut rng = rand::rng();
        Some(legal[rng.random_range(0..legal.len())])
    }
}

/// Synthetic opponent handle: `bot_` plus six random digits.
pub fn generate_bot_handle() -> String {
    let mut rng = rand::rng();
    format!("{BOT_HANDLE_PREFIX}{:06}", rng.random_range(0..1_000_000u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::is_bot_handle;

    #[test]
    fn random_bot_only_picks_legal_columns() {
        let mut board = Board::new();
        for col in 0..6 {
            for _ in 0..crate::game::ROWS {
                let color = if col % 2 == 0 { Color::Red } else { Color::Yellow };
                board.drop_piece(col, color).unwrap();
            }
        }
        // Only column 6 remains
        for _ in 0..16 {
            assert_eq!(RandomBot.choose_column(&board, Color::Yellow), Some(6));
        }
    }

    #[test]
    fn full_board_yields_no_move() {
        let mut board = Board::new();
        for col in 0..crate::game::COLS {
            for row in 0..crate::game::ROWS {
                let color = if (col + 2 * row) % 4 < 2 { Color::Red } else { Color::Yellow };
                board.drop_piece(col, color).unwrap();
            }
        }
        assert_eq!(RandomBot.choose_column(&board, Color::Red), None);
    }

    #[test]
    fn bot_handles_carry_prefix_and_six_digits() {
        let handle = generate_bot_handle();
        assert!(is_bot_handle(&handle));
        assert_eq!(handle.len(), "bot_".len() + 6);
        assert!(handle["bot_".len()..].chars().all(|c| c.is_ascii_digit()));
    }
}
