use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Board height in rows. Row 0 is the bottom row.
pub const ROWS: usize = 6;
/// Board width in columns.
pub const COLS: usize = 7;
/// Run length required to win.
pub const WIN_LENGTH: usize = 4;

/// Disc color. Red always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Yellow,
}

impl Color {
    pub fn opponent(self) -> Self {
        match self {
            Self::Red => Self::Yellow,
            Self::Yellow => Self::Red,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Yellow => "yellow",
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("column {0} is out of range")]
    ColumnOutOfRange(usize),
    #[error("column {0} is full")]
    ColumnFull(usize),
}

/// 6x7 grid plus a per-column height vector.
///
/// The height vector makes legality and the drop row O(1): `heights[c]`
/// always equals the number of filled cells in column `c`, and every cell at
/// or above `heights[c]` in that column is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: [[Option<Color>; COLS]; ROWS],
    heights: [u8; COLS],
    last_move: Option<(usize, usize)>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            cells: [[None; COLS]; ROWS],
            heights: [0; COLS],
            last_move: None,
        }
    }

    /// A column is legal when it exists and has an empty cell left.
    pub fn is_legal(&self, column: usize) -> bool {
        column < COLS && (self.heights[column] as usize) < ROWS
    }

    /// Drop a disc into `column`, returning the row it landed in.
    pub fn drop_piece(&mut self, column: usize, color: Color) -> Result<usize, BoardError> {
        if column >= COLS {
            return Err(BoardError::ColumnOutOfRange(column));
        }
        let row = self.heights[column] as usize;
        if row >= ROWS {
            return Err(BoardError::ColumnFull(column));
        }

        self.cells[row][column] = Some(color);
        self.heights[column] += 1;
        self.last_move = Some((row, column));
        Ok(row)
    }

    /// Check whether the disc most recently placed at `(row, column)`
    /// completes a run of four.
    ///
    /// Any new four-in-a-row must pass through the last move, so only the
    /// four lines through that cell are scanned: at most 4 scans of up to 7
    /// cells each, independent of how full the board is.
    pub fn detect_win(&self, row: usize, column: usize, color: Color) -> bool {
        const DIRECTIONS: [(isize, isize); 4] = [
            (0, 1),  // horizontal
            (1, 0),  // vertical
            (1, 1),  // diagonal /
            (1, -1), // diagonal \
        ];

        for (dr, dc) in DIRECTIONS {
            let mut run = 1usize;
            run += self.count_from(row, column, dr, dc, color);
            run += self.count_from(row, column, -dr, -dc, color);
            if run >= WIN_LENGTH {
                return true;
            }
        }
        false
    }

    /// Count consecutive `color` cells walking from `(row, col)` in direction
    /// `(dr, dc)`, excluding the anchor itself.
    fn count_from(&self, row: usize, col: usize, dr: isize, dc: isize, color: Color) -> usize {
        let mut count = 0;
        let mut r = row as isize + dr;
        let mut c = col as isize + dc;
        while (0..ROWS as isize).contains(&r)
            && (0..COLS as isize).contains(&c)
            && self.cells[r as usize][c as usize] == Some(color)
        {
            count += 1;
            r += dr;
            c += dc;
        }
        count
    }

    pub fn is_full(&self) -> bool {
        self.heights.iter().all(|&h| h as usize == ROWS)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<Color> {
        if row < ROWS && column < COLS {
            self.cells[row][column]
        } else {
            None
        }
    }

    pub fn column_height(&self, column: usize) -> usize {
        if column < COLS {
            self.heights[column] as usize
        } else {
            0
        }
    }

    pub fn last_move(&self) -> Option<(usize, usize)> {
        self.last_move
    }

    /// Columns that still accept a disc.
    pub fn legal_columns(&self) -> Vec<usize> {
        (0..COLS).filter(|&c| self.is_legal(c)).collect()
    }

    /// Wire representation: rows bottom-up, each cell a color string or null.
    pub fn to_rows(&self) -> Vec<Vec<Option<String>>> {
        self.cells
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map(|c| c.as_str().to_string()))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn drop_lands_at_column_height() {
        let mut board = Board::new();
        assert_eq!(board.drop_piece(3, Color::Red), Ok(0));
        assert_eq!(board.drop_piece(3, Color::Yellow), Ok(1));
        assert_eq!(board.drop_piece(3, Color::Red), Ok(2));
        assert_eq!(board.column_height(3), 3);
        assert_eq!(board.cell(0, 3), Some(Color::Red));
        assert_eq!(board.cell(1, 3), Some(Color::Yellow));
        assert_eq!(board.last_move(), Some((2, 3)));
    }

    #[test]
    fn out_of_range_columns_rejected() {
        let mut board = Board::new();
        assert_eq!(
            board.drop_piece(7, Color::Red),
            Err(BoardError::ColumnOutOfRange(7))
        );
        assert!(!board.is_legal(7));
        // usize cannot be negative; -1 arrives as a deserialization failure
        // upstream, so the kernel only sees the high boundary.
        assert!(!board.is_legal(usize::MAX));
    }

    #[test]
    fn full_column_rejected() {
        let mut board = Board::new();
        for i in 0..ROWS {
            let color = if i % 2 == 0 { Color::Red } else { Color::Yellow };
            board.drop_piece(0, color).unwrap();
        }
        assert!(!board.is_legal(0));
        assert_eq!(board.drop_piece(0, Color::Red), Err(BoardError::ColumnFull(0)));
    }

    #[test]
    fn horizontal_win_detected() {
        let mut board = Board::new();
        for col in 0..3 {
            board.drop_piece(col, Color::Red).unwrap();
            board.drop_piece(col, Color::Yellow).unwrap();
        }
        let row = board.drop_piece(3, Color::Red).unwrap();
        assert!(board.detect_win(row, 3, Color::Red));
        assert!(!board.detect_win(row, 3, Color::Yellow));
    }

    #[test]
    fn vertical_win_detected() {
        let mut board = Board::new();
        for _ in 0..3 {
            board.drop_piece(2, Color::Yellow).unwrap();
        }
        let row = board.drop_piece(2, Color::Yellow).unwrap();
        assert!(board.detect_win(row, 2, Color::Yellow));
    }

    #[test]
    fn rising_diagonal_win_detected() {
        let mut board = Board::new();
        // Stairs: column c needs c filler discs below the red disc.
        for col in 0..4 {
            for _ in 0..col {
                board.drop_piece(col, Color::Yellow).unwrap();
            }
            let row = board.drop_piece(col, Color::Red).unwrap();
            assert_eq!(row, col);
        }
        assert!(board.detect_win(3, 3, Color::Red));
    }

    #[test]
    fn falling_diagonal_win_detected() {
        let mut board = Board::new();
        for col in 0..4 {
            for _ in 0..(3 - col) {
                board.drop_piece(col, Color::Yellow).unwrap();
            }
            board.drop_piece(col, Color::Red).unwrap();
        }
        assert!(board.detect_win(0, 3, Color::Red));
    }

    #[test]
    fn three_in_a_row_is_not_a_win() {
        let mut board = Board::new();
        for col in 0..3 {
            board.drop_piece(col, Color::Red).unwrap();
        }
        assert!(!board.detect_win(0, 2, Color::Red));
    }

    #[test]
    fn win_through_middle_of_run() {
        // Fill R _ R R then drop into the gap: the anchor sits inside the run.
        let mut board = Board::new();
        board.drop_piece(0, Color::Red).unwrap();
        board.drop_piece(2, Color::Red).unwrap();
        board.drop_piece(3, Color::Red).unwrap();
        let row = board.drop_piece(1, Color::Red).unwrap();
        assert!(board.detect_win(row, 1, Color::Red));
    }

    #[test]
    fn draw_board_is_full_without_win() {
        // red iff (c + 2r) % 4 < 2 caps every horizontal, vertical, and
        // diagonal run at two cells.
        let mut board = Board::new();
        for col in 0..COLS {
            for row in 0..ROWS {
                let color = if (col + 2 * row) % 4 < 2 { Color::Red } else { Color::Yellow };
                let landed = board.drop_piece(col, color).unwrap();
                assert_eq!(landed, row);
                assert!(!board.detect_win(landed, col, color));
            }
        }
        assert!(board.is_full());
    }

    #[test]
    fn wire_rows_are_bottom_up() {
        let mut board = Board::new();
        board.drop_piece(6, Color::Yellow).unwrap();
        let rows = board.to_rows();
        assert_eq!(rows.len(), ROWS);
        assert_eq!(rows[0][6].as_deref(), Some("yellow"));
        assert_eq!(rows[1][6], None);
    }

    proptest! {
        /// Heights always mirror the filled cells, and every accepted drop
        /// lands exactly at the prior height.
        #[test]
        fn heights_track_cells(columns in proptest::collection::vec(0usize..COLS, 0..64)) {
            let mut board = Board::new();
            let mut turn = Color::Red;
            for col in columns {
                let before = board.column_height(col);
                match board.drop_piece(col, turn) {
                    Ok(row) => {
                        prop_assert_eq!(row, before);
                        prop_assert_eq!(board.column_height(col), before + 1);
                        turn = turn.opponent();
                    }
                    Err(_) => prop_assert_eq!(before, ROWS),
                }
            }
            for col in 0..COLS {
                let filled = (0..ROWS).filter(|&r| board.cell(r, col).is_some()).count();
                prop_assert_eq!(filled, board.column_height(col));
                for row in board.column_height(col)..ROWS {
                    prop_assert!(board.cell(row, col).is_none());
                }
            }
        }
    }
}
