//! Tic-tac-toe, the bundled [`RuleEngine`].

use serde::{Deserialize, Serialize};
use tandem_protocol::{Outcome, Side};

use crate::RuleEngine;

const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// A 3×3 board. Cells are numbered 0..=8, row by row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub cells: [Option<Side>; 9],
    pub turn: Side,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            cells: [None; 9],
            turn: Side::X,
        }
    }
}

impl Board {
    fn winner(&self) -> Option<Side> {
        WINNING_LINES.iter().find_map(|&[a, b, c]| match self.cells[a] {
            Some(side) if self.cells[b] == Some(side) && self.cells[c] == Some(side) => {
                Some(side)
            }
            _ => None,
        })
    }

    fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }
}

/// Classic noughts and crosses. X moves first.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicTacToe;

impl RuleEngine for TicTacToe {
    type State = Board;

    fn init() -> Board {
        Board::default()
    }

    fn turn(state: &Board) -> Side {
        state.turn
    }

    fn validate_move(state: &Board, position: usize, _side: Side) -> Result<(), String> {
        if Self::outcome(state).is_some() {
            return Err("game is over".into());
        }
        match state.cells.get(position) {
            None => Err(format!("position {position} is off the board")),
            Some(Some(_)) => Err(format!("position {position} is occupied")),
            Some(None) => Ok(()),
        }
    }

    fn apply_move(state: &Board, position: usize, side: Side) -> Board {
        let mut next = state.clone();
        next.cells[position] = Some(side);
        // The turn stays put once the game is decided.
        if Self::outcome(&next).is_none() {
            next.turn = side.other();
        }
        next
    }

    fn outcome(state: &Board) -> Option<Outcome> {
        if let Some(side) = state.winner() {
            Some(Outcome::Win { side })
        } else if state.is_full() {
            Some(Outcome::Draw)
        } else {
            None
        }
    }
}
