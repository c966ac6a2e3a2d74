use prettytable::{Cell, Row, Table};

use crate::error::Result;
use crate::solver::*;

pub const UP: ActionId = 0;
pub const DOWN: ActionId = 1;
pub const LEFT: ActionId = 2;
pub const RIGHT: ActionId = 3;

const ACTION_SYMBOLS: [&str; 4] = ["↑", "↓", "←", "→"];

const STEP_REWARD: f64 = -1.0;

pub fn new_state_id(row: usize, col: usize, cols: usize) -> StateId {
    row * cols + col
}

fn is_final(row: usize, col: usize, rows: usize, cols: usize) -> bool {
    (row == 0 && col == 0) || (row == rows - 1 && col == cols - 1)
}

// Moves into a wall leave the agent in place.
pub fn new_grid_env(rows: usize, cols: usize, gamma: f64) -> Result<Mdp> {
    let mut states = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let actions = if is_final(row, col, rows, cols) {
                vec![terminal_action(); ACTION_SYMBOLS.len()]
            } else {
                vec![
                    deterministic_action(
                        new_state_id(row.saturating_sub(1), col, cols),
                        STEP_REWARD,
                    ),
                    deterministic_action(
                        new_state_id((row + 1).min(rows - 1), col, cols),
                        STEP_REWARD,
                    ),
                    deterministic_action(
                        new_state_id(row, col.saturating_sub(1), cols),
                        STEP_REWARD,
                    ),
                    deterministic_action(
                        new_state_id(row, (col + 1).min(cols - 1), cols),
                        STEP_REWARD,
                    ),
                ]
            };

            states.push(StateActions { actions });
        }
    }

    Mdp::new(ACTION_SYMBOLS.len(), gamma, states)
}

pub fn print_grid_state_values(state_values: &[f64], rows: usize, cols: usize) {
    let mut table = Table::new();
    for r in 0..rows {
        let mut cells = Vec::new();
        for c in 0..cols {
            let value = state_values.get(new_state_id(r, c, cols)).unwrap_or(&0.0);
            cells.push(Cell::new(format!("{:.2}", value).as_ref()));
        }
        table.add_row(Row::new(cells));
    }
    table.printstd();
}

pub fn print_grid_policy(mdp: &Mdp, policy: &[ActionId], rows: usize, cols: usize) {
    let mut table = Table::new();
    for r in 0..rows {
        let mut cells = Vec::new();
        for c in 0..cols {
            let state_id = new_state_id(r, c, cols);
            let symbol = if mdp.state(state_id).is_terminal() {
                " "
            } else {
                action_symbol(policy[state_id])
            };

            cells.push(Cell::new(symbol));
        }
        table.add_row(Row::new(cells));
    }
    table.printstd();
}

pub fn action_symbol(action: ActionId) -> &'static str {
    ACTION_SYMBOLS.get(action).copied().unwrap_or("?")
}
