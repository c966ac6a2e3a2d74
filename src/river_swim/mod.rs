use nalgebra::DMatrix;
use prettytable::{Cell, Row, Table};

use crate::error::Result;
use crate::solver::*;

pub const NUM_STATES: usize = 6;
pub const NUM_ACTIONS: usize = 2;

pub const LEFT: ActionId = 0;
pub const RIGHT: ActionId = 1;

const ACTION_SYMBOLS: [&str; NUM_ACTIONS] = ["L", "R"];

const BANK_REWARD: f64 = 0.005;
const UPSTREAM_REWARD: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Current {
    Weak,
    Medium,
    Strong,
}

impl Current {
    // Probabilities of moving forward, staying and being pushed back when
    // swimming upstream.
    fn upstream_probabilities(self) -> (f64, f64, f64) {
        match self {
            Current::Weak => (0.6, 0.3, 0.1),
            Current::Medium => (0.5, 0.3, 0.2),
            Current::Strong => (0.4, 0.3, 0.3),
        }
    }
}

// The reward does not depend on where the swimmer ends up.
pub fn rewards_table() -> DMatrix<f64> {
    let mut rewards = DMatrix::zeros(NUM_STATES, NUM_ACTIONS);
    rewards[(0, LEFT)] = BANK_REWARD;
    rewards[(NUM_STATES - 1, RIGHT)] = UPSTREAM_REWARD;
    rewards
}

pub fn transitions_table(current: Current) -> Vec<DMatrix<f64>> {
    let mut left = DMatrix::zeros(NUM_STATES, NUM_STATES);
    for s in 0..NUM_STATES {
        left[(s, s.saturating_sub(1))] = 1.0;
    }

    let (forward, stay, back) = current.upstream_probabilities();
    let mut right = DMatrix::zeros(NUM_STATES, NUM_STATES);
    for s in 0..NUM_STATES {
        // Pushing against the bank or the source leaves the swimmer in place.
        right[(s, (s + 1).min(NUM_STATES - 1))] += forward;
        right[(s, s)] += stay;
        right[(s, s.saturating_sub(1))] += back;
    }

    vec![left, right]
}

pub fn new_river_swim_env(current: Current, gamma: f64) -> Result<Mdp> {
    Mdp::from_tables(gamma, &rewards_table(), &transitions_table(current))
}

pub fn print_river_state_values(state_values: &[f64]) {
    let mut table = Table::new();
    table.add_row(Row::new(
        (0..state_values.len())
            .map(|s| Cell::new(&format!("s{}", s)))
            .collect(),
    ));
    table.add_row(Row::new(
        state_values
            .iter()
            .map(|v| Cell::new(&format!("{:.3}", v)))
            .collect(),
    ));
    table.printstd();
}

pub fn print_river_policy(policy: &[ActionId]) {
    let mut table = Table::new();
    table.add_row(Row::new(
        policy
            .iter()
            .map(|&action| Cell::new(action_symbol(action)))
            .collect(),
    ));
    table.printstd();
}

pub fn action_symbol(action: ActionId) -> &'static str {
    ACTION_SYMBOLS.get(action).copied().unwrap_or("?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::policy_iteration::policy_iteration;
    use crate::solver::value_iteration::value_iteration;
    use float_eq::*;

    #[test]
    fn tables_build_a_valid_model() {
        for current in [Current::Weak, Current::Medium, Current::Strong] {
            let mdp = new_river_swim_env(current, 0.5).unwrap();
            assert_eq!(mdp.num_states(), NUM_STATES);
            assert_eq!(mdp.num_actions(), NUM_ACTIONS);

            for matrix in transitions_table(current) {
                for row in matrix.row_iter() {
                    assert_float_eq!(row.sum(), 1.0, abs <= 1e-12);
                }
            }
        }
    }

    #[test]
    fn bank_and_source_rewards() {
        let mdp = new_river_swim_env(Current::Weak, 0.5).unwrap();
        let zero = vec![0.0; NUM_STATES];
        assert_float_eq!(bellman_backup(&mdp, &zero, 0, LEFT), BANK_REWARD, abs <= 1e-15);
        assert_float_eq!(
            bellman_backup(&mdp, &zero, NUM_STATES - 1, RIGHT),
            UPSTREAM_REWARD,
            abs <= 1e-15
        );
        assert_eq!(bellman_backup(&mdp, &zero, 2, RIGHT), 0.0);
    }

    #[test]
    fn swimming_left_is_deterministic() {
        let mdp = new_river_swim_env(Current::Strong, 0.5).unwrap();
        assert_eq!(mdp.action(3, LEFT), &deterministic_action(2, 0.0));
        assert_eq!(mdp.action(0, LEFT), &deterministic_action(0, BANK_REWARD));
    }

    #[test]
    fn far_sighted_swimmer_heads_upstream() {
        let mdp = new_river_swim_env(Current::Weak, 0.9).unwrap();
        let config = SolverConfig::default().with_tolerance(1e-8);
        let solution = value_iteration(&mdp, &config).unwrap();

        assert!(solution.is_converged());
        assert_eq!(solution.policy[NUM_STATES - 1], RIGHT);
        // Upstream states are worth more.
        for s in 1..NUM_STATES {
            assert!(solution.values[s] > solution.values[s - 1]);
        }
    }

    #[test]
    fn solvers_agree_for_every_current() {
        for current in [Current::Weak, Current::Medium, Current::Strong] {
            for gamma in [0.5, 0.9, 0.99] {
                let mdp = new_river_swim_env(current, gamma).unwrap();
                let config = SolverConfig::default().with_tolerance(1e-9);
                let pi = policy_iteration(&mdp, &config).unwrap();
                let vi = value_iteration(&mdp, &config).unwrap();

                assert!(pi.is_converged() && vi.is_converged());
                assert_float_eq!(pi.values, vi.values, abs_all <= 1e-4);
            }
        }
    }
}
