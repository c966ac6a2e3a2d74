use std::collections::BTreeMap;
use std::fmt;

use nalgebra::DMatrix;
use tracing::{trace, warn};

use crate::error::{Error, Result};

pub mod config;
pub mod evaluation;
pub mod policy_iteration;
pub mod simulation;
pub mod value_iteration;

pub use config::SolverConfig;

pub type StateId = usize;
pub type ActionId = usize;

// Non-empty destination distributions must sum to 1 within this margin.
const PROBABILITY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ActionDestination {
    pub probability: f64,
    pub reward: f64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ActionResult {
    // Possible destination states with associated probabilities and rewards.
    // Probabilities sum to 1. Empty if taking the action ends the episode.
    pub dest_states: BTreeMap<StateId, ActionDestination>,
}

impl ActionResult {
    pub fn is_terminal(&self) -> bool {
        self.dest_states.is_empty()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct StateActions {
    // Indexed by action id. Every state has the same number of actions.
    pub actions: Vec<ActionResult>,
}

impl StateActions {
    pub fn is_terminal(&self) -> bool {
        self.actions.iter().all(ActionResult::is_terminal)
    }
}

// Rewards are attached to (state, action, next state). Validated on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Mdp {
    num_actions: usize,
    gamma: f64,
    states: Vec<StateActions>,
}

impl Mdp {
    pub fn new(num_actions: usize, gamma: f64, states: Vec<StateActions>) -> Result<Mdp> {
        if states.is_empty() {
            return Err(Error::NoStates);
        }
        if num_actions == 0 {
            return Err(Error::NoActions);
        }
        if !(0.0..=1.0).contains(&gamma) {
            return Err(Error::InvalidDiscount { gamma });
        }

        let num_states = states.len();
        for (state, state_actions) in states.iter().enumerate() {
            if state_actions.actions.len() != num_actions {
                return Err(Error::ActionCountMismatch {
                    state,
                    expected: num_actions,
                    got: state_actions.actions.len(),
                });
            }
            for (action, action_result) in state_actions.actions.iter().enumerate() {
                validate_action(state, action, action_result, num_states)?;
            }
        }

        Ok(Mdp {
            num_actions,
            gamma,
            states,
        })
    }

    // rewards[(s, a)] is paid whatever the outcome, transitions[a][(s, s')] is
    // the probability of moving from s to s' under a.
    pub fn from_tables(
        gamma: f64,
        rewards: &DMatrix<f64>,
        transitions: &[DMatrix<f64>],
    ) -> Result<Mdp> {
        let (num_states, num_actions) = rewards.shape();
        if transitions.len() != num_actions {
            return Err(Error::TableShape {
                message: format!(
                    "rewards table has {} actions but {} transition matrices were given",
                    num_actions,
                    transitions.len()
                ),
            });
        }
        if let Some((action, matrix)) = transitions
            .iter()
            .enumerate()
            .find(|(_, m)| m.shape() != (num_states, num_states))
        {
            return Err(Error::TableShape {
                message: format!(
                    "transition matrix for action {} is {}x{}, expected {}x{}",
                    action,
                    matrix.nrows(),
                    matrix.ncols(),
                    num_states,
                    num_states
                ),
            });
        }
        // Every reward is checked, including those of rows without transitions.
        if let Some(index) = rewards.iter().position(|r| !r.is_finite()) {
            // Column-major storage.
            let (state, action) = (index % num_states, index / num_states);
            return Err(Error::NonFiniteReward {
                state,
                action,
                reward: rewards[(state, action)],
            });
        }

        let states = (0..num_states)
            .map(|state| StateActions {
                actions: (0..num_actions)
                    .map(|action| {
                        let reward = rewards[(state, action)];
                        let dest_states = transitions[action]
                            .row(state)
                            .iter()
                            .enumerate()
                            .filter(|(_, probability)| **probability != 0.0)
                            .map(|(dest, probability)| {
                                (
                                    dest,
                                    ActionDestination {
                                        probability: *probability,
                                        reward,
                                    },
                                )
                            })
                            .collect();
                        ActionResult { dest_states }
                    })
                    .collect(),
            })
            .collect();

        Mdp::new(num_actions, gamma, states)
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn state(&self, state: StateId) -> &StateActions {
        &self.states[state]
    }

    pub fn action(&self, state: StateId, action: ActionId) -> &ActionResult {
        &self.states[state].actions[action]
    }
}

fn validate_action(
    state: StateId,
    action: ActionId,
    action_result: &ActionResult,
    num_states: usize,
) -> Result<()> {
    for (&dest, destination) in &action_result.dest_states {
        if dest >= num_states {
            return Err(Error::DestinationOutOfRange {
                state,
                action,
                dest,
                num_states,
            });
        }
        if !(0.0..=1.0).contains(&destination.probability) {
            return Err(Error::InvalidProbability {
                state,
                action,
                dest,
                probability: destination.probability,
            });
        }
        if !destination.reward.is_finite() {
            return Err(Error::NonFiniteReward {
                state,
                action,
                reward: destination.reward,
            });
        }
    }

    if action_result.is_terminal() {
        return Ok(());
    }

    let sum: f64 = action_result
        .dest_states
        .values()
        .map(|dest| dest.probability)
        .sum();
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(Error::DistributionSum { state, action, sum });
    }
    Ok(())
}

pub fn deterministic_action(dest_state: StateId, reward: f64) -> ActionResult {
    let mut dest_states = BTreeMap::new();
    dest_states.insert(
        dest_state,
        ActionDestination {
            probability: 1.0,
            reward,
        },
    );
    ActionResult { dest_states }
}

pub fn terminal_action() -> ActionResult {
    ActionResult::default()
}

// Returns the action value given the action results and state value function.
fn get_action_value(action: &ActionResult, state_values: &[f64], discount: f64) -> f64 {
    action
        .dest_states
        .iter()
        .map(|(&state_id, dest)| {
            dest.probability * (dest.reward + discount * state_values[state_id])
        })
        .sum()
}

// Q(s, a) = Σ P(s'|s, a) · (R(s, a, s') + γ · V(s')). Empty support gives 0.
pub fn bellman_backup(mdp: &Mdp, values: &[f64], state: StateId, action: ActionId) -> f64 {
    debug_assert_eq!(values.len(), mdp.num_states());
    get_action_value(mdp.action(state, action), values, mdp.gamma())
}

pub fn action_values(mdp: &Mdp, values: &[f64]) -> DMatrix<f64> {
    DMatrix::from_fn(mdp.num_states(), mdp.num_actions(), |state, action| {
        bellman_backup(mdp, values, state, action)
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Convergence {
    Converged,
    // The sweep cap was reached; `delta` is the change made by the last sweep.
    SweepLimit { delta: f64 },
    // Policy iteration ran out of rounds with `changed` states still switching.
    PolicyLimit { changed: usize },
}

impl Convergence {
    pub fn is_converged(&self) -> bool {
        matches!(self, Convergence::Converged)
    }
}

impl fmt::Display for Convergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Convergence::Converged => write!(f, "converged"),
            Convergence::SweepLimit { delta } => {
                write!(f, "sweep limit reached, last delta {:e}", delta)
            }
            Convergence::PolicyLimit { changed } => write!(
                f,
                "policy iteration limit reached, {} states still changing",
                changed
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub values: Vec<f64>,
    pub policy: Vec<ActionId>,
    // Evaluate/improve rounds for policy iteration, sweeps for value iteration.
    pub iterations: usize,
    pub sweeps: usize,
    pub convergence: Convergence,
}

impl Solution {
    pub fn is_converged(&self) -> bool {
        self.convergence.is_converged()
    }

    pub fn into_converged(self) -> Result<Solution> {
        match self.convergence {
            Convergence::Converged => Ok(self),
            reason => Err(Error::NotConverged {
                iterations: self.iterations,
                reason,
            }),
        }
    }
}

pub(crate) fn validate_policy(mdp: &Mdp, policy: &[ActionId]) -> Result<()> {
    if policy.len() != mdp.num_states() {
        return Err(Error::InvalidPolicy {
            message: format!(
                "policy has {} entries, MDP has {} states",
                policy.len(),
                mdp.num_states()
            ),
        });
    }
    if let Some((state, action)) = policy
        .iter()
        .enumerate()
        .find(|&(_, &action)| action >= mdp.num_actions())
    {
        return Err(Error::InvalidPolicy {
            message: format!(
                "state {} selects action {}, MDP has {} actions",
                state,
                action,
                mdp.num_actions()
            ),
        });
    }
    Ok(())
}

pub(crate) fn max_delta(prev_state_values: &[f64], new_state_values: &[f64]) -> f64 {
    prev_state_values
        .iter()
        .zip(new_state_values)
        .map(|(prev, new)| (new - prev).abs())
        .fold(0.0, f64::max)
}

pub(crate) struct SweepOutcome {
    pub values: Vec<f64>,
    pub sweeps: usize,
    pub convergence: Convergence,
}

// Repeats synchronous sweeps starting from an all-zero value function until the
// max-norm change drops below the tolerance or the sweep cap is reached.
// Every sweep reads the complete previous value function and returns a fresh one.
pub(crate) fn run_sweeps<F>(
    num_states: usize,
    config: &SolverConfig,
    mut sweep: F,
) -> Result<SweepOutcome>
where
    F: FnMut(&[f64]) -> (Vec<f64>, f64),
{
    let mut state_values = vec![0.0; num_states];
    let mut delta = f64::INFINITY;

    for sweep_index in 1..=config.max_sweeps {
        let (new_state_values, new_delta) = sweep(&state_values);

        if let Some(state) = new_state_values.iter().position(|v| !v.is_finite()) {
            return Err(Error::NonFiniteValue {
                state,
                sweep: sweep_index,
            });
        }

        state_values = new_state_values;
        delta = new_delta;
        trace!(sweep = sweep_index, delta, "sweep finished");

        if delta < config.tolerance {
            return Ok(SweepOutcome {
                values: state_values,
                sweeps: sweep_index,
                convergence: Convergence::Converged,
            });
        }
    }

    warn!(
        sweeps = config.max_sweeps,
        delta,
        tolerance = config.tolerance,
        "sweep limit reached before convergence"
    );
    Ok(SweepOutcome {
        values: state_values,
        sweeps: config.max_sweeps,
        convergence: Convergence::SweepLimit { delta },
    })
}
