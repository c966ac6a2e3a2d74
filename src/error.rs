use thiserror::Error;

use crate::solver::Convergence;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("MDP must have at least one state")]
    NoStates,

    #[error("MDP must have at least one action")]
    NoActions,

    #[error("discount factor {gamma} must be within [0, 1]")]
    InvalidDiscount { gamma: f64 },

    #[error("state {state} defines {got} actions, expected {expected}")]
    ActionCountMismatch {
        state: usize,
        expected: usize,
        got: usize,
    },

    #[error("state {state}, action {action}: destination {dest} is outside [0, {num_states})")]
    DestinationOutOfRange {
        state: usize,
        action: usize,
        dest: usize,
        num_states: usize,
    },

    #[error("state {state}, action {action}: probability {probability} of reaching {dest} is not within [0, 1]")]
    InvalidProbability {
        state: usize,
        action: usize,
        dest: usize,
        probability: f64,
    },

    #[error("state {state}, action {action}: reward {reward} is not finite")]
    NonFiniteReward {
        state: usize,
        action: usize,
        reward: f64,
    },

    #[error("state {state}, action {action}: probabilities sum to {sum}, expected 1")]
    DistributionSum { state: usize, action: usize, sum: f64 },

    #[error("table shape mismatch: {message}")]
    TableShape { message: String },

    #[error("tolerance {tolerance} must be positive and finite")]
    InvalidTolerance { tolerance: f64 },

    #[error("iteration cap '{name}' must be positive")]
    InvalidIterationCap { name: &'static str },

    #[error("invalid policy: {message}")]
    InvalidPolicy { message: String },

    #[error("start state {state} is outside [0, {num_states})")]
    InvalidStartState { state: usize, num_states: usize },

    #[error("at least one episode is needed to estimate a value")]
    NoEpisodes,

    #[error("value of state {state} became non-finite after sweep {sweep}")]
    NonFiniteValue { state: usize, sweep: usize },

    #[error("policy evaluation system is singular (discount 1 with a closed recurrent class?)")]
    SingularSystem,

    #[error("did not converge after {iterations} iterations: {reason}")]
    NotConverged {
        iterations: usize,
        reason: Convergence,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
