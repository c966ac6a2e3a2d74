pub mod error;
pub mod gridworld;
pub mod river_swim;
pub mod solver;

pub use error::{Error, Result};
pub use solver::evaluation::{exact_policy_evaluation, policy_evaluation, Evaluation};
pub use solver::policy_iteration::{greedy_policy, policy_improvement, policy_iteration, Improvement};
pub use solver::simulation::{estimate_state_value, simulate_episode};
pub use solver::value_iteration::value_iteration;
pub use solver::{
    action_values, bellman_backup, deterministic_action, terminal_action, ActionDestination,
    ActionId, ActionResult, Convergence, Mdp, Solution, SolverConfig, StateActions, StateId,
};
