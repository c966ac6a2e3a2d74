use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{Error, Result};
use crate::solver::*;

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub values: Vec<f64>,
    pub sweeps: usize,
    pub convergence: Convergence,
}

impl Evaluation {
    pub fn is_converged(&self) -> bool {
        self.convergence.is_converged()
    }

    pub fn into_converged(self) -> Result<Vec<f64>> {
        match self.convergence {
            Convergence::Converged => Ok(self.values),
            reason => Err(Error::NotConverged {
                iterations: self.sweeps,
                reason,
            }),
        }
    }
}

// Performs a single iteration to determine the next state-value function.
// Returns new state-value function and a maximum change in state-values.
pub fn evaluate_policy(
    mdp: &Mdp,
    policy: &[ActionId],
    prev_state_values: &[f64],
) -> (Vec<f64>, f64) {
    let new_state_values: Vec<f64> = (0..mdp.num_states())
        .map(|state| bellman_backup(mdp, prev_state_values, state, policy[state]))
        .collect();
    let delta = max_delta(prev_state_values, &new_state_values);

    (new_state_values, delta)
}

pub fn policy_evaluation(
    mdp: &Mdp,
    policy: &[ActionId],
    config: &SolverConfig,
) -> Result<Evaluation> {
    config.validate()?;
    validate_policy(mdp, policy)?;

    let outcome = run_sweeps(mdp.num_states(), config, |state_values| {
        evaluate_policy(mdp, policy, state_values)
    })?;

    if outcome.convergence.is_converged() {
        debug!(sweeps = outcome.sweeps, "policy evaluation converged");
    }

    Ok(Evaluation {
        values: outcome.values,
        sweeps: outcome.sweeps,
        convergence: outcome.convergence,
    })
}

// Solves (I - γ·P_π)·V = r_π. Singular with γ = 1 and a policy that never
// ends the episode.
pub fn exact_policy_evaluation(mdp: &Mdp, policy: &[ActionId]) -> Result<Vec<f64>> {
    validate_policy(mdp, policy)?;

    let num_states = mdp.num_states();
    let mut system = DMatrix::<f64>::identity(num_states, num_states);
    let mut expected_rewards = DVector::<f64>::zeros(num_states);

    for state in 0..num_states {
        for (&dest, destination) in &mdp.action(state, policy[state]).dest_states {
            system[(state, dest)] -= mdp.gamma() * destination.probability;
            expected_rewards[state] += destination.probability * destination.reward;
        }
    }

    let values = system
        .lu()
        .solve(&expected_rewards)
        .ok_or(Error::SingularSystem)?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::SingularSystem);
    }

    Ok(values.iter().copied().collect())
}
