use tracing::info;

use crate::error::Result;
use crate::solver::policy_iteration::greedy_policy;
use crate::solver::*;

// Performs a single state value function iteration.
// Returns new state-value function and a maximum change in state-values.
pub fn iterate_state_value(mdp: &Mdp, prev_state_values: &[f64]) -> (Vec<f64>, f64) {
    let new_state_values: Vec<f64> = (0..mdp.num_states())
        .map(|state| {
            (0..mdp.num_actions())
                .map(|action| bellman_backup(mdp, prev_state_values, state, action))
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .collect();
    let delta = max_delta(prev_state_values, &new_state_values);

    (new_state_values, delta)
}

pub fn value_iteration(mdp: &Mdp, config: &SolverConfig) -> Result<Solution> {
    config.validate()?;

    let outcome = run_sweeps(mdp.num_states(), config, |state_values| {
        iterate_state_value(mdp, state_values)
    })?;
    let policy = greedy_policy(mdp, &outcome.values);

    if outcome.convergence.is_converged() {
        info!(sweeps = outcome.sweeps, "value iteration converged");
    }

    Ok(Solution {
        values: outcome.values,
        policy,
        iterations: outcome.sweeps,
        sweeps: outcome.sweeps,
        convergence: outcome.convergence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::solver::tests::*;
    use float_eq::*;

    #[test]
    fn stay_or_go() {
        let mdp = stay_or_go_mdp(0.9);
        let config = SolverConfig::default().with_tolerance(1e-9);
        let solution = value_iteration(&mdp, &config).unwrap();

        assert!(solution.is_converged());
        assert_float_eq!(solution.values[0], 10.0, abs <= 1e-7);
        assert_float_eq!(solution.values[1], 0.0, abs <= 1e-12);
        assert_eq!(solution.policy[0], STAY);
        assert_eq!(solution.iterations, solution.sweeps);
    }

    #[test]
    fn single_state_converges_to_geometric_sum() {
        for (reward, gamma) in [(1.0, 0.5), (-2.0, 0.9), (3.5, 0.0)] {
            let mdp = Mdp::new(
                1,
                gamma,
                vec![StateActions {
                    actions: vec![deterministic_action(0, reward)],
                }],
            )
            .unwrap();
            let config = SolverConfig::default().with_tolerance(1e-10);
            let solution = value_iteration(&mdp, &config).unwrap();

            assert_float_eq!(
                solution.values[0],
                reward / (1.0 - gamma),
                abs <= 1e-8
            );
            assert_eq!(solution.policy, vec![0]);
        }
    }

    #[test]
    fn sweep_takes_the_best_action() {
        let mdp = stay_or_go_mdp(0.5);
        let (values, delta) = iterate_state_value(&mdp, &[4.0, 2.0]);
        // max(1 + 0.5 * 4, 0 + 0.5 * 2), 0 + 0.5 * 2
        assert_eq!(values, vec![3.0, 1.0]);
        assert_eq!(delta, 1.0);
    }

    #[test]
    fn sweep_limit_is_reported() {
        let mdp = stay_or_go_mdp(1.0);
        let config = SolverConfig::default().with_max_sweeps(10);
        let solution = value_iteration(&mdp, &config).unwrap();

        assert_eq!(solution.convergence, Convergence::SweepLimit { delta: 1.0 });
        assert_eq!(solution.values, vec![10.0, 0.0]);
        assert_eq!(solution.policy, vec![STAY, STAY]);
    }

    #[test]
    fn invalid_config_is_rejected_before_iterating() {
        let mdp = stay_or_go_mdp(0.9);
        let config = SolverConfig::default().with_tolerance(0.0);
        assert_eq!(
            value_iteration(&mdp, &config),
            Err(Error::InvalidTolerance { tolerance: 0.0 })
        );
    }
}
