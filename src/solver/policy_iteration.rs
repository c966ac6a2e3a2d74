use tracing::{debug, info, warn};

use crate::error::Result;
use crate::solver::evaluation::policy_evaluation;
use crate::solver::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Improvement {
    pub policy: Vec<ActionId>,
    // True iff `policy` equals the policy that was improved upon.
    pub stable: bool,
}

// Picks the action with the highest backup. Ties go to the lowest action id.
fn greedy_action(mdp: &Mdp, state_values: &[f64], state: StateId) -> ActionId {
    let mut best_action = 0;
    let mut best_value = f64::NEG_INFINITY;
    for action in 0..mdp.num_actions() {
        let value = bellman_backup(mdp, state_values, state, action);
        if value > best_value {
            best_value = value;
            best_action = action;
        }
    }
    best_action
}

pub fn greedy_policy(mdp: &Mdp, state_values: &[f64]) -> Vec<ActionId> {
    (0..mdp.num_states())
        .map(|state| greedy_action(mdp, state_values, state))
        .collect()
}

pub fn policy_improvement(mdp: &Mdp, state_values: &[f64], policy: &[ActionId]) -> Improvement {
    let new_policy = greedy_policy(mdp, state_values);
    let stable = new_policy == policy;

    Improvement {
        policy: new_policy,
        stable,
    }
}

// Starts from the policy that takes action 0 everywhere. The returned values
// always belong to the returned policy. A capped evaluation in any round
// leaves its SweepLimit on the solution even if later rounds converge.
pub fn policy_iteration(mdp: &Mdp, config: &SolverConfig) -> Result<Solution> {
    config.validate()?;

    let mut policy = vec![0; mdp.num_states()];
    let mut sweeps = 0;
    let mut capped = None;
    let mut round = 0;

    let (values, changed) = loop {
        round += 1;
        let evaluation = policy_evaluation(mdp, &policy, config)?;
        sweeps += evaluation.sweeps;
        if !evaluation.is_converged() {
            capped = Some(evaluation.convergence);
        }

        let improvement = policy_improvement(mdp, &evaluation.values, &policy);
        if improvement.stable {
            let convergence = capped.unwrap_or(Convergence::Converged);
            if convergence.is_converged() {
                info!(rounds = round, sweeps, "policy iteration converged");
            } else {
                warn!(
                    rounds = round,
                    sweeps,
                    %convergence,
                    "policy stabilized on capped evaluations"
                );
            }
            return Ok(Solution {
                values: evaluation.values,
                policy,
                iterations: round,
                sweeps,
                convergence,
            });
        }

        let changed = policy
            .iter()
            .zip(&improvement.policy)
            .filter(|(old, new)| old != new)
            .count();
        debug!(round, changed, "policy improved");

        if round >= config.max_policy_iterations {
            break (evaluation.values, changed);
        }
        policy = improvement.policy;
    };

    warn!(
        rounds = round,
        changed, "policy iteration limit reached before the policy stabilized"
    );
    Ok(Solution {
        values,
        policy,
        iterations: round,
        sweeps,
        convergence: Convergence::PolicyLimit { changed },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::tests::*;
    use float_eq::*;

    #[test]
    fn improvement_is_stable_iff_policy_unchanged() {
        let mdp = stay_or_go_mdp(0.9);
        let values = [10.0, 0.0];

        let improvement = policy_improvement(&mdp, &values, &[STAY, STAY]);
        assert_eq!(improvement.policy, vec![STAY, STAY]);
        assert!(improvement.stable);

        let improvement = policy_improvement(&mdp, &values, &[GO, STAY]);
        assert_eq!(improvement.policy, vec![STAY, STAY]);
        assert!(!improvement.stable);
    }

    #[test]
    fn ties_go_to_the_lowest_action() {
        let mdp = stay_or_go_mdp(0.9);
        // In state 1 both actions lead to the same place with the same reward.
        assert_eq!(greedy_policy(&mdp, &[0.0, 0.0])[1], STAY);

        let mdp = Mdp::new(
            3,
            0.5,
            vec![StateActions {
                actions: vec![
                    deterministic_action(0, 1.0),
                    deterministic_action(0, 2.0),
                    deterministic_action(0, 2.0),
                ],
            }],
        )
        .unwrap();
        assert_eq!(greedy_policy(&mdp, &[0.0]), vec![1]);
    }

    #[test]
    fn finds_staying_optimal() {
        let mdp = stay_or_go_mdp(0.9);
        let config = SolverConfig::default().with_tolerance(1e-9);
        let solution = policy_iteration(&mdp, &config).unwrap();

        assert!(solution.is_converged());
        assert_eq!(solution.policy, vec![STAY, STAY]);
        assert_float_eq!(solution.values, vec![10.0, 0.0], abs_all <= 1e-7);
        // Action 0 is already optimal, so the first round is stable.
        assert_eq!(solution.iterations, 1);
    }

    #[test]
    fn switches_away_from_a_bad_initial_policy() {
        // Same chain, but staying costs 1 and going is free.
        let mdp = Mdp::new(
            2,
            0.9,
            vec![
                StateActions {
                    actions: vec![deterministic_action(0, -1.0), deterministic_action(1, 0.0)],
                },
                StateActions {
                    actions: vec![deterministic_action(1, 0.0), deterministic_action(1, 0.0)],
                },
            ],
        )
        .unwrap();

        let solution = policy_iteration(&mdp, &SolverConfig::default()).unwrap();
        assert!(solution.is_converged());
        assert_eq!(solution.policy, vec![GO, STAY]);
        assert_eq!(solution.values, vec![0.0, 0.0]);
        assert_eq!(solution.iterations, 2);
    }

    #[test]
    fn round_limit_returns_the_last_evaluated_pair() {
        let mdp = Mdp::new(
            2,
            0.9,
            vec![
                StateActions {
                    actions: vec![deterministic_action(0, -1.0), deterministic_action(1, 0.0)],
                },
                StateActions {
                    actions: vec![deterministic_action(1, 0.0), deterministic_action(1, 0.0)],
                },
            ],
        )
        .unwrap();

        let config = SolverConfig::default()
            .with_tolerance(1e-9)
            .with_max_policy_iterations(1);
        let solution = policy_iteration(&mdp, &config).unwrap();

        assert_eq!(solution.convergence, Convergence::PolicyLimit { changed: 1 });
        assert_eq!(solution.policy, vec![STAY, STAY]);
        assert_float_eq!(solution.values, vec![-10.0, 0.0], abs_all <= 1e-7);
        assert!(solution.into_converged().is_err());
    }

    #[test]
    fn capped_first_evaluation_taints_a_converged_second_round() {
        let mdp = Mdp::new(
            2,
            0.9,
            vec![
                StateActions {
                    actions: vec![deterministic_action(0, -1.0), deterministic_action(1, 0.0)],
                },
                StateActions {
                    actions: vec![deterministic_action(1, 0.0), deterministic_action(1, 0.0)],
                },
            ],
        )
        .unwrap();
        let config = SolverConfig::default()
            .with_tolerance(1e-9)
            .with_max_sweeps(5);

        // Staying everywhere needs far more than 5 sweeps.
        let first = policy_evaluation(&mdp, &[STAY, STAY], &config).unwrap();
        assert!(!first.is_converged());
        // Going is worth 0 after a single sweep.
        let second = policy_evaluation(&mdp, &[GO, STAY], &config).unwrap();
        assert!(second.is_converged());

        let solution = policy_iteration(&mdp, &config).unwrap();
        assert_eq!(solution.policy, vec![GO, STAY]);
        assert_eq!(solution.values, vec![0.0, 0.0]);
        assert_eq!(solution.iterations, 2);
        assert_eq!(solution.sweeps, 6);
        match solution.convergence {
            Convergence::SweepLimit { delta } => assert_float_eq!(delta, 0.9f64.powi(4), abs <= 1e-12),
            other => panic!("expected a sweep limit, got {:?}", other),
        }
        assert!(!solution.is_converged());
    }
}
