use rand::prelude::*;

use crate::error::{Error, Result};
use crate::solver::*;

// Samples a destination of the action, walking the distribution in state order.
// Returns None if the action ends the episode.
fn choose_destination<'a, R: Rng + ?Sized>(
    action: &'a ActionResult,
    rng: &mut R,
) -> Option<(StateId, &'a ActionDestination)> {
    let mut remaining_probability = rng.gen::<f64>();
    let mut last = None;
    for (&state, dest) in &action.dest_states {
        if remaining_probability < dest.probability {
            return Some((state, dest));
        }
        remaining_probability -= dest.probability;
        last = Some((state, dest));
    }

    // Probabilities may sum to slightly less than 1.
    last
}

// Returns the discounted return of one episode of at most `max_steps` steps.
pub fn simulate_episode<R: Rng + ?Sized>(
    mdp: &Mdp,
    policy: &[ActionId],
    start_state: StateId,
    max_steps: usize,
    rng: &mut R,
) -> f64 {
    let mut state = start_state;
    let mut total_reward = 0.0;
    let mut discount = 1.0;
    for _ in 0..max_steps {
        let action = mdp.action(state, policy[state]);
        let (target_state, dest) = match choose_destination(action, rng) {
            Some(outcome) => outcome,
            // Final state.
            None => break,
        };

        total_reward += discount * dest.reward;
        discount *= mdp.gamma();
        state = target_state;
    }

    total_reward
}

pub fn estimate_state_value(
    mdp: &Mdp,
    policy: &[ActionId],
    start_state: StateId,
    episodes: usize,
    max_steps: usize,
    seed: u64,
) -> Result<f64> {
    validate_policy(mdp, policy)?;
    if start_state >= mdp.num_states() {
        return Err(Error::InvalidStartState {
            state: start_state,
            num_states: mdp.num_states(),
        });
    }
    if episodes == 0 {
        return Err(Error::NoEpisodes);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let total: f64 = (0..episodes)
        .map(|_| simulate_episode(mdp, policy, start_state, max_steps, &mut rng))
        .sum();

    Ok(total / episodes as f64)
}
