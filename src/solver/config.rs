use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    // A sweep whose max-norm change is below this value ends the solve.
    pub tolerance: f64,
    // Cap on sweeps of a single evaluation or value iteration run.
    pub max_sweeps: usize,
    // Cap on evaluate/improve rounds of policy iteration.
    pub max_policy_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> SolverConfig {
        SolverConfig {
            tolerance: 1e-3,
            max_sweeps: 100_000,
            max_policy_iterations: 1_000,
        }
    }
}

impl SolverConfig {
    pub fn with_tolerance(mut self, tolerance: f64) -> SolverConfig {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_sweeps(mut self, max_sweeps: usize) -> SolverConfig {
        self.max_sweeps = max_sweeps;
        self
    }

    pub fn with_max_policy_iterations(mut self, max_policy_iterations: usize) -> SolverConfig {
        self.max_policy_iterations = max_policy_iterations;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(Error::InvalidTolerance {
                tolerance: self.tolerance,
            });
        }
        if self.max_sweeps == 0 {
            return Err(Error::InvalidIterationCap { name: "max_sweeps" });
        }
        if self.max_policy_iterations == 0 {
            return Err(Error::InvalidIterationCap {
                name: "max_policy_iterations",
            });
        }
        Ok(())
    }
}
