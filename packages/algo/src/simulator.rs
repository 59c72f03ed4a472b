//! Learning Sequence Simulator
//!
//! Produces ordered correct/incorrect sequences in two ways:
//!
//! - **Fallback ordering**: when only `(successes, failures)` totals are known,
//!   emit exactly that many 1s and 0s in a plausible order. A running success
//!   probability starts low and is repeatedly blended with the rate of the
//!   outcomes still left to place, so early attempts lean towards failure.
//! - **Generative simulation**: a latent mastery level grows by a
//!   difficulty-dependent boost after every attempt (capped), and each
//!   attempt is drawn through a noisy channel:
//!   P(correct) = p * (1 - slip) + (1 - p) * guess_floor
//!
//! All draws come from a seeded ChaCha8 generator owned by the simulator.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::sanitize::sanitize_probability;
use crate::types::{Difficulty, DEFAULT_SEED};

// ==================== Constants ====================

/// Initial success probability of the fallback ordering
const FALLBACK_INITIAL_PROB: f64 = 0.3;

/// Residual probability of a lucky guess
const DEFAULT_GUESS_FLOOR: f64 = 0.1;

/// Upper limit of latent mastery growth
const DEFAULT_MASTERY_CAP: f64 = 0.95;

// ==================== Configuration ====================

/// Simulator configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Minimum attempts per simulated user
    pub min_attempts: usize,
    /// Maximum attempts per simulated user (inclusive)
    pub max_attempts: usize,
    /// P(correct) when the skill is not mastered at all
    pub guess_floor: f64,
    /// Cap on latent mastery growth
    pub mastery_cap: f64,
    /// Starting point of the fallback ordering
    pub fallback_initial_prob: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_attempts: 5,
            max_attempts: 20,
            guess_floor: DEFAULT_GUESS_FLOOR,
            mastery_cap: DEFAULT_MASTERY_CAP,
            fallback_initial_prob: FALLBACK_INITIAL_PROB,
        }
    }
}

impl SimulationConfig {
    /// Attempt range with `min <= max`
    pub fn attempt_range(&self) -> (usize, usize) {
        if self.min_attempts <= self.max_attempts {
            (self.min_attempts, self.max_attempts)
        } else {
            (self.max_attempts, self.min_attempts)
        }
    }
}

// ==================== Main Implementation ====================

/// Seeded generator of ordered attempt sequences
pub struct LearningSequenceSimulator {
    config: SimulationConfig,
    rng: ChaCha8Rng,
}

impl LearningSequenceSimulator {
    pub fn new(config: SimulationConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Default configuration with a specific seed
    pub fn with_seed(seed: u64) -> Self {
        Self::new(SimulationConfig::default(), seed)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    // ==================== Fallback Ordering ====================

    /// Order `successes` ones and `failures` zeros
    ///
    /// The output always holds exactly the requested totals; once either pool
    /// runs out the rest is forced to the other outcome.
    pub fn fallback_sequence(&mut self, successes: usize, failures: usize) -> Vec<bool> {
        let total = successes.saturating_add(failures);
        let mut sequence = Vec::with_capacity(total);
        let mut successes_left = successes;
        let mut failures_left = failures;
        let mut current = sanitize_probability(self.config.fallback_initial_prob);

        for _ in 0..total {
            let target_rate = successes_left as f64 / (successes_left + failures_left) as f64;
            current = (current + target_rate) / 2.0;

            let success = if successes_left == 0 {
                false
            } else if failures_left == 0 {
                true
            } else {
                self.rng.gen::<f64>() < current
            };

            if success {
                successes_left -= 1;
            } else {
                failures_left -= 1;
            }
            sequence.push(success);
        }

        sequence
    }

    // ==================== Generative Simulation ====================

    /// Simulate one user with an attempt count drawn from the configured range
    pub fn simulate(&mut self, difficulty: Difficulty) -> Vec<bool> {
        let (min, max) = self.config.attempt_range();
        let attempts = self.rng.gen_range(min..=max);
        self.simulate_attempts(difficulty, attempts)
    }

    /// Simulate exactly `attempts` outcomes (0 yields an empty sequence)
    pub fn simulate_attempts(&mut self, difficulty: Difficulty, attempts: usize) -> Vec<bool> {
        let mut sequence = Vec::with_capacity(attempts);

        for p_correct in self.emission_probabilities(difficulty, attempts) {
            sequence.push(self.rng.gen::<f64>() < p_correct);
        }

        sequence
    }

    /// Latent mastery before each attempt
    pub fn mastery_trajectory(&self, difficulty: Difficulty, attempts: usize) -> Vec<f64> {
        let profile = difficulty.profile();
        let cap = sanitize_probability(self.config.mastery_cap);
        let mut mastery = sanitize_probability(profile.initial_success_prob);

        (0..attempts)
            .map(|i| {
                if i > 0 {
                    mastery = (mastery + profile.learning_boost).min(cap);
                }
                mastery
            })
            .collect()
    }

    /// P(correct) of each attempt; every value lies in [0, 1]
    pub fn emission_probabilities(&self, difficulty: Difficulty, attempts: usize) -> Vec<f64> {
        let slip = difficulty.profile().slip_prob;
        self.mastery_trajectory(difficulty, attempts)
            .into_iter()
            .map(|mastery| self.emission_probability(mastery, slip))
            .collect()
    }

    /// Noisy-channel blend of mastery, slip and the guess floor
    pub fn emission_probability(&self, mastery: f64, slip: f64) -> f64 {
        let p = sanitize_probability(mastery);
        let s = sanitize_probability(slip);
        let g = sanitize_probability(self.config.guess_floor);
        sanitize_probability(p * (1.0 - s) + (1.0 - p) * g)
    }
}

impl Default for LearningSequenceSimulator {
    fn default() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }
}
