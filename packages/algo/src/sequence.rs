//! Sequence Builder
//!
//! Turns a skill's per-user attempts into an [`ObservationSet`]:
//! - ordered attempts are used verbatim
//! - count-only attempts are ordered by the simulator's fallback rule
//!   (never inventing attempts)
//! - users with zero attempts are skipped
//! - count-only users above the attempt limit are skipped with a warning
//!
//! Randomness is seeded per skill from the run seed and the skill id, so the
//! output does not depend on which worker builds which skill.

use crate::error::{BktError, Result};
use crate::records::{Attempts, UserAttempts};
use crate::simulator::{LearningSequenceSimulator, SimulationConfig};
use crate::types::{AttemptSequence, ObservationSet, DEFAULT_MAX_RECORD_ATTEMPTS, DEFAULT_SEED};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const SEED_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

/// Stable per-skill seed derived from the run seed (FNV-1a over the id)
pub fn skill_seed(run_seed: u64, skill: &str) -> u64 {
    let hash = skill.bytes().fold(FNV_OFFSET, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    });
    hash ^ run_seed.wrapping_mul(SEED_MIX)
}

/// Builds per-user observation sequences for one skill at a time
#[derive(Clone, Debug)]
pub struct SequenceBuilder {
    seed: u64,
    simulation: SimulationConfig,
    max_attempts: usize,
}

impl Default for SequenceBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl SequenceBuilder {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            simulation: SimulationConfig::default(),
            max_attempts: DEFAULT_MAX_RECORD_ATTEMPTS,
        }
    }

    pub fn with_simulation(mut self, simulation: SimulationConfig) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Build the observation set of `skill`
    ///
    /// Fails with `InsufficientData` when no user contributes an attempt.
    pub fn build(&self, skill: &str, users: &[UserAttempts]) -> Result<ObservationSet> {
        let mut simulator =
            LearningSequenceSimulator::new(self.simulation.clone(), skill_seed(self.seed, skill));
        let mut observations = ObservationSet::new();
        let mut reconstructed = 0usize;

        for entry in users {
            let outcomes = match &entry.attempts {
                Attempts::Ordered(outcomes) => outcomes.clone(),
                Attempts::Counts {
                    successes,
                    failures,
                } => {
                    let total = entry.attempts.total();
                    if total > self.max_attempts {
                        tracing::warn!(
                            skill,
                            user = %entry.user,
                            total,
                            limit = self.max_attempts,
                            "attempt counts over the limit, skipping user"
                        );
                        continue;
                    }
                    if total > 0 {
                        reconstructed += 1;
                    }
                    simulator.fallback_sequence(*successes, *failures)
                }
            };

            // Zero-attempt users contribute nothing.
            if let Some(sequence) = AttemptSequence::new(outcomes) {
                observations.insert(entry.user.clone(), sequence);
            }
        }

        if observations.is_empty() {
            return Err(BktError::InsufficientData {
                skill: skill.to_string(),
                responses: 0,
                users: 0,
                min_responses: 1,
                min_users: 1,
            });
        }

        tracing::trace!(
            skill,
            users = observations.user_count(),
            observations = observations.total_observations(),
            reconstructed,
            "built observation set"
        );

        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_attempts_used_verbatim() {
        let users = vec![
            UserAttempts::ordered("u1", vec![true, false, true]),
            UserAttempts::ordered("u2", vec![false]),
        ];
        let set = SequenceBuilder::new(42).build("G1", &users).unwrap();
        assert_eq!(set.get("u1").unwrap().outcomes(), &[true, false, true]);
        assert_eq!(set.get("u2").unwrap().outcomes(), &[false]);
    }

    #[test]
    fn test_counts_are_preserved_exactly() {
        let users = vec![
            UserAttempts::counts("u1", 7, 3),
            UserAttempts::counts("u2", 0, 4),
            UserAttempts::counts("u3", 5, 0),
        ];
        let set = SequenceBuilder::new(42).build("W1", &users).unwrap();

        let u1 = set.get("u1").unwrap();
        assert_eq!((u1.successes(), u1.failures()), (7, 3));
        let u2 = set.get("u2").unwrap();
        assert_eq!((u2.successes(), u2.failures()), (0, 4));
        let u3 = set.get("u3").unwrap();
        assert_eq!((u3.successes(), u3.failures()), (5, 0));
        assert_eq!(set.total_observations(), 19);
    }

    #[test]
    fn test_zero_attempt_users_are_skipped() {
        let users = vec![
            UserAttempts::counts("u1", 0, 0),
            UserAttempts::ordered("u2", vec![]),
            UserAttempts::counts("u3", 1, 1),
        ];
        let set = SequenceBuilder::new(42).build("G1", &users).unwrap();
        assert_eq!(set.user_count(), 1);
        assert!(set.get("u1").is_none());
    }

    #[test]
    fn test_all_zero_attempts_is_insufficient() {
        let users = vec![UserAttempts::counts("u1", 0, 0), UserAttempts::counts("u2", 0, 0)];
        let err = SequenceBuilder::new(42).build("G1", &users).unwrap_err();
        assert!(matches!(err, BktError::InsufficientData { .. }));
    }

    #[test]
    fn test_build_is_deterministic_per_seed_and_skill() {
        let users = vec![UserAttempts::counts("u1", 8, 8), UserAttempts::counts("u2", 6, 9)];
        let a = SequenceBuilder::new(9).build("G1", &users).unwrap();
        let b = SequenceBuilder::new(9).build("G1", &users).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_oversized_counts_skip_the_user() {
        let users = vec![
            UserAttempts::counts("u1", usize::MAX, 1),
            UserAttempts::counts("u2", 3, 2),
        ];
        let set = SequenceBuilder::new(42).build("G1", &users).unwrap();
        assert_eq!(set.user_count(), 1);
        assert!(set.get("u1").is_none());

        let capped = SequenceBuilder::new(42).with_max_attempts(4);
        let err = capped.build("G1", &users).unwrap_err();
        assert!(matches!(err, BktError::InsufficientData { .. }));
    }

    #[test]
    fn test_skill_seed_differs_by_skill_and_run() {
        assert_eq!(skill_seed(42, "G1"), skill_seed(42, "G1"));
        assert_ne!(skill_seed(42, "G1"), skill_seed(42, "G2"));
        assert_ne!(skill_seed(42, "G1"), skill_seed(43, "G1"));
    }
}
