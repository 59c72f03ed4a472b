//! Knowledge Tracer
//!
//! Applies fitted (or level-default) parameters to one learner's answers:
//!
//! 1. Posterior after the observation
//!    - correct:   P(K) (1 - slip) / [P(K) (1 - slip) + (1 - P(K)) guess]
//!    - incorrect: P(K) slip / [P(K) slip + (1 - P(K)) (1 - guess)]
//! 2. Transition to the next step
//!    - P(K') = post (1 - forget) + (1 - post) learn

use crate::sanitize::sanitize_probability;
use crate::types::{BktParameters, EPSILON};

/// Mastery tracker for a single learner and skill
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnowledgeTracer {
    params: BktParameters,
}

impl KnowledgeTracer {
    pub fn new(params: BktParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BktParameters {
        &self.params
    }

    /// P(correct) at mastery `p_known`
    pub fn predict_correct(&self, p_known: f64) -> f64 {
        let p = sanitize_probability(p_known);
        sanitize_probability(p * (1.0 - self.params.slip) + (1.0 - p) * self.params.guess)
    }

    /// Mastery after observing one answer
    ///
    /// An observation the model deems impossible leaves `current` unchanged.
    pub fn update_mastery(&self, current: f64, correct: bool) -> f64 {
        let p = sanitize_probability(current);
        let BktParameters {
            slip,
            guess,
            learn,
            forget,
            ..
        } = self.params;

        let (known, unknown) = if correct {
            (p * (1.0 - slip), (1.0 - p) * guess)
        } else {
            (p * slip, (1.0 - p) * (1.0 - guess))
        };

        let evidence = known + unknown;
        if evidence < EPSILON {
            return p;
        }

        let posterior = known / evidence;
        sanitize_probability(posterior * (1.0 - forget) + (1.0 - posterior) * learn)
    }

    /// Mastery before each answer, plus the final mastery
    ///
    /// The returned vector has `outcomes.len() + 1` entries, starting at the prior.
    pub fn trace(&self, outcomes: &[bool]) -> Vec<f64> {
        let mut mastery = sanitize_probability(self.params.prior);
        let mut trajectory = Vec::with_capacity(outcomes.len() + 1);
        trajectory.push(mastery);
        for &correct in outcomes {
            mastery = self.update_mastery(mastery, correct);
            trajectory.push(mastery);
        }
        trajectory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracer() -> KnowledgeTracer {
        KnowledgeTracer::new(BktParameters::new(0.2, 0.3, 0.0, 0.1, 0.25))
    }

    #[test]
    fn test_correct_answer_raises_mastery() {
        let t = tracer();
        // posterior = 0.18 / (0.18 + 0.2) ; next = post + (1 - post) * 0.3
        let post = 0.18 / 0.38;
        let expected = post + (1.0 - post) * 0.3;
        let next = t.update_mastery(0.2, true);
        assert!((next - expected).abs() < 1e-12);
        assert!(next > 0.2);
    }

    #[test]
    fn test_incorrect_answer_lowers_posterior() {
        let t = KnowledgeTracer::new(BktParameters::new(0.5, 0.0, 0.0, 0.1, 0.25));
        // learn = forget = 0, so the result is the plain posterior
        let next = t.update_mastery(0.5, false);
        let expected = 0.05 / (0.05 + 0.375);
        assert!((next - expected).abs() < 1e-12);
    }

    #[test]
    fn test_forget_pulls_mastery_down() {
        let with_forget = KnowledgeTracer::new(BktParameters::new(0.5, 0.1, 0.2, 0.1, 0.2));
        let without = KnowledgeTracer::new(BktParameters::new(0.5, 0.1, 0.0, 0.1, 0.2));
        assert!(with_forget.update_mastery(0.9, true) < without.update_mastery(0.9, true));
    }

    #[test]
    fn test_impossible_observation_keeps_mastery() {
        // Fully known, never slips: an error has zero probability.
        let t = KnowledgeTracer::new(BktParameters::new(1.0, 0.2, 0.0, 0.0, 0.2));
        assert_eq!(t.update_mastery(1.0, false), 1.0);
    }

    #[test]
    fn test_trace_starts_at_prior() {
        let t = tracer();
        let trajectory = t.trace(&[true, true, false, true]);
        assert_eq!(trajectory.len(), 5);
        assert_eq!(trajectory[0], 0.2);
        assert!(trajectory.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_predict_correct() {
        let t = tracer();
        assert!((t.predict_correct(0.0) - 0.25).abs() < 1e-12);
        assert!((t.predict_correct(1.0) - 0.9).abs() < 1e-12);
    }
}
