//! Two-State Hidden Markov Model
//!
//! Forward-backward recursion and expected sufficient statistics for the BKT
//! model.
//!
//! States: 0 = unknown, 1 = known.
//!
//! - Initial: P(known) = prior
//! - Transition after each attempt:
//!   unknown -> known with `learn`, known -> unknown with `forget`
//! - Emission: P(correct | known) = 1 - slip, P(correct | unknown) = guess
//!
//! The forward pass is scaled per step (c_t = P(o_t | o_<t)), so the
//! log-likelihood is Σ ln c_t and long sequences never underflow.

use thiserror::Error;

use crate::sanitize::{has_invalid_values, sanitize_probability};
use crate::types::{BktParameters, EPSILON};

// ==================== Constants ====================

pub const UNKNOWN: usize = 0;
pub const KNOWN: usize = 1;

// ==================== Errors ====================

/// Numerical failure inside the recursion
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericalError {
    #[error("empty observation sequence")]
    EmptySequence,
    #[error("observation {step} has zero probability under the current model")]
    ZeroProbability { step: usize },
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

// ==================== Model Helpers ====================

/// Row-stochastic transition matrix `a[from][to]`
pub fn transition_matrix(params: &BktParameters) -> [[f64; 2]; 2] {
    [
        [1.0 - params.learn, params.learn],
        [params.forget, 1.0 - params.forget],
    ]
}

/// P(observation | state)
pub fn emission(params: &BktParameters, state: usize, correct: bool) -> f64 {
    match (state, correct) {
        (KNOWN, true) => 1.0 - params.slip,
        (KNOWN, false) => params.slip,
        (_, true) => params.guess,
        (_, false) => 1.0 - params.guess,
    }
}

// ==================== Forward-Backward ====================

/// Per-step posteriors of one sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Posteriors {
    /// P(state_t | all observations)
    pub gamma: Vec<[f64; 2]>,
    /// P(state_t = i, state_t+1 = j | all observations), length T - 1
    pub xi: Vec<[[f64; 2]; 2]>,
    pub log_likelihood: f64,
}

/// Run the scaled forward-backward recursion over one sequence
pub fn forward_backward(
    params: &BktParameters,
    outcomes: &[bool],
) -> Result<Posteriors, NumericalError> {
    let len = outcomes.len();
    if len == 0 {
        return Err(NumericalError::EmptySequence);
    }
    if has_invalid_values(&[params.prior, params.learn, params.forget, params.slip, params.guess]) {
        return Err(NumericalError::NonFinite("parameters"));
    }

    let a = transition_matrix(params);
    let initial = [1.0 - params.prior, params.prior];

    // Forward pass
    let mut alpha = vec![[0.0; 2]; len];
    let mut scale = vec![0.0; len];

    for t in 0..len {
        let mut next = [0.0; 2];
        for state in [UNKNOWN, KNOWN] {
            let reach = if t == 0 {
                initial[state]
            } else {
                alpha[t - 1][UNKNOWN] * a[UNKNOWN][state] + alpha[t - 1][KNOWN] * a[KNOWN][state]
            };
            next[state] = reach * emission(params, state, outcomes[t]);
        }

        let c = next[UNKNOWN] + next[KNOWN];
        if !c.is_finite() {
            return Err(NumericalError::NonFinite("forward pass"));
        }
        if c <= 0.0 {
            return Err(NumericalError::ZeroProbability { step: t });
        }

        alpha[t] = [next[UNKNOWN] / c, next[KNOWN] / c];
        scale[t] = c;
    }

    // Backward pass
    let mut beta = vec![[1.0; 2]; len];
    for t in (0..len - 1).rev() {
        let o = outcomes[t + 1];
        for state in [UNKNOWN, KNOWN] {
            let sum: f64 = [UNKNOWN, KNOWN]
                .iter()
                .map(|&next| a[state][next] * emission(params, next, o) * beta[t + 1][next])
                .sum();
            beta[t][state] = sum / scale[t + 1];
        }
    }

    // State posteriors
    let mut gamma = Vec::with_capacity(len);
    for t in 0..len {
        let g0 = alpha[t][UNKNOWN] * beta[t][UNKNOWN];
        let g1 = alpha[t][KNOWN] * beta[t][KNOWN];
        let total = g0 + g1;
        if !total.is_finite() || total <= 0.0 {
            return Err(NumericalError::NonFinite("state posterior"));
        }
        gamma.push([g0 / total, g1 / total]);
    }

    // Transition posteriors
    let mut xi = Vec::with_capacity(len.saturating_sub(1));
    for t in 0..len - 1 {
        let o = outcomes[t + 1];
        let mut m = [[0.0; 2]; 2];
        for from in [UNKNOWN, KNOWN] {
            for to in [UNKNOWN, KNOWN] {
                m[from][to] = alpha[t][from] * a[from][to] * emission(params, to, o) * beta[t + 1][to]
                    / scale[t + 1];
            }
        }
        xi.push(m);
    }

    let log_likelihood: f64 = scale.iter().map(|c| c.ln()).sum();
    if !log_likelihood.is_finite() {
        return Err(NumericalError::NonFinite("log-likelihood"));
    }

    Ok(Posteriors {
        gamma,
        xi,
        log_likelihood,
    })
}

/// Total log-likelihood of independent sequences sharing one parameter set
pub fn log_likelihood<'a, I>(params: &BktParameters, sequences: I) -> Result<f64, NumericalError>
where
    I: IntoIterator<Item = &'a [bool]>,
{
    let mut total = 0.0;
    for outcomes in sequences {
        total += forward_backward(params, outcomes)?.log_likelihood;
    }
    Ok(total)
}

// ==================== Expected Sufficient Statistics ====================

/// E-step totals accumulated over all sequences
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SufficientStats {
    pub sequences: usize,
    /// Σ γ_0(known)
    pub initial_known: f64,
    /// Σ ξ(unknown -> known)
    pub learn_num: f64,
    /// Σ γ_t(unknown) for t < T - 1
    pub learn_den: f64,
    /// Σ ξ(known -> unknown)
    pub forget_num: f64,
    /// Σ γ_t(known) for t < T - 1
    pub forget_den: f64,
    /// Σ γ_t(unknown) · [correct]
    pub guess_num: f64,
    /// Σ γ_t(unknown)
    pub guess_den: f64,
    /// Σ γ_t(known) · [incorrect]
    pub slip_num: f64,
    /// Σ γ_t(known)
    pub slip_den: f64,
    pub log_likelihood: f64,
}

impl SufficientStats {
    pub fn accumulate(&mut self, posteriors: &Posteriors, outcomes: &[bool]) {
        self.sequences += 1;
        self.log_likelihood += posteriors.log_likelihood;

        if let Some(first) = posteriors.gamma.first() {
            self.initial_known += first[KNOWN];
        }

        for (t, (g, &correct)) in posteriors.gamma.iter().zip(outcomes).enumerate() {
            self.guess_den += g[UNKNOWN];
            self.slip_den += g[KNOWN];
            if correct {
                self.guess_num += g[UNKNOWN];
            } else {
                self.slip_num += g[KNOWN];
            }

            if t + 1 < outcomes.len() {
                self.learn_den += g[UNKNOWN];
                self.forget_den += g[KNOWN];
            }
        }

        for m in &posteriors.xi {
            self.learn_num += m[UNKNOWN][KNOWN];
            self.forget_num += m[KNOWN][UNKNOWN];
        }
    }

    /// M-step: re-estimate all five parameters
    ///
    /// A parameter whose denominator vanishes keeps its previous value.
    pub fn maximize(&self, previous: &BktParameters) -> BktParameters {
        let ratio = |num: f64, den: f64, fallback: f64| {
            if den > EPSILON {
                sanitize_probability(num / den)
            } else {
                fallback
            }
        };

        let prior = if self.sequences > 0 {
            sanitize_probability(self.initial_known / self.sequences as f64)
        } else {
            previous.prior
        };

        BktParameters {
            prior,
            learn: ratio(self.learn_num, self.learn_den, previous.learn),
            forget: ratio(self.forget_num, self.forget_den, previous.forget),
            guess: ratio(self.guess_num, self.guess_den, previous.guess),
            slip: ratio(self.slip_num, self.slip_den, previous.slip),
        }
    }
}

/// E-step over all sequences
pub fn expected_statistics(
    params: &BktParameters,
    sequences: &[&[bool]],
) -> Result<SufficientStats, NumericalError> {
    let mut stats = SufficientStats::default();
    for outcomes in sequences {
        let posteriors = forward_backward(params, outcomes)?;
        stats.accumulate(&posteriors, outcomes);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BktParameters {
        BktParameters::new(0.2, 0.3, 0.05, 0.1, 0.25)
    }

    #[test]
    fn test_single_observation_likelihood() {
        let p = params();
        let post = forward_backward(&p, &[true]).unwrap();
        // P(correct) = 0.8 * 0.25 + 0.2 * 0.9
        let expected = 0.8 * 0.25 + 0.2 * 0.9;
        assert!((post.log_likelihood - f64::ln(expected)).abs() < 1e-12);
        assert!(post.xi.is_empty());
    }

    #[test]
    fn test_two_step_likelihood_matches_enumeration() {
        let p = params();
        let obs = [false, true];
        let a = transition_matrix(&p);
        let init = [1.0 - p.prior, p.prior];

        let mut brute = 0.0;
        for s0 in 0..2 {
            for s1 in 0..2 {
                brute += init[s0]
                    * emission(&p, s0, obs[0])
                    * a[s0][s1]
                    * emission(&p, s1, obs[1]);
            }
        }

        let post = forward_backward(&p, &obs).unwrap();
        assert!((post.log_likelihood - brute.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_posteriors_sum_to_one() {
        let p = params();
        let post = forward_backward(&p, &[true, false, true, true, false, true]).unwrap();
        for g in &post.gamma {
            assert!((g[0] + g[1] - 1.0).abs() < 1e-9, "gamma {:?}", g);
        }
        for m in &post.xi {
            let total: f64 = m.iter().flatten().sum();
            assert!((total - 1.0).abs() < 1e-9, "xi total {total}");
        }
    }

    #[test]
    fn test_xi_marginalises_to_gamma() {
        let p = params();
        let post = forward_backward(&p, &[false, false, true, true]).unwrap();
        for (t, m) in post.xi.iter().enumerate() {
            for from in 0..2 {
                let row = m[from][0] + m[from][1];
                assert!((row - post.gamma[t][from]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_empty_sequence_is_error() {
        assert_eq!(
            forward_backward(&params(), &[]).unwrap_err(),
            NumericalError::EmptySequence
        );
    }

    #[test]
    fn test_impossible_observation_is_error() {
        // Everyone starts known, never forgets and never slips: a failure is impossible.
        let p = BktParameters::new(1.0, 0.5, 0.0, 0.0, 0.2);
        let err = forward_backward(&p, &[true, false]).unwrap_err();
        assert_eq!(err, NumericalError::ZeroProbability { step: 1 });
    }

    #[test]
    fn test_long_sequence_does_not_underflow() {
        let p = params();
        let obs: Vec<bool> = (0..5000).map(|i| i % 3 != 0).collect();
        let post = forward_backward(&p, &obs).unwrap();
        assert!(post.log_likelihood.is_finite());
        assert!(post.log_likelihood < 0.0);
    }

    #[test]
    fn test_maximize_keeps_previous_when_denominator_vanishes() {
        let stats = SufficientStats {
            sequences: 2,
            initial_known: 1.0,
            guess_num: 1.0,
            guess_den: 4.0,
            slip_num: 0.5,
            slip_den: 5.0,
            ..Default::default()
        };
        let previous = params();
        let next = stats.maximize(&previous);
        assert!((next.prior - 0.5).abs() < 1e-12);
        assert!((next.guess - 0.25).abs() < 1e-12);
        assert!((next.slip - 0.1).abs() < 1e-12);
        assert_eq!(next.learn, previous.learn);
        assert_eq!(next.forget, previous.forget);
    }

    #[test]
    fn test_em_step_does_not_decrease_likelihood() {
        let sequences: Vec<Vec<bool>> = vec![
            vec![false, false, true, true, true],
            vec![false, true, false, true, true, true],
            vec![true, true, true],
            vec![false, false, false, true],
        ];
        let refs: Vec<&[bool]> = sequences.iter().map(|s| s.as_slice()).collect();

        let mut p = BktParameters::new(0.5, 0.1, 0.02, 0.2, 0.3);
        let mut last = f64::NEG_INFINITY;
        for _ in 0..30 {
            let stats = expected_statistics(&p, &refs).unwrap();
            assert!(stats.log_likelihood >= last - 1e-9);
            last = stats.log_likelihood;
            p = stats.maximize(&p);
        }
    }
}
