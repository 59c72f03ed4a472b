//! BKT Fitter
//!
//! Estimates BKT parameters for one skill with Expectation-Maximization over
//! all users' sequences (independent chains sharing one parameter set).
//!
//! Procedure:
//! 1. Reject sparse skills (too few observations or users)
//! 2. Run several independent restarts in parallel, each from its own seeded
//!    initialisation, alternating E-step (forward-backward) and M-step until
//!    the log-likelihood gain drops below the tolerance, the iteration limit
//!    is hit or the restart's time budget runs out
//! 3. Keep the restart with the highest log-likelihood
//! 4. Relabel hidden states if the winner is label-switched, then clamp into
//!    the plausible ranges
//!
//! References:
//! - Corbett, A. T., & Anderson, J. R. (1995). Knowledge tracing.
//! - Rabiner, L. R. (1989). A tutorial on hidden Markov models.

use std::time::{Duration, Instant};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{BktError, Result};
use crate::hmm::{expected_statistics, NumericalError};
use crate::sanitize::{diagnose_parameters, normalize_labels, Bound, ParameterBounds};
use crate::sequence::skill_seed;
use crate::types::{
    BktParameters, FitDiagnostics, FitResult, JlptLevel, ObservationSet, Skill, DEFAULT_MIN_RESPONSES,
    DEFAULT_MIN_USERS, DEFAULT_NUM_RESTARTS, DEFAULT_SEED, HIGH_FIDELITY_MIN_RESPONSES,
    HIGH_FIDELITY_MIN_USERS, HIGH_FIDELITY_NUM_RESTARTS,
};

// ==================== Constants ====================

/// Default convergence threshold on log-likelihood improvement
const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Default EM iteration limit per restart
const DEFAULT_MAX_ITERATIONS: usize = 200;

/// Default wall-clock budget per restart
const DEFAULT_MAX_RESTART_SECONDS: u64 = 10;

/// Ranges random initialisations are drawn from
const INIT_PRIOR: Bound = Bound::new(0.05, 0.80);
const INIT_LEARN: Bound = Bound::new(0.05, 0.60);
const INIT_SLIP: Bound = Bound::new(0.05, 0.30);
const INIT_GUESS: Bound = Bound::new(0.10, 0.40);
const INIT_FORGET: Bound = Bound::new(0.00, 0.05);

/// Distance kept from 0 and 1 by every initialisation; EM cannot move a
/// probability that starts exactly on the boundary
const START_MARGIN: f64 = 0.01;

// ==================== Configuration ====================

/// Preset thresholds and initialisation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fidelity {
    /// ≥10 responses from ≥3 users, 3 random restarts
    #[default]
    Baseline,
    /// ≥20 responses from ≥5 users, 5 restarts seeded from the level defaults
    #[serde(alias = "high_fidelity", alias = "highfidelity")]
    High,
}

impl Fidelity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "baseline" | "base" => Some(Fidelity::Baseline),
            "high" | "high_fidelity" | "highfidelity" | "improved" => Some(Fidelity::High),
            _ => None,
        }
    }
}

/// Fitter configuration
#[derive(Debug, Clone, PartialEq)]
pub struct FitterConfig {
    pub min_responses: usize,
    pub min_users: usize,
    pub num_restarts: usize,
    /// Run seed; per-skill and per-restart seeds are derived from it
    pub seed: u64,
    /// Starting point of restart 0, moved inside [0.01, 0.99] before use;
    /// `None` means every restart is random
    pub starting_params: Option<BktParameters>,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub max_restart_duration: Duration,
    pub bounds: ParameterBounds,
}

impl Default for FitterConfig {
    fn default() -> Self {
        Self::for_fidelity(Fidelity::Baseline)
    }
}

impl FitterConfig {
    pub fn for_fidelity(fidelity: Fidelity) -> Self {
        let (min_responses, min_users, num_restarts, starting_params) = match fidelity {
            Fidelity::Baseline => (
                DEFAULT_MIN_RESPONSES,
                DEFAULT_MIN_USERS,
                DEFAULT_NUM_RESTARTS,
                None,
            ),
            Fidelity::High => (
                HIGH_FIDELITY_MIN_RESPONSES,
                HIGH_FIDELITY_MIN_USERS,
                HIGH_FIDELITY_NUM_RESTARTS,
                Some(JlptLevel::N5.default_parameters()),
            ),
        };

        Self {
            min_responses,
            min_users,
            num_restarts,
            seed: DEFAULT_SEED,
            starting_params,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_restart_duration: Duration::from_secs(DEFAULT_MAX_RESTART_SECONDS),
            bounds: ParameterBounds::default(),
        }
    }
}

// ==================== Restart Outcome ====================

/// Result of one EM restart
#[derive(Debug, Clone, PartialEq)]
pub struct RestartOutcome {
    pub restart: usize,
    pub initial: BktParameters,
    pub parameters: BktParameters,
    pub log_likelihood: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Log-likelihood after every iteration, starting with the initial model
    pub likelihood_trace: Vec<f64>,
}

// ==================== Main Implementation ====================

/// EM estimator of per-skill BKT parameters
#[derive(Debug, Clone, Default)]
pub struct BktFitter {
    config: FitterConfig,
}

impl BktFitter {
    pub fn new(config: FitterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitterConfig {
        &self.config
    }

    /// Reject skills that cannot identify five free parameters
    pub fn check_sufficiency(&self, skill: &str, observations: &ObservationSet) -> Result<()> {
        let responses = observations.total_observations();
        let users = observations.user_count();

        if responses < self.config.min_responses || users < self.config.min_users {
            return Err(BktError::InsufficientData {
                skill: skill.to_string(),
                responses,
                users,
                min_responses: self.config.min_responses,
                min_users: self.config.min_users,
            });
        }
        Ok(())
    }

    /// Fit one skill
    pub fn fit(&self, skill: &Skill, observations: &ObservationSet) -> Result<FitResult> {
        self.check_sufficiency(&skill.id, observations)?;

        let sequences: Vec<&[bool]> = observations.sequences().map(|s| s.outcomes()).collect();
        let base_seed = skill_seed(self.config.seed, &skill.id);
        let restarts = self.config.num_restarts.max(1);

        let outcomes: Vec<(usize, std::result::Result<RestartOutcome, NumericalError>)> = (0
            ..restarts)
            .into_par_iter()
            .map(|restart| {
                let seed = base_seed.wrapping_add(restart as u64);
                (restart, self.run_restart(&sequences, restart, seed))
            })
            .collect();

        // Ties go to the lowest restart index.
        let mut best: Option<RestartOutcome> = None;
        let mut completed = 0usize;
        let mut last_error: Option<NumericalError> = None;

        for (restart, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    completed += 1;
                    let better = best
                        .as_ref()
                        .map_or(true, |b| outcome.log_likelihood > b.log_likelihood);
                    if better {
                        best = Some(outcome);
                    }
                }
                Err(err) => {
                    tracing::debug!(skill = %skill.id, restart, error = %err, "EM restart failed");
                    last_error = Some(err);
                }
            }
        }

        let best = best.ok_or_else(|| BktError::FitFailed {
            skill: skill.id.clone(),
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no restart completed".to_string()),
        })?;

        let health = diagnose_parameters(&best.parameters);
        if health.has_nan || health.has_inf || health.out_of_range {
            return Err(BktError::FitFailed {
                skill: skill.id.clone(),
                reason: health.message,
            });
        }

        let (relabelled, label_switched) = normalize_labels(&best.parameters);
        let (parameters, clamp_adjustments) = self.config.bounds.clamp(&relabelled);

        for adj in &clamp_adjustments {
            tracing::trace!(
                skill = %skill.id,
                parameter = %adj.parameter,
                raw = adj.raw,
                clamped = adj.clamped,
                "clamped parameter"
            );
        }

        let diagnostics = FitDiagnostics {
            log_likelihood: best.log_likelihood,
            total_users: observations.user_count(),
            total_observations: observations.total_observations(),
            success_rate: observations.success_rate(),
            iterations: best.iterations,
            converged: best.converged,
            restarts_completed: completed,
            best_restart: best.restart,
            label_switched,
            clamp_adjustments,
            degenerate: relabelled.is_degenerate(),
        };

        tracing::debug!(
            skill = %skill.id,
            log_likelihood = diagnostics.log_likelihood,
            iterations = diagnostics.iterations,
            best_restart = diagnostics.best_restart,
            learn = parameters.learn,
            slip = parameters.slip,
            "fitted skill"
        );

        Ok(FitResult {
            skill: skill.clone(),
            parameters,
            diagnostics,
        })
    }

    /// Run a single EM restart
    pub fn run_restart(
        &self,
        sequences: &[&[bool]],
        restart: usize,
        seed: u64,
    ) -> std::result::Result<RestartOutcome, NumericalError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let initial = self.initial_parameters(restart, &mut rng);
        let started = Instant::now();

        let mut params = initial;
        let mut stats = expected_statistics(&params, sequences)?;
        let mut likelihood_trace = vec![stats.log_likelihood];
        let mut iterations = 0usize;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            if started.elapsed() >= self.config.max_restart_duration {
                tracing::warn!(restart, iterations, "EM restart hit its time budget");
                break;
            }

            let next = stats.maximize(&params);
            let next_stats = expected_statistics(&next, sequences)?;
            iterations += 1;

            let improvement = next_stats.log_likelihood - stats.log_likelihood;
            params = next;
            stats = next_stats;
            likelihood_trace.push(stats.log_likelihood);

            if improvement < self.config.tolerance {
                converged = true;
                break;
            }
        }

        Ok(RestartOutcome {
            restart,
            initial,
            parameters: params,
            log_likelihood: stats.log_likelihood,
            iterations,
            converged,
            likelihood_trace,
        })
    }

    /// Restart 0 uses the configured starting point; the rest are random
    fn initial_parameters(&self, restart: usize, rng: &mut ChaCha8Rng) -> BktParameters {
        let start = match self.config.starting_params {
            Some(start) if restart == 0 => start,
            _ => {
                let mut draw = |b: Bound| rng.gen_range(b.min..=b.max);
                BktParameters {
                    prior: draw(INIT_PRIOR),
                    learn: draw(INIT_LEARN),
                    slip: draw(INIT_SLIP),
                    guess: draw(INIT_GUESS),
                    forget: draw(INIT_FORGET),
                }
            }
        };
        away_from_boundary(start)
    }
}

/// Move every parameter into [START_MARGIN, 1 - START_MARGIN]; NaN passes
/// through and fails the first E-step
fn away_from_boundary(params: BktParameters) -> BktParameters {
    let inside = |v: f64| v.clamp(START_MARGIN, 1.0 - START_MARGIN);
    BktParameters {
        prior: inside(params.prior),
        learn: inside(params.learn),
        slip: inside(params.slip),
        guess: inside(params.guess),
        forget: inside(params.forget),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttemptSequence, SkillCategory};

    fn observations(sequences: &[&[u8]]) -> ObservationSet {
        let mut set = ObservationSet::new();
        for (i, seq) in sequences.iter().enumerate() {
            let seq = AttemptSequence::from_binary(seq).unwrap().unwrap();
            set.insert(format!("u{i}"), seq);
        }
        set
    }

    fn skill() -> Skill {
        Skill::new("G1", SkillCategory::Grammar)
    }

    #[test]
    fn test_fidelity_presets() {
        let base = FitterConfig::for_fidelity(Fidelity::Baseline);
        assert_eq!((base.min_responses, base.min_users, base.num_restarts), (10, 3, 3));
        assert!(base.starting_params.is_none());

        let high = FitterConfig::for_fidelity(Fidelity::High);
        assert_eq!((high.min_responses, high.min_users, high.num_restarts), (20, 5, 5));
        assert_eq!(high.starting_params, Some(JlptLevel::N5.default_parameters()));
    }

    #[test]
    fn test_fidelity_parse() {
        assert_eq!(Fidelity::parse("HIGH"), Some(Fidelity::High));
        assert_eq!(Fidelity::parse("improved"), Some(Fidelity::High));
        assert_eq!(Fidelity::parse("baseline"), Some(Fidelity::Baseline));
        assert_eq!(Fidelity::parse("ultra"), None);
    }

    #[test]
    fn test_rejects_nine_responses() {
        let set = observations(&[&[1, 0, 1], &[1, 1, 0], &[0, 1, 1]]);
        let err = BktFitter::default().fit(&skill(), &set).unwrap_err();
        assert!(matches!(
            err,
            BktError::InsufficientData {
                responses: 9,
                users: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_too_few_users() {
        let set = observations(&[&[1, 0, 1, 1, 1, 1], &[1, 1, 0, 0, 1, 1]]);
        let err = BktFitter::default().fit(&skill(), &set).unwrap_err();
        assert!(matches!(err, BktError::InsufficientData { users: 2, .. }));
    }

    #[test]
    fn test_accepts_ten_responses_from_three_users() {
        let set = observations(&[&[1, 0, 1, 1], &[0, 1, 1], &[0, 0, 1]]);
        assert_eq!(set.total_observations(), 10);
        let result = BktFitter::default().fit(&skill(), &set).unwrap();
        assert_eq!(result.diagnostics.total_observations, 10);
        assert_eq!(result.diagnostics.total_users, 3);
    }

    #[test]
    fn test_fitted_parameters_within_bounds() {
        let set = observations(&[
            &[0, 0, 1, 1, 1, 1],
            &[0, 1, 0, 1, 1, 1],
            &[1, 1, 1, 1],
            &[0, 0, 0, 1, 1],
        ]);
        let fitter = BktFitter::default();
        let result = fitter.fit(&skill(), &set).unwrap();
        let bounds = fitter.config().bounds;
        let p = result.parameters;
        assert!(bounds.prior.contains(p.prior));
        assert!(bounds.learn.contains(p.learn));
        assert!(bounds.slip.contains(p.slip));
        assert!(bounds.guess.contains(p.guess));
        assert!(bounds.forget.contains(p.forget));
        assert_eq!(result.diagnostics.restarts_completed, 3);
    }

    #[test]
    fn test_likelihood_trace_is_monotone() {
        let set = observations(&[
            &[0, 0, 1, 1, 1, 1, 1],
            &[0, 1, 0, 1, 1, 1],
            &[1, 0, 1, 1],
            &[0, 0, 0, 1, 1, 1],
        ]);
        let sequences: Vec<&[bool]> = set.sequences().map(|s| s.outcomes()).collect();
        let fitter = BktFitter::default();
        for restart in 0..5 {
            let outcome = fitter.run_restart(&sequences, restart, 100 + restart as u64).unwrap();
            for pair in outcome.likelihood_trace.windows(2) {
                assert!(pair[1] >= pair[0] - 1e-9, "likelihood decreased: {:?}", pair);
            }
            assert_eq!(outcome.likelihood_trace.len(), outcome.iterations + 1);
        }
    }

    #[test]
    fn test_restart_zero_uses_starting_point() {
        let start = BktParameters::new(0.1, 0.2, 0.03, 0.1, 0.2);
        let config = FitterConfig {
            starting_params: Some(start),
            ..Default::default()
        };
        let fitter = BktFitter::new(config);
        let sequences: Vec<&[bool]> = vec![&[true, false, true]];
        let outcome = fitter.run_restart(&sequences, 0, 1).unwrap();
        assert_eq!(outcome.initial, start);
        let other = fitter.run_restart(&sequences, 1, 1).unwrap();
        assert_ne!(other.initial, start);
    }

    #[test]
    fn test_starting_point_is_moved_off_the_boundary() {
        let fitter = BktFitter::new(FitterConfig::for_fidelity(Fidelity::High));
        let sequences: Vec<&[bool]> = vec![&[true, false, true]];
        let outcome = fitter.run_restart(&sequences, 0, 1).unwrap();

        let n5 = JlptLevel::N5.default_parameters();
        assert_eq!(n5.forget, 0.0);
        assert_eq!(outcome.initial.forget, START_MARGIN);
        assert_eq!(outcome.initial.learn, n5.learn);
        assert_eq!(outcome.initial.slip, n5.slip);

        let extreme = BktFitter::new(FitterConfig {
            starting_params: Some(BktParameters::new(1.0, 0.5, 0.0, 0.0, 1.0)),
            max_iterations: 0,
            ..Default::default()
        });
        let init = extreme.run_restart(&sequences, 0, 1).unwrap().initial;
        assert_eq!(init, BktParameters::new(0.99, 0.5, 0.01, 0.01, 0.99));
    }

    #[test]
    fn test_forget_from_level_defaults_is_reestimated() {
        // Users who know the skill early and then decline.
        let set = observations(&[
            &[1, 1, 1, 1, 0, 0, 0, 0],
            &[1, 1, 1, 0, 1, 0, 0, 0],
            &[1, 1, 1, 1, 1, 0, 0, 0],
            &[1, 1, 0, 1, 0, 0, 0, 0],
            &[1, 1, 1, 1, 0, 0, 0, 1],
            &[1, 1, 1, 0, 0, 0, 0, 0],
        ]);
        let sequences: Vec<&[bool]> = set.sequences().map(|s| s.outcomes()).collect();
        let fitter = BktFitter::new(FitterConfig::for_fidelity(Fidelity::High));
        let outcome = fitter.run_restart(&sequences, 0, 1).unwrap();
        assert!(outcome.iterations > 0);
        assert!(
            outcome.parameters.forget > START_MARGIN,
            "forget stuck at {}",
            outcome.parameters.forget
        );
    }

    #[test]
    fn test_time_budget_stops_the_restart() {
        let config = FitterConfig {
            max_restart_duration: Duration::ZERO,
            ..Default::default()
        };
        let fitter = BktFitter::new(config);
        let sequences: Vec<&[bool]> = vec![&[true, false, true, true], &[false, true]];
        let outcome = fitter.run_restart(&sequences, 0, 5).unwrap();
        assert_eq!(outcome.iterations, 0);
        assert!(!outcome.converged);
        assert_eq!(outcome.parameters, outcome.initial);
        assert_eq!(outcome.likelihood_trace.len(), 1);
    }

    #[test]
    fn test_fit_is_reproducible() {
        let set = observations(&[&[0, 1, 1, 1], &[0, 0, 1, 1], &[1, 0, 1, 1], &[0, 1, 0, 1]]);
        let a = BktFitter::default().fit(&skill(), &set).unwrap();
        let b = BktFitter::default().fit(&skill(), &set).unwrap();
        assert_eq!(a.parameters, b.parameters);
        assert_eq!(a.diagnostics.best_restart, b.diagnostics.best_restart);
    }

    #[test]
    fn test_zero_iteration_limit_returns_initial_model() {
        let config = FitterConfig {
            max_iterations: 0,
            ..Default::default()
        };
        let fitter = BktFitter::new(config);
        let sequences: Vec<&[bool]> = vec![&[true, false, true], &[false, true]];
        let outcome = fitter.run_restart(&sequences, 0, 5).unwrap();
        assert_eq!(outcome.iterations, 0);
        assert!(!outcome.converged);
        assert_eq!(outcome.parameters, outcome.initial);
    }

    #[test]
    fn test_all_restarts_failing_is_fit_failed() {
        let config = FitterConfig {
            min_responses: 1,
            min_users: 1,
            num_restarts: 1,
            starting_params: Some(BktParameters::new(f64::NAN, 0.5, 0.0, 0.1, 0.2)),
            ..Default::default()
        };
        let set = observations(&[&[1, 0, 1]]);
        let err = BktFitter::new(config).fit(&skill(), &set).unwrap_err();
        assert!(matches!(err, BktError::FitFailed { .. }));
    }
}
