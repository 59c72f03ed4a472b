//! Common Types and Constants
//!
//! Shared data structures used across all estimation modules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==================== Constants ====================

/// Numerical stability epsilon
pub const EPSILON: f64 = 1e-10;

/// Minimum observations per skill (baseline fidelity)
pub const DEFAULT_MIN_RESPONSES: usize = 10;

/// Minimum distinct users per skill (baseline fidelity)
pub const DEFAULT_MIN_USERS: usize = 3;

/// EM restarts per skill (baseline fidelity)
pub const DEFAULT_NUM_RESTARTS: usize = 3;

/// Minimum observations per skill (high fidelity)
pub const HIGH_FIDELITY_MIN_RESPONSES: usize = 20;

/// Minimum distinct users per skill (high fidelity)
pub const HIGH_FIDELITY_MIN_USERS: usize = 5;

/// EM restarts per skill (high fidelity)
pub const HIGH_FIDELITY_NUM_RESTARTS: usize = 5;

/// Run seed used when none is configured
pub const DEFAULT_SEED: u64 = 42;

/// Largest attempt total accepted from one (user, skill) record
pub const DEFAULT_MAX_RECORD_ATTEMPTS: usize = 100_000;

// ==================== Skill Types ====================

/// Item category a skill belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillCategory {
    Grammar,
    Word,
}

impl SkillCategory {
    pub const ALL: [SkillCategory; 2] = [SkillCategory::Grammar, SkillCategory::Word];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "grammar" | "grammarpoint" | "grammar_point" => Some(SkillCategory::Grammar),
            "word" | "vocabulary" => Some(SkillCategory::Word),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillCategory::Grammar => "grammar",
            SkillCategory::Word => "word",
        }
    }
}

impl fmt::Display for SkillCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A grammar point or vocabulary word being traced
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub category: SkillCategory,
}

impl Skill {
    pub fn new(id: impl Into<String>, category: SkillCategory) -> Self {
        Self {
            id: id.into(),
            category,
        }
    }
}

// ==================== Observation Types ====================

/// Ordered correct/incorrect outcomes of one user on one skill
///
/// Never empty: a user without attempts has no sequence at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptSequence(Vec<bool>);

#[allow(clippy::len_without_is_empty)]
impl AttemptSequence {
    /// Returns `None` for an empty outcome list
    pub fn new(outcomes: Vec<bool>) -> Option<Self> {
        if outcomes.is_empty() {
            None
        } else {
            Some(Self(outcomes))
        }
    }

    /// Build from 0/1 values; returns the first offending value otherwise
    pub fn from_binary(values: &[u8]) -> Result<Option<Self>, u8> {
        let mut outcomes = Vec::with_capacity(values.len());
        for &v in values {
            match v {
                0 => outcomes.push(false),
                1 => outcomes.push(true),
                other => return Err(other),
            }
        }
        Ok(Self::new(outcomes))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn outcomes(&self) -> &[bool] {
        &self.0
    }

    pub fn successes(&self) -> usize {
        self.0.iter().filter(|&&o| o).count()
    }

    pub fn failures(&self) -> usize {
        self.len() - self.successes()
    }

    pub fn to_binary(&self) -> Vec<u8> {
        self.0.iter().map(|&o| u8::from(o)).collect()
    }

    fn extend(&mut self, other: AttemptSequence) {
        self.0.extend(other.0);
    }
}

/// Per-user attempt sequences for a single skill
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationSet {
    users: BTreeMap<String, AttemptSequence>,
}

impl ObservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user's sequence; a repeated user gets the new attempts appended
    pub fn insert(&mut self, user: impl Into<String>, sequence: AttemptSequence) {
        match self.users.entry(user.into()) {
            std::collections::btree_map::Entry::Occupied(mut slot) => slot.get_mut().extend(sequence),
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(sequence);
            }
        }
    }

    pub fn get(&self, user: &str) -> Option<&AttemptSequence> {
        self.users.get(user)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn total_observations(&self) -> usize {
        self.users.values().map(AttemptSequence::len).sum()
    }

    pub fn total_successes(&self) -> usize {
        self.users.values().map(AttemptSequence::successes).sum()
    }

    /// Empirical success rate over all observations (0 when empty)
    pub fn success_rate(&self) -> f64 {
        let total = self.total_observations();
        if total == 0 {
            0.0
        } else {
            self.total_successes() as f64 / total as f64
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttemptSequence)> {
        self.users.iter().map(|(user, seq)| (user.as_str(), seq))
    }

    pub fn sequences(&self) -> impl Iterator<Item = &AttemptSequence> {
        self.users.values()
    }
}

// ==================== BKT Parameter Types ====================

/// Names of the five BKT parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterName {
    Prior,
    Learn,
    Forget,
    Slip,
    Guess,
}

impl ParameterName {
    pub const ALL: [ParameterName; 5] = [
        ParameterName::Prior,
        ParameterName::Learn,
        ParameterName::Slip,
        ParameterName::Guess,
        ParameterName::Forget,
    ];

    /// Accepts both the short names and the exported names
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "prior" | "prior_knowledge" | "priorknowledge" => Some(ParameterName::Prior),
            "learn" | "learns" | "learning_rate" | "learningrate" => Some(ParameterName::Learn),
            "forget" | "forgets" | "forget_rate" | "forgetrate" => Some(ParameterName::Forget),
            "slip" | "slips" | "slip_rate" | "sliprate" => Some(ParameterName::Slip),
            "guess" | "guesses" | "guess_rate" | "guessrate" => Some(ParameterName::Guess),
            _ => None,
        }
    }

    /// Name used in exported artifacts
    pub fn export_name(&self) -> &'static str {
        match self {
            ParameterName::Prior => "prior_knowledge",
            ParameterName::Learn => "learning_rate",
            ParameterName::Forget => "forget_rate",
            ParameterName::Slip => "slip_rate",
            ParameterName::Guess => "guess_rate",
        }
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.export_name())
    }
}

/// The five probabilities of a BKT model
///
/// - `prior`: P(known before the first attempt)
/// - `learn`: P(unknown -> known after an attempt)
/// - `forget`: P(known -> unknown after an attempt)
/// - `slip`: P(incorrect | known)
/// - `guess`: P(correct | unknown)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BktParameters {
    #[serde(rename = "prior_knowledge")]
    pub prior: f64,
    #[serde(rename = "learning_rate")]
    pub learn: f64,
    #[serde(rename = "slip_rate")]
    pub slip: f64,
    #[serde(rename = "guess_rate")]
    pub guess: f64,
    #[serde(rename = "forget_rate")]
    pub forget: f64,
}

impl Default for BktParameters {
    fn default() -> Self {
        JlptLevel::N5.default_parameters()
    }
}

impl BktParameters {
    pub fn new(prior: f64, learn: f64, forget: f64, slip: f64, guess: f64) -> Self {
        Self {
            prior,
            learn,
            slip,
            guess,
            forget,
        }
    }

    pub fn get(&self, name: ParameterName) -> f64 {
        match name {
            ParameterName::Prior => self.prior,
            ParameterName::Learn => self.learn,
            ParameterName::Forget => self.forget,
            ParameterName::Slip => self.slip,
            ParameterName::Guess => self.guess,
        }
    }

    pub fn set(&mut self, name: ParameterName, value: f64) {
        match name {
            ParameterName::Prior => self.prior = value,
            ParameterName::Learn => self.learn = value,
            ParameterName::Forget => self.forget = value,
            ParameterName::Slip => self.slip = value,
            ParameterName::Guess => self.guess = value,
        }
    }

    /// All five values are finite probabilities
    pub fn is_valid(&self) -> bool {
        ParameterName::ALL.iter().all(|&name| {
            let v = self.get(name);
            v.is_finite() && (0.0..=1.0).contains(&v)
        })
    }

    /// A model where guessing is at least as good as knowing
    pub fn is_degenerate(&self) -> bool {
        self.slip + self.guess >= 1.0
    }
}

/// JLPT level used to pick application defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JlptLevel {
    N5,
    N4,
}

impl JlptLevel {
    /// Unknown levels fall back to N5
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "N4" => JlptLevel::N4,
            _ => JlptLevel::N5,
        }
    }

    pub fn default_parameters(&self) -> BktParameters {
        match self {
            JlptLevel::N5 => BktParameters::new(0.06, 0.35, 0.0, 0.18, 0.25),
            JlptLevel::N4 => BktParameters::new(0.04, 0.25, 0.0, 0.25, 0.25),
        }
    }
}

/// A parameter moved by post-fit clamping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClampAdjustment {
    pub parameter: ParameterName,
    pub raw: f64,
    pub clamped: f64,
}

impl ClampAdjustment {
    pub fn delta(&self) -> f64 {
        self.clamped - self.raw
    }
}

// ==================== Fit Result Types ====================

/// Fit diagnostics for one skill
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    /// Final log-likelihood of the selected restart (before clamping)
    pub log_likelihood: f64,
    pub total_users: usize,
    pub total_observations: usize,
    pub success_rate: f64,
    /// EM iterations run by the selected restart
    pub iterations: usize,
    pub converged: bool,
    pub restarts_completed: usize,
    pub best_restart: usize,
    /// Hidden states were relabelled because slip + guess exceeded 1
    pub label_switched: bool,
    pub clamp_adjustments: Vec<ClampAdjustment>,
    pub degenerate: bool,
}

/// Fitted parameters for one skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub skill: Skill,
    pub parameters: BktParameters,
    pub diagnostics: FitDiagnostics,
}

// ==================== Simulation Types ====================

/// Difficulty label of a synthetic item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" | "mid" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn profile(&self) -> DifficultyProfile {
        match self {
            Difficulty::Easy => DifficultyProfile {
                initial_success_prob: 0.40,
                learning_boost: 0.08,
                slip_prob: 0.10,
            },
            Difficulty::Medium => DifficultyProfile {
                initial_success_prob: 0.25,
                learning_boost: 0.06,
                slip_prob: 0.15,
            },
            Difficulty::Hard => DifficultyProfile {
                initial_success_prob: 0.15,
                learning_boost: 0.04,
                slip_prob: 0.20,
            },
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latent-growth settings of a difficulty level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyProfile {
    pub initial_success_prob: f64,
    pub learning_boost: f64,
    pub slip_prob: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_sequence_rejects_empty() {
        assert!(AttemptSequence::new(vec![]).is_none());
        assert_eq!(AttemptSequence::from_binary(&[]), Ok(None));
    }

    #[test]
    fn test_attempt_sequence_from_binary() {
        let seq = AttemptSequence::from_binary(&[1, 0, 1, 1]).unwrap().unwrap();
        assert_eq!(seq.len(), 4);
        assert_eq!(seq.successes(), 3);
        assert_eq!(seq.failures(), 1);
        assert_eq!(seq.to_binary(), vec![1, 0, 1, 1]);

        assert_eq!(AttemptSequence::from_binary(&[1, 2, 0]), Err(2));
    }

    #[test]
    fn test_observation_set_statistics() {
        let mut set = ObservationSet::new();
        set.insert("u1", AttemptSequence::new(vec![true, false]).unwrap());
        set.insert("u2", AttemptSequence::new(vec![true, true]).unwrap());

        assert_eq!(set.user_count(), 2);
        assert_eq!(set.total_observations(), 4);
        assert!((set.success_rate() - 0.75).abs() < EPSILON);
    }

    #[test]
    fn test_observation_set_appends_repeated_user() {
        let mut set = ObservationSet::new();
        set.insert("u1", AttemptSequence::new(vec![false]).unwrap());
        set.insert("u1", AttemptSequence::new(vec![true, true]).unwrap());

        assert_eq!(set.user_count(), 1);
        assert_eq!(set.get("u1").unwrap().outcomes(), &[false, true, true]);
    }

    #[test]
    fn test_empty_observation_set_success_rate() {
        assert_eq!(ObservationSet::new().success_rate(), 0.0);
    }

    #[test]
    fn test_parameter_name_aliases() {
        assert_eq!(ParameterName::parse("prior_knowledge"), Some(ParameterName::Prior));
        assert_eq!(ParameterName::parse("learn"), Some(ParameterName::Learn));
        assert_eq!(ParameterName::parse("Slip_Rate"), Some(ParameterName::Slip));
        assert_eq!(ParameterName::parse("guesses"), Some(ParameterName::Guess));
        assert_eq!(ParameterName::parse("forget_rate"), Some(ParameterName::Forget));
        assert_eq!(ParameterName::parse("mastery"), None);
    }

    #[test]
    fn test_parameters_serialize_with_export_names() {
        let params = BktParameters::new(0.1, 0.2, 0.0, 0.15, 0.25);
        let json = serde_json::to_value(params).unwrap();
        assert_eq!(json["prior_knowledge"], 0.1);
        assert_eq!(json["learning_rate"], 0.2);
        assert_eq!(json["slip_rate"], 0.15);
        assert_eq!(json["guess_rate"], 0.25);
        assert_eq!(json["forget_rate"], 0.0);
    }

    #[test]
    fn test_degenerate_flag() {
        assert!(!BktParameters::new(0.1, 0.2, 0.0, 0.2, 0.3).is_degenerate());
        assert!(BktParameters::new(0.1, 0.2, 0.0, 0.6, 0.5).is_degenerate());
    }

    #[test]
    fn test_validity_rejects_out_of_range() {
        assert!(BktParameters::default().is_valid());
        assert!(!BktParameters::new(1.2, 0.2, 0.0, 0.2, 0.3).is_valid());
        assert!(!BktParameters::new(0.1, f64::NAN, 0.0, 0.2, 0.3).is_valid());
    }

    #[test]
    fn test_level_defaults_fall_back_to_n5() {
        assert_eq!(JlptLevel::parse("n4"), JlptLevel::N4);
        assert_eq!(JlptLevel::parse("N1"), JlptLevel::N5);
        let n5 = JlptLevel::N5.default_parameters();
        assert_eq!(n5.prior, 0.06);
        assert_eq!(n5.learn, 0.35);
        let n4 = JlptLevel::N4.default_parameters();
        assert_eq!(n4.slip, 0.25);
    }

    #[test]
    fn test_difficulty_profiles() {
        let easy = Difficulty::Easy.profile();
        assert_eq!(easy.initial_success_prob, 0.40);
        assert_eq!(easy.learning_boost, 0.08);
        let hard = Difficulty::Hard.profile();
        assert_eq!(hard.slip_prob, 0.20);
        assert_eq!(Difficulty::parse("MEDIUM"), Some(Difficulty::Medium));
    }

    #[test]
    fn test_skill_category_parse() {
        assert_eq!(SkillCategory::parse("grammarPoint"), Some(SkillCategory::Grammar));
        assert_eq!(SkillCategory::parse("word"), Some(SkillCategory::Word));
        assert_eq!(SkillCategory::parse("kanji"), None);
    }
}
