//! Synthetic progress data
//!
//! Generates grammar and word progress records for a pool of users, with
//! items spread over easy/medium/hard difficulty. Attempt sequences come
//! from [`LearningSequenceSimulator`], so a fit on the generated data should
//! rank easy items above hard ones. Output is fully determined by the seed.

use std::collections::BTreeMap;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::records::SkillRecord;
use crate::sanitize::sanitize_probability;
use crate::simulator::{LearningSequenceSimulator, SimulationConfig};
use crate::types::{Difficulty, SkillCategory, DEFAULT_SEED};

/// Mastery score of a learner who attempted an item but never succeeded
pub const NO_SUCCESS_MASTERY: f64 = 0.2602739726027397;

/// Salt separating the simulator stream from the id/sampling stream
const SIMULATOR_SEED_SALT: u64 = 0x5851_f42d_4c95_7f2d;

/// Number of items per difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounts {
    pub easy: usize,
    pub medium: usize,
    pub hard: usize,
}

impl ItemCounts {
    pub fn get(&self, difficulty: Difficulty) -> usize {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }

    pub fn total(&self) -> usize {
        self.easy + self.medium + self.hard
    }
}

/// Generator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub users: usize,
    pub grammar_items: ItemCounts,
    pub word_items: ItemCounts,
    /// Inclusive range of users attempting each grammar item
    pub grammar_users_per_item: (usize, usize),
    /// Inclusive range of users attempting each word
    pub word_users_per_item: (usize, usize),
    /// Share of records belonging to users who barely started
    pub new_user_prob: f64,
    /// New users have 0..=this many failures and no success
    pub new_user_max_failures: usize,
    pub simulation: SimulationConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            users: 20,
            grammar_items: ItemCounts {
                easy: 2,
                medium: 2,
                hard: 1,
            },
            word_items: ItemCounts {
                easy: 3,
                medium: 3,
                hard: 2,
            },
            grammar_users_per_item: (8, 15),
            word_users_per_item: (10, 18),
            new_user_prob: 0.15,
            new_user_max_failures: 2,
            simulation: SimulationConfig::default(),
        }
    }
}

/// One generated (user, item) record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticRecord {
    pub id: String,
    pub user: String,
    pub item: String,
    pub difficulty: Difficulty,
    pub success_count: usize,
    pub failure_count: usize,
    pub sequence: Vec<u8>,
    /// Absent when the user never attempted the item
    pub mastery_score: Option<f64>,
}

impl SyntheticRecord {
    pub fn to_skill_record(&self) -> SkillRecord {
        SkillRecord {
            user: Some(self.user.clone()),
            skill: Some(self.item.clone()),
            success_count: self.success_count,
            failure_count: self.failure_count,
            sequence: Some(self.sequence.clone()),
        }
    }
}

/// Full generated dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticDataset {
    pub users: Vec<String>,
    pub grammar_records: Vec<SyntheticRecord>,
    pub word_records: Vec<SyntheticRecord>,
    pub grammar_items: BTreeMap<Difficulty, Vec<String>>,
    pub word_items: BTreeMap<Difficulty, Vec<String>>,
}

impl SyntheticDataset {
    pub fn records(&self, category: SkillCategory) -> &[SyntheticRecord] {
        match category {
            SkillCategory::Grammar => &self.grammar_records,
            SkillCategory::Word => &self.word_records,
        }
    }

    pub fn skill_records(&self, category: SkillCategory) -> Vec<SkillRecord> {
        self.records(category)
            .iter()
            .map(SyntheticRecord::to_skill_record)
            .collect()
    }
}

/// `None` for zero attempts
pub fn mastery_score(successes: usize, failures: usize) -> Option<f64> {
    let total = successes + failures;
    if total == 0 {
        return None;
    }
    if successes == 0 {
        return Some(NO_SUCCESS_MASTERY);
    }
    let rate = successes as f64 / total as f64;
    Some((rate * 0.8 + 0.1).clamp(0.05, 0.95))
}

/// Seeded generator of synthetic progress data
pub struct SyntheticGenerator {
    config: GeneratorConfig,
    rng: ChaCha8Rng,
    simulator: LearningSequenceSimulator,
}

impl Default for SyntheticGenerator {
    fn default() -> Self {
        Self::new(GeneratorConfig::default(), DEFAULT_SEED)
    }
}

impl SyntheticGenerator {
    pub fn new(config: GeneratorConfig, seed: u64) -> Self {
        let simulator =
            LearningSequenceSimulator::new(config.simulation.clone(), seed ^ SIMULATOR_SEED_SALT);
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            simulator,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Random 24-hex-digit identifier
    pub fn object_id(&mut self) -> String {
        let bytes: [u8; 12] = self.rng.gen();
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn generate(&mut self) -> SyntheticDataset {
        let users: Vec<String> = (0..self.config.users).map(|_| self.object_id()).collect();
        let grammar_items = self.item_ids(self.config.grammar_items);
        let word_items = self.item_ids(self.config.word_items);

        let grammar_records =
            self.progress_records(&users, &grammar_items, self.config.grammar_users_per_item);
        let word_records = self.progress_records(&users, &word_items, self.config.word_users_per_item);

        tracing::debug!(
            users = users.len(),
            grammar_records = grammar_records.len(),
            word_records = word_records.len(),
            "generated synthetic dataset"
        );

        SyntheticDataset {
            users,
            grammar_records,
            word_records,
            grammar_items,
            word_items,
        }
    }

    fn item_ids(&mut self, counts: ItemCounts) -> BTreeMap<Difficulty, Vec<String>> {
        Difficulty::ALL
            .iter()
            .map(|&d| (d, (0..counts.get(d)).map(|_| self.object_id()).collect()))
            .collect()
    }

    fn progress_records(
        &mut self,
        users: &[String],
        items: &BTreeMap<Difficulty, Vec<String>>,
        users_per_item: (usize, usize),
    ) -> Vec<SyntheticRecord> {
        let (lo, hi) = if users_per_item.0 <= users_per_item.1 {
            users_per_item
        } else {
            (users_per_item.1, users_per_item.0)
        };
        let mut records = Vec::new();

        for (&difficulty, ids) in items {
            for item in ids {
                let wanted = self.rng.gen_range(lo..=hi).min(users.len());
                let selected: Vec<&String> = users.choose_multiple(&mut self.rng, wanted).collect();
                for user in selected {
                    let record = self.progress_record(user, item, difficulty);
                    records.push(record);
                }
            }
        }

        records
    }

    fn progress_record(&mut self, user: &str, item: &str, difficulty: Difficulty) -> SyntheticRecord {
        let outcomes = if self.rng.gen_bool(sanitize_probability(self.config.new_user_prob)) {
            let failures = self.rng.gen_range(0..=self.config.new_user_max_failures);
            vec![false; failures]
        } else {
            self.simulator.simulate(difficulty)
        };

        let success_count = outcomes.iter().filter(|&&o| o).count();
        let failure_count = outcomes.len() - success_count;

        SyntheticRecord {
            id: self.object_id(),
            user: user.to_string(),
            item: item.to_string(),
            difficulty,
            success_count,
            failure_count,
            sequence: outcomes.iter().map(|&o| u8::from(o)).collect(),
            mastery_score: mastery_score(success_count, failure_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_deterministic_per_seed() {
        let a = SyntheticGenerator::new(GeneratorConfig::default(), 7).generate();
        let b = SyntheticGenerator::new(GeneratorConfig::default(), 7).generate();
        assert_eq!(a, b);
        let c = SyntheticGenerator::new(GeneratorConfig::default(), 8).generate();
        assert_ne!(a.users, c.users);
    }

    #[test]
    fn test_default_shape() {
        let data = SyntheticGenerator::default().generate();
        assert_eq!(data.users.len(), 20);
        assert_eq!(data.grammar_items[&Difficulty::Easy].len(), 2);
        assert_eq!(data.grammar_items[&Difficulty::Hard].len(), 1);
        assert_eq!(data.word_items.values().map(Vec::len).sum::<usize>(), 8);
        assert!(data.users.iter().all(|id| id.len() == 24
            && id.chars().all(|c| c.is_ascii_hexdigit())));
    }

    #[test]
    fn test_users_per_item_within_range() {
        let data = SyntheticGenerator::default().generate();
        for ids in data.grammar_items.values() {
            for id in ids {
                let users: HashSet<&str> = data
                    .grammar_records
                    .iter()
                    .filter(|r| &r.item == id)
                    .map(|r| r.user.as_str())
                    .collect();
                assert!((8..=15).contains(&users.len()), "grammar item had {} users", users.len());
            }
        }
    }

    #[test]
    fn test_counts_match_sequences() {
        let data = SyntheticGenerator::default().generate();
        for r in data.grammar_records.iter().chain(&data.word_records) {
            assert_eq!(r.sequence.len(), r.success_count + r.failure_count);
            assert_eq!(r.sequence.iter().filter(|&&v| v == 1).count(), r.success_count);
            if r.success_count + r.failure_count == 0 {
                assert!(r.mastery_score.is_none());
            }
        }
    }

    #[test]
    fn test_new_users_have_no_success() {
        let config = GeneratorConfig {
            new_user_prob: 1.0,
            ..Default::default()
        };
        let data = SyntheticGenerator::new(config, 3).generate();
        assert!(data
            .word_records
            .iter()
            .all(|r| r.success_count == 0 && r.failure_count <= 2));
    }

    #[test]
    fn test_mastery_score_rules() {
        assert_eq!(mastery_score(0, 0), None);
        assert_eq!(mastery_score(0, 3), Some(NO_SUCCESS_MASTERY));
        assert!((mastery_score(5, 0).unwrap() - 0.9).abs() < 1e-12);
        assert!((mastery_score(1, 1).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_user_pool_smaller_than_range() {
        let config = GeneratorConfig {
            users: 4,
            ..Default::default()
        };
        let data = SyntheticGenerator::new(config, 1).generate();
        assert_eq!(data.word_records.len(), 4 * 8);
    }
}
