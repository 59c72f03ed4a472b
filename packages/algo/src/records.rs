//! Input records and grouping by skill.
//!
//! A record carries either an authoritative ordered outcome list or only the
//! aggregate success/failure counts. The wire form keeps `sequence` optional;
//! inside the crate it becomes the tagged [`Attempts`] union.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{BktError, Result};
use crate::types::DEFAULT_MAX_RECORD_ATTEMPTS;

/// Wire form of one (user, skill) progress record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRecord {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub skill: Option<String>,
    #[serde(default)]
    pub success_count: usize,
    #[serde(default)]
    pub failure_count: usize,
    /// Ordered outcomes (0/1); takes precedence over the counts
    #[serde(default, alias = "_debugSequence", skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Vec<u8>>,
}

impl SkillRecord {
    pub fn from_counts(
        user: impl Into<String>,
        skill: impl Into<String>,
        success_count: usize,
        failure_count: usize,
    ) -> Self {
        Self {
            user: Some(user.into()),
            skill: Some(skill.into()),
            success_count,
            failure_count,
            sequence: None,
        }
    }

    pub fn from_sequence(user: impl Into<String>, skill: impl Into<String>, sequence: Vec<u8>) -> Self {
        let success_count = sequence.iter().filter(|&&v| v == 1).count();
        let failure_count = sequence.len() - success_count;
        Self {
            user: Some(user.into()),
            skill: Some(skill.into()),
            success_count,
            failure_count,
            sequence: Some(sequence),
        }
    }

    /// Validate and split into the skill id and the user's attempts
    ///
    /// `index` is the record's position in its batch, used in error reports.
    pub fn into_user_attempts(self, index: usize) -> Result<(String, UserAttempts)> {
        self.into_user_attempts_with_limit(index, DEFAULT_MAX_RECORD_ATTEMPTS)
    }

    /// Like [`into_user_attempts`](Self::into_user_attempts), rejecting records
    /// with more than `max_attempts` attempts
    pub fn into_user_attempts_with_limit(
        self,
        index: usize,
        max_attempts: usize,
    ) -> Result<(String, UserAttempts)> {
        let user = required_id(self.user, "user", index)?;
        let skill = required_id(self.skill, "skill", index)?;

        let attempts = match self.sequence {
            Some(values) => {
                if values.len() > max_attempts {
                    return Err(BktError::MalformedRecord {
                        index,
                        reason: format!(
                            "sequence of {} attempts exceeds the limit of {max_attempts}",
                            values.len()
                        ),
                    });
                }
                let mut outcomes = Vec::with_capacity(values.len());
                for v in values {
                    match v {
                        0 => outcomes.push(false),
                        1 => outcomes.push(true),
                        other => {
                            return Err(BktError::MalformedRecord {
                                index,
                                reason: format!("sequence value {other} is not 0 or 1"),
                            })
                        }
                    }
                }
                Attempts::Ordered(outcomes)
            }
            None => {
                let total = self
                    .success_count
                    .checked_add(self.failure_count)
                    .filter(|&total| total <= max_attempts);
                if total.is_none() {
                    return Err(BktError::MalformedRecord {
                        index,
                        reason: format!(
                            "{} successes and {} failures exceed the limit of {max_attempts} attempts",
                            self.success_count, self.failure_count
                        ),
                    });
                }
                Attempts::Counts {
                    successes: self.success_count,
                    failures: self.failure_count,
                }
            }
        };

        Ok((skill, UserAttempts { user, attempts }))
    }
}

fn required_id(value: Option<String>, field: &str, index: usize) -> Result<String> {
    match value {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(BktError::MalformedRecord {
            index,
            reason: format!("missing {field} identifier"),
        }),
    }
}

/// What is known about one user's attempts on a skill
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempts {
    /// Authoritative attempt order
    Ordered(Vec<bool>),
    /// Only the totals are known; order must be reconstructed
    Counts { successes: usize, failures: usize },
}

impl Attempts {
    pub fn total(&self) -> usize {
        match self {
            Attempts::Ordered(outcomes) => outcomes.len(),
            Attempts::Counts {
                successes,
                failures,
            } => successes.saturating_add(*failures),
        }
    }

    pub fn successes(&self) -> usize {
        match self {
            Attempts::Ordered(outcomes) => outcomes.iter().filter(|&&o| o).count(),
            Attempts::Counts { successes, .. } => *successes,
        }
    }
}

/// One user's attempts on a skill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAttempts {
    pub user: String,
    pub attempts: Attempts,
}

impl UserAttempts {
    pub fn ordered(user: impl Into<String>, outcomes: Vec<bool>) -> Self {
        Self {
            user: user.into(),
            attempts: Attempts::Ordered(outcomes),
        }
    }

    pub fn counts(user: impl Into<String>, successes: usize, failures: usize) -> Self {
        Self {
            user: user.into(),
            attempts: Attempts::Counts {
                successes,
                failures,
            },
        }
    }
}

/// Records grouped by skill id (sorted), plus the records that were skipped
#[derive(Debug, Clone, Default)]
pub struct GroupedRecords {
    pub skills: BTreeMap<String, Vec<UserAttempts>>,
    pub malformed: Vec<BktError>,
}

impl GroupedRecords {
    pub fn skill_count(&self) -> usize {
        self.skills.len()
    }
}

/// Group records by skill; malformed records are skipped and reported
pub fn group_by_skill<I>(records: I) -> GroupedRecords
where
    I: IntoIterator<Item = SkillRecord>,
{
    group_by_skill_with_limit(records, DEFAULT_MAX_RECORD_ATTEMPTS)
}

/// [`group_by_skill`] with an explicit per-record attempt limit
pub fn group_by_skill_with_limit<I>(records: I, max_attempts: usize) -> GroupedRecords
where
    I: IntoIterator<Item = SkillRecord>,
{
    let mut grouped = GroupedRecords::default();

    for (index, record) in records.into_iter().enumerate() {
        match record.into_user_attempts_with_limit(index, max_attempts) {
            Ok((skill, attempts)) => grouped.skills.entry(skill).or_default().push(attempts),
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed record");
                grouped.malformed.push(err);
            }
        }
    }

    tracing::debug!(
        skills = grouped.skills.len(),
        malformed = grouped.malformed.len(),
        "grouped records by skill"
    );

    grouped
}
