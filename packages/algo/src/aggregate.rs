//! Aggregation of per-skill fits
//!
//! - per-category parameter means
//! - grammar vs word learning-rate comparison
//! - change of discovered parameters relative to defaults
//! - the exported analysis report

use std::collections::BTreeMap;
use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BktParameters, FitResult, ParameterName, SkillCategory, EPSILON};

/// Ratio one category's mean learning rate must exceed the other's by
const EASIER_RATIO: f64 = 1.10;

// ==================== Category Summary ====================

/// Means over the fitted skills of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category: SkillCategory,
    pub item_count: usize,
    pub total_responses: usize,
    pub mean_success_rate: f64,
    pub mean_parameters: BktParameters,
}

impl CategorySummary {
    /// `None` when `results` holds no skill of `category`
    pub fn from_results(category: SkillCategory, results: &[FitResult]) -> Option<Self> {
        let members: Vec<&FitResult> = results
            .iter()
            .filter(|r| r.skill.category == category)
            .collect();
        if members.is_empty() {
            return None;
        }

        Some(Self {
            category,
            item_count: members.len(),
            total_responses: members
                .iter()
                .map(|r| r.diagnostics.total_observations)
                .sum(),
            mean_success_rate: mean_of(&members, |r| r.diagnostics.success_rate),
            mean_parameters: BktParameters {
                prior: mean_of(&members, |r| r.parameters.prior),
                learn: mean_of(&members, |r| r.parameters.learn),
                slip: mean_of(&members, |r| r.parameters.slip),
                guess: mean_of(&members, |r| r.parameters.guess),
                forget: mean_of(&members, |r| r.parameters.forget),
            },
        })
    }
}

fn mean_of(members: &[&FitResult], f: impl Fn(&FitResult) -> f64) -> f64 {
    members.iter().map(|&r| f(r)).sum::<f64>() / members.len() as f64
}

/// Summaries of every category that has results
pub fn summarize(results: &[FitResult]) -> Vec<CategorySummary> {
    SkillCategory::ALL
        .iter()
        .filter_map(|&c| CategorySummary::from_results(c, results))
        .collect()
}

// ==================== Category Comparison ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonVerdict {
    GrammarEasier,
    WordEasier,
    Comparable,
}

impl fmt::Display for ComparisonVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ComparisonVerdict::GrammarEasier => "grammar points are easier to learn than words",
            ComparisonVerdict::WordEasier => "words are easier to learn than grammar points",
            ComparisonVerdict::Comparable => "grammar points and words have comparable learning rates",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryComparison {
    pub grammar_learning_rate: f64,
    pub word_learning_rate: f64,
    pub verdict: ComparisonVerdict,
}

impl CategoryComparison {
    pub fn from_rates(grammar: f64, word: f64) -> Self {
        let verdict = if grammar > word * EASIER_RATIO {
            ComparisonVerdict::GrammarEasier
        } else if word > grammar * EASIER_RATIO {
            ComparisonVerdict::WordEasier
        } else {
            ComparisonVerdict::Comparable
        };
        Self {
            grammar_learning_rate: grammar,
            word_learning_rate: word,
            verdict,
        }
    }
}

/// Compare mean learning rates; `None` unless both categories are present
pub fn compare_categories(summaries: &[CategorySummary]) -> Option<CategoryComparison> {
    let rate = |c: SkillCategory| {
        summaries
            .iter()
            .find(|s| s.category == c)
            .map(|s| s.mean_parameters.learn)
    };
    Some(CategoryComparison::from_rates(
        rate(SkillCategory::Grammar)?,
        rate(SkillCategory::Word)?,
    ))
}

// ==================== Comparison With Defaults ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    Up,
    Down,
    Unchanged,
    /// The default was zero, so no relative change exists
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterChange {
    pub parameter: ParameterName,
    pub default: f64,
    pub discovered: f64,
    /// `None` when the default is zero
    pub percent_change: Option<f64>,
    pub direction: ChangeDirection,
}

impl fmt::Display for ParameterChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent_change {
            Some(pct) => write!(
                f,
                "{}: {:.3} -> {:.3} ({:+.1}%)",
                self.parameter, self.default, self.discovered, pct
            ),
            None => write!(
                f,
                "{}: {:.3} -> {:.3} (new)",
                self.parameter, self.default, self.discovered
            ),
        }
    }
}

/// Per-parameter change from `defaults` to `discovered`
pub fn compare_with_defaults(
    discovered: &BktParameters,
    defaults: &BktParameters,
) -> Vec<ParameterChange> {
    ParameterName::ALL
        .iter()
        .map(|&parameter| {
            let default = defaults.get(parameter);
            let value = discovered.get(parameter);

            let (percent_change, direction) = if default.abs() < EPSILON {
                (None, ChangeDirection::New)
            } else {
                let pct = (value - default) / default * 100.0;
                let direction = if (value - default).abs() < EPSILON {
                    ChangeDirection::Unchanged
                } else if value > default {
                    ChangeDirection::Up
                } else {
                    ChangeDirection::Down
                };
                (Some(pct), direction)
            };

            ParameterChange {
                parameter,
                default,
                discovered: value,
                percent_change,
                direction,
            }
        })
        .collect()
}

// ==================== Report ====================

/// One exported skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportItem {
    pub item_type: SkillCategory,
    pub total_responses: usize,
    pub total_users: usize,
    pub success_rate: f64,
    pub parameters: BktParameters,
}

impl From<&FitResult> for ReportItem {
    fn from(result: &FitResult) -> Self {
        Self {
            item_type: result.skill.category,
            total_responses: result.diagnostics.total_observations,
            total_users: result.diagnostics.total_users,
            success_rate: result.diagnostics.success_rate,
            parameters: result.parameters,
        }
    }
}

/// Analysis artifact written per category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub items: BTreeMap<String, ReportItem>,
    /// UTC, RFC 3339
    pub analysis_timestamp: String,
    pub total_items_analyzed: usize,
}

impl AnalysisReport {
    pub fn from_results(results: &[FitResult]) -> Self {
        let items: BTreeMap<String, ReportItem> = results
            .iter()
            .map(|r| (r.skill.id.clone(), ReportItem::from(r)))
            .collect();

        Self {
            total_items_analyzed: items.len(),
            items,
            analysis_timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
