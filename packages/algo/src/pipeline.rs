//! Analysis pipeline
//!
//! Grouped records → observation sets → fits, one rayon task per skill.
//! Runs on whichever rayon pool is current; callers that need a bounded
//! pool wrap the call in `ThreadPool::install`.

use rayon::prelude::*;

use crate::error::{BktError, Result};
use crate::fitter::{BktFitter, FitterConfig};
use crate::records::{GroupedRecords, UserAttempts};
use crate::sequence::SequenceBuilder;
use crate::simulator::SimulationConfig;
use crate::types::{FitResult, Skill, SkillCategory};

/// Fitted skills and the skills that were skipped
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    /// Sorted by skill id
    pub results: Vec<FitResult>,
    pub skipped: Vec<BktError>,
}

impl AnalysisOutcome {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Builds sequences and fits every skill of one category
#[derive(Debug, Clone, Default)]
pub struct AnalysisPipeline {
    fitter: BktFitter,
    builder: SequenceBuilder,
}

impl AnalysisPipeline {
    /// The sequence builder shares the fitter's run seed
    pub fn new(config: FitterConfig) -> Self {
        let builder = SequenceBuilder::new(config.seed);
        Self {
            fitter: BktFitter::new(config),
            builder,
        }
    }

    pub fn with_simulation(mut self, simulation: SimulationConfig) -> Self {
        self.builder = self.builder.with_simulation(simulation);
        self
    }

    /// Users whose count-only attempts exceed `max_attempts` are left out
    pub fn with_max_record_attempts(mut self, max_attempts: usize) -> Self {
        self.builder = self.builder.with_max_attempts(max_attempts);
        self
    }

    pub fn fitter(&self) -> &BktFitter {
        &self.fitter
    }

    /// Fit one skill from its users' attempts
    pub fn analyze_skill(&self, skill: &Skill, users: &[UserAttempts]) -> Result<FitResult> {
        let observations = self.builder.build(&skill.id, users)?;
        self.fitter.fit(skill, &observations)
    }

    /// Fit every skill in `grouped` as `category`
    pub fn analyze(&self, grouped: &GroupedRecords, category: SkillCategory) -> AnalysisOutcome {
        let outcomes: Vec<Result<FitResult>> = grouped
            .skills
            .par_iter()
            .map(|(id, users)| self.analyze_skill(&Skill::new(id.as_str(), category), users))
            .collect();

        let mut analysis = AnalysisOutcome::default();
        for outcome in outcomes {
            match outcome {
                Ok(result) => analysis.results.push(result),
                Err(err) => {
                    tracing::info!(category = %category, error = %err, "skipped skill");
                    analysis.skipped.push(err);
                }
            }
        }
        analysis.results.sort_by(|a, b| a.skill.id.cmp(&b.skill.id));

        tracing::info!(
            category = %category,
            fitted = analysis.results.len(),
            skipped = analysis.skipped.len(),
            "analysis finished"
        );

        analysis
    }
}
