use std::path::{Path, PathBuf};

use danci_bkt::{
    group_by_skill_with_limit, AnalysisOutcome, AnalysisPipeline, FitResult, SkillCategory,
};

use crate::config::{Config, ConfigOverrides};
use crate::error::{AnalyzerError, Result};
use crate::export::load_export;
use crate::report::{log_parameter_changes, render_summary, write_report};

const GRAMMAR_EXPORTS: [&str; 2] = [
    "vocabularyApp.usergrammarpointprogressesFULL.json",
    "test_usergrammarpointprogresses.json",
];
const WORD_EXPORTS: [&str; 2] = [
    "vocabularyApp.userwordprogressesFULL.json",
    "test_userwordprogresses.json",
];

#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub grammar: Option<PathBuf>,
    pub word: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub workers: Option<usize>,
    /// CLI-level fitter overrides (fidelity, seed)
    pub overrides: ConfigOverrides,
}

impl AnalyzeOptions {
    fn input(&self, category: SkillCategory) -> Option<PathBuf> {
        let (explicit, fallbacks) = match category {
            SkillCategory::Grammar => (&self.grammar, GRAMMAR_EXPORTS),
            SkillCategory::Word => (&self.word, WORD_EXPORTS),
        };
        match explicit {
            Some(path) => Some(path.clone()),
            None => fallbacks.iter().map(PathBuf::from).find(|p| p.exists()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnalyzeSummary {
    pub results: Vec<FitResult>,
    pub skipped_skills: usize,
    pub malformed_records: usize,
    pub reports: Vec<PathBuf>,
    pub summary: String,
}

/// Layer the config file and CLI flags over the environment
pub fn resolve_config(base: &Config, options: &AnalyzeOptions) -> Result<Config> {
    let mut overrides = base.overrides.clone();
    if let Some(path) = &options.config {
        overrides = overrides.merge(ConfigOverrides::from_file(path)?);
    }
    overrides = overrides.merge(options.overrides.clone());

    Ok(Config {
        log_level: base.log_level.clone(),
        output_dir: options
            .output_dir
            .clone()
            .unwrap_or_else(|| base.output_dir.clone()),
        workers: options.workers.or(base.workers),
        overrides,
    })
}

pub fn execute(base: &Config, options: &AnalyzeOptions) -> Result<AnalyzeSummary> {
    let config = resolve_config(base, options)?;
    let fitter_config = config.fitter_config()?;
    let defaults = config.comparison_defaults()?;
    let max_record_attempts = config.max_record_attempts()?;

    tracing::info!(
        min_responses = fitter_config.min_responses,
        min_users = fitter_config.min_users,
        num_restarts = fitter_config.num_restarts,
        seed = fitter_config.seed,
        workers = ?config.workers,
        "starting BKT analysis"
    );

    let pool = match config.workers {
        Some(n) => Some(rayon::ThreadPoolBuilder::new().num_threads(n).build()?),
        None => None,
    };
    let pipeline =
        AnalysisPipeline::new(fitter_config).with_max_record_attempts(max_record_attempts);

    std::fs::create_dir_all(&config.output_dir)
        .map_err(|e| AnalyzerError::io(&config.output_dir, e))?;

    let mut summary = AnalyzeSummary::default();

    for category in SkillCategory::ALL {
        let Some(path) = options.input(category) else {
            tracing::warn!(category = %category, "no export file found, skipping");
            continue;
        };
        if !path.exists() {
            tracing::warn!(path = %path.display(), "export file not found, skipping");
            continue;
        }

        let analysed = analyze_file(&path, category, &pipeline, max_record_attempts, pool.as_ref());
        let (outcome, malformed) = match analysed {
            Ok(analysed) => analysed,
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "failed to load export");
                continue;
            }
        };
        summary.malformed_records += malformed;

        log_parameter_changes(&outcome.results, &defaults);
        summary.skipped_skills += outcome.skipped.len();

        if !outcome.results.is_empty() {
            let report = write_report(&config.output_dir, category, &outcome.results)?;
            summary.reports.push(report);
        }
        summary.results.extend(outcome.results);
    }

    summary.summary = render_summary(&summary.results);

    if summary.results.is_empty() {
        return Err(AnalyzerError::NothingAnalyzed);
    }
    Ok(summary)
}

/// Load, group and fit one export; also returns the malformed record count
fn analyze_file(
    path: &Path,
    category: SkillCategory,
    pipeline: &AnalysisPipeline,
    max_record_attempts: usize,
    pool: Option<&rayon::ThreadPool>,
) -> Result<(AnalysisOutcome, usize)> {
    let loaded = load_export(path, category)?;
    let grouped = group_by_skill_with_limit(loaded.records, max_record_attempts);
    let malformed = grouped.malformed.len() + loaded.rejected;

    tracing::info!(
        category = %category,
        skills = grouped.skill_count(),
        malformed,
        "grouped export"
    );

    let outcome = match pool {
        Some(pool) => pool.install(|| pipeline.analyze(&grouped, category)),
        None => pipeline.analyze(&grouped, category),
    };
    Ok((outcome, malformed))
}
