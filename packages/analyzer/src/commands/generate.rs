use std::path::PathBuf;

use danci_bkt::{GeneratorConfig, SkillCategory, SyntheticGenerator, DEFAULT_SEED};
use serde_json::Value;

use crate::error::{AnalyzerError, Result};
use crate::export::{difficulty_mappings, synthetic_document, write_json};

pub const GRAMMAR_FILE: &str = "test_usergrammarpointprogresses.json";
pub const WORD_FILE: &str = "test_userwordprogresses.json";
pub const MAPPINGS_FILE: &str = "item_difficulty_mappings.json";

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub output_dir: PathBuf,
    pub seed: u64,
    pub users: usize,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            seed: DEFAULT_SEED,
            users: GeneratorConfig::default().users,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerateSummary {
    pub grammar_records: usize,
    pub word_records: usize,
    pub files: Vec<PathBuf>,
}

pub fn execute(options: &GenerateOptions) -> Result<GenerateSummary> {
    if options.users == 0 {
        return Err(AnalyzerError::Config("--users must be at least 1".into()));
    }
    std::fs::create_dir_all(&options.output_dir)
        .map_err(|e| AnalyzerError::io(&options.output_dir, e))?;

    let config = GeneratorConfig {
        users: options.users,
        ..Default::default()
    };
    let dataset = SyntheticGenerator::new(config, options.seed).generate();

    let mut summary = GenerateSummary {
        grammar_records: dataset.grammar_records.len(),
        word_records: dataset.word_records.len(),
        files: Vec::new(),
    };

    for (category, file) in [(SkillCategory::Grammar, GRAMMAR_FILE), (SkillCategory::Word, WORD_FILE)] {
        let documents: Vec<Value> = dataset
            .records(category)
            .iter()
            .map(|r| synthetic_document(r, category))
            .collect();
        let path = options.output_dir.join(file);
        write_json(&path, &documents)?;
        summary.files.push(path);
    }

    let path = options.output_dir.join(MAPPINGS_FILE);
    write_json(&path, &difficulty_mappings(&dataset))?;
    summary.files.push(path);

    tracing::info!(
        seed = options.seed,
        users = options.users,
        grammar_records = summary.grammar_records,
        word_records = summary.word_records,
        "synthetic data written"
    );
    Ok(summary)
}
