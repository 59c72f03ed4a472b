//! Console summary and report files

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use danci_bkt::{
    compare_categories, compare_with_defaults, summarize, AnalysisReport, BktParameters,
    CategorySummary, FitResult, SkillCategory,
};

use crate::error::Result;
use crate::export::write_json;

/// Report file of a category
pub fn report_file_name(category: SkillCategory) -> &'static str {
    match category {
        SkillCategory::Grammar => "grammar_bkt_analysis.json",
        SkillCategory::Word => "word_bkt_analysis.json",
    }
}

/// Write the category report into `output_dir`; returns the file path
pub fn write_report(output_dir: &Path, category: SkillCategory, results: &[FitResult]) -> Result<PathBuf> {
    let path = output_dir.join(report_file_name(category));
    let report = AnalysisReport::from_results(results);
    write_json(&path, &report)?;
    tracing::info!(path = %path.display(), items = report.total_items_analyzed, "report written");
    Ok(path)
}

/// Per-item comparison with the defaults, at debug level
pub fn log_parameter_changes(results: &[FitResult], defaults: &BktParameters) {
    for result in results {
        for change in compare_with_defaults(&result.parameters, defaults) {
            tracing::debug!(skill = %result.skill.id, "{change}");
        }
    }
}

fn category_heading(category: SkillCategory) -> &'static str {
    match category {
        SkillCategory::Grammar => "Grammar points analysed",
        SkillCategory::Word => "Words analysed",
    }
}

fn write_category(out: &mut String, summary: &CategorySummary) {
    let _ = writeln!(out, "{}: {}", category_heading(summary.category), summary.item_count);
    let _ = writeln!(out, "  Average learning rate:   {:.3}", summary.mean_parameters.learn);
    let _ = writeln!(out, "  Average slip rate:       {:.3}", summary.mean_parameters.slip);
    let _ = writeln!(out, "  Average prior knowledge: {:.3}", summary.mean_parameters.prior);
    let _ = writeln!(out, "  Average success rate:    {:.1}%", summary.mean_success_rate * 100.0);
    let _ = writeln!(out, "  Total responses:         {}", summary.total_responses);
}

/// Human-readable summary of all fitted skills
pub fn render_summary(results: &[FitResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(out, "BKT ANALYSIS SUMMARY");
    let _ = writeln!(out, "{}", "=".repeat(60));

    let summaries = summarize(results);
    if summaries.is_empty() {
        let _ = writeln!(out, "No items analysed.");
        return out;
    }
    for summary in &summaries {
        write_category(&mut out, summary);
    }

    if let Some(comparison) = compare_categories(&summaries) {
        let _ = writeln!(
            out,
            "Comparison: {} (grammar {:.3} vs words {:.3})",
            comparison.verdict, comparison.grammar_learning_rate, comparison.word_learning_rate
        );
    }
    out
}
