//! MongoDB-style progress exports
//!
//! Reads `usergrammarpointprogresses` / `userwordprogresses` exports into
//! [`SkillRecord`]s and writes synthetic datasets in the same shape.
//! Identifiers may be plain strings or `{"$oid": "..."}` objects.

use std::path::Path;

use danci_bkt::{SkillCategory, SkillRecord, SyntheticDataset, SyntheticRecord};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AnalyzerError, Result};

/// `"abc"` or `{"$oid": "abc"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectIdRef {
    Oid {
        #[serde(rename = "$oid")]
        oid: String,
    },
    Plain(String),
}

impl ObjectIdRef {
    pub fn as_str(&self) -> &str {
        match self {
            ObjectIdRef::Oid { oid } => oid,
            ObjectIdRef::Plain(id) => id,
        }
    }
}

/// Fields of one export document the analysis needs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDocument {
    #[serde(default)]
    pub user: Option<ObjectIdRef>,
    #[serde(default)]
    pub grammar_point: Option<ObjectIdRef>,
    #[serde(default)]
    pub word: Option<ObjectIdRef>,
    #[serde(default)]
    pub success_count: usize,
    #[serde(default)]
    pub failure_count: usize,
    #[serde(default, alias = "_debugSequence")]
    pub sequence: Option<Vec<u8>>,
}

impl ProgressDocument {
    pub fn into_record(self, category: SkillCategory) -> SkillRecord {
        let item = match category {
            SkillCategory::Grammar => self.grammar_point,
            SkillCategory::Word => self.word,
        };
        SkillRecord {
            user: self.user.map(|id| id.as_str().to_string()),
            skill: item.map(|id| id.as_str().to_string()),
            success_count: self.success_count,
            failure_count: self.failure_count,
            sequence: self.sequence,
        }
    }
}

/// Records of one export file
#[derive(Debug, Clone, Default)]
pub struct LoadedExport {
    pub records: Vec<SkillRecord>,
    /// Documents that could not be decoded at all
    pub rejected: usize,
}

/// Item key of `category` in export documents
pub fn item_key(category: SkillCategory) -> &'static str {
    match category {
        SkillCategory::Grammar => "grammarPoint",
        SkillCategory::Word => "word",
    }
}

/// Load an export; a document that fails to decode is logged and skipped
pub fn load_export(path: &Path, category: SkillCategory) -> Result<LoadedExport> {
    let raw = std::fs::read_to_string(path).map_err(|e| AnalyzerError::io(path, e))?;
    let documents: Vec<Value> = serde_json::from_str(&raw).map_err(|e| AnalyzerError::json(path, e))?;

    let mut loaded = LoadedExport::default();
    for (index, document) in documents.into_iter().enumerate() {
        match serde_json::from_value::<ProgressDocument>(document) {
            Ok(doc) => loaded.records.push(doc.into_record(category)),
            Err(err) => {
                tracing::warn!(path = %path.display(), index, error = %err, "skipping undecodable document");
                loaded.rejected += 1;
            }
        }
    }

    tracing::info!(
        path = %path.display(),
        category = %category,
        records = loaded.records.len(),
        rejected = loaded.rejected,
        "loaded export"
    );
    Ok(loaded)
}

/// Export document for one synthetic record
pub fn synthetic_document(record: &SyntheticRecord, category: SkillCategory) -> Value {
    let mut doc = json!({
        "_id": { "$oid": record.id },
        "user": { "$oid": record.user },
        "successCount": record.success_count,
        "failureCount": record.failure_count,
        "_debugSequence": record.sequence,
        "__v": 0,
    });
    doc[item_key(category)] = json!({ "$oid": record.item });
    if let Some(score) = record.mastery_score {
        doc["masteryScore"] = json!(score);
    }
    doc
}

/// Item → difficulty mapping file
pub fn difficulty_mappings(dataset: &SyntheticDataset) -> Value {
    json!({
        "grammar_points": dataset.grammar_items,
        "words": dataset.word_items,
        "generated_at": chrono::Utc::now().to_rfc3339(),
    })
}

pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let body = serde_json::to_string_pretty(value).map_err(|e| AnalyzerError::json(path, e))?;
    std::fs::write(path, body).map_err(|e| AnalyzerError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use danci_bkt::Difficulty;

    #[test]
    fn test_oid_and_plain_ids() {
        let doc: ProgressDocument = serde_json::from_str(
            r#"{"user":{"$oid":"u1"},"grammarPoint":"g1","successCount":3,"failureCount":2}"#,
        )
        .unwrap();
        let record = doc.into_record(SkillCategory::Grammar);
        assert_eq!(record.user.as_deref(), Some("u1"));
        assert_eq!(record.skill.as_deref(), Some("g1"));
        assert_eq!(record.success_count, 3);
        assert!(record.sequence.is_none());
    }

    #[test]
    fn test_item_key_follows_category() {
        let doc: ProgressDocument =
            serde_json::from_str(r#"{"user":"u1","word":{"$oid":"w1"},"_debugSequence":[0,1]}"#)
                .unwrap();
        let as_grammar = doc.clone().into_record(SkillCategory::Grammar);
        assert!(as_grammar.skill.is_none());
        let as_word = doc.into_record(SkillCategory::Word);
        assert_eq!(as_word.skill.as_deref(), Some("w1"));
        assert_eq!(as_word.sequence, Some(vec![0, 1]));
    }

    #[test]
    fn test_synthetic_document_shape() {
        let record = SyntheticRecord {
            id: "a".repeat(24),
            user: "b".repeat(24),
            item: "c".repeat(24),
            difficulty: Difficulty::Easy,
            success_count: 2,
            failure_count: 1,
            sequence: vec![0, 1, 1],
            mastery_score: Some(0.63),
        };
        let doc = synthetic_document(&record, SkillCategory::Word);
        assert_eq!(doc["word"]["$oid"], "c".repeat(24));
        assert_eq!(doc["successCount"], 2);
        assert_eq!(doc["masteryScore"], 0.63);
        assert!(doc.get("grammarPoint").is_none());

        let back: ProgressDocument = serde_json::from_value(doc).unwrap();
        assert_eq!(back.sequence, Some(vec![0, 1, 1]));
    }

    #[test]
    fn test_no_mastery_score_without_attempts() {
        let record = SyntheticRecord {
            id: "a".into(),
            user: "b".into(),
            item: "c".into(),
            difficulty: Difficulty::Hard,
            success_count: 0,
            failure_count: 0,
            sequence: vec![],
            mastery_score: None,
        };
        let doc = synthetic_document(&record, SkillCategory::Grammar);
        assert!(doc.get("masteryScore").is_none());
    }
}
