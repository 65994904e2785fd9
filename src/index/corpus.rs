//! JSON corpus format for building in-memory indexes.
//!
//! ```json
//! {
//!   "segment_size": 100,
//!   "documents": [
//!     {
//!       "fields": {
//!         "contents": {
//!           "annotations": { "word": ["The", "cat", "sat"], "lemma": ["the", "cat", "sit"] },
//!           "tags": [{ "name": "s", "start": 0, "end": 3 }],
//!           "relations": [
//!             { "type": "dep::det", "source": [1, 2], "target": [0, 1] },
//!             { "type": "dep::root", "target": [2, 3] }
//!           ]
//!         }
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! A relation without `source` is a root relation. A relation with
//! `target_field` points into another field of the same document.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpanlabError};
use crate::spans::position::Position;
use crate::spans::relation_info::RelationInfo;

/// A whole corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    /// Maximum number of documents per segment; all documents go into one
    /// segment when absent.
    #[serde(default)]
    pub segment_size: Option<usize>,

    /// The documents, in id order.
    pub documents: Vec<CorpusDocument>,
}

/// One document: its fields by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub fields: BTreeMap<String, CorpusField>,
}

/// Token annotations, tags and relations of one field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusField {
    #[serde(default)]
    pub annotations: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub tags: Vec<CorpusTag>,
    #[serde(default)]
    pub relations: Vec<CorpusRelation>,
}

/// An inline tag spanning `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusTag {
    pub name: String,
    pub start: Position,
    pub end: Position,
}

/// A relation between two spans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRelation {
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(default)]
    pub source: Option<[Position; 2]>,
    pub target: [Position; 2],
    #[serde(default)]
    pub target_field: Option<String>,
}

impl CorpusRelation {
    /// The relation as stored in the index, resolving the target field name
    /// through `field_id`.
    pub fn to_relation_info<F>(&self, field_id: F) -> Result<RelationInfo>
    where
        F: Fn(&str) -> Option<u32>,
    {
        let [target_start, target_end] = self.target;
        let mut info = match self.source {
            Some([source_start, source_end]) => {
                RelationInfo::new(source_start, source_end, target_start, target_end)
            }
            None => RelationInfo::root(target_start, target_end),
        };
        if let Some(field) = &self.target_field {
            let id = field_id(field).ok_or_else(|| {
                SpanlabError::invalid_argument(format!("unknown target field '{field}'"))
            })?;
            info = info.with_target_field(id);
        }
        Ok(info)
    }
}

impl Corpus {
    /// Parse a corpus from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a corpus from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Names of all fields used by any document, sorted. Their positions
    /// are the numeric field ids.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .documents
            .iter()
            .flat_map(|doc| doc.fields.keys().cloned())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_corpus() {
        let corpus = Corpus::from_json_str(
            r#"{
                "documents": [
                    {"fields": {"contents": {
                        "annotations": {"word": ["a", "b"]},
                        "relations": [{"type": "dep::root", "target": [1, 2]}]
                    }}},
                    {"fields": {"contents__de": {"annotations": {"word": ["c"]}}}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(corpus.segment_size, None);
        assert_eq!(corpus.field_names(), vec!["contents", "contents__de"]);

        let relation = &corpus.documents[0].fields["contents"].relations[0];
        let info = relation.to_relation_info(|_| None).unwrap();
        assert!(info.root);
        assert_eq!((info.target_start, info.target_end), (1, 2));
    }

    #[test]
    fn test_unknown_target_field() {
        let relation = CorpusRelation {
            relation_type: "align".to_string(),
            source: Some([0, 1]),
            target: [0, 1],
            target_field: Some("missing".to_string()),
        };
        assert!(relation.to_relation_info(|_| None).is_err());
    }
}
